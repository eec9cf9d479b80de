pub mod channels;

pub use channels::{
    channel_order_key, channel_tag, compare_tags, full_channel_name, layer_or_default,
    normalize_channel_name, split_layer_and_short, DEFAULT_LAYER,
};

/// Byte count with a binary unit, two decimals above plain bytes.
pub fn human_size(bytes: u64) -> String {
    const STEPS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let exponent = ((63 - bytes.leading_zeros()) / 10).min(STEPS.len() as u32);
    let scaled = bytes as f64 / (1u64 << (10 * exponent)) as f64;
    format!("{:.2} {}", scaled, STEPS[exponent as usize - 1])
}
