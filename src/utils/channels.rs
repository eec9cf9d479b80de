//! Channel naming for multi-plane files: `<layer>.<tag>`.

use std::cmp::Ordering;

/// Layer used for channels that carry no `layer.` prefix.
pub const DEFAULT_LAYER: &str = "default";

const RGBA_TAGS: [&str; 4] = ["R", "G", "B", "A"];

/// Splits a full channel name into `(layer, short)` at the last `.`.
/// When the header carries its own layer name, that name wins and only the
/// short part is taken from the channel.
#[inline]
pub fn split_layer_and_short(full: &str, base_attr: Option<&str>) -> (String, String) {
    if let Some(base) = base_attr {
        let short = full.rsplit('.').next().unwrap_or(full).to_string();
        (base.to_string(), short)
    } else if let Some(p) = full.rfind('.') {
        (full[..p].to_string(), full[p + 1..].to_string())
    } else {
        ("".to_string(), full.to_string())
    }
}

/// Maps an empty layer part onto [`DEFAULT_LAYER`].
#[inline]
pub fn layer_or_default(layer: &str) -> &str {
    if layer.is_empty() { DEFAULT_LAYER } else { layer }
}

/// Normalizes long channel names to the standard R/G/B/A shorthands.
#[inline]
pub fn normalize_channel_name(channel: &str) -> String {
    let upper = channel.trim().to_ascii_uppercase();
    match upper.as_str() {
        "R" | "RED" => "R".to_string(),
        "G" | "GREEN" => "G".to_string(),
        "B" | "BLUE" => "B".to_string(),
        "A" | "ALPHA" => "A".to_string(),
        _ => channel.to_string(),
    }
}

/// Tag written for channel `index` of a pass: R, G, B, A, then the decimal index.
#[inline]
pub fn channel_tag(index: usize) -> String {
    match RGBA_TAGS.get(index) {
        Some(tag) => (*tag).to_string(),
        None => index.to_string(),
    }
}

#[inline]
pub fn full_channel_name(layer: &str, index: usize) -> String {
    format!("{}.{}", layer, channel_tag(index))
}

/// Sort key for tags inside one layer: R, G, B, A first, numeric tags
/// ascending after them, anything else by name.
pub fn channel_order_key(tag: &str) -> (u8, usize, String) {
    if let Some(pos) = RGBA_TAGS.iter().position(|t| *t == tag) {
        return (0, pos, String::new());
    }
    match tag.parse::<usize>() {
        Ok(n) => (1, n, String::new()),
        Err(_) => (2, 0, tag.to_string()),
    }
}

pub fn compare_tags(a: &str, b: &str) -> Ordering {
    channel_order_key(a).cmp(&channel_order_key(b))
}
