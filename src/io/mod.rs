pub mod exr_file;
pub mod exr_metadata;
pub mod manifest;
pub mod preview;

pub use exr_file::{
    load_exr, load_multi_plane_exr, save_exr, save_multi_plane_exr, ExrCompression, SampleFormat, WriteOptions,
};
pub use exr_metadata::{read_summary, ExrSummary, LayerSummary};
pub use manifest::{PassEntry, PassManifest};
pub use preview::{export_preview, PreviewFormat, PreviewParams};
