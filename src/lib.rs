//! Multi-pass OpenEXR processing: load and pack render passes, filter them,
//! and combine them with additive or blend-mode compositing.

pub mod config;
pub mod error;
pub mod image_data;
pub mod io;
pub mod processing;
pub mod processor;
pub mod render_pass;
pub mod utils;

pub use config::ProcessorConfig;
pub use error::{ProcessingError, Result};
pub use image_data::ImageData;
pub use processing::{BlendMode, Pattern, ToneMapMode};
pub use processor::ExrProcessor;
pub use render_pass::RenderPass;
