pub mod color_processing;
pub mod compositor;
pub mod filters;
pub mod patterns;
pub mod resize;
pub mod tone_mapping;

pub use compositor::BlendMode;
pub use patterns::Pattern;
pub use tone_mapping::ToneMapMode;
