use crate::image_data::ImageData;

/// One named AOV of a multi-plane render.
///
/// `layer_name` is the channel-group prefix used on disk (`<layer_name>.R`);
/// it starts out equal to `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    pub name: String,
    pub image: ImageData,
    pub layer_name: String,
    pub is_alpha: bool,
}

impl RenderPass {
    pub fn new(name: impl Into<String>, width: usize, height: usize, channels: usize, is_alpha: bool) -> Self {
        Self::from_image(name, ImageData::new(width, height, channels), is_alpha)
    }

    pub fn from_image(name: impl Into<String>, image: ImageData, is_alpha: bool) -> Self {
        let name = name.into();
        Self {
            layer_name: name.clone(),
            name,
            image,
            is_alpha,
        }
    }

    pub fn with_layer_name(mut self, layer_name: impl Into<String>) -> Self {
        self.layer_name = layer_name.into();
        self
    }

    #[inline]
    pub fn width(&self) -> usize { self.image.width() }

    #[inline]
    pub fn height(&self) -> usize { self.image.height() }

    #[inline]
    pub fn channels(&self) -> usize { self.image.channels() }
}
