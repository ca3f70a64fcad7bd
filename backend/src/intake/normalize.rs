use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use log::debug;

use super::error::AnalyzeError;

/// Bounds the image to `max_dimension` on its longer side, then flattens any
/// alpha onto opaque white. Always yields 8-bit RGB.
pub fn normalize(image: DynamicImage, max_dimension: u32) -> Result<RgbImage, AnalyzeError> {
    debug!(
        "Normalizing image - original size: {}x{}",
        image.width(),
        image.height()
    );

    let image = bound_size(image, max_dimension);

    if image.color().has_alpha() {
        let flattened = flatten_onto_white(&image)?;
        debug!("Flattened transparent image onto white background");
        Ok(flattened)
    } else {
        Ok(image.to_rgb8())
    }
}

/// Downscales with Lanczos3, keeping the aspect ratio. Never upscales.
fn bound_size(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image;
    }
    let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    debug!("Resized image - new size: {}x{}", resized.width(), resized.height());
    resized
}

fn flatten_onto_white(image: &DynamicImage) -> Result<RgbImage, AnalyzeError> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut canvas = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        canvas.extend([r, g, b].map(|channel| composite_on_white(channel, a)));
    }

    RgbImage::from_raw(width, height, canvas).ok_or_else(|| {
        AnalyzeError::Normalization(format!(
            "composited buffer does not fit {}x{}",
            width, height
        ))
    })
}

fn composite_on_white(channel: u8, alpha: u8) -> u8 {
    let alpha = u32::from(alpha);
    let blended = (u32::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255;
    blended as u8
}
