use image::error::{
    ImageFormatHint, LimitError, LimitErrorKind, UnsupportedError, UnsupportedErrorKind,
};
use image::{ColorType, DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::Cursor;

use super::error::AnalyzeError;

/// Decoder tags, spelled the way they appear in the format allow-list.
const FORMAT_TAGS: &[(ImageFormat, &str)] = &[
    (ImageFormat::Jpeg, "JPEG"),
    (ImageFormat::Png, "PNG"),
    (ImageFormat::Gif, "GIF"),
    (ImageFormat::Bmp, "BMP"),
    (ImageFormat::WebP, "WEBP"),
    (ImageFormat::Tiff, "TIFF"),
    (ImageFormat::Ico, "ICO"),
];

pub fn format_tag(format: ImageFormat) -> String {
    FORMAT_TAGS
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, tag)| tag.to_string())
        .unwrap_or_else(|| format!("{:?}", format).to_uppercase())
}

pub fn parse_format_tag(tag: &str) -> Option<ImageFormat> {
    FORMAT_TAGS
        .iter()
        .find(|(_, t)| *t == tag)
        .map(|(f, _)| *f)
}

#[derive(Debug)]
pub struct DecodedImage {
    pub pixels: DynamicImage,
    pub format: ImageFormat,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn color(&self) -> ColorType {
        self.pixels.color()
    }

    pub fn format_tag(&self) -> String {
        format_tag(self.format)
    }
}

/// Sniffs the container format from the leading bytes and decodes the whole
/// image. The filename extension is never consulted. Images declaring more
/// than `max_pixels` pixels are rejected from the header alone.
pub fn decode(bytes: &[u8], max_pixels: u64) -> Result<DecodedImage, AnalyzeError> {
    let format = sniff(bytes)?.format().ok_or_else(|| {
        AnalyzeError::Decode(ImageError::Unsupported(
            UnsupportedError::from_format_and_kind(
                ImageFormatHint::Unknown,
                UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
            ),
        ))
    })?;

    let (width, height) = sniff(bytes)?
        .into_dimensions()
        .map_err(AnalyzeError::Decode)?;
    if u64::from(width) * u64::from(height) > max_pixels {
        return Err(AnalyzeError::Decode(ImageError::Limits(
            LimitError::from_kind(LimitErrorKind::DimensionError),
        )));
    }

    let pixels = sniff(bytes)?.decode().map_err(AnalyzeError::Decode)?;
    Ok(DecodedImage { pixels, format })
}

fn sniff(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, AnalyzeError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AnalyzeError::Decode(ImageError::IoError(e)))
}
