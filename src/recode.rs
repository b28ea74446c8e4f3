//! Pixel re-encoding: PNG in, WEBP out.

use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Largest width or height a WEBP bitstream can carry.
pub const MAX_WEBP_DIMENSION: u32 = 16383;

/// WEBP encoder settings for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeParams {
    /// Lossless encoding. Pixel values survive exactly.
    pub lossless: bool,
    /// Lossy quality, 0 (smallest) to 100 (best). Ignored when lossless.
    pub quality: f32,
    /// Encoder effort, 0 (fast) to 6 (slow, smaller output).
    pub method: u8,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            lossless: false,
            quality: 80.0,
            method: 4,
        }
    }
}

/// Decode PNG bytes into pixels. Palette and grayscale images are expanded by
/// the decoder.
pub fn decode_png(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| ConvertError::decode(format!("invalid PNG data: {e}")))
}

/// Encode pixels as WEBP.
///
/// Images with alpha are encoded from RGBA, others from RGB. Lossless output
/// keeps the RGB values of fully transparent pixels too, so it decodes
/// pixel-identical to an 8-bit source.
pub fn encode_webp(image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ConvertError::encode("image has no pixels"));
    }
    if width > MAX_WEBP_DIMENSION || height > MAX_WEBP_DIMENSION {
        return Err(ConvertError::encode(format!(
            "{width}x{height} exceeds the WEBP limit of {MAX_WEBP_DIMENSION} pixels per side"
        )));
    }

    let color = image.color();
    if color.bytes_per_pixel() / color.channel_count() > 1 {
        if params.lossless {
            return Err(ConvertError::encode(format!(
                "{color:?} has more than 8 bits per channel and cannot be stored losslessly"
            )));
        }
        log::debug!("Reducing {color:?} to 8 bits per channel");
    }

    let encoded = if color.has_alpha() {
        let rgba = image.to_rgba8();
        configure(webpx::Encoder::new_rgba(rgba.as_raw(), width, height), params).encode(webpx::Unstoppable)
    } else {
        let rgb = image.to_rgb8();
        configure(webpx::Encoder::new_rgb(rgb.as_raw(), width, height), params).encode(webpx::Unstoppable)
    };

    encoded.map_err(|e| ConvertError::encode(e.to_string()))
}

fn configure<'a>(encoder: webpx::Encoder<'a>, params: &EncodeParams) -> webpx::Encoder<'a> {
    let encoder = encoder.method(params.method.min(6));
    if params.lossless {
        encoder.lossless(true).exact(true)
    } else {
        encoder.quality(params.quality.clamp(0.0, 100.0))
    }
}
