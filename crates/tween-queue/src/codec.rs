//! Lossless, text-safe frame encoding: PNG armored as standard base64.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, RgbImage};

use crate::error::{QueueError, QueueResult};

/// Encode an RGB raster for transport.
pub fn encode_frame(raster: &RgbImage) -> QueueResult<String> {
    let mut bytes = Cursor::new(Vec::new());
    PngEncoder::new(&mut bytes)
        .write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ColorType::Rgb8,
        )
        .map_err(|e| QueueError::codec(format!("PNG encode failed: {}", e)))?;
    Ok(STANDARD.encode(bytes.into_inner()))
}

/// Decode a transported raster. Any PNG color type is converted to RGB.
pub fn decode_frame(text: &str) -> QueueResult<RgbImage> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| QueueError::codec(format!("invalid base64: {}", e)))?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| QueueError::codec(format!("invalid PNG: {}", e)))?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_encoding_is_lossless() {
        let raster = gradient(33, 17);
        let decoded = decode_frame(&encode_frame(&raster).unwrap()).unwrap();
        assert_eq!(decoded, raster);
    }

    #[test]
    fn test_armoring_is_text_safe() {
        let text = encode_frame(&gradient(8, 8)).unwrap();
        assert!(text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='));
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        assert!(matches!(decode_frame("not base64!"), Err(QueueError::Codec(_))));
        assert!(matches!(
            decode_frame(&STANDARD.encode(b"definitely not a png")),
            Err(QueueError::Codec(_))
        ));
    }
}
