use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbaImage};

use crate::capture::RawFrame;
use crate::error::CodecError;

/// Resize filter picked by current pipeline load: nearest when the encoder
/// is falling behind, bilinear otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    Nearest,
    Bilinear,
}

impl ResizeMode {
    fn filter(self) -> FilterType {
        match self {
            ResizeMode::Nearest => FilterType::Nearest,
            ResizeMode::Bilinear => FilterType::Triangle,
        }
    }
}

/// JPEG output settings. The encoder always emits baseline (non-progressive)
/// scans with chroma subsampling, so only quality varies per frame.
#[derive(Debug, Clone, Copy)]
pub struct JpegOptions {
    pub quality: u8,
}

/// Decode a raw RGBA sample into a pixel image. Takes the frame by value
/// so the buffer moves straight into the image; raw frames run to
/// hundreds of megabytes on large displays.
pub fn decode(frame: RawFrame) -> Result<RgbaImage, CodecError> {
    let expected = frame.width as usize * frame.height as usize * 4;
    let actual = frame.data.len();
    if actual != expected {
        return Err(CodecError::InvalidRawFrame {
            width: frame.width,
            height: frame.height,
            expected,
            actual,
        });
    }
    ImageBuffer::from_raw(frame.width, frame.height, frame.data).ok_or(
        CodecError::InvalidRawFrame {
            width: frame.width,
            height: frame.height,
            expected,
            actual,
        },
    )
}

pub fn resize(image: &RgbaImage, width: u32, height: u32, mode: ResizeMode) -> RgbaImage {
    imageops::resize(image, width, height, mode.filter())
}

/// Encode to JPEG. Alpha is stripped first; the JPEG encoder only takes RGB.
pub fn encode_jpeg(image: RgbaImage, opts: JpegOptions) -> Result<Vec<u8>, CodecError> {
    let rgb = image::DynamicImage::ImageRgba8(image).into_rgb8();
    let mut jpeg_data = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_data, opts.quality.clamp(1, 100));
    encoder.encode_image(&rgb)?;
    Ok(jpeg_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> RawFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        RawFrame {
            data,
            width,
            height,
        }
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let frame = RawFrame {
            data: vec![0u8; 10],
            width: 4,
            height: 4,
        };
        assert!(decode(frame).is_err());
    }

    #[test]
    fn test_decode_resize_encode_round() {
        let frame = solid_frame(64, 32, [10, 200, 30, 255]);
        let image = decode(frame).unwrap();
        assert_eq!(image.dimensions(), (64, 32));

        let resized = resize(&image, 32, 16, ResizeMode::Bilinear);
        assert_eq!(resized.dimensions(), (32, 16));

        let jpeg = encode_jpeg(resized, JpegOptions { quality: 80 }).unwrap();
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_lower_quality_is_not_larger() {
        // Noisy-ish gradient so quality actually matters
        let width = 128u32;
        let height = 64u32;
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 2) as u8, (y * 3) as u8, ((x + y) * 5) as u8, 255]);
            }
        }
        let frame = RawFrame {
            data,
            width,
            height,
        };
        let image = decode(frame).unwrap();
        let high = encode_jpeg(image.clone(), JpegOptions { quality: 90 }).unwrap();
        let low = encode_jpeg(image, JpegOptions { quality: 60 }).unwrap();
        assert!(low.len() <= high.len());
    }
}
