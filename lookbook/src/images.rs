//! Reference image preparation.
//!
//! Pure, synchronous functions over in-memory buffers: decode with limits, shrink to a maximum
//! dimension, pad to an aspect ratio, place two photos side by side for combined model input,
//! and re-encode. Callers on the async runtime should run these on `spawn_blocking`.

use std::io::Cursor;

use image::{
    DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits, Rgb, RgbImage,
    codecs::jpeg::JpegEncoder,
    imageops::{self, FilterType},
};
use thiserror::Error;

use crate::aspect_ratio::AspectRatio;

/// Largest side accepted from any decoder, independent of the configured output size
const MAX_DECODE_DIMENSION: u32 = 12_000;

/// Canvas colour used for padding and composites
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is empty")]
    Empty,

    #[error("Image data is too large: {size} bytes (max: {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Encodings produced by [`encode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
    WebP,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg { .. } => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }
}

/// An encoded image ready to upload
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

impl EncodedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Sniff the container format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    let format = image::guess_format(bytes).map_err(|_| ImageError::UnsupportedFormat)?;
    match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif | ImageFormat::Bmp | ImageFormat::Tiff => {
            Ok(format)
        }
        _ => Err(ImageError::UnsupportedFormat),
    }
}

/// Decode an uploaded or downloaded image, rejecting oversized input before allocation
pub fn decode(bytes: &[u8], max_bytes: usize) -> Result<DynamicImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let format = detect_format(bytes)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    reader.decode().map_err(ImageError::Decode)
}

/// Shrink so neither side exceeds `max_dimension`, preserving aspect ratio. Never upscales.
pub fn fit_within(image: &DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return image.clone();
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// Extend the canvas (centred, white) so the image has the requested aspect ratio
pub fn pad_to_aspect(image: &DynamicImage, ratio: AspectRatio) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (rw, rh) = ratio.terms();

    // Smallest canvas with the target ratio that contains the image
    let (canvas_w, canvas_h) = if (width as u64) * (rh as u64) >= (height as u64) * (rw as u64) {
        (width, ((width as u64 * rh as u64).div_ceil(rw as u64)) as u32)
    } else {
        (((height as u64 * rw as u64).div_ceil(rh as u64)) as u32, height)
    };

    if (canvas_w, canvas_h) == (width, height) {
        return image.clone();
    }

    let mut canvas = RgbImage::from_pixel(canvas_w, canvas_h, BACKGROUND);
    let x = (canvas_w - width) / 2;
    let y = (canvas_h - height) / 2;
    imageops::replace(&mut canvas, &image.to_rgb8(), x as i64, y as i64);
    DynamicImage::ImageRgb8(canvas)
}

/// Scale both images to the shorter of the two heights and place them left to right
pub fn combine_side_by_side(left: &DynamicImage, right: &DynamicImage) -> DynamicImage {
    let height = left.height().min(right.height()).max(1);

    let scale_to_height = |image: &DynamicImage| -> RgbImage {
        if image.height() == height {
            return image.to_rgb8();
        }
        let width = ((image.width() as f64) * (height as f64) / (image.height() as f64)).round().max(1.0) as u32;
        image.resize_exact(width, height, FilterType::Lanczos3).to_rgb8()
    };

    let left = scale_to_height(left);
    let right = scale_to_height(right);

    let mut canvas = RgbImage::from_pixel(left.width() + right.width(), height, BACKGROUND);
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, left.width() as i64, 0);
    DynamicImage::ImageRgb8(canvas)
}

pub fn encode(image: &DynamicImage, format: OutputFormat) -> Result<EncodedImage, ImageError> {
    let mut bytes = Vec::new();
    match format {
        OutputFormat::Jpeg { quality } => {
            // JPEG has no alpha channel
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
                .encode_image(&rgb)
                .map_err(ImageError::Encode)?;
        }
        OutputFormat::Png => image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(ImageError::Encode)?,
        OutputFormat::WebP => image
            .to_rgba8()
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::WebP)
            .map_err(ImageError::Encode)?,
    }

    Ok(EncodedImage {
        bytes,
        width: image.width(),
        height: image.height(),
        format,
    })
}

/// Decoded and resized reference photos, plus the single image sent to the model
#[derive(Debug, Clone)]
pub struct PreparedReferences {
    /// One JPEG per input photo, in input order
    pub references: Vec<EncodedImage>,
    /// Side-by-side composite when more than one photo was supplied
    pub combined: Option<EncodedImage>,
}

impl PreparedReferences {
    /// The image the model should condition on
    pub fn model_input(&self) -> Option<&EncodedImage> {
        self.combined.as_ref().or_else(|| self.references.first())
    }
}

/// Decode one reference photo, shrink it to `max_dimension` and JPEG-encode it.
/// Returns the resized image alongside its encoding.
pub fn prepare_reference(
    bytes: &[u8],
    max_bytes: usize,
    max_dimension: u32,
    quality: u8,
) -> Result<(DynamicImage, EncodedImage), ImageError> {
    let image = fit_within(&decode(bytes, max_bytes)?, max_dimension);
    let encoded = encode(&image, OutputFormat::Jpeg { quality })?;
    Ok((image, encoded))
}

/// Decode, shrink and JPEG-encode every reference. With two or more, the first two are also
/// composited side by side and padded to the nearest supported aspect ratio.
pub fn prepare_references(
    inputs: &[&[u8]],
    max_bytes: usize,
    max_dimension: u32,
    quality: u8,
) -> Result<PreparedReferences, ImageError> {
    let (decoded, references): (Vec<_>, Vec<_>) = inputs
        .iter()
        .map(|bytes| prepare_reference(bytes, max_bytes, max_dimension, quality))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .unzip();

    let jpeg = OutputFormat::Jpeg { quality };

    let combined = match decoded.as_slice() {
        [left, right, ..] => {
            let composite = combine_side_by_side(left, right);
            let ratio = AspectRatio::nearest_to(composite.width(), composite.height());
            let composite = fit_within(&pad_to_aspect(&composite, ratio), max_dimension);
            Some(encode(&composite, jpeg)?)
        }
        _ => None,
    };

    Ok(PreparedReferences { references, combined })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// PNG of a solid colour, for tests across the crate
    pub(crate) fn solid_png(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(colour)));
        encode(&image, OutputFormat::Png).unwrap().bytes
    }

    #[test]
    fn test_decode_rejects_empty_and_oversized() {
        assert!(matches!(decode(&[], 1024), Err(ImageError::Empty)));

        let png = solid_png(4, 4, [255, 0, 0]);
        assert!(matches!(decode(&png, 10), Err(ImageError::TooLarge { limit: 10, .. })));
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let result = decode(b"definitely not an image", 1024);
        assert!(matches!(result, Err(ImageError::UnsupportedFormat)));
    }

    #[test]
    fn test_decode_png() {
        let png = solid_png(8, 6, [0, 255, 0]);
        let image = decode(&png, 1024 * 1024).unwrap();
        assert_eq!(image.dimensions(), (8, 6));
        assert_eq!(detect_format(&png).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_fit_within_never_upscales() {
        let small = DynamicImage::ImageRgb8(RgbImage::new(100, 50));
        assert_eq!(fit_within(&small, 200).dimensions(), (100, 50));

        let large = DynamicImage::ImageRgb8(RgbImage::new(400, 200));
        assert_eq!(fit_within(&large, 200).dimensions(), (200, 100));
    }

    #[test]
    fn test_prepare_reference_shrinks_to_jpeg() {
        let png = solid_png(300, 150, [20, 40, 60]);
        let (image, encoded) = prepare_reference(&png, 1024 * 1024, 100, 80).unwrap();
        assert_eq!(image.dimensions(), (100, 50));
        assert_eq!((encoded.width, encoded.height), (100, 50));
        assert_eq!(encoded.content_type(), "image/jpeg");
    }

    #[test]
    fn test_pad_to_aspect() {
        let square = DynamicImage::ImageRgb8(RgbImage::from_pixel(90, 90, Rgb([0, 0, 0])));

        let story = pad_to_aspect(&square, AspectRatio::Story);
        assert_eq!(story.dimensions(), (90, 160));
        // Padding is white, the original stays centred
        assert_eq!(story.to_rgb8().get_pixel(0, 0), &BACKGROUND);
        assert_eq!(story.to_rgb8().get_pixel(45, 80), &Rgb([0, 0, 0]));

        let wide = pad_to_aspect(&square, AspectRatio::Widescreen);
        assert_eq!(wide.dimensions(), (160, 90));

        let unchanged = pad_to_aspect(&square, AspectRatio::Square);
        assert_eq!(unchanged.dimensions(), (90, 90));
    }

    #[test]
    fn test_combine_side_by_side() {
        let left = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 200, Rgb([255, 0, 0])));
        let right = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 100, Rgb([0, 0, 255])));

        let combined = combine_side_by_side(&left, &right).to_rgb8();
        // Left scaled to 50x100, right kept at 300x100
        assert_eq!(combined.dimensions(), (350, 100));
        let left_pixel = combined.get_pixel(10, 50);
        assert!(left_pixel[0] > 200 && left_pixel[2] < 50);
        assert_eq!(combined.get_pixel(200, 50), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_encode_formats() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 20, 30])));

        let jpeg = encode(&image, OutputFormat::Jpeg { quality: 80 }).unwrap();
        assert_eq!(detect_format(&jpeg.bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(jpeg.content_type(), "image/jpeg");

        let png = encode(&image, OutputFormat::Png).unwrap();
        assert_eq!(detect_format(&png.bytes).unwrap(), ImageFormat::Png);

        let webp = encode(&image, OutputFormat::WebP).unwrap();
        assert_eq!(detect_format(&webp.bytes).unwrap(), ImageFormat::WebP);
        assert_eq!(webp.format.extension(), "webp");
    }

    #[test]
    fn test_prepare_single_reference() {
        let png = solid_png(800, 400, [200, 100, 50]);
        let prepared = prepare_references(&[&png], 1024 * 1024, 200, 85).unwrap();

        assert_eq!(prepared.references.len(), 1);
        assert!(prepared.combined.is_none());
        let input = prepared.model_input().unwrap();
        assert_eq!((input.width, input.height), (200, 100));
        assert_eq!(input.content_type(), "image/jpeg");
    }

    #[test]
    fn test_prepare_two_references_builds_composite() {
        let first = solid_png(100, 100, [255, 255, 0]);
        let second = solid_png(100, 100, [0, 255, 255]);
        let prepared = prepare_references(&[&first, &second], 1024 * 1024, 512, 85).unwrap();

        assert_eq!(prepared.references.len(), 2);
        let combined = prepared.combined.as_ref().unwrap();
        // 2:1 composite padded to 16:9
        assert_eq!((combined.width, combined.height), (200, 113));
        assert_eq!(prepared.model_input().unwrap().width, 200);
    }
}
