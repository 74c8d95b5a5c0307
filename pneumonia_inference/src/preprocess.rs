use crate::error::InferenceError;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, Ix4};
use serde::Deserialize;

pub const INPUT_SIZE: u32 = 224;
pub const RESIZE_SHORTER: u32 = 256;
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Largest width or height accepted, both when decoding and for the
/// intermediate resize.
pub const MAX_IMAGE_SIDE: u32 = 10_000;

/// How an uploaded image is brought to the 224x224 network resolution.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    /// Shorter side to 256 then a centred 224x224 crop.
    ResizeCenterCrop,
    /// Straight resize to 224x224, aspect ratio is not kept.
    ResizeExact,
}

impl Preprocessing {
    pub fn apply(&self, img: &RgbImage) -> Result<RgbImage, InferenceError> {
        match self {
            Preprocessing::ResizeCenterCrop => Ok(center_crop(
                &resize_shorter_side(img, RESIZE_SHORTER)?,
                INPUT_SIZE,
            )),
            Preprocessing::ResizeExact => Ok(image::imageops::resize(
                img,
                INPUT_SIZE,
                INPUT_SIZE,
                FilterType::Triangle,
            )),
        }
    }
}

pub fn decode_rgb(image_data: &[u8]) -> Result<RgbImage, InferenceError> {
    let mut image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| InferenceError::Decode(e.to_string()))?;

    let mut limits = image::Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_SIDE);
    limits.max_image_height = Some(MAX_IMAGE_SIDE);
    image_reader.limits(limits);

    let img = image_reader
        .decode()
        .map_err(|e| InferenceError::Decode(e.to_string()))?;

    Ok(img.to_rgb8())
}

/// Scales the shorter side to `size`, keeping the aspect ratio. Images so
/// elongated that the longer side would exceed `MAX_IMAGE_SIDE` are rejected.
pub(crate) fn resize_shorter_side(
    img: &RgbImage,
    size: u32,
) -> Result<RgbImage, InferenceError> {
    let (width, height) = img.dimensions();
    let (short, long) = (width.min(height), width.max(height));
    if short == 0 {
        return Err(InferenceError::Decode("image has no pixels".to_string()));
    }

    let scaled_long = (size as u64 * long as u64 / short as u64).max(size as u64);
    let scaled_long = u32::try_from(scaled_long)
        .ok()
        .filter(|&side| side <= MAX_IMAGE_SIDE)
        .ok_or_else(|| {
            InferenceError::Decode(format!(
                "aspect ratio of a {}x{} image is too extreme",
                width, height
            ))
        })?;

    let (new_width, new_height) = if width <= height {
        (size, scaled_long)
    } else {
        (scaled_long, size)
    };
    Ok(image::imageops::resize(
        img,
        new_width,
        new_height,
        FilterType::Triangle,
    ))
}

pub(crate) fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let left = ((width.saturating_sub(size)) as f32 / 2.0).round() as u32;
    let top = ((height.saturating_sub(size)) as f32 / 2.0).round() as u32;
    image::imageops::crop_imm(img, left, top, size, size).to_image()
}

/// Channel-first `[1, 3, H, W]` tensor, scaled to [0, 1] and normalised with
/// the ImageNet statistics.
pub fn to_input_tensor(img: &RgbImage) -> Array<f32, Ix4> {
    let (width, height) = img.dimensions();
    let mut input = Array::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        for (c, value) in pixel.0.iter().enumerate() {
            input[[0, c, y, x]] = ((*value as f32) / 255. - MEAN[c]) / STD[c];
        }
    }
    input
}
