//! Grad-CAM heatmaps and their composition onto the network input image.

use image::{imageops::FilterType, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::{Array2, ArrayView3, Axis};

/// Single-channel importance map with values in [0, 1].
pub type GrayMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Class activation map of a `[C, H, W]` feature map given the gradient of the
/// target logit with respect to it.
pub fn grad_cam(activations: ArrayView3<f32>, gradients: ArrayView3<f32>) -> Array2<f32> {
    let (_, height, width) = activations.dim();
    let mut cam = Array2::<f32>::zeros((height, width));

    for (activation, gradient) in activations
        .axis_iter(Axis(0))
        .zip(gradients.axis_iter(Axis(0)))
    {
        let weight = gradient.mean().unwrap_or(0.0);
        cam.scaled_add(weight, &activation);
    }

    cam.mapv_inplace(|v| v.max(0.0));
    cam
}

/// Min-max scales the map into [0, 1] and resizes it bilinearly.
pub fn scale_cam(cam: &Array2<f32>, width: u32, height: u32) -> GrayMask {
    let min = cam.fold(f32::INFINITY, |acc, &v| acc.min(v));
    let shifted = cam.mapv(|v| v - min);
    let max = shifted.fold(0.0f32, |acc, &v| acc.max(v));
    let scaled = shifted.mapv(|v| v / (1e-7 + max));

    let (rows, cols) = scaled.dim();
    let small = ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([scaled[[y as usize, x as usize]]])
    });
    image::imageops::resize(&small, width, height, FilterType::Triangle)
}

/// Jet colour map, blue for 0 through red for 1.
pub fn jet(value: u8) -> Rgb<u8> {
    let v = value as f32 / 255.0;
    let channel = |offset: f32| {
        let intensity = (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
        (intensity * 255.0) as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Blends the jet-coloured mask over `img`; `image_weight` is the share kept
/// from the original pixels. The result is rescaled so its brightest channel
/// reaches 255.
pub fn overlay(img: &RgbImage, mask: &GrayMask, image_weight: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut blended = vec![0.0f32; (width * height * 3) as usize];

    for (x, y, pixel) in img.enumerate_pixels() {
        let level = (mask.get_pixel(x, y).0[0].clamp(0.0, 1.0) * 255.0) as u8;
        let heat = jet(level);
        let offset = ((y * width + x) * 3) as usize;
        for c in 0..3 {
            let original = pixel.0[c] as f32 / 255.0;
            let colour = heat.0[c] as f32 / 255.0;
            blended[offset + c] = (1.0 - image_weight) * colour + image_weight * original;
        }
    }

    let max = blended.iter().fold(0.0f32, |acc, &v| acc.max(v));
    let max = if max > 0.0 { max } else { 1.0 };

    ImageBuffer::from_fn(width, height, |x, y| {
        let offset = ((y * width + x) * 3) as usize;
        let channel = |c: usize| ((blended[offset + c] / max).clamp(0.0, 1.0) * 255.0) as u8;
        Rgb([channel(0), channel(1), channel(2)])
    })
}
