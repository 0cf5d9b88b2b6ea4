// THEORY:
// Preprocessing is the first stage of a detection pass. It reduces a raw
// camera frame to a binary edge map in three fixed steps:
// 1.  **Intensity**: collapse colour to a single luma channel.
// 2.  **Smoothing**: a Gaussian blur sized by an odd aperture (5 by default)
//     to knock down sensor noise before any gradients are taken.
// 3.  **Edges**: Canny with a low/high hysteresis pair (50/150 by default).
//
// Every step is a single linear sweep (or a fixed-size kernel sweep) over the
// pixels, so the whole stage is O(pixels). It has no side effects; a frame
// whose buffer does not match its declared shape simply yields no edge map.

use crate::core_modules::frame::{Frame, PixelFormat};
use image::buffer::ConvertBuffer;
use image::{GrayImage, ImageBuffer, Luma, Rgb, Rgba};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use log::warn;

/// Converts a frame to single-channel intensity.
pub fn to_intensity(frame: &Frame) -> Option<GrayImage> {
    let (w, h) = frame.dimensions();
    let raw = frame.data.as_slice();
    let gray: Option<GrayImage> = match frame.format {
        PixelFormat::Rgba8 => ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(w, h, raw).map(|img| img.convert()),
        PixelFormat::Rgb8 => ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(w, h, raw).map(|img| img.convert()),
        PixelFormat::Luma8 => ImageBuffer::<Luma<u8>, &[u8]>::from_raw(w, h, raw).map(|img| img.convert()),
    };
    if gray.is_none() {
        warn!(
            "frame {} buffer does not match {}x{} {:?}",
            frame.frame_id, w, h, frame.format
        );
    }
    gray
}

/// Gaussian sigma for an odd square aperture, using the usual
/// `0.3·((k−1)/2 − 1) + 0.8` rule when no sigma is given explicitly.
pub fn sigma_for_aperture(aperture: u32) -> f32 {
    let k = aperture.max(1) as f32;
    0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
}

pub fn smooth(gray: &GrayImage, aperture: u32) -> GrayImage {
    gaussian_blur_f32(gray, sigma_for_aperture(aperture))
}

/// Runs the full stage: intensity, smoothing, then Canny edges.
pub fn edge_map(frame: &Frame, aperture: u32, low: f32, high: f32) -> Option<GrayImage> {
    if frame.width == 0 || frame.height == 0 {
        return None;
    }
    let gray = to_intensity(frame)?;
    let blurred = smooth(&gray, aperture);
    Some(canny(&blurred, low, high))
}
