use board_overlay::Frame;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect;

pub const BACKGROUND: Rgba<u8> = Rgba([20, 24, 28, 255]);
pub const BOARD: Rgba<u8> = Rgba([230, 226, 220, 255]);

pub fn blank(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BACKGROUND)
}

/// A bright axis-aligned board spanning `(x0, y0)` to `(x1, y1)`, exclusive.
pub fn with_rect(width: u32, height: u32, x0: i32, y0: i32, x1: i32, y1: i32) -> RgbaImage {
    let mut image = blank(width, height);
    let rect = Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32);
    draw_filled_rect_mut(&mut image, rect, BOARD);
    image
}

/// A bright board with arbitrary corners, given in drawing order.
pub fn with_quad(width: u32, height: u32, corners: [(i32, i32); 4]) -> RgbaImage {
    let mut image = blank(width, height);
    let poly: Vec<PixelPoint<i32>> = corners.iter().map(|&(x, y)| PixelPoint::new(x, y)).collect();
    draw_polygon_mut(&mut image, &poly, BOARD);
    image
}

pub fn frame(image: RgbaImage) -> Frame {
    Frame::from_rgba(image, 0)
}
