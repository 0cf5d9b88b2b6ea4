mod common;

use board_overlay::core_modules::quad_selector::{MinArea, SelectionPolicy};
use board_overlay::{DetectionPipeline, DetectorConfig, Point};
use common::synthetic_image;

fn pipeline(min_area_px: f64, selection: SelectionPolicy) -> DetectionPipeline {
    DetectionPipeline::new(DetectorConfig {
        min_area: MinArea::Absolute { px: min_area_px },
        selection,
        ..DetectorConfig::default()
    })
}

fn assert_near(actual: Point, x: f64, y: f64, tolerance: f64) {
    assert!(
        (actual.x - x).abs() <= tolerance && (actual.y - y).abs() <= tolerance,
        "corner {actual:?} is not within {tolerance}px of ({x}, {y})"
    );
}

#[test]
fn finds_an_axis_aligned_board() {
    let frame = synthetic_image::frame(synthetic_image::with_rect(320, 240, 60, 40, 260, 200));
    let quad = pipeline(10_000.0, SelectionPolicy::FirstMatch)
        .detect(&frame)
        .expect("board should be detected");

    assert_near(quad.top_left(), 60.0, 40.0, 4.0);
    assert_near(quad.top_right(), 260.0, 40.0, 4.0);
    assert_near(quad.bottom_right(), 260.0, 200.0, 4.0);
    assert_near(quad.bottom_left(), 60.0, 200.0, 4.0);
}

#[test]
fn finds_a_board_seen_in_perspective() {
    let corners = [(70, 50), (250, 62), (268, 196), (52, 204)];
    let frame = synthetic_image::frame(synthetic_image::with_quad(320, 240, corners));
    let quad = pipeline(10_000.0, SelectionPolicy::FirstMatch)
        .detect(&frame)
        .expect("board should be detected");

    assert_near(quad.top_left(), 70.0, 50.0, 6.0);
    assert_near(quad.top_right(), 250.0, 62.0, 6.0);
    assert_near(quad.bottom_right(), 268.0, 196.0, 6.0);
    assert_near(quad.bottom_left(), 52.0, 204.0, 6.0);
}

#[test]
fn blank_frame_has_no_board() {
    let frame = synthetic_image::frame(synthetic_image::blank(320, 240));
    assert!(DetectionPipeline::default().detect(&frame).is_none());
}

#[test]
fn small_rectangles_are_ignored() {
    // 60 x 40 = 2400 px², under the threshold.
    let frame = synthetic_image::frame(synthetic_image::with_rect(320, 240, 100, 100, 160, 140));
    assert!(pipeline(10_000.0, SelectionPolicy::FirstMatch).detect(&frame).is_none());
}

#[test]
fn largest_area_prefers_the_bigger_board() {
    let mut image = synthetic_image::with_rect(640, 480, 20, 20, 200, 160);
    let bigger = synthetic_image::with_rect(640, 480, 260, 120, 600, 440);
    for (x, y, pixel) in bigger.enumerate_pixels() {
        if *pixel == synthetic_image::BOARD {
            image.put_pixel(x, y, *pixel);
        }
    }
    let frame = synthetic_image::frame(image);

    let quad = pipeline(10_000.0, SelectionPolicy::LargestArea)
        .detect(&frame)
        .expect("board should be detected");
    assert_near(quad.top_left(), 260.0, 120.0, 4.0);
    assert_near(quad.bottom_right(), 600.0, 440.0, 4.0);
}

#[test]
fn candidates_include_every_closed_outline() {
    let mut image = synthetic_image::with_rect(640, 480, 20, 20, 200, 160);
    imageproc::drawing::draw_filled_rect_mut(
        &mut image,
        imageproc::rect::Rect::at(300, 200).of_size(200, 200),
        synthetic_image::BOARD,
    );
    let polygons = DetectionPipeline::default()
        .candidates(&synthetic_image::frame(image))
        .expect("frame is well formed");
    let quads = polygons.iter().filter(|p| p.vertex_count() == 4).count();
    assert_eq!(quads, 2);
}
