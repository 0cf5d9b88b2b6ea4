use anyhow::{Context, bail};
use board_overlay::core_modules::overlay::LabelKind;
use board_overlay::{
    GridSpec, Overlay, OverlayBus, Point, Projection, Session, SessionConfig, ShuffleSimulator,
    StillFrameSource,
};
use clap::Parser;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

const DETECTED: Rgba<u8> = Rgba([230, 40, 40, 255]);
const FALLBACK: Rgba<u8> = Rgba([240, 200, 40, 255]);
const DIVIDER: Rgba<u8> = Rgba([40, 220, 90, 255]);
const LABEL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const HIGHLIGHT: Rgba<u8> = Rgba([40, 200, 240, 255]);

/// Runs an overlay session on a still image and saves the last overlay.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Image to use as every camera frame.
    input: PathBuf,
    /// Where to write the composited PNG.
    output: PathBuf,
    /// JSON session config; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    rows: Option<u32>,
    #[arg(long)]
    cols: Option<u32>,
    /// Use a full perspective mapping instead of bilinear.
    #[arg(long)]
    homography: bool,
    /// How long to let the session run, in seconds.
    #[arg(long, default_value_t = 2.5)]
    seconds: f64,
    /// Seed for the value shuffler.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- 1. Argument Parsing & Setup ---
    let args = Args::parse();
    let config = load_config(&args)?;
    let image = image::open(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?
        .to_rgba8();
    info!(
        "{}: {}x{}, grid {}x{}",
        args.input.display(),
        image.width(),
        image.height(),
        config.grid.rows(),
        config.grid.cols()
    );

    // --- 2. Session Initialization ---
    let source = Arc::new(StillFrameSource::new(image.clone()));
    let values = match args.seed {
        Some(seed) => ShuffleSimulator::seeded(seed),
        None => ShuffleSimulator::new(),
    };
    let bus = OverlayBus::new(16);
    let mut overlays = bus.subscribe();
    let session = Session::start(config, source, Box::new(values), Box::new(bus.clone()))?;

    // --- 3. Run ---
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs_f64(args.seconds.max(0.0))) => {}
        _ = session.finished() => warn!("session ended early"),
    }
    session.stop().await?;

    // --- 4. Collect the most recent overlay ---
    let mut latest = None;
    loop {
        match overlays.try_recv() {
            Ok(overlay) => latest = Some(overlay),
            Err(TryRecvError::Lagged(skipped)) => info!("skipped {skipped} older overlays"),
            Err(_) => break,
        }
    }
    let Some(overlay) = latest else {
        bail!("the session produced no overlay");
    };
    info!(
        "tick {}: board {}",
        overlay.tick,
        if overlay.layout.detected { "detected" } else { "not found, showing fallback grid" }
    );

    // --- 5. Visualization ---
    let mut canvas = image;
    draw_overlay(&mut canvas, &overlay);
    canvas
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    info!("Processing complete. Output saved to {}", args.output.display());
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    if args.rows.is_some() || args.cols.is_some() {
        config.grid = GridSpec::new(
            args.rows.unwrap_or(config.grid.rows()),
            args.cols.unwrap_or(config.grid.cols()),
        )?;
    }
    if args.homography {
        config.projection = Projection::Homography;
    }
    Ok(config)
}

fn segment(canvas: &mut RgbaImage, a: Point, b: Point, color: Rgba<u8>) {
    draw_line_segment_mut(canvas, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), color);
}

/// Axis-aligned box spanning two corners, if it has any area on screen.
fn span(a: Point, b: Point) -> Option<Rect> {
    let (x0, y0) = (a.x.min(b.x).round(), a.y.min(b.y).round());
    let (x1, y1) = (a.x.max(b.x).round(), a.y.max(b.y).round());
    let (w, h) = (x1 - x0, y1 - y0);
    (w >= 1.0 && h >= 1.0 && x0.is_finite() && y0.is_finite())
        .then(|| Rect::at(x0 as i32, y0 as i32).of_size(w as u32, h as u32))
}

fn draw_overlay(canvas: &mut RgbaImage, overlay: &Overlay) {
    let layout = &overlay.layout;

    for divider in &layout.dividers {
        segment(canvas, divider.start, divider.end, DIVIDER);
    }

    let outline = layout.outline.corners();
    let color = if layout.detected { DETECTED } else { FALLBACK };
    for i in 0..4 {
        segment(canvas, outline[i], outline[(i + 1) % 4], color);
    }

    if let Some(cell) = overlay.highlighted_cell.and_then(|i| layout.cells.get(i)) {
        if let Some(rect) = span(cell.top_left, cell.bottom_right) {
            draw_hollow_rect_mut(canvas, rect, HIGHLIGHT);
        }
    }

    // No font is bundled, so each label is drawn as its bounding box.
    for label in &overlay.labels {
        let corner = Point::new(
            label.position.x + label.extent.width,
            label.position.y + label.extent.height,
        );
        let Some(rect) = span(label.position, corner) else {
            continue;
        };
        match label.kind {
            LabelKind::Index => draw_hollow_rect_mut(canvas, rect, LABEL),
            LabelKind::Value if label.highlighted => draw_filled_rect_mut(canvas, rect, HIGHLIGHT),
            LabelKind::Value => draw_filled_rect_mut(canvas, rect, LABEL),
        }
    }
}
