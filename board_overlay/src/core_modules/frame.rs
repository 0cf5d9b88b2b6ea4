// THEORY:
// A `Frame` is one immutable snapshot from the camera. It is the only thing
// the detection activity pulls from the outside world, and it lives for a
// single pipeline pass: the preprocessing stage reads it, produces an edge
// map, and the frame is dropped.
//
// Camera acquisition itself is somebody else's job. The engine only knows
// the `FrameSource` trait: report the stream dimensions once at start, hand
// out the current frame on demand, and let go of the device on `release`.

use image::RgbaImage;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;

/// Failures a frame source can report. All of them end the session.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("access to the frame source was denied")]
    Denied,
    #[error("frame source has been released")]
    Closed,
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    Malformed { expected: usize, actual: usize },
}

/// Memory layout of a frame's pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    Luma8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 => 1,
        }
    }
}

/// An immutable camera snapshot.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Row-major, tightly packed pixel bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Monotonic counter assigned by the source.
    pub frame_id: u64,
    pub timestamp: Instant,
}

impl Frame {
    /// Builds a frame, checking that the buffer matches the declared shape.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        frame_id: u64,
    ) -> Result<Self, AcquisitionError> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(AcquisitionError::Malformed {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            frame_id,
            timestamp: Instant::now(),
        })
    }

    pub fn from_rgba(image: RgbaImage, frame_id: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            format: PixelFormat::Rgba8,
            frame_id,
            timestamp: Instant::now(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// The camera, as seen by the engine.
pub trait FrameSource: Send + Sync {
    /// Stream dimensions, known once the stream has started.
    fn dimensions(&self) -> Result<(u32, u32), AcquisitionError>;

    /// The current frame. May block until one is available.
    fn frame(&self) -> Result<Frame, AcquisitionError>;

    /// Stops the stream. Later `frame` calls should fail with `Closed`.
    fn release(&self);
}

/// Serves the same still image for every request.
pub struct StillFrameSource {
    image: Mutex<Option<RgbaImage>>,
    dimensions: (u32, u32),
    next_id: AtomicU64,
    released: AtomicBool,
}

impl StillFrameSource {
    pub fn new(image: RgbaImage) -> Self {
        let dimensions = image.dimensions();
        Self {
            image: Mutex::new(Some(image)),
            dimensions,
            next_id: AtomicU64::new(0),
            released: AtomicBool::new(false),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl FrameSource for StillFrameSource {
    fn dimensions(&self) -> Result<(u32, u32), AcquisitionError> {
        if self.is_released() {
            return Err(AcquisitionError::Closed);
        }
        Ok(self.dimensions)
    }

    fn frame(&self) -> Result<Frame, AcquisitionError> {
        let guard = self
            .image
            .lock()
            .map_err(|_| AcquisitionError::Unavailable("still image lock poisoned".into()))?;
        let image = guard.as_ref().ok_or(AcquisitionError::Closed)?;
        let frame_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Frame::from_rgba(image.clone(), frame_id))
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
        if let Ok(mut guard) = self.image.lock() {
            guard.take();
        }
    }
}
