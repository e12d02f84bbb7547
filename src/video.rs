use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use parking_lot::RwLock;

/// A single video frame handed to the detector
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic index within the stream
    pub index: u64,
    pub image: Arc<RgbaImage>,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(index: u64, image: RgbaImage) -> Self {
        Self::from_shared(index, Arc::new(image))
    }

    pub fn from_shared(index: u64, image: Arc<RgbaImage>) -> Self {
        Self {
            index,
            image,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Camera-backed (or simulated) video stream
///
/// The core only asks three things of it: start capture, hand over the
/// current frame, and stop.
pub trait VideoSource: Send + Sync {
    /// Start capture. `false` means access was denied or no frames are available.
    fn start(&self) -> bool;

    /// Latest frame, or `None` when nothing is available for this tick
    fn current_frame(&self) -> Option<Frame>;

    fn is_active(&self) -> bool;

    /// Release the capture. Safe to call more than once.
    fn stop(&self);
}

enum Origin {
    Directory { dir: PathBuf, mirror: bool },
    Images(Vec<Arc<RgbaImage>>),
}

/// Video source that replays still images in a loop
///
/// Frames are loaded once on [`VideoSource::start`] and handed out in order,
/// wrapping around at the end.
pub struct ReplayVideoSource {
    origin: Origin,
    frames: RwLock<Vec<Arc<RgbaImage>>>,
    active: AtomicBool,
    cursor: AtomicU64,
}

impl ReplayVideoSource {
    /// Replay every png/jpeg in `dir`, sorted by file name
    pub fn from_dir(dir: impl Into<PathBuf>, mirror: bool) -> Self {
        Self::with_origin(Origin::Directory {
            dir: dir.into(),
            mirror,
        })
    }

    /// Replay in-memory images
    pub fn from_images(images: Vec<RgbaImage>) -> Self {
        Self::with_origin(Origin::Images(images.into_iter().map(Arc::new).collect()))
    }

    fn with_origin(origin: Origin) -> Self {
        Self {
            origin,
            frames: RwLock::new(Vec::new()),
            active: AtomicBool::new(false),
            cursor: AtomicU64::new(0),
        }
    }

    /// Number of frames loaded by the last successful start
    pub fn frame_count(&self) -> usize {
        self.frames.read().len()
    }

    fn load_frames(&self) -> Vec<Arc<RgbaImage>> {
        match &self.origin {
            Origin::Images(images) => images.clone(),
            Origin::Directory { dir, mirror } => load_directory(dir, *mirror),
        }
    }
}

fn is_frame_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

fn load_directory(dir: &std::path::Path, mirror: bool) -> Vec<Arc<RgbaImage>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("Cannot open frames directory {}: {}", dir.display(), err);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_frame_file(path))
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        match image::open(&path) {
            Ok(img) => {
                let rgba = img.to_rgba8();
                let rgba = if mirror {
                    image::imageops::flip_horizontal(&rgba)
                } else {
                    rgba
                };
                frames.push(Arc::new(rgba));
            }
            Err(err) => tracing::warn!("Skipping unreadable frame {}: {}", path.display(), err),
        }
    }
    frames
}

impl VideoSource for ReplayVideoSource {
    fn start(&self) -> bool {
        let frames = self.load_frames();
        if frames.is_empty() {
            tracing::warn!("Replay source has no frames; treating as capture denied");
            return false;
        }

        tracing::info!("✓ Replay source started with {} frames", frames.len());
        *self.frames.write() = frames;
        self.cursor.store(0, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        true
    }

    fn current_frame(&self) -> Option<Frame> {
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }

        let frames = self.frames.read();
        if frames.is_empty() {
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let image = Arc::clone(&frames[(index % frames.len() as u64) as usize]);
        Some(Frame::from_shared(index, image))
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::info!("Replay source stopped");
        }
        self.frames.write().clear();
    }
}
