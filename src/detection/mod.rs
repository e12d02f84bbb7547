/// Detection module
///
/// Wraps the external gesture detector and maps its output to UI states.
///
/// ## Architecture
///
/// ```text
/// DetectorAdapter
///   ├── DetectorLoader (builds the model from ModelConfig)
///   ├── Detector       (frame → detections, blocking)
///   └── worker thread  (one request at a time, cancellable)
///
/// ClassificationMapper
///   └── ordered LabelRule table (first match wins)
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use detection::{ClassificationMapper, DetectorAdapter, ScriptedLoader};
///
/// let adapter = DetectorAdapter::initialize(&ScriptedLoader::from_path("script.json"), model)?;
/// let mapper = ClassificationMapper::default();
///
/// let detections = adapter.submit(frame)?.wait(timeout)?;
/// match mapper.map(&detections) {
///     UiState::GestureA => println!("open palm"),
///     UiState::GestureB => println!("fist"),
///     UiState::Neutral => {}
/// }
/// ```

pub mod adapter;
pub mod detector;
pub mod mapper;
pub mod scripted;

// Re-export commonly used types
pub use adapter::{ClassifyOutcome, DetectorAdapter, PendingClassification};
pub use detector::{Detection, Detector, DetectorLoader};
pub use mapper::{default_label_rules, ClassificationMapper, LabelRule};
pub use scripted::{DetectionScript, ScriptedDetector, ScriptedLoader};
