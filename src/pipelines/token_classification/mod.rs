/// Batcher
pub mod batcher;

/// Tagger Configuration
pub mod config;

/// Token Classification Items
pub mod item;

/// Training and inference outputs
pub mod output;

/// Tagger lifecycle
pub mod tagger;

/// Token Classification Training
pub mod training;

/// Token Classification Inference
pub mod inference;

pub use config::{OptimizerKind, TaggerConfig};
pub use inference::{Attention, Labels, Predictions};
pub use item::{Indexed, SentenceRecord};
pub use tagger::{LifecycleState, Tagger};
pub use training::{EpochReport, FitReport, Score};
