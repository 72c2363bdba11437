/// Model Configuration
pub mod config;

/// Embedding and recurrent layers
pub mod encoder;

/// Time-wise and feature-wise pre-attention
pub mod attention;

/// Model
pub mod model;

/// Training and validation steps
pub mod train;

pub use config::{
    AttentionConfig, AttentionVariant, CharEncoding, CharacterConfig, FeatureScope, HeadConfig,
    ModelConfig, ScoreFunction,
};
pub use model::Model;
