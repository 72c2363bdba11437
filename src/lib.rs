//! # Argument-mining BiLSTM tagger
#![forbid(unsafe_code)]

/// Models
pub mod models;

/// Pipelines
pub mod pipelines;

/// Datasets
pub mod datasets;

/// Vocabulary mappings
pub mod mappings;

/// Token embedding matrices
pub mod embeddings;

/// Errors
pub mod errors;

/// Utilities
pub mod utils;

/// CLI indexes and utilities
pub mod cli;

pub use errors::{Result, TaggerError};
pub use pipelines::token_classification::{
    Predictions, SentenceRecord, Tagger, TaggerConfig,
};
