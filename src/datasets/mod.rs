use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{errors::Result, pipelines::token_classification::SentenceRecord};

/// JSON corpora bundling mappings, embeddings and datasets
pub mod corpus;

pub use corpus::Corpus;

/// A corpus which can be loaded from disk
#[async_trait]
pub trait LoadableCorpus {
    /// Load the corpus
    async fn load(path: &str) -> Result<Self>
    where
        Self: std::marker::Sized;
}

/// Describes one named dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDescriptor {
    /// The column holding gold labels
    pub label: String,

    /// Whether dev/test metrics are computed for this dataset
    #[serde(default)]
    pub evaluate: bool,

    /// Where the dataset is stored
    #[serde(default)]
    pub dirpath: String,

    /// Column layout of the source files
    #[serde(default)]
    pub columns: BTreeMap<String, String>,

    /// Comment marker of the source files
    #[serde(default)]
    pub comment_symbol: Option<String>,
}

impl DatasetDescriptor {
    /// Describe a dataset by its label column
    pub fn new(label: impl Into<String>, evaluate: bool) -> Self {
        Self {
            label: label.into(),
            evaluate,
            dirpath: String::new(),
            columns: BTreeMap::new(),
            comment_symbol: None,
        }
    }
}

/// Train, dev and test sentences of one dataset
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplits {
    /// Training sentences
    #[serde(rename = "trainMatrix", default)]
    pub train: Vec<SentenceRecord>,

    /// Development sentences
    #[serde(rename = "devMatrix", default)]
    pub dev: Vec<SentenceRecord>,

    /// Test sentences
    #[serde(rename = "testMatrix", default)]
    pub test: Vec<SentenceRecord>,
}

/// Which split of a dataset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    /// Training sentences
    Train,
    /// Development sentences
    Dev,
    /// Test sentences
    Test,
}

impl Split {
    /// All splits in order
    pub const ALL: [Split; 3] = [Split::Train, Split::Dev, Split::Test];
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Dev => "dev",
            Split::Test => "test",
        };

        write!(f, "{}", name)
    }
}

impl DatasetSplits {
    /// The sentences of a split
    pub fn split(&self, split: Split) -> &[SentenceRecord] {
        match split {
            Split::Train => &self.train,
            Split::Dev => &self.dev,
            Split::Test => &self.test,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn deserializes_descriptors_and_splits() {
        let descriptor: DatasetDescriptor = serde_json::from_str(
            r#"{"columns": {}, "commentSymbol": null, "dirpath": "", "evaluate": true, "label": "labels"}"#,
        )
        .unwrap();

        assert_eq!(descriptor, DatasetDescriptor::new("labels", true));

        let splits: DatasetSplits = serde_json::from_str(
            r#"{"trainMatrix": [{"tokens": [1], "casing": [4], "labels": [0]}], "devMatrix": []}"#,
        )
        .unwrap();

        assert_eq!(splits.split(Split::Train).len(), 1);
        assert!(splits.split(Split::Test).is_empty());
    }
}
