use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    embeddings::EmbeddingMatrix, errors::Result, mappings::Mappings, utils::files,
};

use super::{DatasetDescriptor, DatasetSplits, LoadableCorpus};

/// Everything the tagger consumes from the data preparation step, in one JSON document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Corpus {
    /// Vocabulary mappings per stream and label column
    pub mappings: Mappings,

    /// Pretrained token embeddings aligned with the `tokens` mapping
    pub embeddings: EmbeddingMatrix,

    /// Dataset descriptors by name
    pub datasets: BTreeMap<String, DatasetDescriptor>,

    /// Indexed sentences by dataset name
    pub data: BTreeMap<String, DatasetSplits>,
}

#[async_trait]
impl LoadableCorpus for Corpus {
    async fn load(path: &str) -> Result<Self> {
        let text = files::read_to_string(path).await?;
        let corpus: Corpus = serde_json::from_str(&text)?;

        log::info!(
            "Loaded corpus {} with {} dataset(s) and {} embedding rows",
            path,
            corpus.datasets.len(),
            corpus.embeddings.rows()
        );

        Ok(corpus)
    }
}
