use std::collections::BTreeMap;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Result, TaggerError},
    mappings::{Casing, Mappings, CHARACTERS},
};

/// One sentence as parallel token, casing, character and label sequences
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SentenceRecord {
    /// The surface tokens, if known
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_tokens: Vec<String>,

    /// Token indexes into the `tokens` mapping
    pub tokens: Vec<usize>,

    /// Casing indexes into the `casing` mapping
    pub casing: Vec<usize>,

    /// Character indexes per token into the `characters` mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<Vec<Vec<usize>>>,

    /// Label columns (e.g. `labels`), absent at prediction time
    #[serde(flatten)]
    pub columns: BTreeMap<String, Vec<usize>>,
}

impl SentenceRecord {
    /// Index raw tokens through the mappings; unseen tokens degrade to the unknown index
    pub fn from_raw_tokens<S: AsRef<str>>(raw_tokens: &[S], mappings: &Mappings) -> Result<Self> {
        let casing_mapping = mappings.casing()?;

        let tokens = raw_tokens
            .iter()
            .map(|token| mappings.token_index(token.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let casing = raw_tokens
            .iter()
            .map(|token| casing_mapping.index_or_unknown(Casing::classify(token.as_ref()).as_str()))
            .collect();

        let characters = mappings.get(CHARACTERS).map(|mapping| {
            raw_tokens
                .iter()
                .map(|token| {
                    token
                        .as_ref()
                        .chars()
                        .map(|c| mapping.index_or_unknown(c.encode_utf8(&mut [0; 4])))
                        .collect()
                })
                .collect()
        });

        Ok(Self {
            raw_tokens: raw_tokens.iter().map(|t| t.as_ref().to_string()).collect(),
            tokens,
            casing,
            characters,
            columns: BTreeMap::new(),
        })
    }

    /// Attach a label column
    pub fn with_labels(mut self, column: impl Into<String>, labels: Vec<usize>) -> Self {
        self.columns.insert(column.into(), labels);
        self
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True for sentences without tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Gold labels for a column
    pub fn labels(&self, column: &str) -> Option<&[usize]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    /// Check that every parallel sequence matches the token count
    pub fn check_lengths(&self) -> Result<()> {
        let length = self.len();

        let mismatch = |name: &str, found: usize| {
            TaggerError::data(format!(
                "'{name}' has {found} entries but the sentence has {length} tokens"
            ))
        };

        if self.casing.len() != length {
            return Err(mismatch("casing", self.casing.len()));
        }

        if !self.raw_tokens.is_empty() && self.raw_tokens.len() != length {
            return Err(mismatch("raw_tokens", self.raw_tokens.len()));
        }

        if let Some(characters) = &self.characters {
            if characters.len() != length {
                return Err(mismatch("characters", characters.len()));
            }
        }

        for (column, labels) in &self.columns {
            if labels.len() != length {
                return Err(mismatch(column, labels.len()));
            }
        }

        Ok(())
    }
}

/// A sentence paired with its position in the caller's input
#[derive(Clone, Debug, new)]
pub struct Indexed {
    /// Position in the original input
    pub index: usize,

    /// The sentence
    pub record: SentenceRecord,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mappings::{Mapping, PADDING, TOKENS, UNKNOWN_TOKEN};

    #[test]
    fn deserializes_the_dictionary_layout() {
        let json = r#"{
            "labels": [0, 1],
            "raw_tokens": ["hello", "world"],
            "tokens": [1, 2],
            "casing": [5, 4]
        }"#;

        let record: SentenceRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.len(), 2);
        assert_eq!(record.labels("labels"), Some(&[0, 1][..]));
        assert_eq!(record.characters, None);
        assert!(record.check_lengths().is_ok());
    }

    #[test]
    fn detects_mismatched_parallel_sequences() {
        let record = SentenceRecord {
            tokens: vec![1, 2],
            casing: vec![4],
            ..Default::default()
        };

        assert!(matches!(record.check_lengths(), Err(TaggerError::Data(_))));

        let record = SentenceRecord {
            tokens: vec![1, 2],
            casing: vec![4, 4],
            ..Default::default()
        }
        .with_labels("labels", vec![0]);

        assert!(matches!(record.check_lengths(), Err(TaggerError::Data(_))));
    }

    #[test]
    fn indexes_raw_tokens() {
        let mappings = Mappings::new()
            .with(
                TOKENS,
                Mapping::from([(PADDING, 0), (UNKNOWN_TOKEN, 1), ("hello", 2)]),
            )
            .with("casing", Casing::mapping())
            .with(CHARACTERS, Mapping::characters());

        let record = SentenceRecord::from_raw_tokens(&["Hello", "Zorg"], &mappings).unwrap();

        assert_eq!(record.tokens, vec![2, 1]);
        assert_eq!(record.casing, vec![6, 6]);

        let characters = record.characters.unwrap();
        assert_eq!(characters[0].len(), 5);
        assert_eq!(characters[1][0], Mapping::characters().get("Z").unwrap());
    }
}
