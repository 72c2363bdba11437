//! Vocabulary mappings from raw strings to embedding rows

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{Result, TaggerError},
    utils::classes::invert_map,
};

/// Casing classes for tokens
pub mod casing;

pub use casing::Casing;

/// The reserved padding entry, always at index 0
pub const PADDING: &str = "PADDING";

/// The out-of-vocabulary entry used by token mappings
pub const UNKNOWN_TOKEN: &str = "UNKNOWN_TOKEN";

/// The out-of-vocabulary entry used by character mappings
pub const UNKNOWN: &str = "UNKNOWN";

/// Name of the token stream mapping
pub const TOKENS: &str = "tokens";

/// Name of the casing stream mapping
pub const CASING: &str = "casing";

/// Name of the character stream mapping
pub const CHARACTERS: &str = "characters";

const CHARSET: &str = " 0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.,-_()[]{}!?:;#'\"/\\%$`&=*+@^~|";

/// A string to index lookup table for one input stream
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping(BTreeMap<String, usize>);

impl Mapping {
    /// Create a mapping from explicit entries
    pub fn new(entries: BTreeMap<String, usize>) -> Self {
        Self(entries)
    }

    /// The default character set: padding, unknown, then printable ASCII
    pub fn characters() -> Self {
        [PADDING.to_string(), UNKNOWN.to_string()]
            .into_iter()
            .chain(CHARSET.chars().map(String::from))
            .enumerate()
            .map(|(index, key)| (key, index))
            .collect()
    }

    /// Look up the index of a key
    pub fn get(&self, key: &str) -> Option<usize> {
        self.0.get(key).copied()
    }

    /// Number of named entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the mapping has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of embedding rows needed to cover every index, including the padding slot
    pub fn vocab_size(&self) -> usize {
        self.0.values().max().map_or(1, |max| max + 1)
    }

    /// The index substituted for out-of-vocabulary entries
    pub fn unknown_index(&self) -> usize {
        self.get(UNKNOWN_TOKEN)
            .or_else(|| self.get(UNKNOWN))
            .unwrap_or(0)
    }

    /// Look up a key, degrading to the out-of-vocabulary index
    pub fn index_or_unknown(&self, key: &str) -> usize {
        self.get(key).unwrap_or_else(|| self.unknown_index())
    }

    /// Clamp an already-resolved index into the vocabulary
    pub fn clamp(&self, index: usize) -> usize {
        if index < self.vocab_size() {
            index
        } else {
            self.unknown_index()
        }
    }

    /// Reverse lookup table from index to name
    pub fn id2label(&self) -> BTreeMap<usize, String> {
        invert_map(self.0.clone())
    }

    /// Iterate over the entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.0.iter()
    }

    /// Check the mapping invariants: non-empty, one key per index, padding at zero
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.is_empty() {
            return Err(TaggerError::config(format!("mapping '{name}' is empty")));
        }

        if let Some(index) = self.get(PADDING) {
            if index != 0 {
                return Err(TaggerError::config(format!(
                    "mapping '{name}' places {PADDING} at {index} instead of 0"
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for (key, index) in self.iter() {
            if !seen.insert(*index) {
                return Err(TaggerError::config(format!(
                    "mapping '{name}' assigns index {index} more than once (last: '{key}')"
                )));
            }
        }

        Ok(())
    }
}

impl FromIterator<(String, usize)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (String, usize)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, usize); N]> for Mapping {
    fn from(entries: [(&str, usize); N]) -> Self {
        entries
            .into_iter()
            .map(|(key, index)| (key.to_string(), index))
            .collect()
    }
}

/// Named mappings for every input stream and label column
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mappings(BTreeMap<String, Mapping>);

impl Mappings {
    /// Create an empty set of mappings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named mapping
    pub fn insert(&mut self, name: impl Into<String>, mapping: Mapping) -> &mut Self {
        self.0.insert(name.into(), mapping);
        self
    }

    /// Builder-style variant of `insert`
    pub fn with(mut self, name: impl Into<String>, mapping: Mapping) -> Self {
        self.insert(name, mapping);
        self
    }

    /// Look up a named mapping
    pub fn get(&self, name: &str) -> Option<&Mapping> {
        self.0.get(name)
    }

    /// True if a named mapping is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Look up a named mapping, failing with a configuration error when absent
    pub fn require(&self, name: &str) -> Result<&Mapping> {
        self.get(name)
            .ok_or_else(|| TaggerError::config(format!("no '{name}' mapping was provided")))
    }

    /// The token stream mapping
    pub fn tokens(&self) -> Result<&Mapping> {
        self.require(TOKENS)
    }

    /// The casing stream mapping
    pub fn casing(&self) -> Result<&Mapping> {
        self.require(CASING)
    }

    /// Validate every mapping
    pub fn validate(&self) -> Result<()> {
        self.0
            .iter()
            .try_for_each(|(name, mapping)| mapping.validate(name))
    }

    /// Resolve a raw token to its index: exact match, lowercase, then normalized digits
    pub fn token_index(&self, token: &str) -> Result<usize> {
        let tokens = self.tokens()?;

        let lower = token.to_lowercase();
        let normalized: String = lower
            .replace("--", "-")
            .chars()
            .map(|c| if c.is_ascii_digit() { '0' } else { c })
            .collect();

        Ok(tokens
            .get(token)
            .or_else(|| tokens.get(&lower))
            .or_else(|| tokens.get(&normalized))
            .unwrap_or_else(|| tokens.unknown_index()))
    }
}
