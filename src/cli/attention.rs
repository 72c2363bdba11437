use std::fmt::Display;

use crate::models::bilstm::AttentionConfig;

/// The unique string token for a tagger without pre-attention
pub static NONE: &str = "none";

/// The unique string token for time-wise pre-attention
pub static TIME: &str = "time";

/// The unique string token for feature-wise pre-attention
pub static FEATURE: &str = "feature";

/// Available attention variants
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Attention {
    /// Plain BiLSTM tagger
    None,
    /// Time-wise pre-attention
    Time,
    /// Feature-wise pre-attention
    Feature,
}

impl Attention {
    /// The attention configuration for this variant
    pub fn config(&self) -> Option<AttentionConfig> {
        match self {
            Attention::None => None,
            Attention::Time => Some(AttentionConfig::time()),
            Attention::Feature => Some(AttentionConfig::feature()),
        }
    }
}

impl TryFrom<&str> for Attention {
    type Error = AttentionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            v if v == NONE => Ok(Attention::None),
            v if v == TIME => Ok(Attention::Time),
            v if v == FEATURE => Ok(Attention::Feature),
            _ => Err(AttentionError::Unknown(value.to_string())),
        }
    }
}

impl Display for Attention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Attention::None => NONE,
            Attention::Time => TIME,
            Attention::Feature => FEATURE,
        };

        write!(f, "{}", name)
    }
}

/// Attention Error
#[derive(thiserror::Error, Debug)]
pub enum AttentionError {
    /// No attention variant found for the given string
    #[error("no attention variant found for {0}")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::bilstm::AttentionVariant;

    #[test]
    fn parses_variants() {
        assert_eq!(Attention::try_from("Time").unwrap(), Attention::Time);
        assert_eq!(Attention::try_from("none").unwrap().config(), None);
        assert_eq!(
            Attention::Feature.config().map(|config| config.variant),
            Some(AttentionVariant::Feature)
        );
        assert!(Attention::try_from("global").is_err());
        assert_eq!(Attention::Time.to_string(), "time");
    }
}
