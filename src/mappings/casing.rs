use super::{Mapping, PADDING};

/// Coarse orthographic class of a token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Casing {
    /// Padding slot
    Padding,
    /// Anything not covered by the other classes
    Other,
    /// Only digits
    Numeric,
    /// More than half digits
    MainlyNumeric,
    /// All cased characters are lowercase
    AllLower,
    /// All cased characters are uppercase
    AllUpper,
    /// Starts with an uppercase character
    InitialUpper,
    /// Contains at least one digit
    ContainsDigit,
}

impl Casing {
    /// Every class, ordered by its default index
    pub const ALL: [Casing; 8] = [
        Casing::Padding,
        Casing::Other,
        Casing::Numeric,
        Casing::MainlyNumeric,
        Casing::AllLower,
        Casing::AllUpper,
        Casing::InitialUpper,
        Casing::ContainsDigit,
    ];

    /// The mapping key for this class
    pub fn as_str(&self) -> &'static str {
        match self {
            Casing::Padding => PADDING,
            Casing::Other => "other",
            Casing::Numeric => "numeric",
            Casing::MainlyNumeric => "mainly_numeric",
            Casing::AllLower => "allLower",
            Casing::AllUpper => "allUpper",
            Casing::InitialUpper => "initialUpper",
            Casing::ContainsDigit => "contains_digit",
        }
    }

    /// Classify a raw token
    pub fn classify(word: &str) -> Self {
        let length = word.chars().count();
        if length == 0 {
            return Casing::Other;
        }

        let digits = word.chars().filter(char::is_ascii_digit).count();
        let has_cased = word.chars().any(|c| c.is_lowercase() || c.is_uppercase());

        if digits == length {
            Casing::Numeric
        } else if digits as f32 / length as f32 > 0.5 {
            Casing::MainlyNumeric
        } else if has_cased && !word.chars().any(char::is_uppercase) {
            Casing::AllLower
        } else if has_cased && !word.chars().any(char::is_lowercase) {
            Casing::AllUpper
        } else if word.chars().next().is_some_and(char::is_uppercase) {
            Casing::InitialUpper
        } else if digits > 0 {
            Casing::ContainsDigit
        } else {
            Casing::Other
        }
    }

    /// The standard casing mapping
    pub fn mapping() -> Mapping {
        Self::ALL
            .iter()
            .enumerate()
            .map(|(index, casing)| (casing.as_str().to_string(), index))
            .collect()
    }
}
