use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Languages the content can be distributed in. Anything else coming from
/// the outside world is coerced to [`Language::DEFAULT`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    En,
    Es,
    Fr,
    Pt,
    /// Amharic
    Am,
    /// Swahili
    Sw,
}

impl Default for Language {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Language {
    pub const DEFAULT: Language = Language::En;

    /// Parses a language tag leniently: surrounding whitespace and casing
    /// are ignored, and region subtags (`pt-BR`, `en_US`) are dropped.
    pub fn parse(tag: &str) -> Option<Language> {
        Language::from_str(&normalize_tag(tag)).ok()
    }

    pub fn code(self) -> &'static str {
        self.into()
    }
}

/// Primary subtag of the language tag in lowercase
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_parsing() {
        assert_eq!(Language::parse("en"), Some(Language::En));
        assert_eq!(Language::parse(" PT-br "), Some(Language::Pt));
        assert_eq!(Language::parse("sw_KE"), Some(Language::Sw));
        assert_eq!(Language::parse("de"), None);
        assert_eq!(Language::parse(""), None);
    }

    #[test]
    fn codes() {
        assert_eq!(Language::Am.code(), "am");
        assert_eq!(Language::default(), Language::En);
    }
}
