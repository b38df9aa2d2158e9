//! Localized field composition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tabular::ExtractedValues;

/// Language codes read for every localized column, primary language first.
pub const DEFAULT_LANGUAGES: &[&str] = &["en_NZ", "zh", "jp"];

/// Language code to text. Languages without a value are absent, never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedField(BTreeMap<String, String>);

impl LocalizedField {
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `None` when no language carried a value, so payloads can omit the field.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// Column name holding `base` in `language`, e.g. `en_NZ_name`.
pub fn column_name(language: &str, base: &str) -> String {
    format!("{}_{}", language, base)
}

/// Column names for `base` in every language, in language order.
pub fn localized_columns(base: &str, languages: &[String]) -> Vec<String> {
    languages.iter().map(|lang| column_name(lang, base)).collect()
}

/// Collects `{lang}_{base}` values into a sparse localized map.
pub fn compose(base: &str, values: &ExtractedValues, languages: &[String]) -> LocalizedField {
    LocalizedField(
        languages
            .iter()
            .filter_map(|lang| {
                values
                    .owned(&column_name(lang, base))
                    .map(|text| (lang.clone(), text))
            })
            .collect(),
    )
}
