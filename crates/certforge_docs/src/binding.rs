use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::clock::ProcessingStamp;
use crate::dates::{DateInput, normalize_date};
use crate::error::{ForgeError, Result};
use crate::placeholders::{PlaceholderSet, is_date_placeholder};
use crate::tabular::Record;

/// Placeholder names that always carry the processing date, whatever the
/// mapping says.
pub const DATE_ALIASES: [&str; 4] = ["date", "current_date", "completion_date", "issue_date"];

/// Placeholder name → source column header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, String>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of `"placeholder": "Header"` pairs.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Read a JSON mapping file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| mapping_error(path, e))?;
        Self::from_json(&content).map_err(|e| mapping_error(path, e))
    }

    /// Parse one `placeholder=Header` assignment. The header may contain `=`.
    pub fn parse_assignment(text: &str) -> Option<(String, String)> {
        let (placeholder, header) = text.split_once('=')?;
        let placeholder = placeholder.trim();
        if placeholder.is_empty() {
            return None;
        }
        Some((placeholder.to_string(), header.trim().to_string()))
    }

    pub fn insert(&mut self, placeholder: impl Into<String>, header: impl Into<String>) {
        self.0.insert(placeholder.into(), header.into());
    }

    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.0.get(placeholder).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, h)| (p.as_str(), h.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl<P: Into<String>, H: Into<String>> FromIterator<(P, H)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (P, H)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(p, h)| (p.into(), h.into())).collect())
    }
}

impl<P: Into<String>, H: Into<String>> Extend<(P, H)> for FieldMapping {
    fn extend<I: IntoIterator<Item = (P, H)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(p, h)| (p.into(), h.into())));
    }
}

fn mapping_error(path: &Path, reason: impl std::fmt::Display) -> ForgeError {
    ForgeError::DataExtraction {
        path: path.to_path_buf(),
        reason: format!("invalid field mapping: {reason}"),
    }
}

/// Values handed to the renderer for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenderContext(BTreeMap<String, String>);

impl RenderContext {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenderContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Builds a [`RenderContext`] for each record.
///
/// Resolution order:
/// 1. mapped placeholders take the record's value for their header, or `""`
///    when the header is absent;
/// 2. [`DATE_ALIASES`] are set to the processing date, overriding step 1;
/// 3. remaining placeholders get the processing date if their name looks
///    like a date, otherwise `""`.
///
/// Every placeholder of the template is therefore present in the result.
#[derive(Debug, Clone)]
pub struct FieldBinder<'a> {
    placeholders: &'a PlaceholderSet,
    mapping: &'a FieldMapping,
    stamp: ProcessingStamp,
    normalize_mapped_dates: bool,
}

impl<'a> FieldBinder<'a> {
    pub fn new(
        placeholders: &'a PlaceholderSet,
        mapping: &'a FieldMapping,
        stamp: ProcessingStamp,
    ) -> Self {
        Self {
            placeholders,
            mapping,
            stamp,
            normalize_mapped_dates: false,
        }
    }

    /// Run mapped values of date-like placeholders through the date
    /// normalizer.
    pub fn normalize_mapped_dates(mut self, enabled: bool) -> Self {
        self.normalize_mapped_dates = enabled;
        self
    }

    pub fn bind(&self, record: &Record) -> RenderContext {
        let today = self.stamp.canonical_date();
        let mut values = BTreeMap::new();

        for (placeholder, header) in self.mapping.iter() {
            let raw = record.get(header);
            let value = if self.normalize_mapped_dates && is_date_placeholder(placeholder) {
                normalize_date(DateInput::from(raw), &self.stamp)
            } else {
                raw.unwrap_or_default().to_string()
            };
            values.insert(placeholder.to_string(), value);
        }

        for alias in DATE_ALIASES {
            values.insert(alias.to_string(), today.clone());
        }

        for placeholder in self.placeholders.iter() {
            if values.contains_key(placeholder) {
                continue;
            }
            let value = if is_date_placeholder(placeholder) {
                today.clone()
            } else {
                String::new()
            };
            values.insert(placeholder.to_string(), value);
        }

        debug!(
            "Bound record {} ({} values)",
            record.index() + 1,
            values.len()
        );
        RenderContext(values)
    }
}

/// One-shot form of [`FieldBinder::bind`] with default options.
pub fn resolve_context(
    record: &Record,
    mapping: &FieldMapping,
    placeholders: &PlaceholderSet,
    stamp: ProcessingStamp,
) -> RenderContext {
    FieldBinder::new(placeholders, mapping, stamp).bind(record)
}
