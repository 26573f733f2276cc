use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::Result;
use crate::render::DocxTemplate;

/// True if a placeholder is expected to hold a date: its name contains
/// `date` in any letter case.
pub fn is_date_placeholder(name: &str) -> bool {
    name.to_lowercase().contains("date")
}

/// Distinct placeholder names a template references, in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PlaceholderSet(BTreeSet<String>);

impl PlaceholderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Members that match [`is_date_placeholder`].
    pub fn date_like(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|name| is_date_placeholder(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PlaceholderSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for PlaceholderSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// Open a template and list the placeholders it declares.
pub fn inspect_placeholders(template_path: &Path) -> Result<PlaceholderSet> {
    let template = DocxTemplate::open(template_path)?;
    Ok(template.placeholders().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_date_placeholder_ignores_case() {
        assert!(is_date_placeholder("date"));
        assert!(is_date_placeholder("Issue_Date"));
        assert!(is_date_placeholder("GRADUATIONDATE"));
        assert!(is_date_placeholder("updated"));
        assert!(!is_date_placeholder("name"));
        assert!(!is_date_placeholder("dat"));
    }

    #[test]
    fn test_set_is_sorted_and_deduplicated() {
        let set: PlaceholderSet = ["name", "course", "name"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["course", "name"]);
    }

    #[test]
    fn test_set_is_case_preserving() {
        let set: PlaceholderSet = ["Name", "name"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains("Name"));
        assert!(!set.contains("NAME"));
    }

    #[test]
    fn test_date_like_members() {
        let set: PlaceholderSet = ["name", "start_date", "EndDate"].into_iter().collect();
        let dates: Vec<_> = set.date_like().collect();
        assert_eq!(dates, vec!["EndDate", "start_date"]);
    }

    #[test]
    fn test_inspect_missing_template_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = inspect_placeholders(&tmp.path().join("missing.docx")).unwrap_err();
        assert!(matches!(err, crate::ForgeError::TemplateParse { .. }));
    }
}
