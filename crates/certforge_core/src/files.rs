use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::debug;

use crate::config::ForgeConfig;

/// Extensions accepted for tabular data sources.
pub const DATA_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods", "csv", "tsv"];

/// Extensions accepted for document templates.
pub const TEMPLATE_EXTENSIONS: &[&str] = &["docx"];

/// True if `filename` has one of `extensions` (case-insensitive).
pub fn allowed_file(filename: &str, extensions: &[&str]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|allowed| *allowed == ext)
        }
        None => false,
    }
}

/// Validate an input file before any processing: extension, existence and
/// the configured size limit.
pub fn check_upload(path: &Path, extensions: &[&str], config: &ForgeConfig) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !allowed_file(&name, extensions) {
        bail!(
            "Invalid file format: {} (expected one of: {})",
            path.display(),
            extensions.join(", ")
        );
    }

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("File not found: {}", path.display()))?;
    if !metadata.is_file() {
        bail!("Not a regular file: {}", path.display());
    }
    if metadata.len() > config.max_upload_bytes {
        bail!(
            "File too large ({} bytes, max {} bytes): {}",
            metadata.len(),
            config.max_upload_bytes,
            path.display()
        );
    }

    debug!("Accepted input file: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_file_matches_case_insensitively() {
        assert!(allowed_file("people.xlsx", DATA_EXTENSIONS));
        assert!(allowed_file("PEOPLE.XLSX", DATA_EXTENSIONS));
        assert!(allowed_file("roster.v2.csv", DATA_EXTENSIONS));
        assert!(allowed_file("award.docx", TEMPLATE_EXTENSIONS));
    }

    #[test]
    fn test_allowed_file_rejects_unknown_or_missing_extension() {
        assert!(!allowed_file("award.doc", TEMPLATE_EXTENSIONS));
        assert!(!allowed_file("README", DATA_EXTENSIONS));
        assert!(!allowed_file("", DATA_EXTENSIONS));
    }

    #[test]
    fn test_check_upload_accepts_small_known_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("roster.csv");
        std::fs::write(&path, "Name\nAda\n").unwrap();

        check_upload(&path, DATA_EXTENSIONS, &ForgeConfig::default()).unwrap();
    }

    #[test]
    fn test_check_upload_rejects_wrong_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("roster.txt");
        std::fs::write(&path, "Name\n").unwrap();

        let err = check_upload(&path, DATA_EXTENSIONS, &ForgeConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Invalid file format"));
    }

    #[test]
    fn test_check_upload_rejects_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.docx");

        let err = check_upload(&path, TEMPLATE_EXTENSIONS, &ForgeConfig::default()).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_check_upload_enforces_size_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.csv");
        std::fs::write(&path, vec![b'a'; 64]).unwrap();

        let config = ForgeConfig {
            max_upload_bytes: 16,
            ..ForgeConfig::default()
        };
        let err = check_upload(&path, DATA_EXTENSIONS, &config).unwrap_err();
        assert!(err.to_string().contains("File too large"));
    }
}
