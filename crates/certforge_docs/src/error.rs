use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the certificate engine.
///
/// Every variant names the input that failed (source path, template name or
/// record index) so callers can tell the user what to fix.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Data extraction failed for {}: {reason}", path.display())]
    DataExtraction { path: PathBuf, reason: String },

    #[error("Template parse failed for {template}{}: {reason}", part_suffix(part))]
    TemplateParse {
        template: String,
        part: Option<String>,
        reason: String,
    },

    #[error("Render failed for template {template}{}: {reason}", record_suffix(*record))]
    Render {
        template: String,
        record: Option<usize>,
        reason: String,
    },

    #[error("Batch generation aborted at record {}: {source}", record + 1)]
    BatchGeneration {
        record: usize,
        #[source]
        source: Box<ForgeError>,
    },

    #[error("Packaging failed for {}: {reason}", path.display())]
    Packaging { path: PathBuf, reason: String },

    #[error("Record index {index} out of range ({count} records available)")]
    RecordIndex { index: usize, count: usize },
}

fn part_suffix(part: &Option<String>) -> String {
    part.as_ref().map(|p| format!(" ({p})")).unwrap_or_default()
}

fn record_suffix(record: Option<usize>) -> String {
    record
        .map(|r| format!(" at record {}", r + 1))
        .unwrap_or_default()
}

impl ForgeError {
    /// Attach the zero-based record index to a render error.
    pub fn for_record(self, index: usize) -> Self {
        match self {
            Self::Render {
                template, reason, ..
            } => Self::Render {
                template,
                record: Some(index),
                reason,
            },
            other => other,
        }
    }

    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            Self::DataExtraction { .. } => {
                "Error processing data file. Check that it is a readable spreadsheet with a header row.".into()
            }
            Self::TemplateParse { reason, .. } => {
                format!("The template is not a valid Word template: {reason}")
            }
            Self::Render { record, .. } => match record {
                Some(r) => format!("Could not fill the template for row {}.", r + 1),
                None => "Could not fill the template.".into(),
            },
            Self::BatchGeneration { source, .. } => source.user_message(),
            Self::Packaging { .. } => {
                "Could not write the generated files. Check disk space and permissions.".into()
            }
            Self::RecordIndex { index, count } => {
                format!("Row {} does not exist; the data file has {count} rows.", index + 1)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;
