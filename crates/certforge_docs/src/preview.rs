use std::path::{Path, PathBuf};
use tracing::info;

use crate::batch::GeneratedDocument;
use crate::binding::{FieldBinder, FieldMapping};
use crate::clock::ProcessingStamp;
use crate::error::Result;
use crate::package::packaging_error;
use crate::render::DocxTemplate;
use crate::tabular::{Dataset, extract_records};

/// `preview_<template file name>`; one slot per template name.
pub fn preview_filename(template: &DocxTemplate) -> String {
    format!("preview_{}", template.name())
}

/// Render the record at `row_index` (zero-based) without touching disk.
///
/// `normalize_mapped_dates` must match the batch setting for the preview to
/// show what the batch will produce.
pub fn render_preview(
    dataset: &Dataset,
    template: &DocxTemplate,
    mapping: &FieldMapping,
    row_index: usize,
    stamp: ProcessingStamp,
    normalize_mapped_dates: bool,
) -> Result<GeneratedDocument> {
    let record = dataset.record(row_index)?;
    let context = FieldBinder::new(template.placeholders(), mapping, stamp)
        .normalize_mapped_dates(normalize_mapped_dates)
        .bind(record);
    let content = template
        .render(&context)
        .map_err(|e| e.for_record(row_index))?;

    Ok(GeneratedDocument {
        index: row_index,
        filename: preview_filename(template),
        content,
    })
}

/// Render one record to `preview_dir`, replacing any earlier preview made
/// from the same template. Returns the written path.
pub fn generate_preview(
    source: &Path,
    template_path: &Path,
    mapping: &FieldMapping,
    row_index: usize,
    preview_dir: &Path,
    stamp: ProcessingStamp,
    normalize_mapped_dates: bool,
) -> Result<PathBuf> {
    let dataset = extract_records(source)?;
    let template = DocxTemplate::open(template_path)?;
    let doc = render_preview(
        &dataset,
        &template,
        mapping,
        row_index,
        stamp,
        normalize_mapped_dates,
    )?;

    std::fs::create_dir_all(preview_dir).map_err(|e| packaging_error(preview_dir, e))?;
    let path = preview_dir.join(&doc.filename);
    std::fs::write(&path, &doc.content).map_err(|e| packaging_error(&path, e))?;

    info!(
        "Preview of record {} written to {}",
        row_index + 1,
        path.display()
    );
    Ok(path)
}
