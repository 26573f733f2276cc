use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::binding::{FieldBinder, FieldMapping};
use crate::clock::ProcessingStamp;
use crate::error::{ForgeError, Result};
use crate::package::{Archive, Packager, packaging_error};
use crate::render::DocxTemplate;
use crate::tabular::{Dataset, Record, extract_records};

/// Header whose value names the generated file.
pub const NAME_HEADER: &str = "Name";

/// One rendered certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    /// Zero-based index of the source record.
    pub index: usize,
    pub filename: String,
    pub content: Vec<u8>,
}

/// `certificate_<Name>.<ext>` with every non-alphanumeric character of the
/// name replaced by `_`, or `certificate_<index + 1>.<ext>` when the record
/// has no usable name.
pub fn document_filename(record: &Record, index: usize, extension: &str) -> String {
    format!("{}.{extension}", document_stem(record, index))
}

fn document_stem(record: &Record, index: usize) -> String {
    match record.get(NAME_HEADER).filter(|name| !name.is_empty()) {
        Some(name) => {
            let sanitized: String = name
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect();
            format!("certificate_{sanitized}")
        }
        None => format!("certificate_{}", index + 1),
    }
}

/// Hands out unique filenames in record order. Names are compared
/// case-insensitively so no two entries collide on case-folding filesystems.
#[derive(Debug, Default)]
struct FilenameAllocator {
    taken: HashSet<String>,
}

impl FilenameAllocator {
    fn is_taken(&self, candidate: &str) -> bool {
        self.taken.contains(&candidate.to_lowercase())
    }

    fn allocate(&mut self, record: &Record, index: usize, extension: &str) -> String {
        let stem = document_stem(record, index);
        let mut candidate = format!("{stem}.{extension}");
        if self.is_taken(&candidate) {
            let base = format!("{stem}_{}", index + 1);
            candidate = format!("{base}.{extension}");
            let mut n = 2;
            while self.is_taken(&candidate) {
                candidate = format!("{base}_{n}.{extension}");
                n += 1;
            }
            debug!("Filename collision for record {}, using {candidate}", index + 1);
        }
        self.taken.insert(candidate.to_lowercase());
        candidate
    }
}

/// Renders a whole dataset against one template.
pub struct BatchGenerator<'a> {
    template: &'a DocxTemplate,
    mapping: &'a FieldMapping,
    stamp: ProcessingStamp,
    normalize_mapped_dates: bool,
}

impl<'a> BatchGenerator<'a> {
    pub fn new(template: &'a DocxTemplate, mapping: &'a FieldMapping, stamp: ProcessingStamp) -> Self {
        Self {
            template,
            mapping,
            stamp,
            normalize_mapped_dates: false,
        }
    }

    pub fn normalize_mapped_dates(mut self, enabled: bool) -> Self {
        self.normalize_mapped_dates = enabled;
        self
    }

    /// Render every record in memory. The first failure aborts the batch.
    pub fn render_all(&self, records: &[Record]) -> Result<Vec<GeneratedDocument>> {
        let binder = FieldBinder::new(self.template.placeholders(), self.mapping, self.stamp)
            .normalize_mapped_dates(self.normalize_mapped_dates);
        let extension = self.template.extension();
        let mut names = FilenameAllocator::default();
        let mut docs = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let context = binder.bind(record);
            let content =
                self.template
                    .render(&context)
                    .map_err(|e| ForgeError::BatchGeneration {
                        record: index,
                        source: Box::new(e.for_record(index)),
                    })?;
            docs.push(GeneratedDocument {
                index,
                filename: names.allocate(record, index, extension),
                content,
            });
        }
        Ok(docs)
    }

    /// Clear `output_dir`, render every record and package the results.
    /// Nothing is written unless every record renders.
    pub fn run(&self, dataset: &Dataset, output_dir: &Path) -> Result<Archive> {
        let removed = clear_output_dir(output_dir)?;
        if removed > 0 {
            debug!("Removed {removed} stale files from {}", output_dir.display());
        }

        let docs = self.render_all(dataset.records())?;
        Packager::new(output_dir).package(&docs, &self.stamp)
    }
}

/// Remove every file directly inside `dir`, creating it if missing.
/// Subdirectories are left alone. Returns the number of files removed.
pub fn clear_output_dir(dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir).map_err(|e| packaging_error(dir, e))?;

    let mut removed = 0;
    for entry in std::fs::read_dir(dir).map_err(|e| packaging_error(dir, e))? {
        let entry = entry.map_err(|e| packaging_error(dir, e))?;
        let path = entry.path();
        let is_file = entry
            .file_type()
            .map(|t| !t.is_dir())
            .map_err(|e| packaging_error(&path, e))?;
        if is_file {
            std::fs::remove_file(&path).map_err(|e| packaging_error(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Extract `source`, load `template_path` and generate one certificate per
/// record into `output_dir`.
pub fn generate_certificates(
    source: &Path,
    template_path: &Path,
    mapping: &FieldMapping,
    output_dir: &Path,
    stamp: ProcessingStamp,
) -> Result<Archive> {
    let dataset = extract_records(source)?;
    let template = DocxTemplate::open(template_path)?;

    for (placeholder, header) in mapping.iter() {
        if !dataset.headers().iter().any(|h| h == header) {
            warn!("Mapping {placeholder} -> {header}: no such column, value will be empty");
        }
    }

    info!(
        "Generating {} certificates from {} with template {}",
        dataset.len(),
        source.display(),
        template.name()
    );
    BatchGenerator::new(&template, mapping, stamp).run(&dataset, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(index: usize, name: &str) -> Record {
        Record::from_pairs(index, [("Name", name)])
    }

    #[test]
    fn test_document_filename_sanitizes_name() {
        let record = named(0, "Jane O'Brien!");
        assert_eq!(
            document_filename(&record, 0, "docx"),
            "certificate_Jane_O_Brien_.docx"
        );
        assert_eq!(
            document_filename(&named(0, "José Núñez"), 0, "docx"),
            "certificate_José_Núñez.docx"
        );
    }

    #[test]
    fn test_document_filename_falls_back_to_index() {
        let record = Record::from_pairs(3, [("Student", "Ada")]);
        assert_eq!(document_filename(&record, 3, "docx"), "certificate_4.docx");
        assert_eq!(
            document_filename(&named(3, ""), 3, "docx"),
            "certificate_4.docx"
        );
    }

    #[test]
    fn test_filename_allocator_resolves_collisions() {
        let mut names = FilenameAllocator::default();
        assert_eq!(
            names.allocate(&named(0, "Ann Lee"), 0, "docx"),
            "certificate_Ann_Lee.docx"
        );
        assert_eq!(
            names.allocate(&named(1, "Ann-Lee"), 1, "docx"),
            "certificate_Ann_Lee_2.docx"
        );
        assert_eq!(
            names.allocate(&named(2, "Ann Lee"), 2, "docx"),
            "certificate_Ann_Lee_3.docx"
        );
    }

    #[test]
    fn test_filename_allocator_second_level_collision() {
        let mut names = FilenameAllocator::default();
        assert_eq!(names.allocate(&named(0, "B"), 0, "docx"), "certificate_B.docx");
        assert_eq!(names.allocate(&named(1, "B_3"), 1, "docx"), "certificate_B_3.docx");
        // index suffix `_3` is already taken by record 1
        assert_eq!(names.allocate(&named(2, "B"), 2, "docx"), "certificate_B_3_2.docx");
        assert_eq!(names.allocate(&named(3, "B"), 3, "docx"), "certificate_B_4.docx");
    }

    #[test]
    fn test_filename_allocator_ignores_case() {
        let mut names = FilenameAllocator::default();
        assert_eq!(names.allocate(&named(0, "Ann"), 0, "docx"), "certificate_Ann.docx");
        assert_eq!(names.allocate(&named(1, "ANN"), 1, "docx"), "certificate_ANN_2.docx");
        assert_eq!(names.allocate(&named(2, "ann_2"), 2, "docx"), "certificate_ann_2_3.docx");
    }

    #[test]
    fn test_clear_output_dir_removes_only_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.docx"), b"x").unwrap();
        std::fs::write(tmp.path().join("certificates_old.zip"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("keep")).unwrap();

        assert_eq!(clear_output_dir(tmp.path()).unwrap(), 2);
        assert!(tmp.path().join("keep").is_dir());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_clear_output_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("fresh");
        assert_eq!(clear_output_dir(&dir).unwrap(), 0);
        assert!(dir.is_dir());
    }
}
