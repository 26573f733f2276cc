use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::batch::GeneratedDocument;
use crate::clock::ProcessingStamp;
use crate::error::{ForgeError, Result};

/// A written archive and the documents it holds, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub entries: Vec<String>,
}

impl Archive {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Writes generated documents to a directory and bundles them into a zip.
#[derive(Debug, Clone)]
pub struct Packager {
    output_dir: PathBuf,
}

impl Packager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `certificates_<YYYYMMDD_HHMMSS>.zip`
    pub fn archive_name(stamp: &ProcessingStamp) -> String {
        format!("certificates_{}.zip", stamp.archive_suffix())
    }

    /// Write every document, then archive them. Refuses to replace an
    /// existing archive of the same name.
    pub fn package(&self, docs: &[GeneratedDocument], stamp: &ProcessingStamp) -> Result<Archive> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| packaging_error(&self.output_dir, e))?;

        for doc in docs {
            let path = self.output_dir.join(&doc.filename);
            std::fs::write(&path, &doc.content).map_err(|e| packaging_error(&path, e))?;
            debug!("Wrote {} ({} bytes)", path.display(), doc.content.len());
        }

        let path = self.output_dir.join(Self::archive_name(stamp));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| packaging_error(&path, e))?;

        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            zip.start_file(doc.filename.as_str(), options)
                .map_err(|e| packaging_error(&path, e))?;
            zip.write_all(&doc.content)
                .map_err(|e| packaging_error(&path, e))?;
            entries.push(doc.filename.clone());
        }

        let mut writer = zip.finish().map_err(|e| packaging_error(&path, e))?;
        writer.flush().map_err(|e| packaging_error(&path, e))?;

        info!(
            "Packaged {} certificates into {}",
            entries.len(),
            path.display()
        );
        Ok(Archive { path, entries })
    }
}

pub(crate) fn packaging_error(path: &Path, reason: impl std::fmt::Display) -> ForgeError {
    ForgeError::Packaging {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
