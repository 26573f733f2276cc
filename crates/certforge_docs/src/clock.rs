use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::dates::format_canonical;

/// The moment a run started.
///
/// Captured once and passed to every step that needs "today", so all records
/// of a batch and the archive name agree on the date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStamp(NaiveDateTime);

impl ProcessingStamp {
    /// Read the local wall clock.
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }

    /// A fixed instant, for replays and tests.
    pub fn at(instant: NaiveDateTime) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.0
    }

    pub fn today(&self) -> NaiveDate {
        self.0.date()
    }

    /// Today in the canonical display form, e.g. `January 05, 2024`.
    pub fn canonical_date(&self) -> String {
        format_canonical(self.today())
    }

    /// `YYYYMMDD_HHMMSS`, used in archive names.
    pub fn archive_suffix(&self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }
}
