use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use docx_rs::{Docx, Paragraph, Run};
use rust_xlsxwriter::{ExcelDateTime, Format, FormatBorder, Workbook};
use std::io::Cursor;

/// Build a minimal certificate template: a title followed by one
/// `{{ placeholder }}` paragraph per name.
pub fn sample_template(placeholders: &[&str]) -> Result<Vec<u8>> {
    let mut docx = Docx::new();

    let title_run = Run::new()
        .add_text("Certificate of Completion")
        .bold()
        .size(48); // half-points, 24pt
    docx = docx.add_paragraph(Paragraph::new().add_run(title_run));
    docx = docx.add_paragraph(Paragraph::new());

    for name in placeholders {
        let run = Run::new().add_text(format!("{{{{ {name} }}}}")).size(28);
        docx = docx.add_paragraph(Paragraph::new().add_run(run));
    }

    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| anyhow::anyhow!("Failed to pack DOCX: {}", e))?;

    Ok(buf.into_inner())
}

/// One row of a sample roster.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecipient {
    pub name: String,
    pub course: String,
    pub completed: NaiveDate,
    pub score: f64,
}

impl SampleRecipient {
    pub fn new(name: &str, course: &str, completed: NaiveDate, score: f64) -> Self {
        Self {
            name: name.into(),
            course: course.into(),
            completed,
            score,
        }
    }
}

/// Column headers written by [`sample_roster`].
pub const ROSTER_HEADERS: [&str; 4] = ["Name", "Course", "Completed", "Score"];

/// Build an XLSX roster with one row per recipient. `Completed` is a real
/// date cell and `Score` a number, so extraction sees typed values.
pub fn sample_roster(recipients: &[SampleRecipient]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Roster")?;

    let header = Format::new().set_bold().set_border_bottom(FormatBorder::Thin);
    let date = Format::new().set_num_format("yyyy-mm-dd");
    sheet.write_row_with_format(0, 0, ROSTER_HEADERS, &header)?;

    for (i, recipient) in recipients.iter().enumerate() {
        let row = u32::try_from(i + 1).context("Roster has too many recipients")?;
        let completed = excel_date(recipient.completed)
            .with_context(|| format!("Unsupported completion date for {}", recipient.name))?;
        sheet.write_string(row, 0, &recipient.name)?;
        sheet.write_string(row, 1, &recipient.course)?;
        sheet.write_datetime_with_format(row, 2, &completed, &date)?;
        sheet.write_number(row, 3, recipient.score)?;
    }
    sheet.set_column_width(0, 24)?;
    sheet.set_column_width(1, 24)?;
    sheet.set_column_width(2, 12)?;

    Ok(workbook.save_to_buffer()?)
}

fn excel_date(date: NaiveDate) -> Result<ExcelDateTime> {
    let year = u16::try_from(date.year())?;
    // month() and day() are always small enough for u8
    Ok(ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)?)
}

/// The roster `certforge init` writes.
pub fn sample_recipients() -> Vec<SampleRecipient> {
    let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap_or_default();
    vec![
        SampleRecipient::new("Ada Lovelace", "Analytical Engines", day(3, 5), 98.0),
        SampleRecipient::new("Alan Turing", "Computability", day(4, 12), 95.5),
        SampleRecipient::new("Grace Hopper", "Compilers", day(5, 20), 97.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DocxTemplate, document_text};

    #[test]
    fn test_sample_template_declares_placeholders() {
        let bytes = sample_template(&["name", "course", "issue_date"]).unwrap();
        assert_eq!(&bytes[0..2], b"PK");

        let template = DocxTemplate::from_bytes("sample.docx", &bytes).unwrap();
        let names: Vec<_> = template.placeholders().iter().collect();
        assert_eq!(names, vec!["course", "issue_date", "name"]);
    }

    #[test]
    fn test_sample_template_without_placeholders() {
        let bytes = sample_template(&[]).unwrap();
        let template = DocxTemplate::from_bytes("empty.docx", &bytes).unwrap();
        assert!(template.placeholders().is_empty());
        let text = document_text(&bytes).unwrap();
        assert!(text.starts_with("Certificate of Completion"));
    }

    #[test]
    fn test_sample_roster_has_typed_cells() {
        use crate::tabular::extract_records;

        let completed = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let bytes = sample_roster(&[SampleRecipient::new("Ada", "Math", completed, 92.5)]).unwrap();
        assert_eq!(&bytes[0..2], b"PK");

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("roster.xlsx");
        std::fs::write(&path, &bytes).unwrap();
        let dataset = extract_records(&path).unwrap();
        assert_eq!(dataset.headers(), ROSTER_HEADERS);
        let ada = &dataset.records()[0];
        assert_eq!(ada.get("Completed"), Some("February 29, 2024"));
        assert_eq!(ada.get("Score"), Some("92.5"));
    }

    #[test]
    fn test_sample_recipients_have_distinct_names() {
        let recipients = sample_recipients();
        assert_eq!(recipients.len(), 3);
        assert!(recipients.iter().all(|r| r.completed.year() == 2024));
        let names: std::collections::BTreeSet<_> =
            recipients.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), 3);
    }
}
