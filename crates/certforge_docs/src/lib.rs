//! Certificate generation: spreadsheet rows bound into DOCX templates.
//!
//! The pipeline is extraction ([`tabular`]), template inspection
//! ([`placeholders`]), field binding ([`binding`]), rendering ([`render`])
//! and batch packaging ([`batch`], [`package`]). [`preview`] renders a single
//! record for inspection.

pub mod batch;
pub mod binding;
pub mod clock;
pub mod dates;
pub mod error;
pub mod package;
pub mod placeholders;
pub mod preview;
pub mod render;
pub mod samples;
pub mod tabular;

pub use batch::{BatchGenerator, GeneratedDocument, generate_certificates};
pub use binding::{DATE_ALIASES, FieldBinder, FieldMapping, RenderContext, resolve_context};
pub use clock::ProcessingStamp;
pub use dates::{DateResolution, normalize_date, resolve_date};
pub use error::{ForgeError, Result};
pub use package::{Archive, Packager};
pub use placeholders::{PlaceholderSet, inspect_placeholders, is_date_placeholder};
pub use preview::{generate_preview, render_preview};
pub use render::{DocxTemplate, document_text};
pub use tabular::{Dataset, Record, extract_records, read_headers};
