use minijinja::{AutoEscape, Environment, Error as TemplateError, ErrorKind, UndefinedBehavior, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::binding::RenderContext;
use crate::error::{ForgeError, Result};
use crate::placeholders::PlaceholderSet;

/// Package parts that may contain placeholders.
static TEMPLATED_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^word/(?:document|header\d*|footer\d*|footnotes|endnotes)\.xml$")
        .expect("valid regex")
});

/// Names the template engine provides itself; never reported as placeholders.
const BUILTIN_GLOBALS: &[&str] = &["range", "dict", "debug", "namespace", "loop"];

const MAIN_PART: &str = "word/document.xml";

enum PackageEntry {
    Directory(String),
    Verbatim { name: String, data: Vec<u8> },
    Templated(String),
}

/// A DOCX file loaded as a template.
///
/// Loading compiles every templated part once; rendering never touches the
/// loaded state, so one template can render any number of records.
pub struct DocxTemplate {
    name: String,
    entries: Vec<PackageEntry>,
    env: Environment<'static>,
    placeholders: PlaceholderSet,
}

impl fmt::Debug for DocxTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocxTemplate")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("placeholders", &self.placeholders)
            .finish()
    }
}

impl DocxTemplate {
    /// Load and compile a template from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)
            .map_err(|e| parse_error(&name, None, format!("failed to read template: {e}")))?;
        Self::from_bytes(name, &bytes)
    }

    /// Load and compile a template from an in-memory DOCX package.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| parse_error(&name, None, format!("not a DOCX package: {e}")))?;

        let mut env = template_env();
        let mut entries = Vec::with_capacity(archive.len());
        let mut placeholders = PlaceholderSet::new();
        let mut has_main_part = false;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| parse_error(&name, None, format!("unreadable entry {i}: {e}")))?;
            let entry_name = file.name().to_string();

            if file.is_dir() {
                entries.push(PackageEntry::Directory(entry_name));
                continue;
            }

            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| parse_error(&name, Some(entry_name.as_str()), e))?;

            if !TEMPLATED_PART.is_match(&entry_name) {
                entries.push(PackageEntry::Verbatim {
                    name: entry_name,
                    data,
                });
                continue;
            }

            let xml = String::from_utf8(data)
                .map_err(|_| parse_error(&name, Some(entry_name.as_str()), "part is not valid UTF-8"))?;
            env.add_template_owned(entry_name.clone(), repair_split_tags(&xml))
                .map_err(|e| parse_error(&name, Some(entry_name.as_str()), e))?;
            let compiled = env
                .get_template(&entry_name)
                .map_err(|e| parse_error(&name, Some(entry_name.as_str()), e))?;
            placeholders.extend(
                compiled
                    .undeclared_variables(false)
                    .into_iter()
                    .filter(|var| !BUILTIN_GLOBALS.contains(&var.as_str())),
            );

            has_main_part |= entry_name == MAIN_PART;
            entries.push(PackageEntry::Templated(entry_name));
        }

        if !has_main_part {
            return Err(parse_error(&name, None, format!("missing {MAIN_PART}")));
        }

        debug!("Template {} variables: {:?}", name, placeholders);
        Ok(Self {
            name,
            entries,
            env,
            placeholders,
        })
    }

    /// File name the template was loaded under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extension for generated files, `docx` unless the template says otherwise.
    pub fn extension(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
            _ => "docx",
        }
    }

    pub fn placeholders(&self) -> &PlaceholderSet {
        &self.placeholders
    }

    /// Substitute `context` into every templated part and return the new
    /// package. Names missing from the context render as empty text.
    pub fn render(&self, context: &RenderContext) -> Result<Vec<u8>> {
        let ctx = Value::from_serialize(context);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = entry_options();

        for entry in &self.entries {
            match entry {
                PackageEntry::Directory(name) => {
                    zip.add_directory(name.as_str(), options)
                        .map_err(|e| self.render_error(name, e))?;
                }
                PackageEntry::Verbatim { name, data } => {
                    zip.start_file(name.as_str(), options)
                        .map_err(|e| self.render_error(name, e))?;
                    zip.write_all(data).map_err(|e| self.render_error(name, e))?;
                }
                PackageEntry::Templated(name) => {
                    let xml = self
                        .env
                        .get_template(name)
                        .and_then(|t| t.render(&ctx))
                        .map_err(|e| self.render_error(name, e))?;
                    zip.start_file(name.as_str(), options)
                        .map_err(|e| self.render_error(name, e))?;
                    zip.write_all(xml.as_bytes())
                        .map_err(|e| self.render_error(name, e))?;
                }
            }
        }

        let cursor = zip
            .finish()
            .map_err(|e| self.render_error("package", e))?;
        Ok(cursor.into_inner())
    }

    fn render_error(&self, part: &str, reason: impl fmt::Display) -> ForgeError {
        ForgeError::Render {
            template: self.name.clone(),
            record: None,
            reason: format!("{part}: {reason}"),
        }
    }
}

fn parse_error(template: &str, part: Option<&str>, reason: impl fmt::Display) -> ForgeError {
    ForgeError::TemplateParse {
        template: template.to_string(),
        part: part.map(str::to_string),
        reason: reason.to_string(),
    }
}

/// Fixed timestamp and compression so identical input renders to identical bytes.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

fn template_env() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    // Part names end in `.xml`; escaping is done by the formatter below.
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_formatter(|out, _state, value| {
        if value.is_undefined() || value.is_none() {
            return Ok(());
        }
        out.write_str(&xml_escape(&value.to_string()))
            .map_err(|_| TemplateError::new(ErrorKind::WriteFailure, "failed to write output"))
    });
    env
}

// ---------------------------------------------------------------------------
// Split-tag repair
// ---------------------------------------------------------------------------

/// Word often splits `{{ name }}` over several runs, leaving XML markup
/// inside the tag. Strip that markup so the template engine sees clean tags,
/// and turn entities and curly quotes inside tags back into plain characters.
pub(crate) fn repair_split_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let opener = skip_markup(after);

        let close = match opener.chars().next() {
            Some('{') => '}',
            Some('%') => '%',
            Some('#') => '#',
            _ => {
                out.push('{');
                rest = after;
                continue;
            }
        };

        match find_close(&opener[1..], close) {
            Some((body, remaining)) => {
                out.push('{');
                out.push_str(&opener[..1]);
                out.push_str(&clean_expression(&body));
                out.push(close);
                out.push('}');
                rest = remaining;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn skip_markup(mut s: &str) -> &str {
    while s.starts_with('<') {
        match s.find('>') {
            Some(end) => s = &s[end + 1..],
            None => break,
        }
    }
    s
}

/// Collect tag text up to `close` + `}`, dropping markup on the way.
fn find_close(body: &str, close: char) -> Option<(String, &str)> {
    let mut text = String::new();
    let mut rest = body;
    loop {
        let c = rest.chars().next()?;
        if c == '<' {
            let end = rest.find('>')?;
            rest = &rest[end + 1..];
            continue;
        }
        if c == close {
            let after = skip_markup(&rest[c.len_utf8()..]);
            if let Some(remaining) = after.strip_prefix('}') {
                return Some((text, remaining));
            }
        }
        text.push(c);
        rest = &rest[c.len_utf8()..];
    }
}

fn clean_expression(body: &str) -> String {
    xml_unescape(body)
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201c}', '\u{201d}'], "\"")
}

// ---------------------------------------------------------------------------
// XML text helpers
// ---------------------------------------------------------------------------

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);").expect("valid regex")
});

fn xml_unescape(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => {
                    let code = match entity.strip_prefix("#x") {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => entity[1..].parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

static TEXT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|</w:p>|<w:tab\s*/>|<w:br\s*/>").expect("valid regex")
});

/// Visible text of a DOCX main document, one line per paragraph.
pub fn document_text(docx: &[u8]) -> Result<String> {
    let err = |reason: String| parse_error("rendered document", Some(MAIN_PART), reason);

    let mut archive =
        ZipArchive::new(Cursor::new(docx)).map_err(|e| err(format!("not a DOCX package: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name(MAIN_PART)
        .map_err(|e| err(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| err(e.to_string()))?;

    let mut text = String::new();
    for caps in TEXT_TOKEN.captures_iter(&xml) {
        match caps.get(1) {
            Some(run) => text.push_str(&xml_unescape(run.as_str())),
            None if caps[0].starts_with("<w:tab") => text.push('\t'),
            None => text.push('\n'),
        }
    }
    Ok(text.trim_end_matches('\n').to_string())
}
