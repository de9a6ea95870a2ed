//! File name templates with `{field}` placeholders
//!
//! Template text may contain `/` to create directories; substituted values are sanitized
//! so metadata can never introduce a path separator of its own.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Fields available to the track file name template
pub const TRACK_FIELDS: &[&str] = &[
    "artist",
    "album",
    "name",
    "rel_year",
    "disc_number",
    "track_number",
    "spotid",
    "genre",
    "label",
    "explicit",
    "trackcount",
    "disccount",
    "playlist_name",
    "playlist_owner",
    "playlist_desc",
];

/// Fields available to the album directory template
pub const ALBUM_FIELDS: &[&str] = &[
    "artist",
    "rel_year",
    "album",
    "genre",
    "label",
    "trackcount",
    "playlist_name",
    "playlist_owner",
    "playlist_desc",
];

/// Fields available to the playlist file template
pub const PLAYLIST_FILE_FIELDS: &[&str] = &["name", "owner", "description"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed file name template
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse template text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] for unbalanced braces or empty/invalid field names.
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        field.push(c);
                    }
                    if !closed {
                        return Err(template_error(text, "unclosed '{'"));
                    }
                    if field.is_empty()
                        || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(template_error(
                            text,
                            format!("invalid field name \"{field}\""),
                        ));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(template_error(text, "unmatched '}'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: text.to_string(),
            segments,
        })
    }

    /// Ensure every placeholder is one of `allowed`
    pub fn check_fields(&self, allowed: &[&str]) -> Result<()> {
        for segment in &self.segments {
            if let Segment::Field(name) = segment
                && !allowed.contains(&name.as_str())
            {
                return Err(template_error(
                    &self.source,
                    format!("unknown field \"{name}\""),
                ));
            }
        }
        Ok(())
    }

    /// Substitute every placeholder
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] if a placeholder has no value.
    pub fn render(&self, values: &TemplateValues) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match values.0.get(name.as_str()) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(template_error(
                            &self.source,
                            format!("unknown field \"{name}\""),
                        ));
                    }
                },
            }
        }
        Ok(out)
    }
}

fn template_error(template: &str, reason: impl Into<String>) -> Error {
    Error::Template {
        template: template.to_string(),
        reason: reason.into(),
    }
}

/// Values substituted into a template, sanitized on insertion
#[derive(Debug, Clone, Default)]
pub struct TemplateValues(BTreeMap<&'static str, String>);

impl TemplateValues {
    /// Create an empty value set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, stripping characters that are not allowed in a path component
    pub fn set(&mut self, field: &'static str, value: impl AsRef<str>) -> &mut Self {
        self.0.insert(field, sanitize_component(value.as_ref()));
        self
    }
}

/// Remove path separators (and characters Windows rejects) from a metadata value
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '/' | '\\' => {}
            #[cfg(windows)]
            '*' | '?' | '\'' | '<' | '>' | '"' | ':' => {}
            #[cfg(windows)]
            '|' => out.push('-'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
