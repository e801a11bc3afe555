//! Template parsing and resolution.

use super::Bindings;
use crate::errors::{TemplateError, UnboundPlaceholderError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// `{{` and `}}` are escapes, `{name}` and `{name:0N}` are placeholders. Any
// other brace text (`'{print $1}'`, `${FSLDIR}` written as `${{FSLDIR}}`)
// is left alone.
const TOKEN_PATTERN: &str = r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)(?::0([1-9][0-9]?))?\}";

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    TOKEN.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("template token pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { name: String, width: Option<usize> },
}

/// A parsed path or command template.
///
/// Parsing never fails; unknown placeholders are reported when the template
/// is resolved, or earlier by pipeline validation through
/// [`Template::placeholders`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template string.
    #[must_use]
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in token_regex().captures_iter(&source) {
            let Some(whole) = caps.get(0) else { continue };
            literal.push_str(&source[last..whole.start()]);
            last = whole.end();

            match whole.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                _ => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
                    let width = caps.get(2).and_then(|m| m.as_str().parse().ok());
                    segments.push(Segment::Placeholder { name, width });
                }
            }
        }

        literal.push_str(&source[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { source, segments }
    }

    /// Returns the original template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the placeholder names in order of appearance (with repeats).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Returns true if the template contains no placeholders.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.placeholders().next().is_none()
    }

    /// Substitutes every placeholder from `bindings`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Unbound`] for the first placeholder without a
    /// binding, or [`TemplateError::NotNumeric`] when a padded placeholder is
    /// bound to something other than digits.
    pub fn resolve(&self, bindings: &Bindings) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { name, width } => {
                    let value = bindings
                        .get(name)
                        .ok_or_else(|| UnboundPlaceholderError::new(name, &self.source))?;
                    match width {
                        Some(width) => {
                            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                                return Err(TemplateError::NotNumeric {
                                    placeholder: name.clone(),
                                    value: value.to_string(),
                                });
                            }
                            out.push_str(&format!("{value:0>width$}"));
                        }
                        None => out.push_str(value),
                    }
                }
            }
        }

        Ok(out)
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Self::parse(source)
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Resolves `template` against `bindings` in one step.
///
/// # Errors
///
/// See [`Template::resolve`].
pub fn resolve(template: &str, bindings: &Bindings) -> Result<String, TemplateError> {
    Template::parse(template).resolve(bindings)
}
