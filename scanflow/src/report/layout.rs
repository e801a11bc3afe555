//! Report document layout.

use crate::errors::TemplateError;
use crate::paths::{Bindings, Template};
use serde::{Deserialize, Serialize};

/// Layout used when none is configured.
pub const DEFAULT_LAYOUT: &str = "# {title}\n\nSubjects: {subjects}\n\n{body}";

/// A document template with `{title}`, `{subjects}` and `{body}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportLayout {
    template: Template,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self::new(DEFAULT_LAYOUT)
    }
}

impl ReportLayout {
    /// Creates a layout from a template.
    #[must_use]
    pub fn new(template: impl Into<Template>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Renders the document.
    ///
    /// # Errors
    ///
    /// Fails if the layout uses a placeholder other than the three it is given.
    pub fn render(&self, title: &str, subjects: &[String], body: &str) -> Result<String, TemplateError> {
        let bindings = Bindings::new()
            .with("title", title)
            .with("subjects", subjects.join(", "))
            .with("body", body);
        self.template.resolve(&bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_layout() {
        let doc = ReportLayout::default()
            .render("anat-preproc", &["A".into(), "B".into()], "## A / run 1\n")
            .unwrap();

        assert_eq!(doc, "# anat-preproc\n\nSubjects: A, B\n\n## A / run 1\n");
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = ReportLayout::new("{title} {date}").render("x", &[], "").unwrap_err();
        assert!(matches!(err, TemplateError::Unbound(ref e) if e.placeholder == "date"));
    }
}
