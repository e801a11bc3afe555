//! Thread-safe collection of report fragments.

use super::ReportLayout;
use crate::errors::TemplateError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One rendered fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Subject identifier.
    pub subject: String,
    /// Run identifier.
    pub run: String,
    /// Stage that produced the fragment.
    pub stage: String,
    /// Rendered text.
    pub fragment: String,
}

/// Gathers fragments from concurrent subject workers.
///
/// Fragments come back grouped by subject, in the configured subject order
/// (insertion order for subjects it does not name), then in the order they
/// were appended within each subject.
#[derive(Debug, Default)]
pub struct ReportCollector {
    subject_order: Vec<String>,
    entries: Mutex<Vec<ReportEntry>>,
}

impl ReportCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the subject order used by [`fragments`](Self::fragments).
    #[must_use]
    pub fn with_subject_order<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject_order = subjects.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a fragment.
    pub fn append(
        &self,
        subject: impl Into<String>,
        run: impl Into<String>,
        stage: impl Into<String>,
        fragment: impl Into<String>,
    ) {
        self.entries.lock().push(ReportEntry {
            subject: subject.into(),
            run: run.into(),
            stage: stage.into(),
            fragment: fragment.into(),
        });
    }

    /// Returns the number of fragments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the fragments in report order.
    #[must_use]
    pub fn fragments(&self) -> Vec<ReportEntry> {
        let mut entries = self.entries.lock().clone();

        let mut first_seen: Vec<String> = Vec::new();
        for entry in &entries {
            if !first_seen.contains(&entry.subject) {
                first_seen.push(entry.subject.clone());
            }
        }
        let rank = |subject: &str| -> (usize, usize) {
            match self.subject_order.iter().position(|s| s == subject) {
                Some(pos) => (0, pos),
                None => (1, first_seen.iter().position(|s| s == subject).unwrap_or(0)),
            }
        };

        // stable, so appends keep their order within a subject
        entries.sort_by_key(|entry| rank(&entry.subject));
        entries
    }

    /// Renders every fragment under `## <subject> / run <run>` headings.
    #[must_use]
    pub fn body(&self) -> String {
        let mut body = String::new();
        let mut current: Option<(String, String)> = None;

        for entry in self.fragments() {
            let heading = (entry.subject.clone(), entry.run.clone());
            if current.as_ref() != Some(&heading) {
                if current.is_some() {
                    body.push('\n');
                }
                body.push_str(&format!("## {} / run {}\n\n", entry.subject, entry.run));
                current = Some(heading);
            }
            body.push_str(entry.fragment.trim_end());
            body.push('\n');
        }

        body
    }

    /// Renders the whole document through `layout`.
    ///
    /// `{subjects}` lists the fixed subject order when one was given, so
    /// subjects without fragments still appear; otherwise the subjects
    /// that contributed fragments.
    ///
    /// # Errors
    ///
    /// See [`ReportLayout::render`].
    pub fn render(&self, layout: &ReportLayout, title: &str) -> Result<String, TemplateError> {
        let mut subjects = self.subject_order.clone();
        if subjects.is_empty() {
            for entry in self.fragments() {
                if !subjects.contains(&entry.subject) {
                    subjects.push(entry.subject);
                }
            }
        }
        layout.render(title, &subjects, &self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_insertion_order_without_subject_order() {
        let collector = ReportCollector::new();
        collector.append("B", "1", "skullstrip", "B brain");
        collector.append("A", "1", "skullstrip", "A brain");
        collector.append("B", "1", "segment", "B masks");

        let stages: Vec<_> = collector
            .fragments()
            .into_iter()
            .map(|e| format!("{}:{}", e.subject, e.stage))
            .collect();

        assert_eq!(stages, vec!["B:skullstrip", "B:segment", "A:skullstrip"]);
    }

    #[test]
    fn test_subject_order_wins_over_completion_order() {
        let collector = ReportCollector::new().with_subject_order(["A", "B"]);
        collector.append("B", "1", "skullstrip", "B brain");
        collector.append("A", "1", "skullstrip", "A brain");
        collector.append("A", "2", "skullstrip", "A brain run 2");

        let subjects: Vec<_> = collector
            .fragments()
            .into_iter()
            .map(|e| format!("{}/{}", e.subject, e.run))
            .collect();

        assert_eq!(subjects, vec!["A/1", "A/2", "B/1"]);
    }

    #[test]
    fn test_render() {
        let collector = ReportCollector::new().with_subject_order(["A", "B"]);
        collector.append("B", "1", "segment", "csf ok\n");
        collector.append("A", "1", "skullstrip", "brain ok");
        collector.append("A", "1", "segment", "csf ok");

        let doc = collector.render(&ReportLayout::default(), "anat").unwrap();

        assert_eq!(
            doc,
            "# anat\n\nSubjects: A, B\n\n\
             ## A / run 1\n\nbrain ok\ncsf ok\n\n\
             ## B / run 1\n\ncsf ok\n"
        );
    }

    #[test]
    fn test_render_subjects_without_fragments() {
        let ordered = ReportCollector::new().with_subject_order(["A", "B"]);
        ordered.append("A", "1", "skullstrip", "brain ok");
        let unordered = ReportCollector::new();
        unordered.append("C", "1", "skullstrip", "brain ok");

        let layout = ReportLayout::new("{subjects}");
        assert_eq!(ordered.render(&layout, "anat").unwrap(), "A, B");
        assert_eq!(unordered.render(&layout, "anat").unwrap(), "C");
    }

    #[tokio::test]
    async fn test_concurrent_append() {
        let collector = Arc::new(ReportCollector::new().with_subject_order(["s0", "s1", "s2", "s3"]));

        let handles: Vec<_> = (0..4)
            .rev()
            .map(|i| {
                let collector = collector.clone();
                tokio::spawn(async move {
                    collector.append(format!("s{i}"), "1", "stage", format!("fragment {i}"));
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let subjects: Vec<_> = collector.fragments().into_iter().map(|e| e.subject).collect();
        assert_eq!(subjects, vec!["s0", "s1", "s2", "s3"]);
    }
}
