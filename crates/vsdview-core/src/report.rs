//! Per-part load outcomes.
//!
//! Part-level failures never abort a load; they are recorded here (and logged) so callers can
//! tell a clean document from a degraded one.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// An expected part is absent (often benign: no theme, no masters).
    PartMissing,
    /// Malformed XML, invalid references or structural limits exceeded.
    SchemaParse,
    /// Embedded media that could not be decoded.
    Media,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartIssue {
    pub part: String,
    pub kind: IssueKind,
    pub message: String,
}

impl PartIssue {
    pub fn new(part: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    parsed: Vec<String>,
    issues: Vec<PartIssue>,
}

impl ParseReport {
    pub fn parsed_parts(&self) -> &[String] {
        &self.parsed
    }

    pub fn issues(&self) -> &[PartIssue] {
        &self.issues
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &PartIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    pub(crate) fn parsed(&mut self, part: &str) {
        self.parsed.push(part.to_string());
    }

    pub(crate) fn push(&mut self, issue: PartIssue) {
        match issue.kind {
            IssueKind::PartMissing => {
                tracing::debug!(part = %issue.part, "{}", issue.message);
            }
            IssueKind::SchemaParse | IssueKind::Media => {
                tracing::warn!(part = %issue.part, kind = ?issue.kind, "{}", issue.message);
            }
        }
        self.issues.push(issue);
    }

    pub(crate) fn extend(&mut self, issues: impl IntoIterator<Item = PartIssue>) {
        for issue in issues {
            self.push(issue);
        }
    }
}
