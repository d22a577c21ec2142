//! Structured record of everything a render approximated, skipped or fell back on.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A geometry row kind with no known meaning; the row was skipped.
    UnsupportedGeometryOp,
    /// A geometry row drawn with a simpler primitive (splines, NURBS, unreadable polylines).
    ApproximatedGeometry,
    /// A color cell that could not be resolved; a policy default was used.
    ColorFallback,
    /// EMF/WMF payloads drawn as a placeholder rectangle.
    MetafilePlaceholder,
    /// Foreign data whose bytes are missing or not a known image format.
    MissingMedia,
    /// A master located by its ID rather than through the relationship chain.
    MasterFallback,
    /// A glue record whose endpoints could not (fully) be placed.
    UnresolvedConnection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub page: usize,
    pub shape: Option<u32>,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderDiagnostics {
    page: usize,
    items: Vec<Diagnostic>,
}

impl RenderDiagnostics {
    pub fn new(page: usize) -> Self {
        Self {
            page,
            items: Vec::new(),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn push(&mut self, shape: Option<u32>, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(page = self.page, shape = ?shape, kind = ?kind, "{message}");
        self.items.push(Diagnostic {
            page: self.page,
            shape,
            kind,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.kind == kind)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
