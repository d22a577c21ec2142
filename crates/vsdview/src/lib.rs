#![forbid(unsafe_code)]

//! `vsdview` converts Visio drawing packages (`.vsdx`, `.vssx`, `.vstx` and their macro-enabled
//! variants) into one standalone SVG per page, headlessly.
//!
//! The heavy lifting lives in `vsdview-core` (package reader, shape model, master inheritance)
//! and `vsdview-render` (geometry, styles, connectors, SVG emission); this crate bundles them
//! behind a small conversion API plus page listing, text extraction and text search.

mod config;
mod format;
mod text;

pub use config::{CONFIG_ENV, ConvertConfig};
pub use format::{PackageFormat, open_bytes, open_path};
pub use text::{PageText, TextMatch, extract_text, search_text};

pub use vsdview_core::{
    Document, IssueKind, Page, PackageLimits, ParseOptions, ParseReport, PartIssue, Shape,
};
pub use vsdview_render::{
    DeterministicTextMeasurer, Diagnostic, DiagnosticKind, RenderDiagnostics, RenderedPage,
    SvgRenderOptions, TextMeasurer, sanitize_svg_id,
};

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Core(#[from] vsdview_core::Error),

    #[error(transparent)]
    Render(#[from] vsdview_render::Error),

    #[error("conversion unavailable: {reason}")]
    ConversionUnavailable { reason: String },

    #[error("invalid config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// One row of [`page_index`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PageSummary {
    pub index: usize,
    pub name: String,
    pub shape_count: usize,
    /// Inches.
    pub width: f64,
    /// Inches.
    pub height: f64,
    pub is_background: bool,
}

fn ensure_pages(document: &Document) -> Result<()> {
    if document.page_count() == 0 {
        return Err(ConvertError::ConversionUnavailable {
            reason: "the package has no drawing pages (stencil without pages?)".to_string(),
        });
    }
    Ok(())
}

/// Renders every page, background pages included, in page order.
pub fn convert(document: &Document, options: &SvgRenderOptions) -> Result<Vec<String>> {
    Ok(convert_with_diagnostics(document, options)?
        .into_iter()
        .map(|page| page.svg)
        .collect())
}

/// Like [`convert`], keeping each page's render diagnostics.
pub fn convert_with_diagnostics(
    document: &Document,
    options: &SvgRenderOptions,
) -> Result<Vec<RenderedPage>> {
    ensure_pages(document)?;
    let pages = vsdview_render::render_document(document, options)?;
    for page in &pages {
        if !page.diagnostics.is_empty() {
            tracing::debug!(
                page = page.diagnostics.page(),
                diagnostics = page.diagnostics.len(),
                "page rendered with approximations"
            );
        }
    }
    Ok(pages)
}

/// Renders one page; `Ok(None)` when `page_index` is out of range.
pub fn convert_page(
    document: &Document,
    page_index: usize,
    options: &SvgRenderOptions,
) -> Result<Option<String>> {
    ensure_pages(document)?;
    Ok(vsdview_render::render_page(document, page_index, options)?)
}

/// Opens `path` with the extension policy of [`open_path`] and renders every page.
pub fn convert_path(path: impl AsRef<Path>, config: &ConvertConfig) -> Result<Vec<String>> {
    let document = open_path(path, &config.parse)?;
    convert(&document, &config.render)
}

pub fn page_index(document: &Document) -> Vec<PageSummary> {
    document
        .pages
        .iter()
        .map(|page| PageSummary {
            index: page.index,
            name: page.name.clone(),
            shape_count: page.shape_count(),
            width: page.width,
            height: page.height,
            is_background: page.is_background,
        })
        .collect()
}

/// Parse and render options bundled for repeated conversions.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConverter {
    pub parse: ParseOptions,
    pub svg: SvgRenderOptions,
}

impl HeadlessConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ConvertConfig) -> Self {
        Self {
            parse: config.parse,
            svg: config.render,
        }
    }

    pub fn strict(mut self) -> Self {
        self.parse.strict = true;
        self
    }

    pub fn with_media_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.svg.media_dir = Some(dir.into());
        self
    }

    pub fn open(&self, path: impl AsRef<Path>) -> Result<Document> {
        open_path(path, &self.parse)
    }

    pub fn open_bytes(&self, bytes: &[u8]) -> Result<Document> {
        open_bytes(bytes, &self.parse)
    }

    pub fn convert(&self, document: &Document) -> Result<Vec<String>> {
        convert(document, &self.svg)
    }

    pub fn convert_path(&self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let document = self.open(path)?;
        self.convert(&document)
    }

    pub fn convert_bytes(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let document = self.open_bytes(bytes)?;
        self.convert(&document)
    }

    pub fn convert_page(&self, document: &Document, page_index: usize) -> Result<Option<String>> {
        convert_page(document, page_index, &self.svg)
    }

    /// Renders one page with `<defs>`/element ids prefixed by a sanitized `diagram_id`.
    pub fn convert_page_with_diagram_id(
        &self,
        document: &Document,
        page_index: usize,
        diagram_id: &str,
    ) -> Result<Option<String>> {
        let mut svg = self.svg.clone();
        svg.diagram_id = Some(sanitize_svg_id(diagram_id));
        convert_page(document, page_index, &svg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_documents_are_unavailable() {
        let err = convert(&Document::default(), &SvgRenderOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::ConversionUnavailable { .. }));
        assert!(page_index(&Document::default()).is_empty());
    }
}
