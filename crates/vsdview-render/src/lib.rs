#![forbid(unsafe_code)]

//! Headless SVG rendering for Visio pages.
//!
//! Input is a loaded [`vsdview_core::Document`]; output is one standalone SVG string per page plus
//! a [`RenderDiagnostics`] record of everything that was approximated or skipped. Rendering is a
//! pure function of the document and the options.

pub mod color;
pub mod connect;
pub mod diagnostics;
pub mod geometry;
pub mod style;
pub mod svg;
pub mod text;
pub mod transform;
mod util;

pub use color::{ColorContext, ColorRole, Rgb};
pub use diagnostics::{Diagnostic, DiagnosticKind, RenderDiagnostics};
pub use svg::{SvgRenderOptions, sanitize_svg_id};
pub use text::{DeterministicTextMeasurer, TextMeasurer};

use vsdview_core::Document;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("color value `{value}` names no color")]
    ColorResolution { value: String },

    #[error("failed to write media: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] vsdview_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub svg: String,
    pub diagnostics: RenderDiagnostics,
}

/// Renders page `index`; `Ok(None)` when the document has no such page.
pub fn render_page(
    doc: &Document,
    index: usize,
    options: &SvgRenderOptions,
) -> Result<Option<String>> {
    Ok(render_page_with_diagnostics(doc, index, options)?.map(|page| page.svg))
}

pub fn render_page_with_diagnostics(
    doc: &Document,
    index: usize,
    options: &SvgRenderOptions,
) -> Result<Option<RenderedPage>> {
    render_page_with_measurer(doc, index, options, &DeterministicTextMeasurer::default())
}

pub fn render_page_with_measurer(
    doc: &Document,
    index: usize,
    options: &SvgRenderOptions,
    measurer: &dyn TextMeasurer,
) -> Result<Option<RenderedPage>> {
    let Some(page) = doc.page(index) else {
        return Ok(None);
    };
    let mut diagnostics = RenderDiagnostics::new(index);
    let svg = svg::render_page_svg(doc, page, options, measurer, &mut diagnostics)?;
    Ok(Some(RenderedPage { svg, diagnostics }))
}

/// Renders every page in document order.
pub fn render_document(doc: &Document, options: &SvgRenderOptions) -> Result<Vec<RenderedPage>> {
    let mut out = Vec::with_capacity(doc.page_count());
    for index in 0..doc.page_count() {
        if let Some(page) = render_page_with_diagnostics(doc, index, options)? {
            out.push(page);
        }
    }
    Ok(out)
}
