//! Page text extraction and search.

use std::fmt;

use serde::Serialize;
use vsdview_core::{Document, InheritContext, Page, Shape, resolve_shape};
use vsdview_render::text::shape_text;

/// Text of one page: one entry per shape that carries text, in drawing order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    pub index: usize,
    pub name: String,
    pub text: String,
}

impl fmt::Display for PageText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMatch {
    pub page_index: usize,
    pub page_name: String,
    pub shape_id: u32,
    pub text: String,
}

/// `(shape id, text)` for every shape with non-blank effective text (master text included).
fn page_shape_texts(document: &Document, page: &Page) -> Vec<(u32, String)> {
    let ctx = InheritContext {
        masters: &document.masters,
        styles: &document.styles,
    };
    let mut out = Vec::new();
    collect(&ctx, &page.shapes, None, &mut out);
    out
}

fn collect(ctx: &InheritContext<'_>, shapes: &[Shape], master: Option<u32>, out: &mut Vec<(u32, String)>) {
    for shape in shapes {
        let effective = resolve_shape(shape, ctx, master);
        if let Some(text) = shape_text(&effective.shape) {
            let text = text.trim();
            if !text.is_empty() {
                out.push((shape.id, text.to_string()));
            }
        }
        collect(ctx, &shape.sub_shapes, effective.master_id, out);
    }
}

pub fn extract_text(document: &Document) -> Vec<PageText> {
    document
        .pages
        .iter()
        .map(|page| PageText {
            index: page.index,
            name: page.name.clone(),
            text: page_shape_texts(document, page)
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect()
}

/// Shapes whose text contains `query`, case-insensitively. An empty query matches nothing.
pub fn search_text(document: &Document, query: &str) -> Vec<TextMatch> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut matches = Vec::new();
    for page in &document.pages {
        for (shape_id, text) in page_shape_texts(document, page) {
            if text.to_lowercase().contains(&needle) {
                matches.push(TextMatch {
                    page_index: page.index,
                    page_name: page.name.clone(),
                    shape_id,
                    text,
                });
            }
        }
    }
    matches
}
