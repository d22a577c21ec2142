//! Page compositor and SVG emitter.
//!
//! Walks a referenced background page first, then the page's own shapes, then page-level
//! connection lines. Each shape is resolved through its master and style sheets, compiled, styled
//! and written as a `<g>` carrying its placement matrix: geometry paths, then the embedded image,
//! then sub-shapes, then text.

mod defs;
mod image;

pub use image::ImageFormat;

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vsdview_core::geom::{Box2D, Point, Transform, bounds, point};
use vsdview_core::{Document, InheritContext, Page, Shape, ShapeKind, resolve_shape};

use crate::Result;
use crate::color::{ColorContext, Rgb};
use crate::connect::{IndexedShape, ShapeIndex, resolve_connections};
use crate::diagnostics::{DiagnosticKind, RenderDiagnostics};
use crate::geometry::{CompiledPath, Fidelity, compile_shape, local_to_px};
use crate::style::{Paint, ShapeStyle, resolve_style};
use crate::text::{TextMeasurer, layout_text, write_text_block};
use crate::transform::{Xform, svg_matrix};
use crate::util::{escape_xml, fmt3};

use defs::Defs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvgRenderOptions {
    /// Scene pixels per drawing inch.
    pub px_per_inch: f64,
    /// Pages wider or taller than this (in pixels) are cropped to their shapes and scaled down.
    pub max_display_px: f64,
    /// Padding around the shape bounds of a cropped page, as a fraction of the bounds.
    pub viewport_padding: f64,
    /// Groups smaller than this (either side, pixels) are not clipped to their box.
    pub group_clip_min_px: f64,
    pub include_background: bool,
    pub include_connections: bool,
    /// Write bitmaps here and reference them by path instead of inline `data:` URIs.
    pub media_dir: Option<PathBuf>,
    /// Used when the theme has no `accent1` and a color cell cannot be trusted.
    pub default_accent: String,
    /// Prefix for element and `<defs>` ids; defaults to `page{n}`.
    pub diagram_id: Option<String>,
    pub font_family: String,
}

impl Default for SvgRenderOptions {
    fn default() -> Self {
        Self {
            px_per_inch: 72.0,
            max_display_px: 4096.0,
            viewport_padding: 0.05,
            group_clip_min_px: 48.0,
            include_background: true,
            include_connections: true,
            media_dir: None,
            default_accent: "#4472C4".to_string(),
            diagram_id: None,
            font_family: "Calibri, Arial, sans-serif".to_string(),
        }
    }
}

impl SvgRenderOptions {
    fn px_per_inch(&self) -> f64 {
        if self.px_per_inch.is_finite() && self.px_per_inch > 0.0 {
            self.px_per_inch
        } else {
            72.0
        }
    }
}

/// Converts an arbitrary string into a conservative SVG `id` token, so several rendered pages can
/// be inlined into one DOM without their `<defs>` ids colliding.
///
/// Unsupported characters become `-`, runs of `-` collapse, and the result always starts with an
/// ASCII letter (`vsd-` is prefixed when needed).
pub fn sanitize_svg_id(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "vsd-untitled".to_string();
    }

    let mut out = String::with_capacity(raw.len() + 4);
    for ch in raw.chars() {
        let ok = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_';
        out.push(if ok { ch } else { '-' });
    }
    if !out.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        out.insert_str(0, "vsd-");
    }
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    let out = out.trim_matches('-');
    if out.is_empty() || out == "vsd" {
        return "vsd-untitled".to_string();
    }
    out.to_string()
}

/// Where a shape is being placed.
#[derive(Clone, Copy)]
struct Placement<'p> {
    page: &'p Page,
    prefix: &'p str,
    /// Parent frame height in inches (page height for top-level shapes).
    parent_height: f64,
    /// Parent pixel frame to page pixels.
    parent_to_page: Transform,
    inherited_master: Option<u32>,
    /// Register placed shapes for connection lookup.
    indexed: bool,
}

struct Compositor<'a> {
    doc: &'a Document,
    options: &'a SvgRenderOptions,
    measurer: &'a dyn TextMeasurer,
    ppi: f64,
    colors: ColorContext<'a>,
    inherit: InheritContext<'a>,
    defs: Defs,
    index: ShapeIndex,
    bounds: Option<Box2D>,
    diagnostics: &'a mut RenderDiagnostics,
}

pub(crate) fn render_page_svg(
    doc: &Document,
    page: &Page,
    options: &SvgRenderOptions,
    measurer: &dyn TextMeasurer,
    diagnostics: &mut RenderDiagnostics,
) -> Result<String> {
    let ppi = options.px_per_inch();
    let prefix = sanitize_svg_id(
        &options
            .diagram_id
            .clone()
            .unwrap_or_else(|| format!("page{}", page.index + 1)),
    );
    let mut colors = ColorContext::new(&doc.theme, &doc.colors);
    if let Some(accent) = Rgb::parse_hex(&options.default_accent) {
        colors.default_accent = accent;
    }

    let mut c = Compositor {
        doc,
        options,
        measurer,
        ppi,
        colors,
        inherit: InheritContext {
            masters: &doc.masters,
            styles: &doc.styles,
        },
        defs: Defs::new(&prefix),
        index: ShapeIndex::new(),
        bounds: None,
        diagnostics,
    };

    let mut background = String::new();
    if options.include_background {
        let bg = page
            .background
            .filter(|&i| i != page.index)
            .and_then(|i| doc.page(i));
        if let Some(bg) = bg {
            tracing::debug!(page = page.index, background = bg.index, "composing background page");
            let bg_prefix = format!("{prefix}-bg");
            c.emit_shapes(&mut background, &bg.shapes, Placement {
                page: bg,
                prefix: &bg_prefix,
                parent_height: bg.height,
                parent_to_page: Transform::identity(),
                inherited_master: None,
                indexed: false,
            })?;
        }
    }

    let mut foreground = String::new();
    c.emit_shapes(&mut foreground, &page.shapes, Placement {
        page,
        prefix: &prefix,
        parent_height: page.height,
        parent_to_page: Transform::identity(),
        inherited_master: None,
        indexed: true,
    })?;

    let mut connections = String::new();
    if options.include_connections && !page.connects.is_empty() {
        let lines = resolve_connections(&page.connects, &c.index, c.diagnostics);
        for line in &lines {
            let _ = write!(
                connections,
                r##"<path class="connection" data-connector="{}" d="M{} {} L{} {}" fill="none" stroke="#000000" stroke-width="1"/>"##,
                line.connector,
                fmt3(line.from.x),
                fmt3(line.from.y),
                fmt3(line.to.x),
                fmt3(line.to.y)
            );
            c.extend_bounds([line.from, line.to]);
        }
    }

    let page_w = page.width.max(0.0) * ppi;
    let page_h = page.height.max(0.0) * ppi;
    let viewport = Viewport::fit(page_w, page_h, c.bounds, options);

    let mut out = String::with_capacity(background.len() + foreground.len() + connections.len() + 512);
    let _ = write!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" id="{}" width="{}" height="{}" viewBox="{} {} {} {}" data-page-index="{}" data-page-name="{}">"#,
        escape_xml(&prefix),
        fmt3(viewport.display_width),
        fmt3(viewport.display_height),
        fmt3(viewport.x),
        fmt3(viewport.y),
        fmt3(viewport.width),
        fmt3(viewport.height),
        page.index,
        escape_xml(&page.name)
    );
    c.defs.write(&mut out);
    let _ = write!(
        out,
        r##"<rect class="page-background" x="{}" y="{}" width="{}" height="{}" fill="#FFFFFF"/>"##,
        fmt3(viewport.x),
        fmt3(viewport.y),
        fmt3(viewport.width),
        fmt3(viewport.height)
    );
    if !background.is_empty() {
        out.push_str(r#"<g class="background-page">"#);
        out.push_str(&background);
        out.push_str("</g>");
    }
    out.push_str(r#"<g class="page">"#);
    out.push_str(&foreground);
    out.push_str("</g>");
    if !connections.is_empty() {
        out.push_str(r#"<g class="connections">"#);
        out.push_str(&connections);
        out.push_str("</g>");
    }
    out.push_str("</svg>\n");
    Ok(out)
}

/// The `viewBox` plus the `width`/`height` the page is displayed at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub display_width: f64,
    pub display_height: f64,
}

impl Viewport {
    pub(crate) fn fit(page_w: f64, page_h: f64, shapes: Option<Box2D>, options: &SvgRenderOptions) -> Self {
        let cap = options.max_display_px;
        let oversized = cap > 0.0 && page_w.max(page_h) > cap;
        if !oversized {
            return Self {
                x: 0.0,
                y: 0.0,
                width: page_w,
                height: page_h,
                display_width: page_w,
                display_height: page_h,
            };
        }

        let (x, y, width, height) = match shapes {
            Some(b) => {
                let pad = options.viewport_padding.max(0.0);
                let (w, h) = (b.width(), b.height());
                let (px, py) = (w * pad, h * pad);
                (b.min.x - px, b.min.y - py, (w + 2.0 * px).max(1.0), (h + 2.0 * py).max(1.0))
            }
            None => (0.0, 0.0, page_w.max(1.0), page_h.max(1.0)),
        };
        let scale = (cap / width.max(height)).min(1.0);
        tracing::debug!(page_w, page_h, width, height, scale, "oversized page cropped to shapes");
        Self {
            x,
            y,
            width,
            height,
            display_width: width * scale,
            display_height: height * scale,
        }
    }
}

/// A shape is hidden when every layer it lists exists and is invisible.
fn hidden_by_layers(shape: &Shape, page: &Page) -> bool {
    let Some(members) = shape.cells.str("LayerMember") else {
        return false;
    };
    let mut listed = false;
    for ix in members.split(';').filter_map(|p| p.trim().parse::<u32>().ok()) {
        listed = true;
        match page.layer(ix) {
            Some(layer) if !layer.visible => {}
            _ => return false,
        }
    }
    listed
}

impl Compositor<'_> {
    fn emit_shapes(&mut self, out: &mut String, shapes: &[Shape], at: Placement<'_>) -> Result<()> {
        for shape in shapes {
            self.emit_shape(out, shape, at)?;
        }
        Ok(())
    }

    fn extend_bounds<I: IntoIterator<Item = Point>>(&mut self, points: I) {
        let Some(b) = bounds(points) else {
            return;
        };
        self.bounds = Some(match self.bounds {
            Some(cur) => cur.union(&b),
            None => b,
        });
    }

    fn emit_shape(&mut self, out: &mut String, shape: &Shape, at: Placement<'_>) -> Result<()> {
        if shape.kind == ShapeKind::Guide {
            return Ok(());
        }
        let effective = resolve_shape(shape, &self.inherit, at.inherited_master);
        let s = &effective.shape;
        tracing::trace!(page = at.page.index, shape = s.id, "shape dispatched");
        if effective.used_master_fallback() {
            if let Some(id) = effective.master_id {
                self.diagnostics.push(
                    Some(s.id),
                    DiagnosticKind::MasterFallback,
                    format!("master {id} located by file name"),
                );
            }
        }
        if hidden_by_layers(s, at.page) {
            tracing::trace!(shape = s.id, "hidden by layer");
            return Ok(());
        }

        let ppi = self.ppi;
        let xf = Xform::of_shape(s);
        let to_parent = xf.to_parent_px(at.parent_height, ppi);
        let to_page = to_parent.then(&at.parent_to_page);
        let local_px = local_to_px(xf.height, ppi);
        let style = resolve_style(s, &self.colors, ppi, self.diagnostics);
        let paths = compile_shape(s, effective.master_dims);
        self.report_paths(s.id, &paths);

        let _ = write!(
            out,
            r#"<g id="{}-shape-{}" class="shape" data-shape-id="{}""#,
            escape_xml(at.prefix),
            s.id,
            s.id
        );
        if let Some(name) = s.display_name() {
            let _ = write!(out, r#" data-name="{}""#, escape_xml(name));
        }
        if let Some(m) = svg_matrix(&to_parent) {
            let _ = write!(out, r#" transform="{m}""#);
        }
        if style.shadow {
            let _ = write!(out, r#" filter="url(#{})""#, self.defs.shadow_filter());
        }
        out.push('>');

        let one_d = s.is_one_dimensional();
        let mut drew = false;
        for path in paths.iter().filter(|p| !p.is_empty()) {
            let d = path.to_svg_data(&local_px);
            self.write_path(out, &d, path.is_closed() && !one_d && !path.no_fill, path.no_line, &style);
            let to_scene = local_px.then(&to_page);
            self.extend_bounds(path.points().map(|p| to_scene.transform_point(p)));
            drew = true;
        }
        if one_d && !drew {
            drew = self.write_endpoint_line(out, s, &to_parent, &to_page, at.parent_height, &style);
        }

        let (w_px, h_px) = (xf.width * ppi, xf.height * ppi);
        if s.foreign_data.is_some() {
            image::write_foreign_image(
                out,
                s,
                &self.doc.media,
                self.options.media_dir.as_deref(),
                at.prefix,
                ppi,
                self.diagnostics,
            )?;
        }
        if !one_d && w_px > 0.0 && h_px > 0.0 {
            self.extend_bounds(
                [point(0.0, 0.0), point(w_px, 0.0), point(w_px, h_px), point(0.0, h_px)]
                    .into_iter()
                    .map(|p| to_page.transform_point(p)),
            );
        }

        if !s.sub_shapes.is_empty() {
            let min = self.options.group_clip_min_px;
            let clip = (w_px >= min && h_px >= min).then(|| self.defs.clip_rect(w_px, h_px));
            match &clip {
                Some(id) => {
                    let _ = write!(out, r#"<g class="group" clip-path="url(#{id})">"#);
                }
                None => out.push_str(r#"<g class="group">"#),
            }
            self.emit_shapes(out, &s.sub_shapes, Placement {
                parent_height: xf.height,
                parent_to_page: to_page,
                inherited_master: effective.master_id,
                ..at
            })?;
            out.push_str("</g>");
        }

        if let Some(block) = layout_text(s, &self.colors, ppi, self.measurer, self.diagnostics) {
            write_text_block(out, &block, &self.options.font_family);
        }
        out.push_str("</g>");

        if at.indexed {
            self.index
                .insert(IndexedShape::new(s, local_px.then(&to_page), one_d && drew));
        }
        Ok(())
    }

    fn report_paths(&mut self, shape: u32, paths: &[CompiledPath]) {
        for path in paths {
            for row in &path.skipped {
                self.diagnostics.push(
                    Some(shape),
                    DiagnosticKind::UnsupportedGeometryOp,
                    format!(
                        "geometry section {} row {}: `{}` skipped",
                        path.section, row.ix, row.kind
                    ),
                );
            }
            if let Fidelity::Approximated { reasons } = &path.fidelity {
                self.diagnostics.push(
                    Some(shape),
                    DiagnosticKind::ApproximatedGeometry,
                    format!("geometry section {}: {}", path.section, reasons.join("; ")),
                );
            }
        }
    }

    fn write_path(&mut self, out: &mut String, d: &str, filled: bool, no_line: bool, style: &ShapeStyle) {
        let _ = write!(out, r#"<path d="{d}""#);

        match &style.fill.paint {
            Paint::Solid(rgb) if filled => {
                let _ = write!(out, r#" fill="{rgb}""#);
            }
            Paint::Gradient(gradient) if filled => {
                let id = self.defs.gradient(gradient);
                let _ = write!(out, r#" fill="url(#{id})""#);
            }
            _ => out.push_str(r#" fill="none""#),
        }
        if filled && style.fill.opacity < 1.0 {
            let _ = write!(out, r#" fill-opacity="{}""#, fmt3(style.fill.opacity));
        }

        let line = &style.line;
        if no_line || !line.visible {
            out.push_str(r#" stroke="none"/>"#);
            return;
        }
        let _ = write!(
            out,
            r#" stroke="{}" stroke-width="{}" stroke-linecap="{}""#,
            line.color,
            fmt3(line.width),
            line.cap.as_svg()
        );
        if let Some(dash) = &line.dash {
            let parts: Vec<String> = dash.iter().map(|v| fmt3(*v)).collect();
            let _ = write!(out, r#" stroke-dasharray="{}""#, parts.join(" "));
        }
        if line.opacity < 1.0 {
            let _ = write!(out, r#" stroke-opacity="{}""#, fmt3(line.opacity));
        }
        if !filled {
            if let Some(arrow) = &style.begin_arrow {
                let _ = write!(out, r#" marker-start="url(#{})""#, self.defs.marker(arrow));
            }
            if let Some(arrow) = &style.end_arrow {
                let _ = write!(out, r#" marker-end="url(#{})""#, self.defs.marker(arrow));
            }
        }
        out.push_str("/>");
    }

    /// Straight begin-to-end line for a one-dimensional shape without geometry. Begin/end are in
    /// the parent frame, so they are mapped back into the shape's own pixel frame.
    fn write_endpoint_line(
        &mut self,
        out: &mut String,
        shape: &Shape,
        to_parent: &Transform,
        to_page: &Transform,
        parent_height: f64,
        style: &ShapeStyle,
    ) -> bool {
        let cells = &shape.cells;
        let (Some(bx), Some(ex)) = (cells.f64("BeginX"), cells.f64("EndX")) else {
            return false;
        };
        let (by, ey) = (cells.f64_or("BeginY", 0.0), cells.f64_or("EndY", 0.0));
        let Some(from_parent) = to_parent.inverse() else {
            return false;
        };
        let ppi = self.ppi;
        let in_parent = [
            point(bx * ppi, (parent_height - by) * ppi),
            point(ex * ppi, (parent_height - ey) * ppi),
        ];
        let [a, b] = in_parent.map(|p| from_parent.transform_point(p));
        let d = format!("M{} {} L{} {}", fmt3(a.x), fmt3(a.y), fmt3(b.x), fmt3(b.y));
        self.write_path(out, &d, false, false, style);
        self.extend_bounds([a, b].map(|p| to_page.transform_point(p)));
        true
    }
}
