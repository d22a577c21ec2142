//! Shape text: field substitution, character/paragraph formatting, block placement and wrapping.

use std::fmt::Write as _;

use unicode_width::UnicodeWidthChar;
use vsdview_core::Shape;
use vsdview_core::geom::Transform;
use vsdview_core::model::{Row, row_by_ix};

use crate::color::{ColorContext, ColorRole, Rgb, resolve_color};
use crate::diagnostics::{DiagnosticKind, RenderDiagnostics};
use crate::transform::{Xform, svg_matrix};
use crate::util::{escape_xml, escape_xml_into, fmt3};

/// 12pt, in inches.
const DEFAULT_CHAR_SIZE_IN: f64 = 1.0 / 6.0;
/// 4pt, in inches.
const DEFAULT_MARGIN_IN: f64 = 4.0 / 72.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_family: Option<String>,
    /// Pixels.
    pub font_size: f64,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: Rgb,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: None,
            font_size: 12.0,
            bold: false,
            italic: false,
            underline: false,
            color: Rgb::BLACK,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
    pub line_count: usize,
}

pub trait TextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics;
}

/// Font-free estimate: East Asian wide characters count double.
#[derive(Debug, Clone, Default)]
pub struct DeterministicTextMeasurer {
    pub char_width_factor: f64,
    pub line_height_factor: f64,
}

impl DeterministicTextMeasurer {
    fn factors(&self) -> (f64, f64) {
        let char_width_factor = if self.char_width_factor == 0.0 {
            0.6
        } else {
            self.char_width_factor
        };
        let line_height_factor = if self.line_height_factor == 0.0 {
            1.2
        } else {
            self.line_height_factor
        };
        (char_width_factor, line_height_factor)
    }
}

impl TextMeasurer for DeterministicTextMeasurer {
    fn measure(&self, text: &str, style: &TextStyle) -> TextMetrics {
        let (char_width_factor, line_height_factor) = self.factors();
        let font_size = style.font_size.max(1.0);
        let lines: Vec<&str> = text.split('\n').collect();
        let max_columns = lines
            .iter()
            .map(|line| line.chars().map(|c| c.width().unwrap_or(0)).sum::<usize>())
            .max()
            .unwrap_or(0);
        let bold = if style.bold { 1.05 } else { 1.0 };

        TextMetrics {
            width: max_columns as f64 * font_size * char_width_factor * bold,
            height: lines.len() as f64 * font_size * line_height_factor,
            line_count: lines.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

impl HorizontalAlign {
    fn from_code(code: Option<f64>) -> Self {
        match code.map(|c| c as i64) {
            Some(0 | 3) => Self::Left,
            Some(2) => Self::Right,
            _ => Self::Center,
        }
    }

    fn anchor(self) -> &'static str {
        match self {
            Self::Left => "start",
            Self::Center => "middle",
            Self::Right => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Middle,
    Bottom,
}

impl VerticalAlign {
    fn from_code(code: Option<f64>) -> Self {
        match code.map(|c| c as i64) {
            Some(0) => Self::Top,
            Some(2) => Self::Bottom,
            _ => Self::Middle,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub style: TextStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub runs: Vec<TextRun>,
    pub align: HorizontalAlign,
    pub width: f64,
    pub height: f64,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Laid-out text of one shape, in the text block's own pixel frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
    pub width: f64,
    pub height: f64,
    pub margins: [f64; 4],
    pub valign: VerticalAlign,
    /// Text block frame to the shape's pixel frame.
    pub transform: Transform,
}

/// Shape text with `<fld>` runs replaced by their field values.
pub fn shape_text(shape: &Shape) -> Option<String> {
    let text = shape.text.as_ref()?;
    Some(
        text.segments
            .iter()
            .map(|seg| field_value(shape, seg.field_ix).unwrap_or(&seg.text))
            .collect(),
    )
}

fn field_value(shape: &Shape, field_ix: Option<u32>) -> Option<&str> {
    row_by_ix(&shape.fields, field_ix?)?.cells.str("Value")
}

/// Resolves and wraps the text of an effective shape; `None` when there is nothing to draw.
pub fn layout_text(
    shape: &Shape,
    colors: &ColorContext<'_>,
    px_per_inch: f64,
    measurer: &dyn TextMeasurer,
    diagnostics: &mut RenderDiagnostics,
) -> Option<TextBlock> {
    if shape.cells.bool("HideText") {
        return None;
    }
    let text = shape.text.as_ref()?;
    if text.is_blank() {
        return None;
    }

    let cells = &shape.cells;
    let (w, h) = (shape.width(), shape.height());
    let block_w = cells.f64("TxtWidth").unwrap_or(w);
    let block_h = cells.f64("TxtHeight").unwrap_or(h);
    let xform = Xform {
        pin_x: cells.f64_or("TxtPinX", w / 2.0),
        pin_y: cells.f64_or("TxtPinY", h / 2.0),
        width: block_w,
        height: block_h,
        loc_pin_x: cells.f64_or("TxtLocPinX", block_w / 2.0),
        loc_pin_y: cells.f64_or("TxtLocPinY", block_h / 2.0),
        angle: cells.f64_or("TxtAngle", 0.0),
        flip_x: false,
        flip_y: false,
    };
    let margin = |name: &str| cells.f64_or(name, DEFAULT_MARGIN_IN).max(0.0) * px_per_inch;
    let margins = [
        margin("TopMargin"),
        margin("RightMargin"),
        margin("BottomMargin"),
        margin("LeftMargin"),
    ];
    let width = block_w.max(0.0) * px_per_inch;
    let height = block_h.max(0.0) * px_per_inch;
    let wrap_width = (width - margins[1] - margins[3]).max(0.0);

    let mut styles = StyleCache::default();
    let mut paragraphs: Vec<(HorizontalAlign, Vec<TextRun>)> = vec![(HorizontalAlign::Center, Vec::new())];
    let mut para_started = false;
    for seg in &text.segments {
        let content = field_value(shape, seg.field_ix).unwrap_or(&seg.text);
        let style = styles.get(shape, seg.char_ix, colors, px_per_inch, diagnostics);
        let align = HorizontalAlign::from_code(
            row_for(&shape.para_formats, seg.para_ix).and_then(|r| r.f64("HorzAlign")),
        );

        for (i, piece) in content.split(['\n', '\u{2028}', '\u{2029}']).enumerate() {
            let piece = piece.trim_end_matches('\r');
            if i > 0 {
                paragraphs.push((align, Vec::new()));
                para_started = false;
            }
            if !para_started {
                if let Some(last) = paragraphs.last_mut() {
                    last.0 = align;
                }
                para_started = true;
            }
            if !piece.is_empty() {
                if let Some(last) = paragraphs.last_mut() {
                    last.1.push(TextRun {
                        text: piece.to_string(),
                        style: style.clone(),
                    });
                }
            }
        }
    }
    if paragraphs.last().is_some_and(|(_, runs)| runs.is_empty()) && paragraphs.len() > 1 {
        paragraphs.pop();
    }

    let mut lines = Vec::new();
    for (align, runs) in paragraphs {
        wrap_paragraph(&runs, align, wrap_width, measurer, &mut lines);
    }

    Some(TextBlock {
        lines,
        width,
        height,
        margins,
        valign: VerticalAlign::from_code(cells.f64("VerticalAlign")),
        transform: xform.to_parent_px(h, px_per_inch),
    })
}

/// The row with index `ix`, else row 0.
fn row_for(rows: &[Row], ix: u32) -> Option<&Row> {
    row_by_ix(rows, ix).or_else(|| row_by_ix(rows, 0))
}

#[derive(Default)]
struct StyleCache {
    resolved: Vec<(u32, TextStyle)>,
}

impl StyleCache {
    fn get(
        &mut self,
        shape: &Shape,
        char_ix: u32,
        colors: &ColorContext<'_>,
        px_per_inch: f64,
        diagnostics: &mut RenderDiagnostics,
    ) -> TextStyle {
        if let Some((_, style)) = self.resolved.iter().find(|(ix, _)| *ix == char_ix) {
            return style.clone();
        }
        let style = char_style(shape, row_for(&shape.char_formats, char_ix), colors, px_per_inch, diagnostics);
        self.resolved.push((char_ix, style.clone()));
        style
    }
}

fn char_style(
    shape: &Shape,
    row: Option<&Row>,
    colors: &ColorContext<'_>,
    px_per_inch: f64,
    diagnostics: &mut RenderDiagnostics,
) -> TextStyle {
    let Some(row) = row else {
        return TextStyle {
            font_size: DEFAULT_CHAR_SIZE_IN * px_per_inch,
            ..TextStyle::default()
        };
    };
    let bits = row.f64("Style").unwrap_or(0.0).max(0.0) as u32;
    let color = match row.cells.get("Color") {
        Some(cell) if cell.has_value() || cell.formula.is_some() => {
            match resolve_color(cell, ColorRole::Text, colors) {
                Ok(rgb) => rgb,
                Err(err) => {
                    diagnostics.push(Some(shape.id), DiagnosticKind::ColorFallback, format!("text color: {err}"));
                    Rgb::BLACK
                }
            }
        }
        _ => Rgb::BLACK,
    };
    let font_family = row
        .cells
        .str("Font")
        .filter(|f| f.parse::<f64>().is_err() && !f.eq_ignore_ascii_case("Themed"))
        .map(str::to_string);

    TextStyle {
        font_family,
        font_size: row
            .f64("Size")
            .filter(|s| *s > 0.0)
            .unwrap_or(DEFAULT_CHAR_SIZE_IN)
            * px_per_inch,
        bold: bits & 1 != 0,
        italic: bits & 2 != 0,
        underline: bits & 4 != 0,
        color,
    }
}

/// Greedy word wrap; a word wider than the block gets a line of its own.
fn wrap_paragraph(
    runs: &[TextRun],
    align: HorizontalAlign,
    max_width: f64,
    measurer: &dyn TextMeasurer,
    out: &mut Vec<TextLine>,
) {
    let default_height = runs
        .first()
        .map(|r| measurer.measure("", &r.style).height)
        .unwrap_or_else(|| measurer.measure("", &TextStyle::default()).height);
    let mut line = TextLine {
        runs: Vec::new(),
        align,
        width: 0.0,
        height: 0.0,
    };

    for run in runs {
        for token in tokens(&run.text) {
            let m = measurer.measure(token, &run.style);
            let is_space = token.chars().all(char::is_whitespace);
            if !is_space && line.width > 0.0 && max_width > 0.0 && line.width + m.width > max_width {
                trim_trailing_space(&mut line, measurer);
                out.push(std::mem::replace(
                    &mut line,
                    TextLine {
                        runs: Vec::new(),
                        align,
                        width: 0.0,
                        height: 0.0,
                    },
                ));
            }
            if is_space && line.runs.is_empty() {
                continue;
            }
            push_token(&mut line, token, &run.style);
            line.width += m.width;
            line.height = line.height.max(m.height);
        }
    }
    trim_trailing_space(&mut line, measurer);
    if line.height == 0.0 {
        line.height = default_height;
    }
    out.push(line);
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let space = first.is_whitespace();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace() != space)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (token, tail) = rest.split_at(end);
        rest = tail;
        Some(token)
    })
}

fn push_token(line: &mut TextLine, token: &str, style: &TextStyle) {
    match line.runs.last_mut() {
        Some(last) if last.style == *style => last.text.push_str(token),
        _ => line.runs.push(TextRun {
            text: token.to_string(),
            style: style.clone(),
        }),
    }
}

fn trim_trailing_space(line: &mut TextLine, measurer: &dyn TextMeasurer) {
    while let Some(last) = line.runs.last_mut() {
        let trimmed_len = last.text.trim_end().len();
        if trimmed_len == last.text.len() {
            break;
        }
        let removed = measurer.measure(&last.text[trimmed_len..], &last.style).width;
        last.text.truncate(trimmed_len);
        line.width = (line.width - removed).max(0.0);
        if last.text.is_empty() {
            line.runs.pop();
        } else {
            break;
        }
    }
}

/// Writes `block` as one `<text>` element with a `<tspan>` per line.
pub fn write_text_block(out: &mut String, block: &TextBlock, default_family: &str) {
    let [top, right, bottom, left] = block.margins;
    let total: f64 = block.lines.iter().map(|l| l.height).sum();
    let mut y = match block.valign {
        VerticalAlign::Top => top,
        VerticalAlign::Middle => (block.height - total) / 2.0,
        VerticalAlign::Bottom => block.height - bottom - total,
    };

    out.push_str(r#"<text class="shape-text""#);
    if let Some(m) = svg_matrix(&block.transform) {
        let _ = write!(out, r#" transform="{m}""#);
    }
    let _ = write!(out, r#" font-family="{}">"#, escape_xml(default_family));

    for line in &block.lines {
        let x = match line.align {
            HorizontalAlign::Left => left,
            HorizontalAlign::Center => block.width / 2.0,
            HorizontalAlign::Right => block.width - right,
        };
        let font_size = line
            .runs
            .iter()
            .map(|r| r.style.font_size)
            .fold(0.0_f64, f64::max);
        let baseline = y + (line.height + font_size * 0.7) / 2.0;
        let _ = write!(
            out,
            r#"<tspan x="{}" y="{}" text-anchor="{}">"#,
            fmt3(x),
            fmt3(baseline),
            line.align.anchor()
        );
        for run in &line.runs {
            write_run(out, run);
        }
        out.push_str("</tspan>");
        y += line.height;
    }
    out.push_str("</text>");
}

fn write_run(out: &mut String, run: &TextRun) {
    let style = &run.style;
    let _ = write!(
        out,
        r#"<tspan font-size="{}" fill="{}""#,
        fmt3(style.font_size),
        style.color
    );
    if let Some(family) = &style.font_family {
        let _ = write!(out, r#" font-family="{}""#, escape_xml(family));
    }
    if style.bold {
        out.push_str(r#" font-weight="bold""#);
    }
    if style.italic {
        out.push_str(r#" font-style="italic""#);
    }
    if style.underline {
        out.push_str(r#" text-decoration="underline""#);
    }
    out.push('>');
    escape_xml_into(out, &run.text);
    out.push_str("</tspan>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsdview_core::Theme;
    use vsdview_core::model::{Cell, CellMap, ShapeText, TextSegment};

    fn cells(pairs: &[(&str, &str)]) -> CellMap {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), Cell::from_value(*v)))
            .collect()
    }

    fn seg(text: &str, char_ix: u32, para_ix: u32, field_ix: Option<u32>) -> TextSegment {
        TextSegment {
            text: text.to_string(),
            char_ix,
            para_ix,
            field_ix,
        }
    }

    fn text_shape(segments: Vec<TextSegment>) -> Shape {
        Shape {
            id: 7,
            cells: cells(&[("Width", "2"), ("Height", "1")]),
            text: Some(ShapeText { segments }),
            ..Default::default()
        }
    }

    fn layout(shape: &Shape) -> Option<TextBlock> {
        let theme = Theme::default();
        let colors = ColorContext::new(&theme, &[]);
        let mut diags = RenderDiagnostics::new(0);
        layout_text(shape, &colors, 72.0, &DeterministicTextMeasurer::default(), &mut diags)
    }

    #[test]
    fn fields_are_substituted() {
        let mut shape = text_shape(vec![seg("Total: ", 0, 0, None), seg("{x}", 0, 0, Some(0))]);
        shape.fields = vec![Row {
            ix: 0,
            cells: cells(&[("Value", "42")]),
            ..Default::default()
        }];
        assert_eq!(shape_text(&shape).as_deref(), Some("Total: 42"));
        let block = layout(&shape).unwrap();
        assert_eq!(block.lines[0].text(), "Total: 42");
    }

    #[test]
    fn char_and_para_rows_drive_formatting() {
        let mut shape = text_shape(vec![seg("Plain ", 0, 0, None), seg("Bold", 1, 0, None)]);
        shape.char_formats = vec![
            Row {
                ix: 0,
                cells: cells(&[("Size", "0.1666667")]),
                ..Default::default()
            },
            Row {
                ix: 1,
                cells: cells(&[("Size", "0.25"), ("Style", "5"), ("Color", "#FF0000"), ("Font", "Arial")]),
                ..Default::default()
            },
        ];
        shape.para_formats = vec![Row {
            ix: 0,
            cells: cells(&[("HorzAlign", "2")]),
            ..Default::default()
        }];
        let block = layout(&shape).unwrap();
        let line = &block.lines[0];
        assert_eq!(line.align, HorizontalAlign::Right);
        assert_eq!(line.runs.len(), 2);
        let bold = &line.runs[1].style;
        assert!(bold.bold && bold.underline && !bold.italic);
        assert_eq!(bold.font_size, 18.0);
        assert_eq!(bold.color, Rgb::new(255, 0, 0));
        assert_eq!(bold.font_family.as_deref(), Some("Arial"));
    }

    #[test]
    fn long_text_wraps_within_the_block() {
        let shape = text_shape(vec![seg("alpha beta gamma delta epsilon zeta", 0, 0, None)]);
        let block = layout(&shape).unwrap();
        assert!(block.lines.len() > 1);
        let wrap = block.width - block.margins[1] - block.margins[3];
        for line in &block.lines {
            assert!(line.width <= wrap + 1e-9, "{} > {wrap}", line.width);
            assert!(!line.text().ends_with(' '));
        }
    }

    #[test]
    fn explicit_breaks_start_new_paragraphs() {
        let shape = text_shape(vec![seg("one\ntwo\n", 0, 0, None)]);
        let block = layout(&shape).unwrap();
        let texts: Vec<String> = block.lines.iter().map(TextLine::text).collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[test]
    fn hidden_or_blank_text_is_skipped() {
        let mut shape = text_shape(vec![seg("visible", 0, 0, None)]);
        shape.cells.insert("HideText", Cell::from_value("1"));
        assert!(layout(&shape).is_none());
        assert!(layout(&text_shape(vec![seg("  ", 0, 0, None)])).is_none());
    }

    #[test]
    fn written_text_escapes_and_anchors() {
        let shape = text_shape(vec![seg("a < b", 0, 0, None)]);
        let block = layout(&shape).unwrap();
        let mut out = String::new();
        write_text_block(&mut out, &block, "Calibri, sans-serif");
        assert!(out.starts_with(r#"<text class="shape-text""#));
        assert!(out.contains("a &lt; b"));
        assert!(out.contains(r#"text-anchor="middle""#));
        assert!(out.contains(r##"fill="#000000""##));
    }

    #[test]
    fn wide_characters_measure_double() {
        let m = DeterministicTextMeasurer::default();
        let style = TextStyle::default();
        let narrow = m.measure("ab", &style).width;
        let wide = m.measure("日本", &style).width;
        assert!((wide - 2.0 * narrow).abs() < 1e-9);
    }
}
