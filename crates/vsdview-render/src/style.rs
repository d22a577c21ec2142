//! Fill, line, arrow and shadow resolution for one effective shape.

use vsdview_core::Shape;
use vsdview_core::model::Row;

use crate::color::{ColorContext, ColorRole, Rgb, opacity, resolve_color};
use crate::diagnostics::{DiagnosticKind, RenderDiagnostics};

/// Visio's default line weight (0.75pt), in inches.
const DEFAULT_LINE_WEIGHT_IN: f64 = 0.0104;

/// Approximate direction (degrees, counter-clockwise from +x) of the legacy gradient patterns
/// 25..=40. Radial and rectangular variants are drawn as linear ones.
const LEGACY_GRADIENT_ANGLES: [f64; 16] = [
    0.0, 0.0, 180.0, 270.0, 270.0, 90.0, 315.0, 45.0, 135.0, 225.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Dash/gap lengths, in multiples of the stroke width, for line patterns 2..=23.
const DASH_PATTERNS: [&[f64]; 22] = [
    &[4.0, 3.0],
    &[1.0, 3.0],
    &[4.0, 3.0, 1.0, 3.0],
    &[4.0, 3.0, 1.0, 3.0, 1.0, 3.0],
    &[8.0, 3.0, 4.0, 3.0],
    &[8.0, 3.0, 1.0, 3.0, 1.0, 3.0],
    &[8.0, 3.0],
    &[1.0, 1.0],
    &[2.0, 1.0],
    &[2.0, 1.0, 1.0, 1.0],
    &[2.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    &[4.0, 1.0, 2.0, 1.0],
    &[4.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    &[4.0, 1.0],
    &[6.0, 3.0],
    &[1.0, 6.0],
    &[6.0, 3.0, 1.0, 3.0],
    &[6.0, 3.0, 1.0, 3.0, 1.0, 3.0],
    &[12.0, 6.0, 6.0, 6.0],
    &[12.0, 6.0, 1.0, 6.0, 1.0, 6.0],
    &[12.0, 6.0],
    &[1.0, 2.0],
];

/// Arrow size index 0..=6 (very small .. colossal).
const ARROW_SIZE_FACTORS: [f64; 7] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 3.0];

#[derive(Debug, Clone, PartialEq)]
pub struct GradientStop {
    /// 0..=1.
    pub offset: f64,
    pub color: Rgb,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    /// Degrees, counter-clockwise from +x.
    pub angle: f64,
    pub stops: Vec<GradientStop>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    None,
    Solid(Rgb),
    Gradient(LinearGradient),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillStyle {
    pub paint: Paint,
    pub opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Round,
    Square,
    Butt,
}

impl LineCap {
    pub fn as_svg(self) -> &'static str {
        match self {
            Self::Round => "round",
            Self::Square => "square",
            Self::Butt => "butt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineStyle {
    pub visible: bool,
    pub color: Rgb,
    /// Stroke width in pixels.
    pub width: f64,
    /// Dash array in pixels; `None` is a solid line.
    pub dash: Option<Vec<f64>>,
    pub cap: LineCap,
    pub opacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrowKind {
    Filled,
    Open,
    Circle,
    Diamond,
}

impl ArrowKind {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => None,
            1..=3 => Some(Self::Open),
            10 | 20 | 21 => Some(Self::Circle),
            13..=15 => Some(Self::Diamond),
            _ => Some(Self::Filled),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filled => "filled",
            Self::Open => "open",
            Self::Circle => "circle",
            Self::Diamond => "diamond",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowStyle {
    pub kind: ArrowKind,
    /// Marker edge length in pixels.
    pub size: f64,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeStyle {
    pub fill: FillStyle,
    pub line: LineStyle,
    pub begin_arrow: Option<ArrowStyle>,
    pub end_arrow: Option<ArrowStyle>,
    pub shadow: bool,
}

/// Resolves every paint-related cell of `shape`; color failures fall back to policy defaults and
/// are recorded as [`DiagnosticKind::ColorFallback`].
pub fn resolve_style(
    shape: &Shape,
    colors: &ColorContext<'_>,
    px_per_inch: f64,
    diagnostics: &mut RenderDiagnostics,
) -> ShapeStyle {
    let mut resolver = Resolver {
        shape,
        colors,
        diagnostics,
    };
    let line = resolver.line(px_per_inch);
    let begin_arrow = resolver.arrow("BeginArrow", "BeginArrowSize", &line);
    let end_arrow = resolver.arrow("EndArrow", "EndArrowSize", &line);
    let fill = resolver.fill();
    let shadow = shape.cells.f64("ShdwPattern").is_some_and(|p| p > 0.0);

    ShapeStyle {
        fill,
        line,
        begin_arrow,
        end_arrow,
        shadow,
    }
}

struct Resolver<'s, 'c, 'd> {
    shape: &'s Shape,
    colors: &'s ColorContext<'c>,
    diagnostics: &'d mut RenderDiagnostics,
}

impl Resolver<'_, '_, '_> {
    /// `None` when the cell is absent or blank; failures are reported and also yield `None`.
    fn color(&mut self, name: &str, role: ColorRole) -> Option<Rgb> {
        let shape = self.shape;
        let cell = shape.cells.get(name)?;
        if !cell.has_value() && cell.formula.is_none() {
            return None;
        }
        match resolve_color(cell, role, self.colors) {
            Ok(rgb) => Some(rgb),
            Err(err) => {
                self.diagnostics.push(
                    Some(shape.id),
                    DiagnosticKind::ColorFallback,
                    format!("{name}: {err}"),
                );
                None
            }
        }
    }

    fn quick_style(&self, name: &str) -> Option<Rgb> {
        self.colors.quick_style(self.shape.cells.f64(name)?)
    }

    fn fill(&mut self) -> FillStyle {
        let shape = self.shape;
        let cells = &shape.cells;
        let pattern = cells.f64("FillPattern").unwrap_or(1.0).max(0.0) as u32;
        let opacity = opacity(cells.get("FillForegndTrans"));
        let fg = self
            .color("FillForegnd", ColorRole::Fill)
            .or_else(|| self.quick_style("QuickStyleFillColor"));

        if pattern == 0 {
            return FillStyle {
                paint: Paint::None,
                opacity,
            };
        }

        if cells.bool("FillGradientEnabled") && !shape.fill_gradient.is_empty() {
            let angle = cells
                .f64("FillGradientAngle")
                .map(f64::to_degrees)
                .unwrap_or(0.0);
            let stops = self.gradient_stops(&shape.fill_gradient);
            if stops.len() >= 2 {
                return FillStyle {
                    paint: Paint::Gradient(LinearGradient { angle, stops }),
                    opacity,
                };
            }
        }

        let fg = fg.unwrap_or(Rgb::WHITE);
        let paint = match pattern {
            1 => Paint::Solid(fg),
            25..=40 => {
                let bg = self.color("FillBkgnd", ColorRole::Fill).unwrap_or(Rgb::WHITE);
                let bg_opacity = crate::color::opacity(cells.get("FillBkgndTrans"));
                Paint::Gradient(LinearGradient {
                    angle: LEGACY_GRADIENT_ANGLES[(pattern - 25) as usize],
                    stops: vec![
                        GradientStop {
                            offset: 0.0,
                            color: fg,
                            opacity,
                        },
                        GradientStop {
                            offset: 1.0,
                            color: bg,
                            opacity: bg_opacity,
                        },
                    ],
                })
            }
            2..=24 => {
                tracing::debug!(shape = shape.id, pattern, "textured fill approximated");
                if cells.get("FillForegnd").is_some_and(|c| c.has_value()) {
                    Paint::Solid(fg.lighten(0.35))
                } else {
                    Paint::Solid(self.color("FillBkgnd", ColorRole::Fill).unwrap_or(fg))
                }
            }
            _ => Paint::Solid(fg),
        };
        FillStyle { paint, opacity }
    }

    fn gradient_stops(&mut self, rows: &[Row]) -> Vec<GradientStop> {
        let mut stops: Vec<GradientStop> = rows
            .iter()
            .filter(|r| !r.deleted)
            .filter_map(|row| {
                let cell = row.cells.get("GradientStopColor")?;
                let color = match resolve_color(cell, ColorRole::Fill, self.colors) {
                    Ok(rgb) => rgb,
                    Err(err) => {
                        self.diagnostics.push(
                            Some(self.shape.id),
                            DiagnosticKind::ColorFallback,
                            format!("gradient stop {}: {err}", row.ix),
                        );
                        return None;
                    }
                };
                let position = row.f64("GradientStopPosition").unwrap_or(0.0);
                let offset = if position > 1.0 { position / 100.0 } else { position };
                Some(GradientStop {
                    offset: offset.clamp(0.0, 1.0),
                    color,
                    opacity: opacity(row.cells.get("GradientStopColorTrans")),
                })
            })
            .collect();
        stops.sort_by(|a, b| a.offset.total_cmp(&b.offset));
        stops
    }

    fn line(&mut self, px_per_inch: f64) -> LineStyle {
        let shape = self.shape;
        let cells = &shape.cells;
        let pattern = cells.f64("LinePattern").unwrap_or(1.0).max(0.0) as u32;
        let width = cells
            .f64("LineWeight")
            .filter(|w| *w >= 0.0)
            .unwrap_or(DEFAULT_LINE_WEIGHT_IN)
            * px_per_inch;
        let width = width.max(0.25);
        let color = self
            .color("LineColor", ColorRole::Line)
            .or_else(|| self.quick_style("QuickStyleLineColor"))
            .unwrap_or(Rgb::BLACK);
        let cap = match cells.f64("LineCap").unwrap_or(0.0) as u32 {
            1 => LineCap::Square,
            2 => LineCap::Butt,
            _ => LineCap::Round,
        };

        let dash = match pattern {
            2..=23 => {
                let unit = width.max(1.0);
                Some(
                    DASH_PATTERNS[(pattern - 2) as usize]
                        .iter()
                        .map(|v| v * unit)
                        .collect(),
                )
            }
            _ => None,
        };

        LineStyle {
            visible: pattern != 0,
            color,
            width,
            dash,
            cap,
            opacity: opacity(cells.get("LineColorTrans")),
        }
    }

    fn arrow(&mut self, code_cell: &str, size_cell: &str, line: &LineStyle) -> Option<ArrowStyle> {
        let code = self.shape.cells.f64(code_cell)?.max(0.0) as u32;
        let kind = ArrowKind::from_code(code)?;
        let size_ix = self
            .shape
            .cells
            .f64(size_cell)
            .unwrap_or(2.0)
            .clamp(0.0, 6.0) as usize;
        Some(ArrowStyle {
            kind,
            size: (6.0 + 2.0 * line.width) * ARROW_SIZE_FACTORS[size_ix],
            color: line.color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsdview_core::Theme;
    use vsdview_core::model::{Cell, CellMap};

    fn shape(pairs: &[(&str, &str)]) -> Shape {
        Shape {
            id: 1,
            cells: pairs
                .iter()
                .map(|(n, v)| (n.to_string(), Cell::from_value(*v)))
                .collect::<CellMap>(),
            ..Default::default()
        }
    }

    fn style(s: &Shape) -> (ShapeStyle, RenderDiagnostics) {
        let theme = Theme::default();
        let ctx = ColorContext::new(&theme, &[]);
        let mut diags = RenderDiagnostics::new(0);
        (resolve_style(s, &ctx, 72.0, &mut diags), diags)
    }

    #[test]
    fn defaults_are_white_fill_black_line() {
        let (st, _) = style(&shape(&[]));
        assert_eq!(st.fill.paint, Paint::Solid(Rgb::WHITE));
        assert_eq!(st.line.color, Rgb::BLACK);
        assert!(st.line.visible);
        assert!(st.line.dash.is_none());
        assert!(!st.shadow);
        assert!(st.begin_arrow.is_none());
    }

    #[test]
    fn fill_pattern_codes() {
        let (st, _) = style(&shape(&[("FillPattern", "0")]));
        assert_eq!(st.fill.paint, Paint::None);

        let (st, _) = style(&shape(&[
            ("FillPattern", "28"),
            ("FillForegnd", "#FF0000"),
            ("FillBkgnd", "#0000FF"),
        ]));
        let Paint::Gradient(g) = st.fill.paint else {
            panic!("expected gradient");
        };
        assert_eq!(g.angle, 270.0);
        assert_eq!(g.stops[0].color, Rgb::new(255, 0, 0));
        assert_eq!(g.stops[1].color, Rgb::new(0, 0, 255));

        let (st, _) = style(&shape(&[("FillPattern", "5"), ("FillForegnd", "#000000")]));
        assert_eq!(st.fill.paint, Paint::Solid(Rgb::BLACK.lighten(0.35)));
    }

    #[test]
    fn modern_gradient_rows_take_precedence() {
        let mut s = shape(&[
            ("FillPattern", "1"),
            ("FillForegnd", "#FF0000"),
            ("FillGradientEnabled", "1"),
            ("FillGradientAngle", "1.5707963267949"),
        ]);
        let stop = |ix: u32, color: &str, pos: &str| Row {
            ix,
            cells: [
                ("GradientStopColor".to_string(), Cell::from_value(color)),
                ("GradientStopPosition".to_string(), Cell::from_value(pos)),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        s.fill_gradient = vec![stop(1, "#FFFFFF", "1"), stop(0, "#00FF00", "0")];
        let (st, _) = style(&s);
        let Paint::Gradient(g) = st.fill.paint else {
            panic!("expected gradient");
        };
        assert!((g.angle - 90.0).abs() < 1e-6);
        assert_eq!(g.stops[0].color, Rgb::new(0, 255, 0));
        assert_eq!(g.stops[1].offset, 1.0);
    }

    #[test]
    fn line_pattern_weight_and_cap() {
        let (st, _) = style(&shape(&[
            ("LinePattern", "2"),
            ("LineWeight", "0.0416667"),
            ("LineCap", "2"),
            ("LineColorTrans", "0.5"),
        ]));
        assert!((st.line.width - 3.0).abs() < 1e-3);
        let dash = st.line.dash.unwrap();
        assert!((dash[0] - 12.0).abs() < 1e-2);
        assert_eq!(st.line.cap, LineCap::Butt);
        assert_eq!(st.line.opacity, 0.5);

        let (st, _) = style(&shape(&[("LinePattern", "0")]));
        assert!(!st.line.visible);
    }

    #[test]
    fn arrows_pick_kind_and_scale_with_size() {
        let (st, _) = style(&shape(&[
            ("BeginArrow", "1"),
            ("EndArrow", "4"),
            ("EndArrowSize", "5"),
            ("LineColor", "#336699"),
        ]));
        let begin = st.begin_arrow.unwrap();
        let end = st.end_arrow.unwrap();
        assert_eq!(begin.kind, ArrowKind::Open);
        assert_eq!(end.kind, ArrowKind::Filled);
        assert!(end.size > begin.size);
        assert_eq!(end.color.to_hex(), "#336699");
        assert_eq!(ArrowKind::from_code(20), Some(ArrowKind::Circle));
        assert_eq!(ArrowKind::from_code(14), Some(ArrowKind::Diamond));
    }

    #[test]
    fn unresolved_colors_fall_back_and_are_reported() {
        let (st, diags) = style(&shape(&[("FillForegnd", "Themed"), ("ShdwPattern", "1")]));
        assert_eq!(st.fill.paint, Paint::Solid(Rgb::WHITE));
        assert_eq!(diags.of_kind(DiagnosticKind::ColorFallback).count(), 1);
        assert!(st.shadow);
    }
}
