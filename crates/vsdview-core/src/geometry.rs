//! Typed geometry rows.
//!
//! Every row kind the drawing format defines for `Geometry` sections decodes into one
//! [`GeometryOp`] variant; anything else is [`Error::UnsupportedGeometryOp`]. Missing numeric cells
//! read as `0`.

use crate::model::Row;
use crate::utils::polyline_args;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryOp {
    MoveTo { x: f64, y: f64 },
    /// Coordinates are fractions of the shape's width/height.
    RelMoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    RelLineTo { x: f64, y: f64 },
    /// `a` is the sagitta (bow) of the arc.
    ArcTo { x: f64, y: f64, a: f64 },
    /// `(a, b)` is a point on the arc, `c` the major-axis angle (radians), `d` the axis ratio.
    EllipticalArcTo {
        x: f64,
        y: f64,
        a: f64,
        b: f64,
        c: f64,
        d: f64,
    },
    RelEllipticalArcTo {
        x: f64,
        y: f64,
        a: f64,
        b: f64,
        c: f64,
        d: f64,
    },
    /// Center `(x, y)`, one axis end `(a, b)`, the other axis end `(c, d)`.
    Ellipse {
        x: f64,
        y: f64,
        a: f64,
        b: f64,
        c: f64,
        d: f64,
    },
    PolylineTo {
        x: f64,
        y: f64,
        /// Intermediate points; `None` when the formula could not be read.
        points: Option<Vec<(f64, f64)>>,
        x_relative: bool,
        y_relative: bool,
    },
    /// Cubic Bezier; control points `(a, b)` and `(c, d)`, all relative.
    RelCubBezTo {
        x: f64,
        y: f64,
        a: f64,
        b: f64,
        c: f64,
        d: f64,
    },
    RelQuadBezTo { x: f64, y: f64, a: f64, b: f64 },
    SplineStart { x: f64, y: f64 },
    SplineKnot { x: f64, y: f64 },
    NurbsTo { x: f64, y: f64 },
    InfiniteLine { x: f64, y: f64, a: f64, b: f64 },
}

impl GeometryOp {
    pub fn decode(row: &Row) -> Result<Self> {
        let v = |name: &str| row.f64(name).unwrap_or(0.0);
        let kind = row.kind.as_deref().unwrap_or("").trim();
        let (x, y) = (v("X"), v("Y"));
        let op = match kind {
            "MoveTo" => Self::MoveTo { x, y },
            "RelMoveTo" => Self::RelMoveTo { x, y },
            "LineTo" => Self::LineTo { x, y },
            "RelLineTo" => Self::RelLineTo { x, y },
            "ArcTo" => Self::ArcTo { x, y, a: v("A") },
            "EllipticalArcTo" => Self::EllipticalArcTo {
                x,
                y,
                a: v("A"),
                b: v("B"),
                c: v("C"),
                d: v("D"),
            },
            "RelEllipticalArcTo" => Self::RelEllipticalArcTo {
                x,
                y,
                a: v("A"),
                b: v("B"),
                c: v("C"),
                d: v("D"),
            },
            "Ellipse" => Self::Ellipse {
                x,
                y,
                a: v("A"),
                b: v("B"),
                c: v("C"),
                d: v("D"),
            },
            "PolylineTo" => decode_polyline(row, x, y),
            "RelCubBezTo" | "RelCurveTo" => Self::RelCubBezTo {
                x,
                y,
                a: v("A"),
                b: v("B"),
                c: v("C"),
                d: v("D"),
            },
            "RelQuadBezTo" => Self::RelQuadBezTo {
                x,
                y,
                a: v("A"),
                b: v("B"),
            },
            "SplineStart" => Self::SplineStart { x, y },
            "SplineKnot" => Self::SplineKnot { x, y },
            "NURBSTo" => Self::NurbsTo { x, y },
            "InfiniteLine" => Self::InfiniteLine {
                x,
                y,
                a: v("A"),
                b: v("B"),
            },
            other => {
                return Err(Error::UnsupportedGeometryOp {
                    kind: other.to_string(),
                    ix: row.ix,
                });
            }
        };
        Ok(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveTo { .. } => "MoveTo",
            Self::RelMoveTo { .. } => "RelMoveTo",
            Self::LineTo { .. } => "LineTo",
            Self::RelLineTo { .. } => "RelLineTo",
            Self::ArcTo { .. } => "ArcTo",
            Self::EllipticalArcTo { .. } => "EllipticalArcTo",
            Self::RelEllipticalArcTo { .. } => "RelEllipticalArcTo",
            Self::Ellipse { .. } => "Ellipse",
            Self::PolylineTo { .. } => "PolylineTo",
            Self::RelCubBezTo { .. } => "RelCubBezTo",
            Self::RelQuadBezTo { .. } => "RelQuadBezTo",
            Self::SplineStart { .. } => "SplineStart",
            Self::SplineKnot { .. } => "SplineKnot",
            Self::NurbsTo { .. } => "NURBSTo",
            Self::InfiniteLine { .. } => "InfiniteLine",
        }
    }

    /// Target point of the row, in the row's own coordinate convention.
    pub fn end(&self) -> (f64, f64) {
        match *self {
            Self::MoveTo { x, y }
            | Self::RelMoveTo { x, y }
            | Self::LineTo { x, y }
            | Self::RelLineTo { x, y }
            | Self::ArcTo { x, y, .. }
            | Self::EllipticalArcTo { x, y, .. }
            | Self::RelEllipticalArcTo { x, y, .. }
            | Self::PolylineTo { x, y, .. }
            | Self::RelCubBezTo { x, y, .. }
            | Self::RelQuadBezTo { x, y, .. }
            | Self::SplineStart { x, y }
            | Self::SplineKnot { x, y }
            | Self::NurbsTo { x, y } => (x, y),
            Self::Ellipse { a, b, .. } => (a, b),
            Self::InfiniteLine { a, b, .. } => (a, b),
        }
    }
}

fn decode_polyline(row: &Row, x: f64, y: f64) -> GeometryOp {
    let formula = row.cells.get("A").and_then(|c| c.formula.as_deref());
    let args = formula.and_then(polyline_args);
    let (points, x_relative, y_relative) = match args {
        Some(args) if args.len() >= 2 && args.len() % 2 == 0 => {
            let points = args[2..].chunks_exact(2).map(|p| (p[0], p[1])).collect();
            (Some(points), args[0] == 0.0, args[1] == 0.0)
        }
        Some(_) => (None, false, false),
        // A plain polyline with no formula is just a line to its end point.
        None if formula.is_none() => (Some(Vec::new()), false, false),
        None => (None, false, false),
    };
    GeometryOp::PolylineTo {
        x,
        y,
        points,
        x_relative,
        y_relative,
    }
}
