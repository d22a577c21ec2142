//! Geometry sections to path commands.
//!
//! Compilation happens in shape-local inches with the Y axis up (the drawing's own convention);
//! emission maps every point through a [`Transform`] into scene pixels. Arcs stay arcs: their
//! radii and axis rotation are re-derived for the target transform instead of being flattened.

use std::fmt::Write as _;

use vsdview_core::geom::{Point, Size, Transform, point, vector};
use vsdview_core::model::Row;
use vsdview_core::{GeometryOp, GeometrySection, Shape};

use crate::util::fmt3;

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    /// Elliptical arc; `sweep` is true when the arc runs in the positive-angle direction of the
    /// coordinate system it is expressed in.
    ArcTo {
        rx: f64,
        ry: f64,
        /// Degrees.
        rotation: f64,
        large_arc: bool,
        sweep: bool,
        to: Point,
    },
    CubicTo {
        c1: Point,
        c2: Point,
        to: Point,
    },
    QuadTo {
        c: Point,
        to: Point,
    },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fidelity {
    Exact,
    Approximated { reasons: Vec<String> },
}

impl Fidelity {
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact)
    }
}

/// A row the compiler could not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub ix: u32,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPath {
    /// `IX` of the source section.
    pub section: u32,
    pub commands: Vec<PathCommand>,
    pub fidelity: Fidelity,
    pub skipped: Vec<SkippedRow>,
    pub no_fill: bool,
    pub no_line: bool,
}

impl CompiledPath {
    /// Only moves (or nothing at all): there is nothing to stroke or fill.
    pub fn is_empty(&self) -> bool {
        self.commands
            .iter()
            .all(|c| matches!(c, PathCommand::MoveTo(_)))
    }

    pub fn is_closed(&self) -> bool {
        self.commands.iter().any(|c| matches!(c, PathCommand::Close))
    }

    /// Every end and control point, in local inches.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.commands.iter().flat_map(|cmd| {
            let pts: Vec<Point> = match *cmd {
                PathCommand::MoveTo(p) | PathCommand::LineTo(p) => vec![p],
                PathCommand::ArcTo { to, .. } => vec![to],
                PathCommand::CubicTo { c1, c2, to } => vec![c1, c2, to],
                PathCommand::QuadTo { c, to } => vec![c, to],
                PathCommand::Close => Vec::new(),
            };
            pts
        })
    }

    /// SVG path data with every point mapped through `transform`.
    pub fn to_svg_data(&self, transform: &Transform) -> String {
        let linear = linear_part(transform);
        let flips = determinant(linear) < 0.0;
        let mut out = String::new();
        let push_point = |out: &mut String, p: Point| {
            let p = transform.transform_point(p);
            let _ = write!(out, "{} {}", fmt3(p.x), fmt3(p.y));
        };

        for cmd in &self.commands {
            if !out.is_empty() {
                out.push(' ');
            }
            match *cmd {
                PathCommand::MoveTo(p) => {
                    out.push('M');
                    push_point(&mut out, p);
                }
                PathCommand::LineTo(p) => {
                    out.push('L');
                    push_point(&mut out, p);
                }
                PathCommand::ArcTo {
                    rx,
                    ry,
                    rotation,
                    large_arc,
                    sweep,
                    to,
                } => {
                    let (rx, ry, rot) = map_ellipse(linear, rx, ry, rotation.to_radians());
                    let _ = write!(
                        out,
                        "A{} {} {} {} {} ",
                        fmt3(rx),
                        fmt3(ry),
                        fmt3(normalize_degrees(rot.to_degrees())),
                        u8::from(large_arc),
                        u8::from(sweep != flips)
                    );
                    push_point(&mut out, to);
                }
                PathCommand::CubicTo { c1, c2, to } => {
                    out.push('C');
                    push_point(&mut out, c1);
                    out.push(' ');
                    push_point(&mut out, c2);
                    out.push(' ');
                    push_point(&mut out, to);
                }
                PathCommand::QuadTo { c, to } => {
                    out.push('Q');
                    push_point(&mut out, c);
                    out.push(' ');
                    push_point(&mut out, to);
                }
                PathCommand::Close => out.push('Z'),
            }
        }
        out
    }
}

/// Shape-local inches (Y up) to shape-local pixels (Y down).
pub fn local_to_px(height_in: f64, px_per_inch: f64) -> Transform {
    Transform::scale(px_per_inch, -px_per_inch).then_translate(vector(0.0, height_in * px_per_inch))
}

/// Dimensions a section is drawn into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub width: f64,
    pub height: f64,
    /// Native size of the master the geometry came from; absolute coordinates are rescaled
    /// per axis when it differs from `width`/`height`.
    pub master_dims: Option<Size>,
}

impl Frame {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            master_dims: None,
        }
    }

    pub fn with_master(mut self, dims: Option<Size>) -> Self {
        self.master_dims = dims;
        self
    }

    fn scale(&self) -> (f64, f64) {
        match self.master_dims {
            Some(m) => (ratio(self.width, m.width), ratio(self.height, m.height)),
            None => (1.0, 1.0),
        }
    }
}

fn ratio(value: f64, native: f64) -> f64 {
    if native.abs() > EPS && value.is_finite() {
        value / native
    } else {
        1.0
    }
}

/// Compiles every visible section of an effective shape, in section order.
pub fn compile_shape(shape: &Shape, master_dims: Option<Size>) -> Vec<CompiledPath> {
    let frame = Frame::new(shape.width(), shape.height()).with_master(master_dims);
    shape
        .geometry
        .iter()
        .filter(|s| !s.deleted && !s.no_show())
        .map(|s| compile_section(s, frame))
        .collect()
}

pub fn compile_section(section: &GeometrySection, frame: Frame) -> CompiledPath {
    let mut compiler = Compiler::new(frame);
    let mut skipped = Vec::new();

    for row in section.rows.iter().filter(|r| !r.deleted) {
        match GeometryOp::decode(row) {
            Ok(op) => compiler.apply(&op, row),
            Err(_) => {
                let kind = row.kind.clone().unwrap_or_default();
                tracing::debug!(section = section.ix, ix = row.ix, kind = %kind, "geometry row skipped");
                skipped.push(SkippedRow { ix: row.ix, kind });
            }
        }
    }
    compiler.finish_subpath();

    let fidelity = if compiler.approximations.is_empty() {
        Fidelity::Exact
    } else {
        Fidelity::Approximated {
            reasons: compiler.approximations,
        }
    };

    CompiledPath {
        section: section.ix,
        commands: compiler.commands,
        fidelity,
        skipped,
        no_fill: section.no_fill(),
        no_line: section.no_line(),
    }
}

struct Compiler {
    frame: Frame,
    sx: f64,
    sy: f64,
    commands: Vec<PathCommand>,
    cursor: Option<Point>,
    start: Option<Point>,
    /// Segments drawn since the last move.
    drawn: bool,
    approximations: Vec<String>,
}

impl Compiler {
    fn new(frame: Frame) -> Self {
        let (sx, sy) = frame.scale();
        Self {
            frame,
            sx,
            sy,
            commands: Vec::new(),
            cursor: None,
            start: None,
            drawn: false,
            approximations: Vec::new(),
        }
    }

    fn abs(&self, x: f64, y: f64) -> Point {
        point(x * self.sx, y * self.sy)
    }

    fn rel(&self, x: f64, y: f64) -> Point {
        point(x * self.frame.width, y * self.frame.height)
    }

    fn unscale(&self, p: Point) -> Option<Point> {
        (self.sx.abs() > EPS && self.sy.abs() > EPS).then(|| point(p.x / self.sx, p.y / self.sy))
    }

    fn approximate(&mut self, reason: String) {
        if !self.approximations.contains(&reason) {
            self.approximations.push(reason);
        }
    }

    fn apply(&mut self, op: &GeometryOp, row: &Row) {
        match *op {
            GeometryOp::MoveTo { x, y } => self.move_to(self.abs(x, y)),
            GeometryOp::RelMoveTo { x, y } => self.move_to(self.rel(x, y)),
            GeometryOp::LineTo { x, y } => self.line_to(self.abs(x, y)),
            GeometryOp::RelLineTo { x, y } => self.line_to(self.rel(x, y)),
            GeometryOp::ArcTo { x, y, a } => self.arc_to(self.abs(x, y), a),
            GeometryOp::EllipticalArcTo { x, y, a, b, c, d } => {
                let from = self.ensure_cursor();
                let to = self.abs(x, y);
                match self.unscale(from) {
                    Some(from_native) => {
                        let linear = [self.sx, 0.0, 0.0, self.sy];
                        self.elliptical_arc(from_native, point(a, b), point(x, y), c, d, linear, to);
                    }
                    None => self.line_to(to),
                }
            }
            GeometryOp::RelEllipticalArcTo { x, y, a, b, c, d } => {
                let from = self.ensure_cursor();
                let to = self.rel(x, y);
                let ctrl = self.rel(a, b);
                self.elliptical_arc(from, ctrl, to, c, d, [1.0, 0.0, 0.0, 1.0], to);
            }
            GeometryOp::Ellipse { x, y, a, b, c, d } => self.ellipse(x, y, a, b, c, d),
            GeometryOp::PolylineTo {
                x,
                y,
                ref points,
                x_relative,
                y_relative,
            } => {
                match points {
                    Some(points) => {
                        for &(px, py) in points {
                            let px = if x_relative { px * self.frame.width } else { px * self.sx };
                            let py = if y_relative { py * self.frame.height } else { py * self.sy };
                            self.line_to(point(px, py));
                        }
                    }
                    None => self.approximate(format!(
                        "PolylineTo row {} has an unreadable point list; drawn as a line",
                        row.ix
                    )),
                }
                self.line_to(self.abs(x, y));
            }
            GeometryOp::RelCubBezTo { x, y, a, b, c, d } => {
                self.ensure_cursor();
                let cmd = PathCommand::CubicTo {
                    c1: self.rel(a, b),
                    c2: self.rel(c, d),
                    to: self.rel(x, y),
                };
                self.segment(cmd, self.rel(x, y));
            }
            GeometryOp::RelQuadBezTo { x, y, a, b } => {
                self.ensure_cursor();
                let cmd = PathCommand::QuadTo {
                    c: self.rel(a, b),
                    to: self.rel(x, y),
                };
                self.segment(cmd, self.rel(x, y));
            }
            GeometryOp::SplineStart { x, y }
            | GeometryOp::SplineKnot { x, y }
            | GeometryOp::NurbsTo { x, y } => {
                self.approximate(format!("{} drawn as straight segments", op.name()));
                self.line_to(self.abs(x, y));
            }
            GeometryOp::InfiniteLine { x, y, a, b } => {
                self.move_to(self.abs(x, y));
                self.line_to(self.abs(a, b));
            }
        }
    }

    fn finish_subpath(&mut self) {
        if let (true, Some(start), Some(cursor)) = (self.drawn, self.start, self.cursor) {
            if (start - cursor).length() < 1e-6 {
                self.commands.push(PathCommand::Close);
            }
        }
        self.drawn = false;
    }

    fn move_to(&mut self, p: Point) {
        self.finish_subpath();
        self.commands.push(PathCommand::MoveTo(p));
        self.cursor = Some(p);
        self.start = Some(p);
    }

    fn ensure_cursor(&mut self) -> Point {
        match self.cursor {
            Some(p) => p,
            None => {
                let origin = point(0.0, 0.0);
                self.move_to(origin);
                origin
            }
        }
    }

    fn segment(&mut self, cmd: PathCommand, to: Point) {
        self.commands.push(cmd);
        self.cursor = Some(to);
        self.drawn = true;
    }

    fn line_to(&mut self, p: Point) {
        self.ensure_cursor();
        self.segment(PathCommand::LineTo(p), p);
    }

    /// Circular arc with sagitta `bow`, measured in the master's native units. A positive bow
    /// runs counter-clockwise.
    fn arc_to(&mut self, to: Point, bow: f64) {
        let from = self.ensure_cursor();
        let (Some(p0), Some(p1)) = (self.unscale(from), self.unscale(to)) else {
            return self.line_to(to);
        };
        let chord = (p1 - p0).length();
        if chord < EPS {
            return;
        }
        if bow.abs() < EPS {
            return self.line_to(to);
        }

        let radius = (chord * chord / 4.0 + bow * bow) / (2.0 * bow.abs());
        let linear = [self.sx, 0.0, 0.0, self.sy];
        let (rx, ry, rotation) = map_ellipse(linear, radius, radius, 0.0);
        let cmd = PathCommand::ArcTo {
            rx,
            ry,
            rotation: rotation.to_degrees(),
            large_arc: bow.abs() > chord / 2.0,
            sweep: (bow > 0.0) != (determinant(linear) < 0.0),
            to,
        };
        self.segment(cmd, to);
    }

    /// Arc from `from` through `ctrl` to `end` on an ellipse whose major axis is at `angle`
    /// radians with major/minor ratio `ratio`. Points are in the ellipse's own space; `linear`
    /// maps that space into local inches and `to` is `end` already mapped.
    #[allow(clippy::too_many_arguments)]
    fn elliptical_arc(
        &mut self,
        from: Point,
        ctrl: Point,
        end: Point,
        angle: f64,
        ratio: f64,
        linear: [f64; 4],
        to: Point,
    ) {
        let ratio = if ratio.is_finite() && ratio > EPS { ratio } else { 1.0 };
        let (sin, cos) = (-angle).sin_cos();
        let to_circle = |p: Point| point((p.x * cos - p.y * sin) / ratio, p.x * sin + p.y * cos);
        let (a0, a1, a2) = (to_circle(from), to_circle(ctrl), to_circle(end));

        if (a2 - a0).length() < EPS {
            return;
        }
        let Some(center) = circumcenter(a0, a1, a2) else {
            return self.line_to(to);
        };
        let radius = (a0 - center).length();
        let chord = a2 - a0;
        let ctrl_side = chord.cross(a1 - a0);
        let center_side = chord.cross(center - a0);

        let (rx, ry, rotation) = map_ellipse(linear, radius * ratio, radius, angle);
        let cmd = PathCommand::ArcTo {
            rx,
            ry,
            rotation: rotation.to_degrees(),
            large_arc: ctrl_side * center_side > 0.0,
            sweep: (ctrl_side < 0.0) != (determinant(linear) < 0.0),
            to,
        };
        self.segment(cmd, to);
    }

    fn ellipse(&mut self, cx: f64, cy: f64, ax: f64, ay: f64, bx: f64, by: f64) {
        let u = vector(ax - cx, ay - cy);
        let v = vector(bx - cx, by - cy);
        let start = self.abs(ax, ay);
        let opposite = self.abs(2.0 * cx - ax, 2.0 * cy - ay);
        if u.length() < EPS || v.length() < EPS {
            self.move_to(start);
            self.line_to(opposite);
            return;
        }

        let linear = [self.sx, 0.0, 0.0, self.sy];
        let (rx, ry, rotation) = map_ellipse(linear, u.length(), v.length(), u.y.atan2(u.x));
        let arc = |to| PathCommand::ArcTo {
            rx,
            ry,
            rotation: rotation.to_degrees(),
            large_arc: false,
            sweep: true,
            to,
        };
        self.move_to(start);
        self.segment(arc(opposite), opposite);
        self.segment(arc(start), start);
    }
}

fn circumcenter(a: Point, b: Point, c: Point) -> Option<Point> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < EPS {
        return None;
    }
    let (a2, b2, c2) = (
        a.to_vector().square_length(),
        b.to_vector().square_length(),
        c.to_vector().square_length(),
    );
    Some(point(
        (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
        (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
    ))
}

/// `[a, b, c, d]` with `x' = a·x + b·y`, `y' = c·x + d·y`.
fn linear_part(t: &Transform) -> [f64; 4] {
    [t.m11, t.m21, t.m12, t.m22]
}

fn determinant(m: [f64; 4]) -> f64 {
    m[0] * m[3] - m[1] * m[2]
}

/// Image of the ellipse `(rx, ry, rotation)` under a linear map, as `(rx', ry', rotation')`.
fn map_ellipse(linear: [f64; 4], rx: f64, ry: f64, rotation: f64) -> (f64, f64, f64) {
    let (sin, cos) = rotation.sin_cos();
    // A = L · R(rotation) · diag(rx, ry)
    let r = [cos * rx, -sin * ry, sin * rx, cos * ry];
    let a = [
        linear[0] * r[0] + linear[1] * r[2],
        linear[0] * r[1] + linear[1] * r[3],
        linear[2] * r[0] + linear[3] * r[2],
        linear[2] * r[1] + linear[3] * r[3],
    ];

    let e = (a[0] + a[3]) / 2.0;
    let f = (a[0] - a[3]) / 2.0;
    let g = (a[2] + a[1]) / 2.0;
    let h = (a[2] - a[1]) / 2.0;
    let q = e.hypot(h);
    let r = f.hypot(g);
    let a1 = g.atan2(f);
    let a2 = h.atan2(e);
    ((q + r).abs(), (q - r).abs(), (a2 + a1) / 2.0)
}

fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    if (d - 360.0).abs() < 1e-6 { 0.0 } else { d }
}
