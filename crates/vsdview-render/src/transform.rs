//! Shape placement: pin, local pin, rotation and flips as affine transforms.
//!
//! Every shape draws into its own pixel frame (origin top-left, Y down, `width × height`). The
//! placement transform maps that frame into the parent's pixel frame, which for top-level shapes
//! is the page.

use vsdview_core::Shape;
use vsdview_core::geom::{Angle, Point, Transform, point, vector};

use crate::geometry::local_to_px;
use crate::util::{fmt, fmt3};

/// Transform inputs in drawing units (inches, radians, Y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Xform {
    pub pin_x: f64,
    pub pin_y: f64,
    pub width: f64,
    pub height: f64,
    pub loc_pin_x: f64,
    pub loc_pin_y: f64,
    pub angle: f64,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Xform {
    /// Reads the shape transform cells. One-dimensional shapes without a pin derive their frame
    /// from the begin/end points.
    pub fn of_shape(shape: &Shape) -> Self {
        let cells = &shape.cells;
        if !cells.contains("PinX") && shape.is_one_dimensional() {
            if let Some(xf) = Self::from_endpoints(shape) {
                return xf;
            }
        }

        let width = shape.width();
        let height = shape.height();
        Self {
            pin_x: cells.f64_or("PinX", width / 2.0),
            pin_y: cells.f64_or("PinY", height / 2.0),
            width,
            height,
            loc_pin_x: cells.f64_or("LocPinX", width / 2.0),
            loc_pin_y: cells.f64_or("LocPinY", height / 2.0),
            angle: cells.f64_or("Angle", 0.0),
            flip_x: cells.bool("FlipX"),
            flip_y: cells.bool("FlipY"),
        }
    }

    fn from_endpoints(shape: &Shape) -> Option<Self> {
        let cells = &shape.cells;
        let (bx, by) = (cells.f64("BeginX")?, cells.f64("BeginY")?);
        let (ex, ey) = (cells.f64("EndX")?, cells.f64("EndY")?);
        let width = (ex - bx).hypot(ey - by);
        let height = shape.height();
        Some(Self {
            pin_x: (bx + ex) / 2.0,
            pin_y: (by + ey) / 2.0,
            width,
            height,
            loc_pin_x: width / 2.0,
            loc_pin_y: height / 2.0,
            angle: (ey - by).atan2(ex - bx),
            flip_x: false,
            flip_y: false,
        })
    }

    /// Local pixel frame to the parent's pixel frame.
    pub fn to_parent_px(&self, parent_height_in: f64, px_per_inch: f64) -> Transform {
        let loc = vector(
            self.loc_pin_x * px_per_inch,
            (self.height - self.loc_pin_y) * px_per_inch,
        );
        let pin = vector(
            self.pin_x * px_per_inch,
            (parent_height_in - self.pin_y) * px_per_inch,
        );
        let fx = if self.flip_x { -1.0 } else { 1.0 };
        let fy = if self.flip_y { -1.0 } else { 1.0 };

        Transform::translation(-loc.x, -loc.y)
            .then_scale(fx, fy)
            .then_rotate(Angle::radians(-self.angle))
            .then_translate(pin)
    }

    /// Local inches (Y up) to the parent's pixel frame.
    pub fn local_in_to_parent_px(&self, parent_height_in: f64, px_per_inch: f64) -> Transform {
        local_to_px(self.height, px_per_inch).then(&self.to_parent_px(parent_height_in, px_per_inch))
    }
}

/// `matrix(a b c d e f)` for an SVG `transform` attribute; `None` for the identity.
pub fn svg_matrix(t: &Transform) -> Option<String> {
    let identity = (t.m11 - 1.0).abs() < 1e-9
        && t.m12.abs() < 1e-9
        && t.m21.abs() < 1e-9
        && (t.m22 - 1.0).abs() < 1e-9
        && t.m31.abs() < 1e-9
        && t.m32.abs() < 1e-9;
    if identity {
        return None;
    }
    Some(format!(
        "matrix({} {} {} {} {} {})",
        coef(t.m11),
        coef(t.m12),
        coef(t.m21),
        coef(t.m22),
        fmt3(t.m31),
        fmt3(t.m32)
    ))
}

fn coef(v: f64) -> String {
    fmt((v * 1e6).round() / 1e6)
}

/// Maps a drawing point (inches, Y up) on a page of height `page_height_in` to page pixels.
pub fn page_point(x: f64, y: f64, page_height_in: f64, px_per_inch: f64) -> Point {
    point(x * px_per_inch, (page_height_in - y) * px_per_inch)
}
