//! 2D primitives shared by the model and the renderer.
//!
//! Drawing coordinates are inches with the Y axis pointing up; scene coordinates are pixels with
//! the Y axis pointing down. Both use the same (unit-less) euclid types.

pub type Unit = euclid::UnknownUnit;

pub type Point = euclid::Point2D<f64, Unit>;
pub type Vector = euclid::Vector2D<f64, Unit>;
pub type Size = euclid::Size2D<f64, Unit>;
pub type Rect = euclid::Rect<f64, Unit>;
pub type Box2D = euclid::Box2D<f64, Unit>;
pub type Transform = euclid::Transform2D<f64, Unit, Unit>;
pub type Angle = euclid::Angle<f64>;

pub fn point(x: f64, y: f64) -> Point {
    euclid::point2(x, y)
}

pub fn vector(x: f64, y: f64) -> Vector {
    euclid::vec2(x, y)
}

pub fn size(w: f64, h: f64) -> Size {
    euclid::size2(w, h)
}

/// Smallest box containing every finite point, or `None` when there are none.
pub fn bounds<I>(points: I) -> Option<Box2D>
where
    I: IntoIterator<Item = Point>,
{
    let mut out: Option<Box2D> = None;
    for p in points {
        if !(p.x.is_finite() && p.y.is_finite()) {
            continue;
        }
        out = Some(match out {
            None => Box2D::new(p, p),
            Some(b) => Box2D::new(
                point(b.min.x.min(p.x), b.min.y.min(p.y)),
                point(b.max.x.max(p.x), b.max.y.max(p.y)),
            ),
        });
    }
    out
}
