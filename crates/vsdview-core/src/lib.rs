#![forbid(unsafe_code)]

//! Visio package reader + shape model (headless).
//!
//! Reads `.vsdx`/`.vssx`/`.vstx` ZIP+XML packages into an immutable [`Document`]: pages of shape
//! records, a master catalog, the theme color table, document style sheets and embedded media.
//! Master/style inheritance is resolved on demand by [`inherit::resolve_shape`]; nothing here
//! renders.

pub mod document;
pub mod error;
pub mod geom;
pub mod geometry;
pub mod inherit;
pub mod masters;
pub mod model;
pub mod package;
pub mod parse;
pub mod rels;
pub mod report;
pub mod styles;
pub mod theme;
mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use document::{Document, MediaStore, Page};
pub use error::{Error, Result};
pub use geometry::GeometryOp;
pub use inherit::{EffectiveShape, InheritContext, resolve_shape};
pub use masters::{MasterCatalog, MasterLocation};
pub use model::{Cell, CellMap, Connect, GeometrySection, Row, Shape, ShapeKind};
pub use package::{Package, PackageLimits};
pub use report::{IssueKind, ParseReport, PartIssue};
pub use theme::Theme;

/// Default cap on rows per geometry section.
pub const DEFAULT_MAX_GEOMETRY_ROWS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Contained part failures (malformed page/master/theme parts) become hard errors.
    pub strict: bool,
    pub limits: PackageLimits,
    pub max_geometry_rows: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParseOptions {
    /// Strict parsing (part-level failures are returned as errors).
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::lenient()
        }
    }

    /// Lenient parsing: part-level failures are recorded in the [`ParseReport`] and the part is
    /// treated as empty.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            limits: PackageLimits::default(),
            max_geometry_rows: DEFAULT_MAX_GEOMETRY_ROWS,
        }
    }
}
