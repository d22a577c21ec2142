//! Page-level glue (`Connect` records) to straight connection lines.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::FxHashMap;
use vsdview_core::geom::{Point, Transform, point};
use vsdview_core::model::{Row, row_by_ix};
use vsdview_core::{Connect, Shape};

use crate::diagnostics::{DiagnosticKind, RenderDiagnostics};

/// What the connection resolver needs to know about one placed shape.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedShape {
    pub id: u32,
    /// Local inches (Y up) to page pixels.
    pub to_page: Transform,
    pub width: f64,
    pub height: f64,
    pub loc_pin: Point,
    pub controls: Vec<Row>,
    pub connection_points: Vec<Row>,
    /// The shape already drew its own line (geometry or begin/end points).
    pub draws_itself: bool,
}

impl IndexedShape {
    pub fn new(shape: &Shape, to_page: Transform, draws_itself: bool) -> Self {
        let (width, height) = (shape.width(), shape.height());
        Self {
            id: shape.id,
            to_page,
            width,
            height,
            loc_pin: point(
                shape.cells.f64_or("LocPinX", width / 2.0),
                shape.cells.f64_or("LocPinY", height / 2.0),
            ),
            controls: shape.controls.clone(),
            connection_points: shape.connection_points.clone(),
            draws_itself,
        }
    }

    /// The pin in page pixels.
    pub fn pin(&self) -> Point {
        self.to_page.transform_point(self.loc_pin)
    }

    fn row_point(&self, row: &Row) -> Option<Point> {
        let local = point(row.f64("X")?, row.f64("Y")?);
        Some(self.to_page.transform_point(local))
    }

    /// Resolves a glue target cell (`Connections.X2`, `Controls.Row_1`, `PinX`, ...) to page
    /// pixels. `None` when the named row does not exist or lacks coordinates.
    pub fn resolve(&self, cell: Option<&str>) -> Option<Point> {
        let Some(cell) = cell.map(str::trim).filter(|c| !c.is_empty()) else {
            return Some(self.pin());
        };
        let Some(caps) = target_re().captures(cell) else {
            return Some(self.pin());
        };
        let rows = if caps[1].eq_ignore_ascii_case("Connections") {
            &self.connection_points
        } else {
            &self.controls
        };
        let row = find_row(rows, &caps[2])?;
        self.row_point(row)
    }
}

fn target_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(Connections|Controls)\.([A-Za-z_][\w]*?)(?:\.[XY])?$").expect("valid regex")
    })
}

fn numbered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:X|Y|Row_)(\d+)$").expect("valid regex"))
}

/// `X3` / `Row_3` name the third row (`IX` 2) unless a row carries that name explicitly.
fn find_row<'r>(rows: &'r [Row], key: &str) -> Option<&'r Row> {
    let live = || rows.iter().filter(|r| !r.deleted);
    if let Some(row) = live().find(|r| r.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(key))) {
        return Some(row);
    }
    let n: u32 = numbered_re().captures(key)?.get(1)?.as_str().parse().ok()?;
    let ix = n.checked_sub(1)?;
    row_by_ix(rows, ix)
        .filter(|r| !r.deleted)
        .or_else(|| live().nth(ix as usize))
}

/// Placed shapes of one page, by id.
#[derive(Debug, Clone, Default)]
pub struct ShapeIndex {
    shapes: FxHashMap<u32, IndexedShape>,
}

impl ShapeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shape: IndexedShape) {
        self.shapes.insert(shape.id, shape);
    }

    pub fn get(&self, id: u32) -> Option<&IndexedShape> {
        self.shapes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionLine {
    pub connector: u32,
    pub from: Point,
    pub to: Point,
}

#[derive(Default)]
struct Ends<'a> {
    begin: Option<&'a Connect>,
    end: Option<&'a Connect>,
}

/// One straight line per connector whose glue resolves, skipping connectors that drew
/// themselves.
pub fn resolve_connections(
    connects: &[Connect],
    index: &ShapeIndex,
    diagnostics: &mut RenderDiagnostics,
) -> Vec<ConnectionLine> {
    let mut by_connector: IndexMap<u32, Ends<'_>> = IndexMap::new();
    for c in connects {
        let ends = by_connector.entry(c.from_sheet).or_default();
        match c.from_cell.as_deref().map(str::trim) {
            Some(cell) if cell.eq_ignore_ascii_case("BeginX") => ends.begin = Some(c),
            Some(cell) if cell.eq_ignore_ascii_case("EndX") => ends.end = Some(c),
            _ if ends.begin.is_none() => ends.begin = Some(c),
            _ => ends.end = Some(c),
        }
    }

    let mut lines = Vec::new();
    for (connector, ends) in by_connector {
        if index.get(connector).is_some_and(|s| s.draws_itself) {
            continue;
        }
        let (Some(begin), Some(end)) = (ends.begin, ends.end) else {
            diagnostics.push(
                Some(connector),
                DiagnosticKind::UnresolvedConnection,
                "connector is glued at one end only",
            );
            continue;
        };
        let (Some(from_shape), Some(to_shape)) = (index.get(begin.to_sheet), index.get(end.to_sheet)) else {
            diagnostics.push(
                Some(connector),
                DiagnosticKind::UnresolvedConnection,
                format!(
                    "glued shape missing (from {}, to {})",
                    begin.to_sheet, end.to_sheet
                ),
            );
            continue;
        };

        let from = from_shape.resolve(begin.to_cell.as_deref());
        let to = to_shape.resolve(end.to_cell.as_deref());
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) => (from, to),
            (Some(from), None) => {
                diagnostics.push(
                    Some(connector),
                    DiagnosticKind::UnresolvedConnection,
                    format!("end target `{}` unresolved; vertical drop used", end.to_cell.as_deref().unwrap_or("")),
                );
                (from, point(from.x, to_shape.pin().y))
            }
            (None, Some(to)) => {
                diagnostics.push(
                    Some(connector),
                    DiagnosticKind::UnresolvedConnection,
                    format!("begin target `{}` unresolved; vertical drop used", begin.to_cell.as_deref().unwrap_or("")),
                );
                (point(to.x, from_shape.pin().y), to)
            }
            (None, None) => {
                diagnostics.push(
                    Some(connector),
                    DiagnosticKind::UnresolvedConnection,
                    "neither glue target resolves",
                );
                continue;
            }
        };
        lines.push(ConnectionLine {
            connector,
            from,
            to,
        });
    }
    lines
}
