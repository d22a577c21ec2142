//! Shape records as they appear in page and master parts.
//!
//! Values are stored verbatim (`V`, `F`, `U` attributes); numeric interpretation happens on read.
//! Lengths are always inches: the `U` display-unit annotation never changes the stored value.

use indexmap::IndexMap;

use crate::geom::{Size, size};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: Option<String>,
    pub formula: Option<String>,
    pub unit: Option<String>,
}

impl Cell {
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// A non-blank cached value is present.
    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    /// No usable value, but a formula: the value must come from an inheritance source.
    pub fn is_unresolved(&self) -> bool {
        !self.has_value() && self.formula.is_some()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn as_f64(&self) -> Option<f64> {
        parse_number(self.as_str()?)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.as_str()? {
            "1" | "TRUE" | "true" => Some(true),
            "0" | "FALSE" | "false" => Some(false),
            other => parse_number(other).map(|v| v != 0.0),
        }
    }

    pub fn formula_contains(&self, needle: &str) -> bool {
        self.formula
            .as_deref()
            .is_some_and(|f| f.to_ascii_uppercase().contains(needle))
    }
}

/// Lenient numeric parse: accepts a trailing `%` (returned as a fraction) and ignores unit
/// suffixes such as `1.5 in`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some(pct) = raw.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|v| v / 100.0);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return v.is_finite().then_some(v);
    }
    let end = raw
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .map(|(i, _)| i)?;
    raw[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Ordered property bag (`<Cell N="..."/>` elements).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellMap(IndexMap<String, Cell>);

impl CellMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, cell: Cell) {
        self.0.insert(name.into(), cell);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name)?.as_f64()
    }

    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.f64(name).unwrap_or(default)
    }

    pub fn bool(&self, name: &str) -> bool {
        self.get(name).and_then(Cell::as_bool).unwrap_or(false)
    }

    /// `self` laid over `base`: cells with a value here win, unresolved cells here fall back to
    /// `base`. Key order is `base` order followed by keys only present here.
    pub fn overlay(&self, base: &CellMap) -> CellMap {
        let mut out = base.clone();
        for (name, cell) in self.iter() {
            match out.0.get_mut(name) {
                Some(existing) => {
                    if cell.has_value() || !existing.has_value() {
                        *existing = cell.clone();
                    }
                }
                None => {
                    out.0.insert(name.to_string(), cell.clone());
                }
            }
        }
        out
    }
}

impl FromIterator<(String, Cell)> for CellMap {
    fn from_iter<T: IntoIterator<Item = (String, Cell)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One `<Row>` of a section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub ix: u32,
    /// Named rows (`Controls` rows use `N="Row_1"`).
    pub name: Option<String>,
    /// Row type (`T` attribute); geometry override rows may omit it.
    pub kind: Option<String>,
    pub cells: CellMap,
    /// `Del="1"`: removes the inherited row of the same index.
    pub deleted: bool,
}

impl Row {
    pub fn f64(&self, cell: &str) -> Option<f64> {
        self.cells.f64(cell)
    }
}

/// Finds the row with the given `IX`.
pub fn row_by_ix(rows: &[Row], ix: u32) -> Option<&Row> {
    rows.iter().find(|r| r.ix == ix)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometrySection {
    pub ix: u32,
    /// Section-level cells (`NoFill`, `NoLine`, `NoShow`, `NoSnap`).
    pub cells: CellMap,
    pub rows: Vec<Row>,
    pub deleted: bool,
}

impl GeometrySection {
    pub fn no_fill(&self) -> bool {
        self.cells.bool("NoFill")
    }

    pub fn no_line(&self) -> bool {
        self.cells.bool("NoLine")
    }

    pub fn no_show(&self) -> bool {
        self.cells.bool("NoShow")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    #[default]
    Shape,
    Group,
    Foreign,
    Guide,
}

impl ShapeKind {
    pub fn from_attr(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("Group") => Self::Group,
            Some("Foreign") => Self::Foreign,
            Some("Guide") => Self::Guide,
            _ => Self::Shape,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MasterRef {
    pub master: Option<u32>,
    pub master_shape: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StyleRefs {
    pub line: Option<u32>,
    pub fill: Option<u32>,
    pub text: Option<u32>,
}

impl StyleRefs {
    pub fn is_empty(&self) -> bool {
        self.line.is_none() && self.fill.is_none() && self.text.is_none()
    }

    /// Per-kind fallback to `other`.
    pub fn or(self, other: StyleRefs) -> StyleRefs {
        StyleRefs {
            line: self.line.or(other.line),
            fill: self.fill.or(other.fill),
            text: self.text.or(other.text),
        }
    }
}

/// A run of text sharing one character and one paragraph format row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub char_ix: u32,
    pub para_ix: u32,
    /// Set when the run came from a `<fld>` marker.
    pub field_ix: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeText {
    pub segments: Vec<TextSegment>,
}

impl ShapeText {
    pub fn plain(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignSource {
    /// `<Rel r:id="..."/>`; `target` is filled in from the owning part's relationships.
    Relationship { id: String, target: Option<String> },
    Inline { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignData {
    /// `Bitmap`, `EnhMetaFile`, `MetaFile`, `Object`, ...
    pub foreign_type: String,
    /// `PNG`, `JPEG`, `GIF`, `TIFF`, `BMP`, ...
    pub compression: Option<String>,
    pub source: ForeignSource,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub id: u32,
    pub name: Option<String>,
    pub name_u: Option<String>,
    pub kind: ShapeKind,
    pub master_ref: MasterRef,
    pub styles: StyleRefs,
    pub cells: CellMap,
    pub geometry: Vec<GeometrySection>,
    pub text: Option<ShapeText>,
    pub char_formats: Vec<Row>,
    pub para_formats: Vec<Row>,
    pub fields: Vec<Row>,
    pub controls: Vec<Row>,
    pub connection_points: Vec<Row>,
    pub fill_gradient: Vec<Row>,
    pub sub_shapes: Vec<Shape>,
    pub foreign_data: Option<ForeignData>,
}

impl Shape {
    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.cells.f64(name)
    }

    pub fn width(&self) -> f64 {
        self.cells.f64_or("Width", 0.0)
    }

    pub fn height(&self) -> f64 {
        self.cells.f64_or("Height", 0.0)
    }

    pub fn dims(&self) -> Option<Size> {
        Some(size(self.f64("Width")?, self.f64("Height")?))
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.name_u.as_deref())
    }

    /// One-dimensional (connector-like) shapes carry begin/end points.
    pub fn is_one_dimensional(&self) -> bool {
        self.cells.contains("BeginX") && self.cells.contains("EndX")
    }

    pub fn plain_text(&self) -> Option<String> {
        self.text.as_ref().map(ShapeText::plain)
    }

    /// Depth-first walk over this shape and every nested sub-shape.
    pub fn walk(&self) -> ShapeWalk<'_> {
        ShapeWalk { stack: vec![self] }
    }
}

pub struct ShapeWalk<'a> {
    stack: Vec<&'a Shape>,
}

impl<'a> Iterator for ShapeWalk<'a> {
    type Item = &'a Shape;

    fn next(&mut self) -> Option<Self::Item> {
        let shape = self.stack.pop()?;
        self.stack.extend(shape.sub_shapes.iter().rev());
        Some(shape)
    }
}

/// Page-level glue record (`<Connect>`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connect {
    pub from_sheet: u32,
    pub from_cell: Option<String>,
    pub from_part: Option<i32>,
    pub to_sheet: u32,
    pub to_cell: Option<String>,
    pub to_part: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub ix: u32,
    pub name: String,
    pub visible: bool,
}
