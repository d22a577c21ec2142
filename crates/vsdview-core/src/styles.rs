//! Document style sheets and color table (`visio/document.xml`).
//!
//! Style sheets are the lowest-priority inheritance tier: a shape's `LineStyle`, `FillStyle` and
//! `TextStyle` each select a sheet, and sheets chain to their own parents per kind.

use indexmap::IndexMap;
use roxmltree::Document;
use rustc_hash::FxHashSet;

use crate::model::{CellMap, Row, StyleRefs};
use crate::package::Package;
use crate::parse::{parse_cells, parse_rows};
use crate::report::{IssueKind, ParseReport, PartIssue};
use crate::utils::{attr_string, attr_u32, child_elements};
use crate::{Error, Result};

pub const DOCUMENT_PART: &str = "visio/document.xml";

/// Chains longer than this are treated as broken.
const MAX_STYLE_DEPTH: usize = 32;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSheet {
    pub id: u32,
    pub name: Option<String>,
    pub parents: StyleRefs,
    pub cells: CellMap,
    pub char_formats: Vec<Row>,
    pub para_formats: Vec<Row>,
}

/// Cells and text formats contributed by style sheets to one shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleDefaults {
    pub cells: CellMap,
    pub char_formats: Vec<Row>,
    pub para_formats: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleKind {
    Line,
    Fill,
    Text,
}

impl StyleKind {
    fn parent(self, refs: StyleRefs) -> Option<u32> {
        match self {
            Self::Line => refs.line,
            Self::Fill => refs.fill,
            Self::Text => refs.text,
        }
    }

    fn owns(self, cell: &str) -> bool {
        match self {
            Self::Line => {
                cell.starts_with("Line")
                    || cell.starts_with("BeginArrow")
                    || cell.starts_with("EndArrow")
                    || cell == "Rounding"
                    || cell == "CompoundType"
            }
            Self::Fill => cell.starts_with("Fill") || cell.starts_with("Shdw"),
            Self::Text => !(Self::Line.owns(cell) || Self::Fill.owns(cell)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSheets {
    sheets: IndexMap<u32, StyleSheet>,
}

impl StyleSheets {
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&StyleSheet> {
        self.sheets.get(&id)
    }

    pub fn insert(&mut self, sheet: StyleSheet) {
        self.sheets.insert(sheet.id, sheet);
    }

    /// Merged defaults for the given style references.
    pub fn defaults_for(&self, refs: StyleRefs) -> StyleDefaults {
        let mut out = StyleDefaults::default();
        if refs.is_empty() || self.sheets.is_empty() {
            return out;
        }

        for kind in [StyleKind::Text, StyleKind::Fill, StyleKind::Line] {
            let Some(start) = kind.parent(refs) else {
                continue;
            };
            for sheet in self.chain(kind, start) {
                let owned: CellMap = sheet
                    .cells
                    .iter()
                    .filter(|(name, _)| kind.owns(name))
                    .map(|(name, cell)| (name.to_string(), cell.clone()))
                    .collect();
                // Nearer sheets win over their ancestors.
                out.cells = out.cells.overlay(&owned);
                if kind == StyleKind::Text {
                    if out.char_formats.is_empty() {
                        out.char_formats = sheet.char_formats.clone();
                    }
                    if out.para_formats.is_empty() {
                        out.para_formats = sheet.para_formats.clone();
                    }
                }
            }
        }
        out
    }

    /// Sheets from `start` towards the root, nearest first; stops on cycles.
    fn chain(&self, kind: StyleKind, start: u32) -> Vec<&StyleSheet> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut next = Some(start);
        while let Some(id) = next {
            if !seen.insert(id) || out.len() >= MAX_STYLE_DEPTH {
                tracing::debug!(style = id, "style sheet chain cycle; stopping");
                break;
            }
            let Some(sheet) = self.sheets.get(&id) else {
                break;
            };
            out.push(sheet);
            next = kind.parent(sheet.parents);
        }
        out
    }
}

/// Document-wide settings read from `visio/document.xml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSheet {
    pub styles: StyleSheets,
    /// Document color table (`ColorEntry`), `#RRGGBB` by index.
    pub colors: Vec<String>,
}

impl DocumentSheet {
    pub fn load(package: &Package, report: &mut ParseReport) -> DocumentSheet {
        let xml = match package.part_str(DOCUMENT_PART) {
            Ok(xml) => xml,
            Err(err) => {
                report.push(PartIssue::new(
                    DOCUMENT_PART,
                    IssueKind::PartMissing,
                    err.to_string(),
                ));
                return DocumentSheet::default();
            }
        };
        match parse_document_part(xml, DOCUMENT_PART) {
            Ok(sheet) => {
                report.parsed(DOCUMENT_PART);
                sheet
            }
            Err(err) => {
                report.push(PartIssue::new(
                    DOCUMENT_PART,
                    IssueKind::SchemaParse,
                    err.to_string(),
                ));
                DocumentSheet::default()
            }
        }
    }
}

pub fn parse_document_part(xml: &str, part: &str) -> Result<DocumentSheet> {
    let doc = Document::parse(xml).map_err(|e| Error::schema(part, e.to_string()))?;
    let root = doc.root_element();
    let mut out = DocumentSheet::default();

    for sheets in child_elements(root, "StyleSheets") {
        for node in child_elements(sheets, "StyleSheet") {
            let Some(id) = attr_u32(node, "ID") else {
                continue;
            };
            let mut sheet = StyleSheet {
                id,
                name: attr_string(node, "NameU").or_else(|| attr_string(node, "Name")),
                parents: StyleRefs {
                    line: attr_u32(node, "LineStyle"),
                    fill: attr_u32(node, "FillStyle"),
                    text: attr_u32(node, "TextStyle"),
                },
                cells: parse_cells(node),
                ..Default::default()
            };
            for section in child_elements(node, "Section") {
                match section.attribute("N") {
                    Some("Character") => sheet.char_formats = parse_rows(section),
                    Some("Paragraph") => sheet.para_formats = parse_rows(section),
                    _ => {}
                }
            }
            out.styles.insert(sheet);
        }
    }

    for colors in child_elements(root, "Colors") {
        let mut entries: Vec<(u32, String)> = child_elements(colors, "ColorEntry")
            .filter_map(|n| Some((attr_u32(n, "IX")?, attr_string(n, "RGB")?)))
            .collect();
        entries.sort_by_key(|(ix, _)| *ix);
        out.colors = entries.into_iter().map(|(_, rgb)| rgb).collect();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"<VisioDocument xmlns="http://schemas.microsoft.com/office/visio/2012/main">
  <Colors><ColorEntry IX="1" RGB="#FFFFFF"/><ColorEntry IX="0" RGB="#000000"/></Colors>
  <StyleSheets>
    <StyleSheet ID="0" NameU="No Style">
      <Cell N="LineWeight" V="0.01"/>
      <Cell N="LineColor" V="0"/>
      <Cell N="FillForegnd" V="1"/>
      <Cell N="VerticalAlign" V="1"/>
      <Section N="Character"><Row IX="0"><Cell N="Size" V="0.1666"/></Row></Section>
    </StyleSheet>
    <StyleSheet ID="3" NameU="Normal" LineStyle="0" FillStyle="0" TextStyle="0">
      <Cell N="LineWeight" V="0.02"/>
      <Cell N="FillPattern" V="1"/>
    </StyleSheet>
    <StyleSheet ID="7" LineStyle="8"/>
    <StyleSheet ID="8" LineStyle="7"><Cell N="LinePattern" V="2"/></StyleSheet>
  </StyleSheets>
</VisioDocument>"##;

    #[test]
    fn parses_sheets_and_color_table() {
        let doc = parse_document_part(DOC, DOCUMENT_PART).unwrap();
        assert_eq!(doc.styles.len(), 4);
        assert_eq!(doc.colors, ["#000000", "#FFFFFF"]);
        assert_eq!(doc.styles.get(3).unwrap().parents.line, Some(0));
    }

    #[test]
    fn chains_resolve_nearest_first_per_kind() {
        let doc = parse_document_part(DOC, DOCUMENT_PART).unwrap();
        let d = doc.styles.defaults_for(StyleRefs {
            line: Some(3),
            fill: Some(3),
            text: Some(3),
        });
        assert_eq!(d.cells.f64("LineWeight"), Some(0.02));
        assert_eq!(d.cells.f64("LineColor"), Some(0.0));
        assert_eq!(d.cells.f64("FillPattern"), Some(1.0));
        assert_eq!(d.cells.f64("FillForegnd"), Some(1.0));
        assert_eq!(d.cells.f64("VerticalAlign"), Some(1.0));
        assert_eq!(d.char_formats.len(), 1);
    }

    #[test]
    fn cells_only_flow_from_their_own_kind() {
        let doc = parse_document_part(DOC, DOCUMENT_PART).unwrap();
        let d = doc.styles.defaults_for(StyleRefs {
            fill: Some(0),
            ..Default::default()
        });
        assert_eq!(d.cells.f64("FillForegnd"), Some(1.0));
        assert!(d.cells.get("LineWeight").is_none());
    }

    #[test]
    fn cyclic_chains_terminate() {
        let doc = parse_document_part(DOC, DOCUMENT_PART).unwrap();
        let d = doc.styles.defaults_for(StyleRefs {
            line: Some(7),
            ..Default::default()
        });
        assert_eq!(d.cells.f64("LinePattern"), Some(2.0));
    }
}
