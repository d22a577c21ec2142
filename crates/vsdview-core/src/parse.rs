//! Shape model parser for `PageContents` / `MasterContents` parts.

use base64::Engine as _;
use roxmltree::{Document, Node};

use crate::model::{
    Cell, CellMap, Connect, ForeignData, ForeignSource, GeometrySection, Layer, MasterRef, Row,
    Shape, ShapeKind, ShapeText, StyleRefs, TextSegment,
};
use crate::rels::{Relationship, resolve_target};
use crate::report::{IssueKind, PartIssue};
use crate::utils::{
    attr_flag, attr_i32, attr_rel_id, attr_string, attr_u32, child_elements, first_child,
};
use crate::{Error, ParseOptions, Result};

/// Everything a shapes-bearing part contributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPart {
    pub shapes: Vec<Shape>,
    pub connects: Vec<Connect>,
    /// Contained problems (truncated sections, undecodable inline data).
    pub issues: Vec<PartIssue>,
}

/// Parses one page or master part.
///
/// Malformed XML is an [`Error::SchemaParse`]; callers decide whether that is fatal.
pub fn parse_shapes_part(xml: &str, part: &str, options: &ParseOptions) -> Result<ParsedPart> {
    let doc = Document::parse(xml).map_err(|e| Error::schema(part, e.to_string()))?;
    let root = doc.root_element();

    let mut ctx = ParseCtx {
        part,
        options,
        issues: Vec::new(),
    };

    let shapes = match first_child(root, "Shapes") {
        Some(node) => parse_shape_list(node, &mut ctx),
        None => Vec::new(),
    };

    let connects = first_child(root, "Connects")
        .map(|node| child_elements(node, "Connect").filter_map(parse_connect).collect())
        .unwrap_or_default();

    Ok(ParsedPart {
        shapes,
        connects,
        issues: ctx.issues,
    })
}

struct ParseCtx<'a> {
    part: &'a str,
    options: &'a ParseOptions,
    issues: Vec<PartIssue>,
}

fn parse_shape_list(node: Node<'_, '_>, ctx: &mut ParseCtx<'_>) -> Vec<Shape> {
    child_elements(node, "Shape")
        .filter_map(|n| parse_shape(n, ctx))
        .collect()
}

fn parse_shape(node: Node<'_, '_>, ctx: &mut ParseCtx<'_>) -> Option<Shape> {
    let Some(id) = attr_u32(node, "ID") else {
        ctx.issues.push(PartIssue::new(
            ctx.part,
            IssueKind::SchemaParse,
            "shape without a numeric ID skipped",
        ));
        return None;
    };

    let mut shape = Shape {
        id,
        name: attr_string(node, "Name"),
        name_u: attr_string(node, "NameU"),
        kind: ShapeKind::from_attr(node.attribute("Type")),
        master_ref: MasterRef {
            master: attr_u32(node, "Master"),
            master_shape: attr_u32(node, "MasterShape"),
        },
        styles: StyleRefs {
            line: attr_u32(node, "LineStyle"),
            fill: attr_u32(node, "FillStyle"),
            text: attr_u32(node, "TextStyle"),
        },
        cells: parse_cells(node),
        ..Default::default()
    };

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "Section" => parse_section_into(child, &mut shape, ctx),
            "Text" => shape.text = Some(parse_text(child)),
            "ForeignData" => shape.foreign_data = parse_foreign_data(child, ctx),
            "Shapes" => shape.sub_shapes = parse_shape_list(child, ctx),
            _ => {}
        }
    }

    Some(shape)
}

fn parse_section_into(node: Node<'_, '_>, shape: &mut Shape, ctx: &mut ParseCtx<'_>) {
    let Some(name) = node.attribute("N") else {
        return;
    };
    match name {
        "Geometry" => {
            let mut rows = parse_rows(node);
            let max = ctx.options.max_geometry_rows;
            if rows.len() > max {
                ctx.issues.push(PartIssue::new(
                    ctx.part,
                    IssueKind::SchemaParse,
                    format!(
                        "shape {} geometry section has {} rows; truncated to {max}",
                        shape.id,
                        rows.len()
                    ),
                ));
                rows.truncate(max);
            }
            shape.geometry.push(GeometrySection {
                ix: attr_u32(node, "IX").unwrap_or(shape.geometry.len() as u32),
                cells: parse_cells(node),
                rows,
                deleted: attr_flag(node, "Del"),
            });
        }
        "Character" => shape.char_formats = parse_rows(node),
        "Paragraph" => shape.para_formats = parse_rows(node),
        "Field" => shape.fields = parse_rows(node),
        "Controls" => shape.controls = parse_rows(node),
        "Connection" => shape.connection_points = parse_rows(node),
        "FillGradient" => shape.fill_gradient = parse_rows(node),
        _ => {}
    }
}

/// Direct `<Cell>` children of `node`.
pub(crate) fn parse_cells(node: Node<'_, '_>) -> CellMap {
    child_elements(node, "Cell")
        .filter_map(|c| {
            let name = c.attribute("N")?;
            Some((
                name.to_string(),
                Cell {
                    value: c.attribute("V").map(str::to_string),
                    formula: c.attribute("F").map(str::to_string),
                    unit: c.attribute("U").map(str::to_string),
                },
            ))
        })
        .collect()
}

pub(crate) fn parse_rows(section: Node<'_, '_>) -> Vec<Row> {
    child_elements(section, "Row")
        .enumerate()
        .map(|(pos, row)| Row {
            ix: attr_u32(row, "IX").unwrap_or(pos as u32),
            name: attr_string(row, "N"),
            kind: attr_string(row, "T"),
            cells: parse_cells(row),
            deleted: attr_flag(row, "Del"),
        })
        .collect()
}

/// Flattens `<Text>` content into runs, tracking the active `cp`/`pp` markers.
pub(crate) fn parse_text(node: Node<'_, '_>) -> ShapeText {
    let mut segments: Vec<TextSegment> = Vec::new();
    let mut char_ix = 0u32;
    let mut para_ix = 0u32;

    for child in node.children() {
        if child.is_text() {
            push_run(&mut segments, child.text().unwrap_or(""), char_ix, para_ix);
            continue;
        }
        if !child.is_element() {
            continue;
        }
        match child.tag_name().name() {
            "cp" => char_ix = attr_u32(child, "IX").unwrap_or(0),
            "pp" => para_ix = attr_u32(child, "IX").unwrap_or(0),
            "fld" => {
                let text: String = child
                    .descendants()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect();
                // Field runs are kept even when empty so the field value can be substituted.
                segments.push(TextSegment {
                    text: normalize_newlines(&text),
                    char_ix,
                    para_ix,
                    field_ix: Some(attr_u32(child, "IX").unwrap_or(0)),
                });
            }
            _ => {}
        }
    }

    ShapeText { segments }
}

fn push_run(
    segments: &mut Vec<TextSegment>,
    text: &str,
    char_ix: u32,
    para_ix: u32,
) {
    if text.is_empty() {
        return;
    }
    let text = normalize_newlines(text);
    match segments.last_mut() {
        Some(last)
            if last.char_ix == char_ix && last.para_ix == para_ix && last.field_ix.is_none() =>
        {
            last.text.push_str(&text);
        }
        _ => segments.push(TextSegment {
            text,
            char_ix,
            para_ix,
            field_ix: None,
        }),
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace(['\r', '\u{2028}', '\u{2029}'], "\n")
}

fn parse_foreign_data(node: Node<'_, '_>, ctx: &mut ParseCtx<'_>) -> Option<ForeignData> {
    let foreign_type = attr_string(node, "ForeignType").unwrap_or_else(|| "Bitmap".to_string());
    let compression = attr_string(node, "CompressionType");

    if let Some(rel) = first_child(node, "Rel") {
        let id = attr_rel_id(rel)?;
        return Some(ForeignData {
            foreign_type,
            compression,
            source: ForeignSource::Relationship { id, target: None },
        });
    }

    let payload: String = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .flat_map(|t| t.chars().filter(|c| !c.is_whitespace()))
        .collect();
    if payload.is_empty() {
        return None;
    }
    match base64::engine::general_purpose::STANDARD.decode(payload.as_bytes()) {
        Ok(data) => Some(ForeignData {
            foreign_type,
            compression,
            source: ForeignSource::Inline { data },
        }),
        Err(err) => {
            ctx.issues.push(PartIssue::new(
                ctx.part,
                IssueKind::Media,
                format!("inline foreign data is not valid base64: {err}"),
            ));
            None
        }
    }
}

/// Fills in [`ForeignSource::Relationship`] targets from the owning part's relationships.
///
/// Unknown relationship ids are left unresolved and returned so the caller can report them.
pub(crate) fn link_foreign_data(
    shapes: &mut [Shape],
    part: &str,
    rels: &[Relationship],
) -> Vec<String> {
    let mut unresolved = Vec::new();
    for shape in shapes {
        if let Some(ForeignData {
            source: ForeignSource::Relationship { id, target },
            ..
        }) = shape.foreign_data.as_mut()
        {
            match rels.iter().find(|r| &r.id == id) {
                Some(rel) => *target = Some(resolve_target(part, &rel.target)),
                None => unresolved.push(id.clone()),
            }
        }
        unresolved.extend(link_foreign_data(&mut shape.sub_shapes, part, rels));
    }
    unresolved
}

fn parse_connect(node: Node<'_, '_>) -> Option<Connect> {
    Some(Connect {
        from_sheet: attr_u32(node, "FromSheet")?,
        from_cell: attr_string(node, "FromCell"),
        from_part: attr_i32(node, "FromPart"),
        to_sheet: attr_u32(node, "ToSheet")?,
        to_cell: attr_string(node, "ToCell"),
        to_part: attr_i32(node, "ToPart"),
    })
}

/// `Layer` section rows of a `PageSheet`.
pub(crate) fn parse_layers(page_sheet: Node<'_, '_>) -> Vec<Layer> {
    child_elements(page_sheet, "Section")
        .filter(|s| s.attribute("N") == Some("Layer"))
        .flat_map(parse_rows)
        .map(|row| Layer {
            ix: row.ix,
            name: row.cells.str("Name").unwrap_or_default().to_string(),
            visible: row.cells.get("Visible").and_then(Cell::as_bool).unwrap_or(true),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<PageContents xmlns="http://schemas.microsoft.com/office/visio/2012/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <Shapes>
    <Shape ID="1" NameU="Process" Name="Process" Type="Shape" Master="2" LineStyle="3" FillStyle="3" TextStyle="3">
      <Cell N="PinX" V="4.25" U="IN"/>
      <Cell N="PinY" V="5.5"/>
      <Cell N="Width" V="1" F="Inh"/>
      <Cell N="LocPinX" F="Width*0.5"/>
      <Section N="Geometry" IX="0">
        <Cell N="NoFill" V="0"/>
        <Row T="MoveTo" IX="1"><Cell N="X" V="0"/><Cell N="Y" V="0"/></Row>
        <Row IX="2"><Cell N="X" V="1"/></Row>
        <Row T="LineTo" IX="3" Del="1"/>
      </Section>
      <Section N="Character"><Row IX="0"><Cell N="Color" V="#ff0000"/></Row><Row IX="1"><Cell N="Style" V="1"/></Row></Section>
      <Section N="Controls"><Row N="Row_1" IX="0"><Cell N="X" V="0.5"/><Cell N="Y" V="0"/></Row></Section>
      <Text><cp IX="0"/>Hello <cp IX="1"/>bold<fld IX="0">10/15/2026</fld>
next</Text>
    </Shape>
    <Shape ID="5" Type="Group">
      <Shapes>
        <Shape ID="6" MasterShape="7"><Cell N="PinX" V="0.1"/></Shape>
        <Shape ID="8" Type="Foreign">
          <ForeignData ForeignType="Bitmap" CompressionType="PNG"><Rel r:id="rId1"/></ForeignData>
        </Shape>
      </Shapes>
    </Shape>
    <Shape ID="9" Type="Foreign">
      <ForeignData ForeignType="Bitmap" CompressionType="PNG">iVBORw0K
      GgoAAAAN</ForeignData>
    </Shape>
  </Shapes>
  <Connects>
    <Connect FromSheet="10" FromCell="BeginX" FromPart="9" ToSheet="1" ToCell="Connections.X1" ToPart="100"/>
    <Connect FromSheet="10" FromCell="EndX" ToSheet="5"/>
  </Connects>
</PageContents>"##;

    fn parse(xml: &str) -> ParsedPart {
        parse_shapes_part(xml, "visio/pages/page1.xml", &ParseOptions::default()).unwrap()
    }

    #[test]
    fn parses_cells_sections_and_rows() {
        let part = parse(PAGE);
        assert_eq!(part.shapes.len(), 3);
        let s = &part.shapes[0];
        assert_eq!(s.id, 1);
        assert_eq!(s.master_ref.master, Some(2));
        assert_eq!(s.styles.fill, Some(3));
        assert_eq!(s.f64("PinX"), Some(4.25));
        assert_eq!(s.cell("PinX").unwrap().unit.as_deref(), Some("IN"));
        assert!(s.cell("LocPinX").unwrap().is_unresolved());

        let geo = &s.geometry[0];
        assert!(!geo.no_fill());
        assert_eq!(geo.rows.len(), 3);
        assert_eq!(geo.rows[1].kind, None);
        assert!(geo.rows[2].deleted);

        assert_eq!(s.char_formats.len(), 2);
        assert_eq!(s.controls[0].name.as_deref(), Some("Row_1"));
    }

    #[test]
    fn flattens_text_runs_and_fields() {
        let part = parse(PAGE);
        let text = part.shapes[0].text.as_ref().unwrap();
        assert_eq!(text.segments[0].text, "Hello ");
        assert_eq!(text.segments[0].char_ix, 0);
        assert_eq!(text.segments[1].text, "bold");
        assert_eq!(text.segments[1].char_ix, 1);
        assert_eq!(text.segments[2].field_ix, Some(0));
        assert_eq!(text.plain(), "Hello bold10/15/2026\nnext");
    }

    #[test]
    fn parses_groups_and_foreign_data() {
        let part = parse(PAGE);
        let group = &part.shapes[1];
        assert_eq!(group.kind, ShapeKind::Group);
        assert_eq!(group.sub_shapes.len(), 2);
        assert_eq!(group.sub_shapes[0].master_ref.master_shape, Some(7));
        let fd = group.sub_shapes[1].foreign_data.as_ref().unwrap();
        assert_eq!(
            fd.source,
            ForeignSource::Relationship {
                id: "rId1".into(),
                target: None
            }
        );

        let inline = part.shapes[2].foreign_data.as_ref().unwrap();
        let ForeignSource::Inline { data } = &inline.source else {
            panic!("expected inline data");
        };
        assert!(data.starts_with(b"\x89PNG"));
    }

    #[test]
    fn parses_connects() {
        let part = parse(PAGE);
        assert_eq!(part.connects.len(), 2);
        assert_eq!(part.connects[0].from_cell.as_deref(), Some("BeginX"));
        assert_eq!(part.connects[0].to_cell.as_deref(), Some("Connections.X1"));
        assert_eq!(part.connects[1].to_part, None);
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse(PAGE), parse(PAGE));
    }

    #[test]
    fn malformed_xml_is_a_schema_error() {
        let err = parse_shapes_part("<PageContents><Shapes>", "p.xml", &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::SchemaParse { ref part, .. } if part == "p.xml"));
    }

    #[test]
    fn oversized_geometry_sections_are_truncated_and_reported() {
        let mut rows = String::new();
        for i in 0..10 {
            rows.push_str(&format!(
                r#"<Row T="LineTo" IX="{i}"><Cell N="X" V="{i}"/><Cell N="Y" V="0"/></Row>"#
            ));
        }
        let xml = format!(
            r#"<PageContents><Shapes><Shape ID="1"><Section N="Geometry" IX="0">{rows}</Section></Shape></Shapes></PageContents>"#
        );
        let options = ParseOptions {
            max_geometry_rows: 4,
            ..Default::default()
        };
        let part = parse_shapes_part(&xml, "p.xml", &options).unwrap();
        assert_eq!(part.shapes[0].geometry[0].rows.len(), 4);
        assert_eq!(part.issues.len(), 1);
        assert_eq!(part.issues[0].kind, IssueKind::SchemaParse);
    }
}
