//! Inheritance merge: style sheets < master shape < local shape.
//!
//! [`resolve_shape`] is pure; it returns a new effective [`Shape`] and never touches the parsed
//! document, so renders are independent of call order.

use crate::geom::Size;
use crate::masters::{MasterCatalog, MasterLocation};
use crate::model::{GeometrySection, Row, Shape};
use crate::styles::StyleSheets;

/// Read-only sources an effective shape is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct InheritContext<'a> {
    pub masters: &'a MasterCatalog,
    pub styles: &'a StyleSheets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveShape {
    pub shape: Shape,
    /// Master context handed to sub-shapes.
    pub master_id: Option<u32>,
    /// Where the master was found, when one was used.
    pub master_location: Option<MasterLocation>,
    /// The master's own Width/Height when geometry was adopted wholesale from it.
    pub master_dims: Option<Size>,
}

impl EffectiveShape {
    pub fn used_master_fallback(&self) -> bool {
        self.master_location
            .as_ref()
            .is_some_and(MasterLocation::is_fallback)
    }
}

/// Merges `shape` with its master (own reference, else `inherited_master`) and style sheets.
///
/// The master shape is the one named by `MasterShape`, else the master's first shape. Master
/// sub-shapes are only copied into shapes carrying their own `Master`; a shape resolved through
/// the group context never re-expands the group it sits in.
pub fn resolve_shape(
    shape: &Shape,
    ctx: &InheritContext<'_>,
    inherited_master: Option<u32>,
) -> EffectiveShape {
    let own_master = shape.master_ref.master;
    let master_id = own_master.or(inherited_master);

    let master_shape = master_id.and_then(|id| ctx.masters.shape(id, shape.master_ref.master_shape));
    let master_location = master_shape
        .and(master_id)
        .and_then(|id| ctx.masters.resolve_location(id).ok());
    if let Some(loc) = master_location.as_ref().filter(|l| l.is_fallback()) {
        tracing::debug!(shape = shape.id, part = %loc.part(), "master resolved by fallback locator");
    }
    if master_id.is_some() && master_shape.is_none() {
        tracing::debug!(shape = shape.id, master = ?master_id, "master shape not found");
    }

    let style_refs = match master_shape {
        Some(m) => shape.styles.or(m.styles),
        None => shape.styles,
    };
    let defaults = ctx.styles.defaults_for(style_refs);

    let Some(master) = master_shape else {
        let mut out = shape.clone();
        out.styles = style_refs;
        out.cells = shape.cells.overlay(&defaults.cells);
        if out.char_formats.is_empty() {
            out.char_formats = defaults.char_formats;
        }
        if out.para_formats.is_empty() {
            out.para_formats = defaults.para_formats;
        }
        out.geometry = live_sections(&shape.geometry);
        return EffectiveShape {
            shape: out,
            master_id,
            master_location: None,
            master_dims: None,
        };
    };

    let base_cells = master.cells.overlay(&defaults.cells);
    let cells = shape.cells.overlay(&base_cells);
    let one_d = cells.contains("BeginX") && cells.contains("EndX");

    let mut master_dims = None;
    let geometry = if shape.geometry.is_empty() {
        if !master.geometry.is_empty() {
            master_dims = master.dims();
        }
        live_sections(&master.geometry)
    } else if one_d {
        live_sections(&shape.geometry)
    } else {
        merge_geometry(&shape.geometry, &master.geometry)
    };

    let pick = |local: &Vec<Row>, inherited: &Vec<Row>| {
        if local.is_empty() {
            inherited.clone()
        } else {
            local.clone()
        }
    };

    let mut char_formats = pick(&shape.char_formats, &master.char_formats);
    if char_formats.is_empty() {
        char_formats = defaults.char_formats;
    }
    let mut para_formats = pick(&shape.para_formats, &master.para_formats);
    if para_formats.is_empty() {
        para_formats = defaults.para_formats;
    }

    let effective = Shape {
        id: shape.id,
        name: shape.name.clone().or_else(|| master.name.clone()),
        name_u: shape.name_u.clone().or_else(|| master.name_u.clone()),
        kind: shape.kind,
        master_ref: shape.master_ref,
        styles: style_refs,
        cells,
        geometry,
        text: shape.text.clone().or_else(|| master.text.clone()),
        char_formats,
        para_formats,
        fields: pick(&shape.fields, &master.fields),
        controls: pick(&shape.controls, &master.controls),
        connection_points: pick(&shape.connection_points, &master.connection_points),
        fill_gradient: pick(&shape.fill_gradient, &master.fill_gradient),
        sub_shapes: if shape.sub_shapes.is_empty() && own_master.is_some() {
            master.sub_shapes.clone()
        } else {
            shape.sub_shapes.clone()
        },
        foreign_data: shape
            .foreign_data
            .clone()
            .or_else(|| master.foreign_data.clone()),
    };

    EffectiveShape {
        shape: effective,
        master_id,
        master_location,
        master_dims,
    }
}

/// Section-by-section geometry merge keyed by section `IX`, then row-by-row keyed by row `IX`.
///
/// Master order is preserved; local sections/rows without a master counterpart are appended and
/// deleted ones remove their master counterpart.
pub fn merge_geometry(local: &[GeometrySection], master: &[GeometrySection]) -> Vec<GeometrySection> {
    let mut out = Vec::with_capacity(master.len().max(local.len()));
    for m in master {
        match local.iter().find(|s| s.ix == m.ix) {
            Some(l) if l.deleted => {}
            Some(l) => out.push(GeometrySection {
                ix: m.ix,
                cells: l.cells.overlay(&m.cells),
                rows: merge_rows(&l.rows, &m.rows),
                deleted: false,
            }),
            None if m.deleted => {}
            None => out.push(m.clone()),
        }
    }
    for l in local {
        if !l.deleted && !master.iter().any(|m| m.ix == l.ix) {
            out.push(GeometrySection {
                rows: l.rows.iter().filter(|r| !r.deleted).cloned().collect(),
                ..l.clone()
            });
        }
    }
    out
}

/// Row-level merge: a local row replaces the master row with the same `IX` (its cells laid over
/// the master row's cells); other master rows pass through unchanged, in master order.
pub fn merge_rows(local: &[Row], master: &[Row]) -> Vec<Row> {
    let mut out = Vec::with_capacity(master.len() + local.len());
    for m in master {
        match local.iter().find(|r| r.ix == m.ix) {
            Some(l) if l.deleted => {}
            Some(l) => out.push(Row {
                ix: m.ix,
                name: l.name.clone().or_else(|| m.name.clone()),
                kind: l.kind.clone().or_else(|| m.kind.clone()),
                cells: l.cells.overlay(&m.cells),
                deleted: false,
            }),
            None if m.deleted => {}
            None => out.push(m.clone()),
        }
    }
    for l in local {
        if !l.deleted && !master.iter().any(|m| m.ix == l.ix) {
            out.push(l.clone());
        }
    }
    out
}

fn live_sections(sections: &[GeometrySection]) -> Vec<GeometrySection> {
    sections
        .iter()
        .filter(|s| !s.deleted)
        .map(|s| GeometrySection {
            rows: s.rows.iter().filter(|r| !r.deleted).cloned().collect(),
            ..s.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::size;
    use crate::masters::Master;
    use crate::model::{Cell, CellMap, MasterRef, ShapeText, TextSegment};

    fn cells(pairs: &[(&str, &str)]) -> CellMap {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), Cell::from_value(*v)))
            .collect()
    }

    fn row(ix: u32, kind: Option<&str>, pairs: &[(&str, &str)]) -> Row {
        Row {
            ix,
            kind: kind.map(str::to_string),
            cells: cells(pairs),
            ..Default::default()
        }
    }

    fn rect_geometry(w: f64, h: f64) -> GeometrySection {
        let (w, h) = (w.to_string(), h.to_string());
        GeometrySection {
            ix: 0,
            rows: vec![
                row(0, Some("MoveTo"), &[("X", "0"), ("Y", "0")]),
                row(1, Some("LineTo"), &[("X", &w), ("Y", "0")]),
                row(2, Some("LineTo"), &[("X", &w), ("Y", &h)]),
                row(3, Some("LineTo"), &[("X", "0"), ("Y", &h)]),
            ],
            ..Default::default()
        }
    }

    fn catalog_with(master_id: u32, shapes: Vec<Shape>) -> MasterCatalog {
        let mut catalog = MasterCatalog::default();
        catalog.insert(Master::new(
            Some(master_id),
            Some("M".into()),
            format!("visio/masters/master{master_id}.xml"),
            shapes,
        ));
        catalog
    }

    fn master_rect() -> Shape {
        Shape {
            id: 5,
            cells: cells(&[("Width", "2"), ("Height", "1"), ("FillForegnd", "#00FF00")]),
            geometry: vec![rect_geometry(2.0, 1.0)],
            text: Some(ShapeText {
                segments: vec![TextSegment {
                    text: "from master".into(),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }
    }

    fn instance(pairs: &[(&str, &str)]) -> Shape {
        Shape {
            id: 1,
            master_ref: MasterRef {
                master: Some(2),
                master_shape: Some(5),
            },
            cells: cells(pairs),
            ..Default::default()
        }
    }

    #[test]
    fn empty_geometry_is_adopted_with_master_dims() {
        let catalog = catalog_with(2, vec![master_rect()]);
        let styles = StyleSheets::default();
        let ctx = InheritContext {
            masters: &catalog,
            styles: &styles,
        };

        let eff = resolve_shape(&instance(&[("Width", "4"), ("Height", "2")]), &ctx, None);
        assert_eq!(eff.shape.geometry, vec![rect_geometry(2.0, 1.0)]);
        assert_eq!(eff.master_dims, Some(size(2.0, 1.0)));
        assert_eq!(eff.shape.f64("Width"), Some(4.0));
        assert_eq!(eff.shape.cells.str("FillForegnd"), Some("#00FF00"));
        assert_eq!(eff.shape.plain_text().as_deref(), Some("from master"));
        assert_eq!(eff.master_id, Some(2));
    }

    #[test]
    fn partial_row_override_keeps_master_order() {
        let catalog = catalog_with(2, vec![master_rect()]);
        let styles = StyleSheets::default();
        let ctx = InheritContext {
            masters: &catalog,
            styles: &styles,
        };
        let mut shape = instance(&[]);
        shape.geometry = vec![GeometrySection {
            ix: 0,
            rows: vec![row(2, None, &[("X", "9")])],
            ..Default::default()
        }];

        let eff = resolve_shape(&shape, &ctx, None);
        let rows = &eff.shape.geometry[0].rows;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().map(|r| r.ix).collect::<Vec<_>>(), [0, 1, 2, 3]);
        assert_eq!(rows[2].kind.as_deref(), Some("LineTo"));
        assert_eq!(rows[2].f64("X"), Some(9.0));
        assert_eq!(rows[2].f64("Y"), Some(1.0));
        assert_eq!(rows[0], master_rect().geometry[0].rows[0]);
        assert_eq!(rows[1], master_rect().geometry[0].rows[1]);
        assert_eq!(rows[3], master_rect().geometry[0].rows[3]);
        assert_eq!(eff.master_dims, None);
    }

    #[test]
    fn deleted_rows_remove_master_rows() {
        let local = vec![Row {
            ix: 1,
            deleted: true,
            ..Default::default()
        }];
        let merged = merge_rows(&local, &rect_geometry(1.0, 1.0).rows);
        assert_eq!(merged.iter().map(|r| r.ix).collect::<Vec<_>>(), [0, 2, 3]);
    }

    #[test]
    fn connectors_keep_their_own_geometry() {
        let catalog = catalog_with(2, vec![master_rect()]);
        let styles = StyleSheets::default();
        let ctx = InheritContext {
            masters: &catalog,
            styles: &styles,
        };
        let mut shape = instance(&[("BeginX", "0"), ("EndX", "1")]);
        shape.geometry = vec![GeometrySection {
            ix: 0,
            rows: vec![
                row(1, Some("MoveTo"), &[("X", "0"), ("Y", "0")]),
                row(2, Some("LineTo"), &[("X", "1"), ("Y", "0")]),
            ],
            ..Default::default()
        }];
        let eff = resolve_shape(&shape, &ctx, None);
        assert_eq!(eff.shape.geometry[0].rows.len(), 2);
    }

    #[test]
    fn group_context_resolves_sub_shapes() {
        let catalog = catalog_with(2, vec![master_rect()]);
        let styles = StyleSheets::default();
        let ctx = InheritContext {
            masters: &catalog,
            styles: &styles,
        };
        let child = Shape {
            id: 11,
            master_ref: MasterRef {
                master: None,
                master_shape: Some(5),
            },
            ..Default::default()
        };
        let eff = resolve_shape(&child, &ctx, Some(2));
        assert_eq!(eff.shape.f64("Width"), Some(2.0));

        let bare = Shape {
            id: 12,
            ..Default::default()
        };
        let eff = resolve_shape(&bare, &ctx, Some(2));
        assert_eq!(eff.master_id, Some(2));
        assert_eq!(eff.shape.f64("Width"), Some(2.0));
        assert_eq!(eff.shape.geometry, master_rect().geometry);
        assert!(eff.master_dims.is_some());
    }

    #[test]
    fn context_child_does_not_reexpand_the_group() {
        let group = Shape {
            id: 1,
            cells: cells(&[("Width", "2"), ("Height", "1")]),
            sub_shapes: vec![master_rect()],
            ..Default::default()
        };
        let catalog = catalog_with(2, vec![group]);
        let styles = StyleSheets::default();
        let ctx = InheritContext {
            masters: &catalog,
            styles: &styles,
        };
        let bare = Shape {
            id: 12,
            ..Default::default()
        };
        let eff = resolve_shape(&bare, &ctx, Some(2));
        assert_eq!(eff.shape.f64("Width"), Some(2.0));
        assert!(eff.shape.sub_shapes.is_empty());

        let instance = Shape {
            id: 20,
            master_ref: MasterRef {
                master: Some(2),
                master_shape: None,
            },
            ..Default::default()
        };
        assert_eq!(resolve_shape(&instance, &ctx, None).shape.sub_shapes.len(), 1);
    }

    #[test]
    fn resolve_is_pure() {
        let catalog = catalog_with(2, vec![master_rect()]);
        let styles = StyleSheets::default();
        let ctx = InheritContext {
            masters: &catalog,
            styles: &styles,
        };
        let shape = instance(&[("Width", "4")]);
        let before = shape.clone();
        let a = resolve_shape(&shape, &ctx, None);
        let b = resolve_shape(&shape, &ctx, None);
        assert_eq!(a, b);
        assert_eq!(shape, before);
    }
}
