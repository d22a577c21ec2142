//! Master catalog.
//!
//! `masters.xml` maps a Master ID to a relationship id; `masters.xml.rels` maps that id to a
//! master part. When either hop is missing the Master ID itself names the part
//! (`master{ID}.xml`), and that fallback is reported as [`MasterLocation::Fallback`].

use indexmap::IndexMap;
use roxmltree::Document;
use rustc_hash::FxHashMap;

use crate::model::Shape;
use crate::package::Package;
use crate::parse::{link_foreign_data, parse_shapes_part};
use crate::rels::{normalize_part_name, resolve_target};
use crate::report::{IssueKind, ParseReport, PartIssue};
use crate::utils::{attr_rel_id, attr_string, attr_u32, child_elements, first_child};
use crate::{Error, ParseOptions, Result};

pub const MASTERS_DIR: &str = "visio/masters/";
pub const MASTERS_INDEX_PART: &str = "visio/masters/masters.xml";

/// Where a Master ID's part was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MasterLocation {
    /// Through `masters.xml` and its relationship part.
    Resolved { part: String },
    /// The relationship chain was incomplete; the Master ID was used as the part locator.
    Fallback { part: String },
}

impl MasterLocation {
    pub fn part(&self) -> &str {
        match self {
            Self::Resolved { part } | Self::Fallback { part } => part,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// An entry of `masters.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterEntry {
    pub id: u32,
    pub name: Option<String>,
    pub rel_id: Option<String>,
}

/// Parsed master part; never rendered directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Master {
    pub id: Option<u32>,
    pub name: Option<String>,
    pub part: String,
    /// Top-level shapes in document order.
    pub shapes: Vec<Shape>,
    by_id: FxHashMap<u32, Shape>,
}

impl Master {
    pub fn new(id: Option<u32>, name: Option<String>, part: String, shapes: Vec<Shape>) -> Self {
        let by_id = shapes
            .iter()
            .flat_map(|s| s.walk())
            .map(|s| (s.id, s.clone()))
            .collect();
        Self {
            id,
            name,
            part,
            shapes,
            by_id,
        }
    }

    /// Any shape of the master, at any nesting depth.
    pub fn shape(&self, id: u32) -> Option<&Shape> {
        self.by_id.get(&id)
    }

    pub fn first_shape(&self) -> Option<&Shape> {
        self.shapes.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterCatalog {
    entries: IndexMap<u32, MasterEntry>,
    /// Relationship id -> master part.
    rel_targets: FxHashMap<String, String>,
    /// Masters reachable through the relationship chain.
    by_id: IndexMap<u32, Master>,
    /// Every other master part, keyed by normalized part name.
    by_locator: IndexMap<String, Master>,
}

impl MasterCatalog {
    pub fn load(package: &Package, options: &ParseOptions, report: &mut ParseReport) -> Result<Self> {
        let mut catalog = MasterCatalog::default();

        if package.contains(MASTERS_INDEX_PART) {
            match package
                .part_str(MASTERS_INDEX_PART)
                .and_then(|xml| parse_masters_index(xml, MASTERS_INDEX_PART))
            {
                Ok(entries) => {
                    report.parsed(MASTERS_INDEX_PART);
                    catalog.entries = entries.into_iter().map(|e| (e.id, e)).collect();
                }
                Err(err) => {
                    if options.strict {
                        return Err(err);
                    }
                    report.push(PartIssue::new(
                        MASTERS_INDEX_PART,
                        IssueKind::SchemaParse,
                        err.to_string(),
                    ));
                }
            }
            match package.relationships(MASTERS_INDEX_PART) {
                Ok(Some(rels)) => {
                    catalog.rel_targets = rels
                        .into_iter()
                        .map(|r| (r.id, resolve_target(MASTERS_INDEX_PART, &r.target)))
                        .collect();
                }
                Ok(None) => report.push(PartIssue::new(
                    crate::rels::rels_part_for(MASTERS_INDEX_PART),
                    IssueKind::PartMissing,
                    "masters index has no relationship part; using Master IDs as locators",
                )),
                Err(err) => {
                    if options.strict {
                        return Err(err);
                    }
                    report.push(PartIssue::new(
                        crate::rels::rels_part_for(MASTERS_INDEX_PART),
                        IssueKind::SchemaParse,
                        err.to_string(),
                    ));
                }
            }
        }

        // Part -> Master ID for every fully resolvable entry.
        let mut resolved: FxHashMap<String, u32> = FxHashMap::default();
        for entry in catalog.entries.values() {
            if let Some(part) = entry
                .rel_id
                .as_ref()
                .and_then(|rel| catalog.rel_targets.get(rel))
            {
                resolved.insert(normalize_part_name(part), entry.id);
            }
        }

        let master_parts: Vec<String> = package
            .parts_under(MASTERS_DIR)
            .map(|(name, _)| name.to_string())
            .filter(|name| is_master_part(name))
            .collect();

        for part in master_parts {
            let parsed = package
                .part_str(&part)
                .and_then(|xml| parse_shapes_part(xml, &part, options));
            let parsed = match parsed {
                Ok(parsed) => parsed,
                Err(err) => {
                    if options.strict {
                        return Err(err);
                    }
                    report.push(PartIssue::new(&part, IssueKind::SchemaParse, err.to_string()));
                    continue;
                }
            };
            report.parsed(&part);
            report.extend(parsed.issues);
            let mut shapes = parsed.shapes;
            if let Ok(Some(rels)) = package.relationships(&part) {
                for id in link_foreign_data(&mut shapes, &part, &rels) {
                    report.push(PartIssue::new(
                        &part,
                        IssueKind::Media,
                        format!("foreign data relationship `{id}` not found"),
                    ));
                }
            }

            let key = normalize_part_name(&part);
            match resolved.get(&key) {
                Some(&id) => {
                    let name = catalog.entries.get(&id).and_then(|e| e.name.clone());
                    catalog
                        .by_id
                        .insert(id, Master::new(Some(id), name, part, shapes));
                }
                None => {
                    tracing::debug!(part = %part, "master part not reachable through masters.xml; keyed by locator");
                    let id = fallback_id(&key);
                    let name = id
                        .and_then(|id| catalog.entries.get(&id))
                        .and_then(|e| e.name.clone());
                    catalog
                        .by_locator
                        .insert(key, Master::new(id, name, part, shapes));
                }
            }
        }

        tracing::debug!(
            resolved = catalog.by_id.len(),
            fallback = catalog.by_locator.len(),
            "master catalog loaded"
        );
        Ok(catalog)
    }

    /// Adds a master reachable by its ID; masters without one are keyed by their part name.
    pub fn insert(&mut self, master: Master) {
        match master.id {
            Some(id) => {
                self.by_id.insert(id, master);
            }
            None => {
                self.by_locator
                    .insert(normalize_part_name(&master.part), master);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty() && self.by_locator.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len() + self.by_locator.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MasterEntry> {
        self.entries.values()
    }

    /// Every parsed master: resolved ones first, then locator-keyed ones.
    pub fn iter(&self) -> impl Iterator<Item = &Master> {
        self.by_id.values().chain(self.by_locator.values())
    }

    /// Resolves a Master ID to its part.
    ///
    /// Returns [`Error::PartMissing`] when neither the relationship chain nor the ID-as-locator
    /// fallback leads to a parsed master.
    pub fn resolve_location(&self, master_id: u32) -> Result<MasterLocation> {
        if let Some(master) = self.by_id.get(&master_id) {
            return Ok(MasterLocation::Resolved {
                part: master.part.clone(),
            });
        }
        let locator = fallback_locator(master_id);
        match self.by_locator.get(&locator) {
            Some(master) => Ok(MasterLocation::Fallback {
                part: master.part.clone(),
            }),
            None => Err(Error::missing(&locator)),
        }
    }

    pub fn get(&self, master_id: u32) -> Option<&Master> {
        self.by_id
            .get(&master_id)
            .or_else(|| self.by_locator.get(&fallback_locator(master_id)))
    }

    /// A master's shape by id, or its first shape when `shape_id` is `None`.
    pub fn shape(&self, master_id: u32, shape_id: Option<u32>) -> Option<&Shape> {
        let master = self.get(master_id)?;
        match shape_id {
            Some(id) => master.shape(id),
            None => master.first_shape(),
        }
    }
}

fn fallback_locator(master_id: u32) -> String {
    format!("{MASTERS_DIR}master{master_id}.xml")
}

fn fallback_id(normalized_part: &str) -> Option<u32> {
    normalized_part
        .strip_prefix(MASTERS_DIR)?
        .strip_prefix("master")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn is_master_part(name: &str) -> bool {
    let lower = normalize_part_name(name);
    let Some(file) = lower.strip_prefix(MASTERS_DIR) else {
        return false;
    };
    !file.contains('/') && file.ends_with(".xml") && file != "masters.xml"
}

pub fn parse_masters_index(xml: &str, part: &str) -> Result<Vec<MasterEntry>> {
    let doc = Document::parse(xml).map_err(|e| Error::schema(part, e.to_string()))?;
    Ok(child_elements(doc.root_element(), "Master")
        .filter_map(|node| {
            Some(MasterEntry {
                id: attr_u32(node, "ID")?,
                name: attr_string(node, "NameU").or_else(|| attr_string(node, "Name")),
                rel_id: first_child(node, "Rel").and_then(attr_rel_id),
            })
        })
        .collect())
}
