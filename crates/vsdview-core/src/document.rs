//! Whole-document load: pages, masters, theme, style sheets and media.

use std::path::Path;

use indexmap::IndexMap;
use roxmltree::Document as XmlDocument;
use rustc_hash::FxHashMap;

use crate::masters::MasterCatalog;
use crate::model::{CellMap, Connect, Layer, Shape};
use crate::package::{MEDIA_DIR, Package};
use crate::parse::{link_foreign_data, parse_cells, parse_layers, parse_shapes_part};
use crate::rels::{normalize_part_name, resolve_target};
use crate::report::{IssueKind, ParseReport, PartIssue};
use crate::styles::{DocumentSheet, StyleSheets};
use crate::theme::Theme;
use crate::utils::{attr_flag, attr_rel_id, attr_string, attr_u32, child_elements, first_child};
use crate::{Error, ParseOptions, Result};

pub const PAGES_DIR: &str = "visio/pages/";
pub const PAGES_INDEX_PART: &str = "visio/pages/pages.xml";

/// Letter portrait, used when a page sheet carries no size.
const DEFAULT_PAGE_SIZE: (f64, f64) = (8.5, 11.0);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Position in page order (0-based).
    pub index: usize,
    pub id: u32,
    pub name: String,
    pub name_u: Option<String>,
    /// Inches.
    pub width: f64,
    /// Inches.
    pub height: f64,
    pub is_background: bool,
    /// Index of the page composed behind this one.
    pub background: Option<usize>,
    pub shapes: Vec<Shape>,
    pub connects: Vec<Connect>,
    pub layers: Vec<Layer>,
    /// `PageSheet` cells.
    pub sheet: CellMap,
    pub part: String,
}

impl Page {
    /// Every shape on the page, nested ones included.
    pub fn shape_count(&self) -> usize {
        self.shapes.iter().map(|s| s.walk().count()).sum()
    }

    /// Depth-first search for a shape by id at any nesting depth.
    pub fn find_shape(&self, id: u32) -> Option<&Shape> {
        self.shapes
            .iter()
            .flat_map(|s| s.walk())
            .find(|s| s.id == id)
    }

    pub fn layer(&self, ix: u32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.ix == ix)
    }
}

/// Files under `visio/media/`, keyed by part name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStore {
    files: IndexMap<String, Vec<u8>>,
}

impl MediaStore {
    fn from_package(package: &Package) -> Self {
        let files = package
            .parts_under(MEDIA_DIR)
            .map(|(name, bytes)| (normalize_part_name(name), bytes.to_vec()))
            .collect();
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Lookup by part name (`visio/media/image1.png`), case-insensitive.
    pub fn get(&self, part: &str) -> Option<&[u8]> {
        self.files.get(&normalize_part_name(part)).map(Vec::as_slice)
    }

    /// Lookup by bare file name (`image1.png`).
    pub fn by_file_name(&self, file_name: &str) -> Option<&[u8]> {
        self.get(&format!("{MEDIA_DIR}{file_name}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// An immutable, fully parsed package.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    pub masters: MasterCatalog,
    pub theme: Theme,
    pub styles: StyleSheets,
    /// Document color table (`#RRGGBB` by index); empty when the document defines none.
    pub colors: Vec<String>,
    pub media: MediaStore,
    pub report: ParseReport,
}

impl Document {
    pub fn open(path: impl AsRef<Path>, options: &ParseOptions) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes, options)
    }

    pub fn from_bytes(bytes: &[u8], options: &ParseOptions) -> Result<Self> {
        let package = Package::from_bytes(bytes, options.limits)?;
        Self::from_package(&package, options)
    }

    pub fn from_package(package: &Package, options: &ParseOptions) -> Result<Self> {
        if package.parts_under("visio/").next().is_none() {
            return Err(Error::InvalidPackage {
                message: "no `visio/` parts; not a Visio drawing package".to_string(),
            });
        }

        let mut report = ParseReport::default();
        let theme = Theme::load(package, &mut report);
        let sheet = DocumentSheet::load(package, &mut report);
        let masters = MasterCatalog::load(package, options, &mut report)?;
        let media = MediaStore::from_package(package);

        let entries = page_entries(package, options, &mut report)?;
        let listed = entries.len();
        let mut pages = Vec::with_capacity(listed);
        let mut back_ids = Vec::with_capacity(listed);
        for (position, entry) in entries.into_iter().enumerate() {
            let back_id = entry.back_page;
            // Unparseable pages are skipped; their issue stays in the report.
            if let Some(mut page) = load_page(package, options, &mut report, position, entry)? {
                page.index = pages.len();
                pages.push(page);
                back_ids.push(back_id);
            }
        }
        if listed > 0 && pages.is_empty() {
            return Err(Error::InvalidPackage {
                message: format!("none of the {listed} page parts could be parsed"),
            });
        }

        link_backgrounds(&mut pages, &back_ids, options, &mut report)?;

        tracing::debug!(
            pages = pages.len(),
            masters = masters.len(),
            media = media.len(),
            issues = report.issues().len(),
            "document loaded"
        );

        Ok(Self {
            pages,
            masters,
            theme,
            styles: sheet.styles,
            colors: sheet.colors,
            media,
            report,
        })
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A `<Page>` of `pages.xml`, or a page part discovered by scanning.
#[derive(Debug, Clone, Default)]
struct PageEntry {
    id: u32,
    name: Option<String>,
    name_u: Option<String>,
    background: bool,
    back_page: Option<u32>,
    sheet: CellMap,
    layers: Vec<Layer>,
    part: Option<String>,
}

fn page_entries(
    package: &Package,
    options: &ParseOptions,
    report: &mut ParseReport,
) -> Result<Vec<PageEntry>> {
    if !package.contains(PAGES_INDEX_PART) {
        report.push(PartIssue::new(
            PAGES_INDEX_PART,
            IssueKind::PartMissing,
            "no page index; scanning page parts",
        ));
        return Ok(scan_page_parts(package));
    }

    let mut entries = match package
        .part_str(PAGES_INDEX_PART)
        .and_then(|xml| parse_pages_index(xml, PAGES_INDEX_PART))
    {
        Ok(entries) => {
            report.parsed(PAGES_INDEX_PART);
            entries
        }
        Err(err) if options.strict => return Err(err),
        Err(err) => {
            report.push(PartIssue::new(
                PAGES_INDEX_PART,
                IssueKind::SchemaParse,
                err.to_string(),
            ));
            return Ok(scan_page_parts(package));
        }
    };

    let rels = match package.relationships(PAGES_INDEX_PART) {
        Ok(rels) => rels.unwrap_or_default(),
        Err(err) if options.strict => return Err(err),
        Err(err) => {
            report.push(PartIssue::new(
                crate::rels::rels_part_for(PAGES_INDEX_PART),
                IssueKind::SchemaParse,
                err.to_string(),
            ));
            Vec::new()
        }
    };
    let targets: FxHashMap<&str, String> = rels
        .iter()
        .map(|r| (r.id.as_str(), resolve_target(PAGES_INDEX_PART, &r.target)))
        .collect();

    for (pos, entry) in entries.iter_mut().enumerate() {
        let resolved = entry
            .part
            .as_deref()
            .and_then(|rel_id| targets.get(rel_id).cloned());
        // Without a usable relationship, pages are numbered in index order.
        entry.part = Some(resolved.unwrap_or_else(|| format!("{PAGES_DIR}page{}.xml", pos + 1)));
    }
    Ok(entries)
}

fn parse_pages_index(xml: &str, part: &str) -> Result<Vec<PageEntry>> {
    let doc = XmlDocument::parse(xml).map_err(|e| Error::schema(part, e.to_string()))?;
    Ok(child_elements(doc.root_element(), "Page")
        .enumerate()
        .map(|(pos, node)| {
            let page_sheet = first_child(node, "PageSheet");
            PageEntry {
                id: attr_u32(node, "ID").unwrap_or(pos as u32),
                name: attr_string(node, "Name"),
                name_u: attr_string(node, "NameU"),
                background: attr_flag(node, "Background"),
                back_page: attr_u32(node, "BackPage"),
                sheet: page_sheet.map(parse_cells).unwrap_or_default(),
                layers: page_sheet.map(parse_layers).unwrap_or_default(),
                part: first_child(node, "Rel").and_then(attr_rel_id),
            }
        })
        .collect())
}

/// `visio/pages/page{N}.xml` parts in numeric order.
fn scan_page_parts(package: &Package) -> Vec<PageEntry> {
    let mut found: Vec<(u32, String)> = package
        .parts_under(PAGES_DIR)
        .filter_map(|(name, _)| {
            let n = normalize_part_name(name)
                .strip_prefix(PAGES_DIR)?
                .strip_prefix("page")?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    found.sort();
    found
        .into_iter()
        .map(|(n, part)| PageEntry {
            id: n,
            part: Some(part),
            ..Default::default()
        })
        .collect()
}

/// Returns the page and whether its part parsed.
fn load_page(
    package: &Package,
    options: &ParseOptions,
    report: &mut ParseReport,
    index: usize,
    entry: PageEntry,
) -> Result<Option<Page>> {
    let part = entry
        .part
        .clone()
        .unwrap_or_else(|| format!("{PAGES_DIR}page{}.xml", index + 1));
    let (default_w, default_h) = DEFAULT_PAGE_SIZE;
    let width = entry.sheet.f64("PageWidth").filter(|w| *w > 0.0);
    let height = entry.sheet.f64("PageHeight").filter(|h| *h > 0.0);
    if width.is_none() || height.is_none() {
        tracing::debug!(page = index, "page sheet has no size; using letter");
    }

    let mut page = Page {
        index,
        id: entry.id,
        name: entry
            .name
            .or_else(|| entry.name_u.clone())
            .unwrap_or_else(|| format!("Page-{}", index + 1)),
        name_u: entry.name_u,
        width: width.unwrap_or(default_w),
        height: height.unwrap_or(default_h),
        is_background: entry.background,
        background: None,
        shapes: Vec::new(),
        connects: Vec::new(),
        layers: entry.layers,
        sheet: entry.sheet,
        part: part.clone(),
    };

    let parsed = package
        .part_str(&part)
        .and_then(|xml| parse_shapes_part(xml, &part, options));
    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(err) if options.strict => return Err(err),
        Err(err) => {
            let kind = match &err {
                Error::PartMissing { .. } => IssueKind::PartMissing,
                _ => IssueKind::SchemaParse,
            };
            report.push(PartIssue::new(&part, kind, err.to_string()));
            return Ok(None);
        }
    };
    report.parsed(&part);
    if options.strict {
        if let Some(issue) = parsed
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::SchemaParse)
        {
            return Err(Error::schema(&issue.part, issue.message.clone()));
        }
    }
    report.extend(parsed.issues);

    let mut shapes = parsed.shapes;
    match package.relationships(&part) {
        Ok(Some(rels)) => {
            for id in link_foreign_data(&mut shapes, &part, &rels) {
                report.push(PartIssue::new(
                    &part,
                    IssueKind::Media,
                    format!("foreign data relationship `{id}` not found"),
                ));
            }
        }
        Ok(None) => {}
        Err(err) => report.push(PartIssue::new(
            crate::rels::rels_part_for(&part),
            IssueKind::SchemaParse,
            err.to_string(),
        )),
    }
    page.shapes = shapes;
    page.connects = parsed.connects;
    tracing::trace!(page = index, shapes = page.shapes.len(), "page parsed");
    Ok(Some(page))
}

/// Turns `BackPage` page IDs into page indexes.
fn link_backgrounds(
    pages: &mut [Page],
    back_ids: &[Option<u32>],
    options: &ParseOptions,
    report: &mut ParseReport,
) -> Result<()> {
    let by_id: FxHashMap<u32, usize> = pages.iter().map(|p| (p.id, p.index)).collect();
    for (page, back_id) in pages.iter_mut().zip(back_ids) {
        let Some(back_id) = *back_id else {
            continue;
        };
        let problem = match by_id.get(&back_id) {
            Some(&ix) if ix == page.index => {
                format!("page `{}` names itself as its background; ignored", page.name)
            }
            Some(&ix) => {
                page.background = Some(ix);
                continue;
            }
            None => format!(
                "page `{}` names unknown background page ID {back_id}; ignored",
                page.name
            ),
        };
        if options.strict {
            return Err(Error::schema(PAGES_INDEX_PART, problem));
        }
        report.push(PartIssue::new(
            PAGES_INDEX_PART,
            IssueKind::SchemaParse,
            problem,
        ));
    }
    Ok(())
}
