//! In-memory package construction for tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for downstream test
//! suites. Produces just enough of the OPC layout for the loader: `pages.xml` + rels, page parts,
//! optional masters/theme/document parts and arbitrary extra parts.

use std::fmt::Write as _;
use std::io::{Cursor, Write};

use zip::ZipWriter;
use zip::write::FileOptions;

pub const VISIO_NS: &str = "http://schemas.microsoft.com/office/visio/2012/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(cursor);
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(bytes).expect("write zip entry");
    }

    zip.finish().expect("finish zip").into_inner()
}

/// One page of a synthesized package.
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub id: u32,
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub background: bool,
    pub back_page: Option<u32>,
    /// Raw `<Shape>` elements placed inside `<Shapes>`.
    pub shapes: String,
    /// Raw `<Connect>` elements placed inside `<Connects>`.
    pub connects: String,
    /// Extra PageSheet content (for example a `Layer` section).
    pub sheet_extra: String,
    /// `(id, target)` pairs written to the page's relationship part.
    pub rels: Vec<(String, String)>,
}

impl PageSpec {
    pub fn new(id: u32, name: &str, width: f64, height: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            width,
            height,
            background: false,
            back_page: None,
            shapes: String::new(),
            connects: String::new(),
            sheet_extra: String::new(),
            rels: Vec::new(),
        }
    }

    pub fn shapes(mut self, xml: &str) -> Self {
        self.shapes.push_str(xml);
        self
    }

    pub fn connects(mut self, xml: &str) -> Self {
        self.connects.push_str(xml);
        self
    }

    pub fn sheet(mut self, xml: &str) -> Self {
        self.sheet_extra.push_str(xml);
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    pub fn back_page(mut self, id: u32) -> Self {
        self.back_page = Some(id);
        self
    }

    pub fn rel(mut self, id: &str, target: &str) -> Self {
        self.rels.push((id.to_string(), target.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
struct MasterSpec {
    id: u32,
    name: String,
    shapes: String,
    /// When false the master is left out of `masters.xml.rels` (fallback resolution).
    linked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PackageBuilder {
    pages: Vec<PageSpec>,
    masters: Vec<MasterSpec>,
    theme: Option<String>,
    document: Option<String>,
    extra: Vec<(String, Vec<u8>)>,
    omit_pages_index: bool,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: PageSpec) -> Self {
        self.pages.push(page);
        self
    }

    /// Adds a master whose part is reachable through `masters.xml.rels`.
    pub fn master(mut self, id: u32, name: &str, shapes: &str) -> Self {
        self.masters.push(MasterSpec {
            id,
            name: name.to_string(),
            shapes: shapes.to_string(),
            linked: true,
        });
        self
    }

    /// Adds a master listed in `masters.xml` but absent from its rels part; the part is stored as
    /// `visio/masters/master{id}.xml`.
    pub fn unlinked_master(mut self, id: u32, name: &str, shapes: &str) -> Self {
        self.masters.push(MasterSpec {
            id,
            name: name.to_string(),
            shapes: shapes.to_string(),
            linked: false,
        });
        self
    }

    pub fn theme(mut self, xml: &str) -> Self {
        self.theme = Some(xml.to_string());
        self
    }

    /// Raw `visio/document.xml` content (style sheets, color table).
    pub fn document(mut self, xml: &str) -> Self {
        self.document = Some(xml.to_string());
        self
    }

    pub fn part(mut self, name: &str, bytes: &[u8]) -> Self {
        self.extra.push((name.to_string(), bytes.to_vec()));
        self
    }

    pub fn without_pages_index(mut self) -> Self {
        self.omit_pages_index = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

        entries.push((
            "[Content_Types].xml".to_string(),
            br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#.to_vec(),
        ));
        let document = self.document.unwrap_or_else(|| {
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><VisioDocument xmlns="{VISIO_NS}"/>"#)
        });
        entries.push(("visio/document.xml".to_string(), document.into_bytes()));

        let mut pages_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Pages xmlns="{VISIO_NS}" xmlns:r="{REL_NS}">"#
        );
        let mut pages_rels = rels_header();
        for (i, page) in self.pages.iter().enumerate() {
            let n = i + 1;
            let _ = write!(
                pages_xml,
                r#"<Page ID="{}" NameU="{}" Name="{}""#,
                page.id, page.name, page.name
            );
            if page.background {
                pages_xml.push_str(r#" Background="1""#);
            }
            if let Some(back) = page.back_page {
                let _ = write!(pages_xml, r#" BackPage="{back}""#);
            }
            let _ = write!(
                pages_xml,
                r#"><PageSheet><Cell N="PageWidth" V="{}" U="IN"/><Cell N="PageHeight" V="{}" U="IN"/>{}</PageSheet><Rel r:id="rId{n}"/></Page>"#,
                page.width, page.height, page.sheet_extra
            );
            let _ = write!(
                pages_rels,
                r#"<Relationship Id="rId{n}" Type="http://schemas.microsoft.com/visio/2010/relationships/page" Target="page{n}.xml"/>"#
            );

            let contents = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><PageContents xmlns="{VISIO_NS}" xmlns:r="{REL_NS}"><Shapes>{}</Shapes><Connects>{}</Connects></PageContents>"#,
                page.shapes, page.connects
            );
            entries.push((format!("visio/pages/page{n}.xml"), contents.into_bytes()));

            if !page.rels.is_empty() {
                let mut rels = rels_header();
                for (id, target) in &page.rels {
                    let _ = write!(
                        rels,
                        r#"<Relationship Id="{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="{target}"/>"#
                    );
                }
                rels.push_str("</Relationships>");
                entries.push((
                    format!("visio/pages/_rels/page{n}.xml.rels"),
                    rels.into_bytes(),
                ));
            }
        }
        pages_xml.push_str("</Pages>");
        pages_rels.push_str("</Relationships>");
        if !self.omit_pages_index {
            entries.push(("visio/pages/pages.xml".to_string(), pages_xml.into_bytes()));
            entries.push((
                "visio/pages/_rels/pages.xml.rels".to_string(),
                pages_rels.into_bytes(),
            ));
        }

        if !self.masters.is_empty() {
            let mut masters_xml = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Masters xmlns="{VISIO_NS}" xmlns:r="{REL_NS}">"#
            );
            let mut masters_rels = rels_header();
            for (i, master) in self.masters.iter().enumerate() {
                let n = i + 1;
                let file = if master.linked {
                    format!("master{n}.xml")
                } else {
                    format!("master{}.xml", master.id)
                };
                let _ = write!(
                    masters_xml,
                    r#"<Master ID="{}" NameU="{}" Name="{}"><Rel r:id="rId{n}"/></Master>"#,
                    master.id, master.name, master.name
                );
                if master.linked {
                    let _ = write!(
                        masters_rels,
                        r#"<Relationship Id="rId{n}" Type="http://schemas.microsoft.com/visio/2010/relationships/master" Target="{file}"/>"#
                    );
                }
                let contents = format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?><MasterContents xmlns="{VISIO_NS}" xmlns:r="{REL_NS}"><Shapes>{}</Shapes></MasterContents>"#,
                    master.shapes
                );
                entries.push((format!("visio/masters/{file}"), contents.into_bytes()));
            }
            masters_xml.push_str("</Masters>");
            masters_rels.push_str("</Relationships>");
            entries.push(("visio/masters/masters.xml".to_string(), masters_xml.into_bytes()));
            entries.push((
                "visio/masters/_rels/masters.xml.rels".to_string(),
                masters_rels.into_bytes(),
            ));
        }

        if let Some(theme) = self.theme {
            entries.push(("visio/theme/theme1.xml".to_string(), theme.into_bytes()));
        }

        entries.extend(self.extra);

        let refs: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
            .collect();
        build_zip(&refs)
    }
}

fn rels_header() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#.to_string()
}

/// A DrawingML theme part with the given `(slot, srgb hex)` pairs.
pub fn theme_xml(slots: &[(&str, &str)]) -> String {
    let mut scheme = String::new();
    for (slot, hex) in slots {
        let _ = write!(scheme, r#"<a:{slot}><a:srgbClr val="{hex}"/></a:{slot}>"#);
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Test"><a:themeElements><a:clrScheme name="Test">{scheme}</a:clrScheme></a:themeElements></a:theme>"#
    )
}

/// A 2-D rectangle shape with a four-row geometry section, positioned by its center.
pub fn rect_shape(id: u32, pin_x: f64, pin_y: f64, width: f64, height: f64) -> String {
    format!(
        r#"<Shape ID="{id}" Type="Shape"><Cell N="PinX" V="{pin_x}"/><Cell N="PinY" V="{pin_y}"/><Cell N="Width" V="{width}"/><Cell N="Height" V="{height}"/><Cell N="LocPinX" V="{lx}"/><Cell N="LocPinY" V="{ly}"/><Section N="Geometry" IX="0"><Row T="MoveTo" IX="1"><Cell N="X" V="0"/><Cell N="Y" V="0"/></Row><Row T="LineTo" IX="2"><Cell N="X" V="{width}"/><Cell N="Y" V="0"/></Row><Row T="LineTo" IX="3"><Cell N="X" V="{width}"/><Cell N="Y" V="{height}"/></Row><Row T="LineTo" IX="4"><Cell N="X" V="0"/><Cell N="Y" V="{height}"/></Row><Row T="LineTo" IX="5"><Cell N="X" V="0"/><Cell N="Y" V="0"/></Row></Section></Shape>"#,
        lx = width / 2.0,
        ly = height / 2.0,
    )
}
