//! OPC relationship parts (`_rels/*.rels`) and part-name arithmetic.

use roxmltree::Document;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_: String,
    pub target: String,
    pub external: bool,
}

pub fn parse_relationships(xml: &str, part_name: &str) -> Result<Vec<Relationship>> {
    let doc = Document::parse(xml).map_err(|e| Error::schema(part_name, e.to_string()))?;

    let mut rels = Vec::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        if node.tag_name().name() != "Relationship" {
            continue;
        }

        let Some(id) = node.attribute("Id") else {
            continue;
        };
        let type_ = node.attribute("Type").unwrap_or_default().to_string();
        let target = node.attribute("Target").unwrap_or_default().to_string();
        let external = node
            .attribute("TargetMode")
            .is_some_and(|m| m.eq_ignore_ascii_case("External"));
        rels.push(Relationship {
            id: id.to_string(),
            type_,
            target,
            external,
        });
    }

    Ok(rels)
}

/// `visio/pages/page1.xml` -> `visio/pages/_rels/page1.xml.rels`.
pub fn rels_part_for(part: &str) -> String {
    let part = part.trim_start_matches(['/', '\\']);
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolves a relationship target against the directory of its source part.
///
/// Absolute targets (`/visio/media/image1.png`) are taken from the package root. `.` and `..`
/// segments are collapsed; `..` never climbs above the root.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    if !target.starts_with('/') {
        let source = source_part.trim_start_matches('/');
        if let Some((dir, _)) = source.rsplit_once('/') {
            segments.extend(dir.split('/').filter(|s| !s.is_empty()));
        }
    }

    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Canonical lookup key for a part name: no leading separators, `/` separators, ASCII lowercase,
/// percent escapes decoded.
pub fn normalize_part_name(name: &str) -> String {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = name.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let mut b = bytes[i];
        i += 1;
        if b == b'%' && i + 1 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i]), hex_val(bytes[i + 1])) {
                b = (hi << 4) | lo;
                i += 2;
            }
        }
        if b == b'\\' {
            b = b'/';
        }
        if out.is_empty() && b == b'/' {
            continue;
        }
        out.push(b.to_ascii_lowercase());
    }
    String::from_utf8_lossy(&out).into_owned()
}
