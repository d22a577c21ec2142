//! ZIP container access.
//!
//! The whole package is inflated into memory up front (under size limits) and the archive handle is
//! dropped before any XML is parsed, so nothing is read lazily during rendering.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::rels::{Relationship, normalize_part_name, parse_relationships, rels_part_for};
use crate::{Error, Result};

/// Default maximum uncompressed size permitted for any single part.
pub const DEFAULT_MAX_PART_BYTES: u64 = 256 * 1024 * 1024; // 256MiB

/// Default maximum total uncompressed bytes across the whole package.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512MiB

pub const MEDIA_DIR: &str = "visio/media/";

/// Size limits enforced by [`Package::from_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

/// Every file part of a package, keyed by its stored name.
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
    lookup: FxHashMap<String, String>,
}

impl Package {
    pub fn from_bytes(bytes: &[u8], limits: PackageLimits) -> Result<Self> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;

        let mut parts = BTreeMap::new();
        let mut used = 0u64;
        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = file.name().to_string();
            let declared = file.size();
            let buf = read_limited(file, &name, declared, &limits, &mut used)?;
            parts.insert(name, buf);
        }
        tracing::debug!(parts = parts.len(), bytes = used, "package inflated");

        Ok(Self::from_parts(parts))
    }

    pub(crate) fn from_parts(parts: BTreeMap<String, Vec<u8>>) -> Self {
        let lookup = parts
            .keys()
            .map(|name| (normalize_part_name(name), name.clone()))
            .collect();
        Self { parts, lookup }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Stored part names, in name order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Case-insensitive, separator-tolerant part lookup.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        if let Some(bytes) = self.parts.get(name) {
            return Some(bytes.as_slice());
        }
        let stored = self.lookup.get(&normalize_part_name(name))?;
        self.parts.get(stored).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.part(name).is_some()
    }

    /// Returns a part as UTF-8 text, stripping a leading byte-order mark.
    pub fn part_str(&self, name: &str) -> Result<&str> {
        let bytes = self.part(name).ok_or_else(|| Error::missing(name))?;
        let text = std::str::from_utf8(bytes).map_err(|e| Error::schema(name, e.to_string()))?;
        Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
    }

    /// Parses the relationship part that belongs to `source_part`.
    ///
    /// `Ok(None)` means the source part simply has no relationships.
    pub fn relationships(&self, source_part: &str) -> Result<Option<Vec<Relationship>>> {
        let rels_part = rels_part_for(source_part);
        if !self.contains(&rels_part) {
            return Ok(None);
        }
        let xml = self.part_str(&rels_part)?;
        parse_relationships(xml, &rels_part).map(Some)
    }

    /// Parts below `prefix` (compared case-insensitively), in name order.
    pub fn parts_under<'a>(&'a self, prefix: &str) -> impl Iterator<Item = (&'a str, &'a [u8])> {
        let prefix = normalize_part_name(prefix);
        self.parts
            .iter()
            .filter(move |(name, _)| normalize_part_name(name).starts_with(&prefix))
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }
}

fn read_limited(
    file: impl Read,
    part: &str,
    declared: u64,
    limits: &PackageLimits,
    used: &mut u64,
) -> Result<Vec<u8>> {
    let remaining = limits.max_total_bytes.saturating_sub(*used);
    let effective_max = limits.max_part_bytes.min(remaining);
    let limit_is_total = effective_max < limits.max_part_bytes;

    if declared > limits.max_part_bytes {
        return Err(Error::PartTooLarge {
            part: part.to_string(),
            size: declared,
            max: limits.max_part_bytes,
        });
    }
    if limit_is_total && declared > effective_max {
        return Err(Error::PackageTooLarge {
            total: used.saturating_add(declared),
            max: limits.max_total_bytes,
        });
    }

    // Size fields can be forged; never read more than one byte past the limit.
    let mut buf = Vec::new();
    file.take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    if observed > effective_max {
        if limit_is_total {
            return Err(Error::PackageTooLarge {
                total: used.saturating_add(observed),
                max: limits.max_total_bytes,
            });
        }
        return Err(Error::PartTooLarge {
            part: part.to_string(),
            size: observed,
            max: limits.max_part_bytes,
        });
    }

    *used = used.saturating_add(observed);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::build_zip;

    #[test]
    fn rejects_non_zip_bytes() {
        let err = Package::from_bytes(b"definitely not a zip", PackageLimits::default())
            .unwrap_err();
        assert!(matches!(err, Error::Package(_)));
    }

    #[test]
    fn lookup_is_case_and_separator_tolerant() {
        let bytes = build_zip(&[("visio/pages/page1.xml", b"<PageContents/>".as_slice())]);
        let pkg = Package::from_bytes(&bytes, PackageLimits::default()).unwrap();
        assert!(pkg.part("/Visio/Pages/Page1.xml").is_some());
        assert!(pkg.part("visio\\pages\\page1.xml").is_some());
        assert!(pkg.part("visio/pages/page2.xml").is_none());
    }

    #[test]
    fn enforces_part_limit() {
        let big = vec![b'a'; 2048];
        let bytes = build_zip(&[("visio/media/blob.bin", big.as_slice())]);
        let limits = PackageLimits {
            max_part_bytes: 1024,
            max_total_bytes: 1 << 20,
        };
        let err = Package::from_bytes(&bytes, limits).unwrap_err();
        assert!(matches!(err, Error::PartTooLarge { .. }));
    }

    #[test]
    fn enforces_total_limit() {
        let chunk = vec![b'a'; 600];
        let bytes = build_zip(&[
            ("a.bin", chunk.as_slice()),
            ("b.bin", chunk.as_slice()),
        ]);
        let limits = PackageLimits {
            max_part_bytes: 1024,
            max_total_bytes: 1000,
        };
        let err = Package::from_bytes(&bytes, limits).unwrap_err();
        assert!(matches!(err, Error::PackageTooLarge { .. }));
    }

    #[test]
    fn missing_rels_part_is_not_an_error() {
        let bytes = build_zip(&[("visio/pages/page1.xml", b"<PageContents/>".as_slice())]);
        let pkg = Package::from_bytes(&bytes, PackageLimits::default()).unwrap();
        assert_eq!(pkg.relationships("visio/pages/page1.xml").unwrap(), None);
    }

    #[test]
    fn part_str_strips_bom() {
        let bytes = build_zip(&[("x.xml", "\u{feff}<a/>".as_bytes())]);
        let pkg = Package::from_bytes(&bytes, PackageLimits::default()).unwrap();
        assert_eq!(pkg.part_str("x.xml").unwrap(), "<a/>");
    }
}
