//! Theme color scheme (`a:clrScheme`) resolution.

use roxmltree::Document;

use crate::package::Package;
use crate::report::{IssueKind, ParseReport, PartIssue};
use crate::{Error, Result};

/// Slot names in index order (`THEMEVAL` numeric arguments index into this table).
pub const THEME_SLOTS: [&str; 12] = [
    "dk1", "lt1", "dk2", "lt2", "accent1", "accent2", "accent3", "accent4", "accent5", "accent6",
    "hlink", "folHlink",
];

/// Theme parts tried in order before falling back to any part under `visio/theme/`.
pub const THEME_CANDIDATES: [&str; 2] = ["visio/theme/theme1.xml", "visio/theme/theme.xml"];

/// Twelve named colors; an empty table is a valid (themeless) document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Theme {
    pub name: Option<String>,
    slots: [Option<String>; 12],
}

impl Theme {
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Case-insensitive slot lookup (`accent1`, `folHlink`, ...); value is `#RRGGBB`.
    pub fn slot(&self, name: &str) -> Option<&str> {
        let idx = THEME_SLOTS
            .iter()
            .position(|s| s.eq_ignore_ascii_case(name.trim()))?;
        self.index(idx)
    }

    pub fn index(&self, idx: usize) -> Option<&str> {
        self.slots.get(idx)?.as_deref()
    }

    pub fn accent1(&self) -> Option<&str> {
        self.index(4)
    }

    pub fn set_slot(&mut self, name: &str, hex: &str) {
        if let Some(idx) = THEME_SLOTS.iter().position(|s| s.eq_ignore_ascii_case(name)) {
            self.slots[idx] = Some(normalize_hex(hex));
        }
    }

    /// `(slot, color)` pairs that are set.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        THEME_SLOTS
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(name, v)| Some((*name, v.as_deref()?)))
    }

    /// Loads the first theme part found; a missing or malformed part yields an empty table and a
    /// report entry.
    pub fn load(package: &Package, report: &mut ParseReport) -> Theme {
        let Some(part) = find_theme_part(package) else {
            report.push(PartIssue::new(
                THEME_CANDIDATES[0],
                IssueKind::PartMissing,
                "no theme part; theme colors fall back to defaults",
            ));
            return Theme::default();
        };

        match package.part_str(&part).and_then(|xml| parse_theme(xml, &part)) {
            Ok(theme) => {
                report.parsed(&part);
                theme
            }
            Err(err) => {
                report.push(PartIssue::new(&part, IssueKind::SchemaParse, err.to_string()));
                Theme::default()
            }
        }
    }
}

fn normalize_hex(hex: &str) -> String {
    format!("#{}", hex.trim().trim_start_matches('#').to_ascii_uppercase())
}

pub fn find_theme_part(package: &Package) -> Option<String> {
    for candidate in THEME_CANDIDATES {
        if package.contains(candidate) {
            return Some(candidate.to_string());
        }
    }
    package
        .parts_under("visio/theme/")
        .map(|(name, _)| name)
        .find(|name| name.to_ascii_lowercase().ends_with(".xml") && !name.contains("/_rels/"))
        .map(str::to_string)
}

pub fn parse_theme(xml: &str, part: &str) -> Result<Theme> {
    let doc = Document::parse(xml).map_err(|e| Error::schema(part, e.to_string()))?;

    let mut theme = Theme {
        name: doc.root_element().attribute("name").map(str::to_string),
        ..Default::default()
    };

    let Some(scheme) = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "clrScheme")
    else {
        return Ok(theme);
    };

    for slot in scheme.children().filter(|n| n.is_element()) {
        let Some(color) = slot.children().find(|n| n.is_element()) else {
            continue;
        };
        let value = match color.tag_name().name() {
            "srgbClr" => color.attribute("val"),
            "sysClr" => color.attribute("lastClr"),
            _ => None,
        };
        if let Some(value) = value.filter(|v| v.len() == 6) {
            theme.set_slot(slot.tag_name().name(), value);
        }
    }

    Ok(theme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_zip, theme_xml};
    use crate::package::PackageLimits;

    const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme">
  <a:themeElements>
    <a:clrScheme name="Office">
      <a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>
      <a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>
      <a:dk2><a:srgbClr val="44546A"/></a:dk2>
      <a:lt2><a:srgbClr val="E7E6E6"/></a:lt2>
      <a:accent1><a:srgbClr val="4472c4"/></a:accent1>
      <a:accent2><a:srgbClr val="ED7D31"/></a:accent2>
      <a:hlink><a:srgbClr val="0563C1"/></a:hlink>
      <a:folHlink><a:srgbClr val="954F72"/></a:folHlink>
    </a:clrScheme>
  </a:themeElements>
</a:theme>"#;

    #[test]
    fn parses_color_scheme_slots() {
        let theme = parse_theme(THEME, "visio/theme/theme1.xml").unwrap();
        assert_eq!(theme.name.as_deref(), Some("Office Theme"));
        assert_eq!(theme.slot("dk1"), Some("#000000"));
        assert_eq!(theme.slot("ACCENT1"), Some("#4472C4"));
        assert_eq!(theme.slot("folhlink"), Some("#954F72"));
        assert_eq!(theme.slot("accent3"), None);
        assert_eq!(theme.index(4), theme.accent1());
        assert_eq!(theme.index(11), Some("#954F72"));
    }

    #[test]
    fn missing_theme_yields_empty_table() {
        let pkg = Package::from_bytes(&build_zip(&[("visio/document.xml", b"<x/>".as_slice())]), PackageLimits::default()).unwrap();
        let mut report = ParseReport::default();
        let theme = Theme::load(&pkg, &mut report);
        assert!(theme.is_empty());
        assert_eq!(report.issues_of(IssueKind::PartMissing).count(), 1);
    }

    #[test]
    fn falls_back_to_any_theme_part() {
        let xml = theme_xml(&[("accent1", "112233")]);
        let pkg = Package::from_bytes(
            &build_zip(&[("visio/theme/theme7.xml", xml.as_bytes())]),
            PackageLimits::default(),
        )
        .unwrap();
        let mut report = ParseReport::default();
        let theme = Theme::load(&pkg, &mut report);
        assert_eq!(theme.accent1(), Some("#112233"));
        assert!(report.is_clean());
    }

    #[test]
    fn malformed_theme_is_reported_not_fatal() {
        let pkg = Package::from_bytes(
            &build_zip(&[("visio/theme/theme1.xml", b"<a:theme".as_slice())]),
            PackageLimits::default(),
        )
        .unwrap();
        let mut report = ParseReport::default();
        assert!(Theme::load(&pkg, &mut report).is_empty());
        assert_eq!(report.issues_of(IssueKind::SchemaParse).count(), 1);
    }
}
