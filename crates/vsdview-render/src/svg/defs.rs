//! Shared `<defs>` entries: arrow markers, gradients, the drop-shadow filter and group clips.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::style::{ArrowKind, ArrowStyle, LinearGradient};
use crate::util::{escape_xml, fmt3};

#[derive(Debug, Default)]
pub(crate) struct Defs {
    prefix: String,
    markers: IndexMap<String, String>,
    gradients: Vec<String>,
    clips: Vec<String>,
    shadow: bool,
}

impl Defs {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Default::default()
        }
    }

    /// One marker per kind/size/color; drawn pointing along +x and reversed at path starts.
    pub(crate) fn marker(&mut self, arrow: &ArrowStyle) -> String {
        let key = format!(
            "{}-{}-{}",
            arrow.kind.as_str(),
            fmt3(arrow.size).replace('.', "_"),
            arrow.color.to_hex().trim_start_matches('#')
        );
        let id = format!("{}-marker-{key}", self.prefix);
        if self.markers.contains_key(&key) {
            return id;
        }

        let s = arrow.size.max(1.0);
        let half = s / 2.0;
        let color = arrow.color;
        let (ref_x, body) = match arrow.kind {
            ArrowKind::Filled => (
                s,
                format!(
                    r#"<path d="M0 0 L{} {} L0 {} Z" fill="{color}"/>"#,
                    fmt3(s),
                    fmt3(half),
                    fmt3(s)
                ),
            ),
            ArrowKind::Open => (
                s,
                format!(
                    r#"<path d="M0 0 L{} {} L0 {}" fill="none" stroke="{color}" stroke-width="1"/>"#,
                    fmt3(s),
                    fmt3(half),
                    fmt3(s)
                ),
            ),
            ArrowKind::Circle => (
                half,
                format!(
                    r#"<circle cx="{h}" cy="{h}" r="{h}" fill="{color}"/>"#,
                    h = fmt3(half)
                ),
            ),
            ArrowKind::Diamond => (
                s,
                format!(
                    r#"<path d="M0 {h} L{h} 0 L{s} {h} L{h} {s} Z" fill="{color}"/>"#,
                    h = fmt3(half),
                    s = fmt3(s)
                ),
            ),
        };
        let xml = format!(
            r#"<marker id="{id}" viewBox="0 0 {s} {s}" refX="{rx}" refY="{h}" markerWidth="{s}" markerHeight="{s}" markerUnits="userSpaceOnUse" orient="auto-start-reverse">{body}</marker>"#,
            id = escape_xml(&id),
            s = fmt3(s),
            rx = fmt3(ref_x),
            h = fmt3(half),
        );
        self.markers.insert(key, xml);
        id
    }

    pub(crate) fn gradient(&mut self, gradient: &LinearGradient) -> String {
        let id = format!("{}-gradient-{}", self.prefix, self.gradients.len() + 1);
        let (sin, cos) = gradient.angle.to_radians().sin_cos();
        let mut xml = format!(
            r#"<linearGradient id="{}" x1="{}" y1="{}" x2="{}" y2="{}">"#,
            escape_xml(&id),
            fmt3(0.5 - cos / 2.0),
            fmt3(0.5 + sin / 2.0),
            fmt3(0.5 + cos / 2.0),
            fmt3(0.5 - sin / 2.0)
        );
        for stop in &gradient.stops {
            let _ = write!(
                xml,
                r#"<stop offset="{}" stop-color="{}""#,
                fmt3(stop.offset),
                stop.color
            );
            if stop.opacity < 1.0 {
                let _ = write!(xml, r#" stop-opacity="{}""#, fmt3(stop.opacity));
            }
            xml.push_str("/>");
        }
        xml.push_str("</linearGradient>");
        self.gradients.push(xml);
        id
    }

    pub(crate) fn shadow_filter(&mut self) -> String {
        self.shadow = true;
        format!("{}-shadow", self.prefix)
    }

    /// Clip rectangle in the clipped element's own user space.
    pub(crate) fn clip_rect(&mut self, width: f64, height: f64) -> String {
        let id = format!("{}-clip-{}", self.prefix, self.clips.len() + 1);
        self.clips.push(format!(
            r#"<clipPath id="{}"><rect x="0" y="0" width="{}" height="{}"/></clipPath>"#,
            escape_xml(&id),
            fmt3(width),
            fmt3(height)
        ));
        id
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.gradients.is_empty() && self.clips.is_empty() && !self.shadow
    }

    pub(crate) fn write(&self, out: &mut String) {
        if self.is_empty() {
            out.push_str("<defs/>");
            return;
        }
        out.push_str("<defs>");
        if self.shadow {
            let _ = write!(
                out,
                r##"<filter id="{}" x="-20%" y="-20%" width="140%" height="140%"><feDropShadow dx="2" dy="2" stdDeviation="1.5" flood-color="#000000" flood-opacity="0.35"/></filter>"##,
                escape_xml(&format!("{}-shadow", self.prefix))
            );
        }
        for xml in self.markers.values() {
            out.push_str(xml);
        }
        for xml in &self.gradients {
            out.push_str(xml);
        }
        for xml in &self.clips {
            out.push_str(xml);
        }
        out.push_str("</defs>");
    }
}
