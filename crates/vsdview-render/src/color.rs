//! Color cell resolution.
//!
//! Cells carry colors as `#RRGGBB`, `RGB(r,g,b)`, `HSL(h,s,l)`, a palette index, or a theme
//! formula (`THEMEVAL(...)`, often wrapped in `GUARD(...)`). Theme-origin cells cache a value the
//! authoring tool computed against its own theme; for fills and lines that cached value is only
//! trusted when it is a non-black literal.

use std::sync::OnceLock;

use regex::Regex;
use vsdview_core::Theme;
use vsdview_core::model::Cell;

use crate::{Error, Result};

/// Fallback accent when no theme slot is available.
pub const DEFAULT_ACCENT: Rgb = Rgb::new(0x44, 0x72, 0xC4);

/// The fixed 25-entry standard palette, by index.
pub const STANDARD_PALETTE: [&str; 25] = [
    "#000000", "#FFFFFF", "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF", "#00FFFF",
    "#800000", "#008000", "#000080", "#808000", "#800080", "#008080", "#C0C0C0", "#E6E6E6",
    "#CDCDCD", "#B3B3B3", "#9A9A9A", "#808080", "#666666", "#4D4D4D", "#333333", "#1A1A1A",
    "#F2F2F2",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#RGB` or `#RRGGBB` (leading `#` optional).
    pub fn parse_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().strip_prefix('#').unwrap_or(raw.trim());
        let nibble = |c: u8| (c as char).to_digit(16).map(|d| d as u8);
        match hex.len() {
            6 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Self::new((v >> 16) as u8, (v >> 8) as u8, v as u8))
            }
            3 => {
                let b = hex.as_bytes();
                let (r, g, bl) = (nibble(b[0])?, nibble(b[1])?, nibble(b[2])?);
                Some(Self::new(r * 17, g * 17, bl * 17))
            }
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn is_black(self) -> bool {
        self == Self::BLACK
    }

    /// Mixes towards white by `amount` (0..=1).
    pub fn lighten(self, amount: f64) -> Self {
        let amount = amount.clamp(0.0, 1.0);
        let mix = |c: u8| (c as f64 + (255.0 - c as f64) * amount).round() as u8;
        Self::new(mix(self.r), mix(self.g), mix(self.b))
    }

    /// Components in 0..=255, hue mapped over the full circle.
    pub fn from_hsl(h: f64, s: f64, l: f64) -> Self {
        let h = (h / 255.0).rem_euclid(1.0) * 6.0;
        let s = (s / 255.0).clamp(0.0, 1.0);
        let l = (l / 255.0).clamp(0.0, 1.0);

        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        let to = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::new(to(r), to(g), to(b))
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// What a color is used for; theme fallbacks differ per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    Fill,
    Line,
    Text,
}

impl ColorRole {
    fn distrusts_black(self) -> bool {
        matches!(self, Self::Fill | Self::Line)
    }
}

/// Document-wide inputs for color resolution.
#[derive(Debug, Clone, Copy)]
pub struct ColorContext<'a> {
    pub theme: &'a Theme,
    /// Document color table; overrides the standard palette for indices it covers.
    pub document_colors: &'a [String],
    pub default_accent: Rgb,
}

impl<'a> ColorContext<'a> {
    pub fn new(theme: &'a Theme, document_colors: &'a [String]) -> Self {
        Self {
            theme,
            document_colors,
            default_accent: DEFAULT_ACCENT,
        }
    }

    fn slot(&self, name: &str) -> Option<Rgb> {
        self.theme.slot(name).and_then(Rgb::parse_hex)
    }

    fn accent1(&self) -> Rgb {
        self.slot("accent1").unwrap_or(self.default_accent)
    }

    /// Palette index lookup (document table first).
    pub fn indexed(&self, index: usize) -> Option<Rgb> {
        self.document_colors
            .get(index)
            .and_then(|c| Rgb::parse_hex(c))
            .or_else(|| STANDARD_PALETTE.get(index).and_then(|c| Rgb::parse_hex(c)))
    }

    /// QuickStyle color index: `n % 100` selects `dk1`, `lt1` or `accent1..6`.
    pub fn quick_style(&self, index: f64) -> Option<Rgb> {
        if !index.is_finite() || index < 0.0 {
            return None;
        }
        let slot = match (index as u32) % 100 {
            0 => "dk1".to_string(),
            1 => "lt1".to_string(),
            n @ 2..=7 => format!("accent{}", n - 1),
            _ => return None,
        };
        self.slot(&slot)
    }
}

fn functional_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(RGB|HSL)\s*\(\s*([-+]?\d+(?:\.\d+)?)\s*,\s*([-+]?\d+(?:\.\d+)?)\s*,\s*([-+]?\d+(?:\.\d+)?)\s*\)\s*$",
        )
        .expect("valid regex")
    })
}

fn themeval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)THEMEVAL\(\s*"?([^",)]*)"?"#).expect("valid regex")
    })
}

/// `#hex`, `RGB()` or `HSL()`; palette indices are not literals.
pub fn parse_literal(raw: &str) -> Option<Rgb> {
    let raw = raw.trim();
    if raw.starts_with('#') {
        return Rgb::parse_hex(raw);
    }
    let caps = functional_re().captures(raw)?;
    let n = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());
    let (a, b, c) = (n(2)?, n(3)?, n(4)?);
    let byte = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    if caps[1].eq_ignore_ascii_case("RGB") {
        Some(Rgb::new(byte(a), byte(b), byte(c)))
    } else {
        Some(Rgb::from_hsl(a, b, c))
    }
}

fn parse_index(raw: &str) -> Option<usize> {
    let v: f64 = raw.trim().parse().ok()?;
    (v.is_finite() && v >= 0.0 && v.fract() == 0.0).then_some(v as usize)
}

/// Theme slot named by a `THEMEVAL` argument (slot name, numeric index or semantic alias).
fn themeval_slot(arg: &str, role: ColorRole) -> Option<String> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Some(match role {
            ColorRole::Text => "dk1".to_string(),
            ColorRole::Fill | ColorRole::Line => "accent1".to_string(),
        });
    }
    if let Some(ix) = parse_index(arg) {
        return vsdview_core::theme::THEME_SLOTS
            .get(ix)
            .map(|s| s.to_string());
    }
    let lower = arg.to_ascii_lowercase();
    if let Some(n) = lower.strip_prefix("accentcolor") {
        let n = if n.is_empty() { 1 } else { n.parse::<u32>().ok()? };
        return (1..=6).contains(&n).then(|| format!("accent{n}"));
    }
    match lower.as_str() {
        "fillcolor" | "linecolor" => Some("accent1".to_string()),
        "textcolor" | "fontcolor" => Some("dk1".to_string()),
        "backgroundcolor" => Some("lt1".to_string()),
        _ => Some(lower),
    }
}

/// Resolves one color cell for `role`.
///
/// Returns [`Error::ColorResolution`] when the cell names no color at all; callers apply their
/// own default.
pub fn resolve_color(cell: &Cell, role: ColorRole, ctx: &ColorContext<'_>) -> Result<Rgb> {
    let value = cell.as_str();
    let theme_origin = cell.formula_contains("THEMEVAL") || cell.formula_contains("GUARD");

    if !theme_origin {
        if let Some(raw) = value {
            if let Some(rgb) = parse_literal(raw) {
                return Ok(rgb);
            }
            if let Some(rgb) = parse_index(raw).and_then(|ix| ctx.indexed(ix)) {
                return Ok(rgb);
            }
        }
        return Err(Error::ColorResolution {
            value: value
                .or(cell.formula.as_deref())
                .unwrap_or_default()
                .to_string(),
        });
    }

    let formula = cell.formula.as_deref().unwrap_or_default();
    if let Some(caps) = themeval_re().captures(formula) {
        let slot = themeval_slot(&caps[1], role).and_then(|slot| ctx.slot(&slot));
        match slot {
            Some(rgb) if !(role.distrusts_black() && rgb.is_black()) => return Ok(rgb),
            _ => {}
        }
    }

    let literal = value.and_then(parse_literal);
    match role {
        ColorRole::Text => {
            let indexed = || value.and_then(parse_index).and_then(|ix| ctx.indexed(ix));
            Ok(literal
                .or_else(indexed)
                .or_else(|| ctx.slot("dk1"))
                .unwrap_or(Rgb::BLACK))
        }
        ColorRole::Fill | ColorRole::Line => match literal {
            Some(rgb) if !rgb.is_black() => Ok(rgb),
            _ => Ok(ctx.accent1()),
        },
    }
}

/// `1 - transparency`, clamped; transparency may be a fraction or a percentage.
pub fn opacity(transparency: Option<&Cell>) -> f64 {
    let t = transparency.and_then(Cell::as_f64).unwrap_or(0.0);
    let t = if t > 1.0 { t / 100.0 } else { t };
    (1.0 - t).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsdview_core::theme::parse_theme;
    use vsdview_core::testing::theme_xml;

    fn cell(v: Option<&str>, f: Option<&str>) -> Cell {
        Cell {
            value: v.map(str::to_string),
            formula: f.map(str::to_string),
            unit: None,
        }
    }

    fn theme(slots: &[(&str, &str)]) -> Theme {
        parse_theme(&theme_xml(slots), "visio/theme/theme1.xml").unwrap()
    }

    #[test]
    fn literal_forms_resolve_directly() {
        let t = Theme::default();
        let ctx = ColorContext::new(&t, &[]);
        let r = |v: &str| resolve_color(&cell(Some(v), None), ColorRole::Fill, &ctx).unwrap();
        assert_eq!(r("#ff8000").to_hex(), "#FF8000");
        assert_eq!(r("RGB(0, 128, 255)"), Rgb::new(0, 128, 255));
        assert_eq!(r("HSL(0,255,128)"), Rgb::new(255, 1, 1));
        assert_eq!(r("HSL(85,255,128)"), Rgb::new(1, 255, 1));
        assert_eq!(r("4"), Rgb::new(0, 0, 255));
        assert_eq!(r("24"), Rgb::new(0xF2, 0xF2, 0xF2));
    }

    #[test]
    fn document_color_table_overrides_palette() {
        let t = Theme::default();
        let colors = vec!["#000000".to_string(), "#123456".to_string()];
        let ctx = ColorContext::new(&t, &colors);
        let rgb = resolve_color(&cell(Some("1"), None), ColorRole::Line, &ctx).unwrap();
        assert_eq!(rgb.to_hex(), "#123456");
        let rgb = resolve_color(&cell(Some("2"), None), ColorRole::Line, &ctx).unwrap();
        assert_eq!(rgb.to_hex(), "#FF0000");
    }

    #[test]
    fn guarded_palette_index_is_not_trusted_for_fills() {
        let t = Theme::default();
        let ctx = ColorContext::new(&t, &[]);
        let rgb =
            resolve_color(&cell(Some("6"), Some("GUARD(6)")), ColorRole::Fill, &ctx).unwrap();
        assert_ne!(rgb.to_hex(), "#FF00FF");
        assert_eq!(rgb, DEFAULT_ACCENT);

        let themed = theme(&[("accent1", "5B9BD5")]);
        let ctx = ColorContext::new(&themed, &[]);
        let rgb =
            resolve_color(&cell(Some("6"), Some("GUARD(6)")), ColorRole::Fill, &ctx).unwrap();
        assert_eq!(rgb.to_hex(), "#5B9BD5");
    }

    #[test]
    fn themeval_resolves_slots_and_aliases() {
        let t = theme(&[
            ("dk1", "000000"),
            ("lt1", "FFFFFF"),
            ("accent1", "4472C4"),
            ("accent2", "ED7D31"),
        ]);
        let ctx = ColorContext::new(&t, &[]);
        let r = |f: &str, role| resolve_color(&cell(Some("#000000"), Some(f)), role, &ctx).unwrap();
        assert_eq!(r(r#"THEMEVAL("AccentColor2")"#, ColorRole::Fill).to_hex(), "#ED7D31");
        assert_eq!(r(r#"THEMEVAL("FillColor",0)"#, ColorRole::Fill).to_hex(), "#4472C4");
        assert_eq!(r("THEMEVAL(5)", ColorRole::Line).to_hex(), "#ED7D31");
        assert_eq!(r("THEMEVAL()", ColorRole::Text).to_hex(), "#000000");
        assert_eq!(r(r#"THEMEVAL("BackgroundColor")"#, ColorRole::Fill).to_hex(), "#FFFFFF");
        // Black from the theme is distrusted for fills, trusted for text.
        assert_eq!(r(r#"THEMEVAL("dk1")"#, ColorRole::Fill).to_hex(), "#4472C4");
        assert_eq!(r(r#"THEMEVAL("dk1")"#, ColorRole::Text).to_hex(), "#000000");
    }

    #[test]
    fn theme_origin_keeps_non_black_literals() {
        let t = Theme::default();
        let ctx = ColorContext::new(&t, &[]);
        let rgb = resolve_color(
            &cell(Some("#C00000"), Some(r#"GUARD(THEMEVAL("Missing"))"#)),
            ColorRole::Line,
            &ctx,
        )
        .unwrap();
        assert_eq!(rgb.to_hex(), "#C00000");
    }

    #[test]
    fn unresolvable_values_are_errors() {
        let t = Theme::default();
        let ctx = ColorContext::new(&t, &[]);
        let err = resolve_color(&cell(Some("Themed"), None), ColorRole::Fill, &ctx).unwrap_err();
        assert!(matches!(err, Error::ColorResolution { ref value } if value == "Themed"));
        assert!(resolve_color(&cell(None, None), ColorRole::Fill, &ctx).is_err());
    }

    #[test]
    fn quick_style_selects_theme_slots() {
        let t = theme(&[("lt1", "FFFFFF"), ("accent3", "A5A5A5")]);
        let ctx = ColorContext::new(&t, &[]);
        assert_eq!(ctx.quick_style(1.0), Some(Rgb::WHITE));
        assert_eq!(ctx.quick_style(104.0).map(Rgb::to_hex).as_deref(), Some("#A5A5A5"));
        assert_eq!(ctx.quick_style(8.0), None);
    }

    #[test]
    fn transparency_maps_to_opacity() {
        assert_eq!(opacity(None), 1.0);
        assert_eq!(opacity(Some(&cell(Some("0.25"), None))), 0.75);
        assert!((opacity(Some(&cell(Some("40%"), None))) - 0.6).abs() < 1e-12);
        assert!((opacity(Some(&cell(Some("2"), None))) - 0.98).abs() < 1e-12);
    }
}
