use regex::Regex;
use roxmltree::Node;
use std::sync::OnceLock;

fn polyline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)POLYLINE\s*\(([^)]*)\)").expect("valid regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("valid regex"))
}

/// Numeric arguments of a `POLYLINE(xType, yType, x1, y1, ...)` formula.
pub(crate) fn polyline_args(formula: &str) -> Option<Vec<f64>> {
    let args = polyline_re().captures(formula)?.get(1)?.as_str();
    let mut out = Vec::new();
    for arg in args.split(',') {
        let m = number_re().find(arg)?;
        out.push(m.as_str().parse::<f64>().ok()?);
    }
    Some(out)
}

pub(crate) fn attr_u32(node: Node<'_, '_>, name: &str) -> Option<u32> {
    node.attribute(name)?.trim().parse().ok()
}

pub(crate) fn attr_i32(node: Node<'_, '_>, name: &str) -> Option<i32> {
    node.attribute(name)?.trim().parse().ok()
}

pub(crate) fn attr_flag(node: Node<'_, '_>, name: &str) -> bool {
    matches!(node.attribute(name).map(str::trim), Some("1" | "true" | "TRUE"))
}

pub(crate) fn attr_string(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Value of an `r:id`-style attribute, whatever prefix the part binds the namespace to.
pub(crate) fn attr_rel_id(node: Node<'_, '_>) -> Option<String> {
    node.attributes()
        .find(|a| a.name() == "id" && a.namespace().is_some())
        .map(|a| a.value().to_string())
}

pub(crate) fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

pub(crate) fn first_child<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> Option<Node<'a, 'input>> {
    child_elements(node, name).next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyline_args_are_extracted() {
        assert_eq!(
            polyline_args("POLYLINE(0, 1, 0.5 in, 1, 1,0)"),
            Some(vec![0.0, 1.0, 0.5, 1.0, 1.0, 0.0])
        );
        assert_eq!(polyline_args("Width*0.5"), None);
        assert_eq!(polyline_args("POLYLINE(0, 1, Width, 1)"), None);
    }
}
