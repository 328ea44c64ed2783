//! Namespace-aware lookups over a parsed metadata document.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use roxmltree::{Document, Node};

use crate::error::ImportError;

pub const GMD_NS: &str = "http://www.isotc211.org/2005/gmd";
pub const GCO_NS: &str = "http://www.isotc211.org/2005/gco";
pub const GMX_NS: &str = "http://www.isotc211.org/2005/gmx";

/// Expanded element name: namespace URI and local name.
pub type Name = (&'static str, &'static str);

pub fn gmd(local: &'static str) -> Name {
    (GMD_NS, local)
}

pub fn gco(local: &'static str) -> Name {
    (GCO_NS, local)
}

pub fn gmx(local: &'static str) -> Name {
    (GMX_NS, local)
}

/// Decode raw bytes into document text. Invalid UTF-8 becomes U+FFFD and a
/// leading byte-order mark is dropped.
pub fn document_text(bytes: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => Cow::Borrowed(text.trim_start_matches('\u{feff}')),
        Cow::Owned(text) => Cow::Owned(text.trim_start_matches('\u{feff}').to_string()),
    }
}

/// Parse `text`, retrying once with undeclared entity references kept as
/// literal text. `repaired` holds the rewritten text the document may
/// borrow from.
pub fn parse_document<'input>(
    text: &'input str,
    repaired: &'input mut Option<String>,
) -> Result<Document<'input>, ImportError> {
    match Document::parse(text) {
        Ok(document) => Ok(document),
        Err(roxmltree::Error::UnknownEntityReference(name, _)) => {
            tracing::warn!(entity = %name, "Undeclared entity in metadata, keeping it as text");
            let fixed = repaired.insert(escape_unknown_entities(text));
            Ok(Document::parse(fixed)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Rewrite `&name;` references that are not predefined XML entities as
/// `&amp;name;`, so they read back verbatim.
pub fn escape_unknown_entities(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"&([A-Za-z_][A-Za-z0-9_.\-]*);").expect("static regex is valid")
    });
    re.replace_all(text, |caps: &Captures<'_>| match &caps[1] {
        "amp" | "lt" | "gt" | "quot" | "apos" => caps[0].to_string(),
        name => format!("&amp;{name};"),
    })
    .into_owned()
}

pub fn is_named(node: &Node<'_, '_>, name: Name) -> bool {
    node.is_element() && node.has_tag_name(name)
}

/// Elements called `name` at any depth below `node`, in document order.
pub fn descendants_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: Name,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .skip(1)
        .filter(move |n| is_named(n, name))
}

/// Direct child elements called `name`.
pub fn children_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: Name,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| is_named(n, name))
}

/// Trimmed text of `node`, if not blank.
pub fn text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}
