//! Owned markup tree.
//!
//! Documents are parsed into an arena of nodes with parent/child indexes, and
//! every query is a plain walk over that arena. Namespace declarations are
//! kept as ordinary `xmlns`/`xmlns:*` attributes so serializing a parsed
//! document reproduces its element structure.

mod structure;

use std::fmt::{Display, Formatter};

use xml::name::OwnedName;
use xml::namespace::Namespace;
use xml::reader::{ParserConfig, XmlEvent};

use crate::errors::DocumentError;
use crate::utils::{escape_attribute, escape_text};

pub use structure::{to_markup, to_struct, Structure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

/// The part of a (possibly prefixed) name after the colon.
pub fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn qualified_name(name: &OwnedName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{prefix}:{}", name.local_name),
        None => name.local_name.clone(),
    }
}

/// Namespace bindings introduced by an element, as `xmlns` attributes.
fn declarations(parent: Option<&Namespace>, current: &Namespace) -> Vec<(String, String)> {
    current
        .into_iter()
        .filter(|(prefix, _)| !matches!(*prefix, "xml" | "xmlns"))
        .filter(|(prefix, uri)| {
            let inherited = parent.and_then(|ns| ns.get(*prefix));
            let inherited = if prefix.is_empty() {
                inherited.or(Some(""))
            } else {
                inherited
            };
            inherited != Some(*uri)
        })
        .map(|(prefix, uri)| {
            let name = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            (name, uri.to_string())
        })
        .collect()
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let reader = ParserConfig::new()
            .trim_whitespace(false)
            .whitespace_to_characters(true)
            .cdata_to_characters(true)
            .ignore_comments(false)
            .create_reader(text.as_bytes());

        let mut document = Document {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let mut root = None;
        let mut stack: Vec<(NodeId, Namespace)> = Vec::new();

        for event in reader {
            match event? {
                XmlEvent::StartElement {
                    name,
                    attributes,
                    namespace,
                } => {
                    let parent = stack.last();
                    let mut attrs = declarations(parent.map(|(_, ns)| ns), &namespace);
                    attrs.extend(
                        attributes
                            .into_iter()
                            .map(|attr| (qualified_name(&attr.name), attr.value)),
                    );
                    let kind = NodeKind::Element {
                        name: qualified_name(&name),
                        attributes: attrs,
                    };
                    let id = match parent.map(|(id, _)| *id) {
                        Some(parent) => document.push(parent, kind),
                        None => {
                            let id = document.alloc(None, kind);
                            root.get_or_insert(id);
                            id
                        }
                    };
                    stack.push((id, namespace));
                }
                XmlEvent::EndElement { .. } => {
                    stack.pop();
                }
                XmlEvent::Characters(text) => {
                    if let Some((parent, _)) = stack.last() {
                        document.push_text(*parent, &text);
                    }
                }
                XmlEvent::Comment(text) => {
                    if let Some((parent, _)) = stack.last() {
                        document.push(*parent, NodeKind::Comment(text));
                    }
                }
                _ => {}
            }
        }

        document.root = root.ok_or(DocumentError::MissingRoot)?;
        Ok(document)
    }

    /// A document holding just an empty root element.
    pub fn with_root(name: &str) -> Self {
        let mut document = Document {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        document.root = document.alloc(
            None,
            NodeKind::Element {
                name: name.to_string(),
                attributes: Vec::new(),
            },
        );
        document
    }

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        id
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.alloc(Some(parent), kind);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push_text(&mut self, parent: NodeId, text: &str) {
        if let Some(last) = self.nodes[parent.0].children.last().copied() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return;
            }
        }
        self.push(parent, NodeKind::Text(text.to_string()));
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Qualified element name; empty for text and comments.
    pub fn name(&self, id: NodeId) -> &str {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => name,
            _ => "",
        }
    }

    pub fn is_named(&self, id: NodeId, name: &str) -> bool {
        self.is_element(id) && local_name(self.name(id)) == name
    }

    pub fn attributes(&self, id: NodeId) -> impl Iterator<Item = (&str, &str)> {
        let attributes = match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes.as_slice(),
            _ => &[],
        };
        attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id).find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            match attributes.iter_mut().find(|(k, _)| k == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .position(|(k, _)| k == name)
                .map(|idx| attributes.remove(idx).1),
            _ => None,
        }
    }

    /// All child nodes, text and comments included.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn elements_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.elements(id)
            .filter(move |child| local_name(self.name(*child)) == name)
    }

    pub fn first_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.elements_named(id, name).next()
    }

    /// Descendant elements in document order, `id` itself excluded.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        stack.reverse();
        Descendants {
            document: self,
            stack,
        }
    }

    pub fn descendants_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.descendants(id)
            .filter(move |node| local_name(self.name(*node)) == name)
    }

    /// Concatenated text of every descendant text node.
    pub fn text(&self, id: NodeId) -> String {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Comment(_) => String::new(),
            NodeKind::Element { .. } => self
                .children(id)
                .iter()
                .map(|child| self.text(*child))
                .collect(),
        }
    }

    /// Concatenated text of the direct text children only.
    pub fn own_text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|child| match &self.nodes[child.0].kind {
                NodeKind::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replaces every child of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            self.push(id, NodeKind::Text(text.to_string()));
        }
    }

    fn is_blank_text(&self, id: NodeId) -> bool {
        matches!(&self.nodes[id.0].kind, NodeKind::Text(text) if text.trim().is_empty())
    }

    fn insert_at(&mut self, parent: NodeId, position: usize, kind: NodeKind) -> NodeId {
        let id = self.alloc(Some(parent), kind);
        self.nodes[parent.0].children.insert(position, id);
        id
    }

    /// Appends a new element as the last element child of `parent`, reusing
    /// the indentation of the existing element children.
    pub fn append_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        let children = self.children(parent);
        let last_element = children.iter().rposition(|c| self.is_element(*c));
        let kind = NodeKind::Element {
            name: name.to_string(),
            attributes: Vec::new(),
        };

        match last_element {
            Some(idx) if idx > 0 && self.is_blank_text(children[idx - 1]) => {
                let indent = self.text(children[idx - 1]);
                let id = self.insert_at(parent, idx + 1, kind);
                self.insert_at(parent, idx + 1, NodeKind::Text(indent));
                id
            }
            _ => self.push(parent, kind),
        }
    }

    /// Inserts a new element right before `anchor`, reusing the indentation in
    /// front of it. A detached anchor leaves the tree unchanged and the new
    /// element orphaned.
    pub fn insert_element_before(&mut self, anchor: NodeId, name: &str) -> NodeId {
        let kind = NodeKind::Element {
            name: name.to_string(),
            attributes: Vec::new(),
        };
        let Some(parent) = self.parent(anchor) else {
            return self.alloc(None, kind);
        };
        let children = self.children(parent);
        let idx = children.iter().position(|c| *c == anchor).unwrap_or(0);
        let indent = (idx > 0 && self.is_blank_text(children[idx - 1]))
            .then(|| self.text(children[idx - 1]));

        let id = self.insert_at(parent, idx, kind);
        if let Some(indent) = indent {
            self.insert_at(parent, idx + 1, NodeKind::Text(indent));
        }
        id
    }

    /// Detaches `id` (and the indentation in front of it) from its parent.
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id.0].parent.take() else {
            return;
        };
        let children = &self.nodes[parent.0].children;
        if let Some(idx) = children.iter().position(|c| *c == id) {
            let blank_before = idx > 0 && self.is_blank_text(children[idx - 1]);
            let siblings = &mut self.nodes[parent.0].children;
            siblings.remove(idx);
            if blank_before {
                let blank = siblings.remove(idx - 1);
                self.nodes[blank.0].parent = None;
            }
        }
    }

    /// Serializes the subtree rooted at the document element (no XML
    /// declaration).
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                if node.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_markup())
    }
}

pub struct Descendants<'a> {
    document: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if !self.document.is_element(id) {
                continue;
            }
            self.stack
                .extend(self.document.children(id).iter().rev().copied());
            return Some(id);
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<divelog program='subsurface' version='3'>
  <settings><fingerprint deviceid='ffeeddcc' serial='1234'/></settings>
  <dives>
    <dive number='1'>
      <notes>Reef &amp; wreck</notes>
      <!-- a comment -->
    </dive>
    <trip><dive number='2'/></trip>
  </dives>
</divelog>"#;

    #[test]
    fn test_parse_and_query() {
        let doc = Document::parse(DOC).unwrap();
        let root = doc.root();
        assert_eq!(doc.name(root), "divelog");
        assert_eq!(doc.attribute(root, "program"), Some("subsurface"));
        assert_eq!(doc.elements(root).count(), 2);

        let numbers: Vec<_> = doc
            .descendants_named(root, "dive")
            .filter_map(|d| doc.attribute(d, "number"))
            .collect();
        assert_eq!(numbers, vec!["1", "2"]);

        let dive = doc.descendants_named(root, "dive").next().unwrap();
        let notes = doc.first_named(dive, "notes").unwrap();
        assert_eq!(doc.text(notes), "Reef & wreck");
        assert_eq!(doc.parent(notes), Some(dive));
    }

    #[test]
    fn test_serialize_round_trip() {
        let doc = Document::parse(DOC).unwrap();
        let markup = doc.to_markup();
        assert!(markup.starts_with("<divelog program=\"subsurface\" version=\"3\">"));
        assert!(markup.contains("<notes>Reef &amp; wreck</notes>"));
        assert!(markup.contains("<!-- a comment -->"));
        assert!(markup.contains("<dive number=\"2\"/>"));

        let again = Document::parse(&markup).unwrap();
        assert_eq!(again.to_markup(), markup);
    }

    #[test]
    fn test_namespaces_are_kept() {
        let gpx = r#"<gpx xmlns="http://www.topografix.com/GPX/1/1" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="a b" version="1.1"><wpt lat="1" lon="2"/></gpx>"#;
        let doc = Document::parse(gpx).unwrap();
        let root = doc.root();
        assert!(doc.is_named(root, "gpx"));
        assert_eq!(
            doc.attribute(root, "xmlns"),
            Some("http://www.topografix.com/GPX/1/1")
        );
        assert_eq!(doc.attribute(root, "xsi:schemaLocation"), Some("a b"));
        let wpt = doc.first_named(root, "wpt").unwrap();
        assert_eq!(doc.attributes(wpt).count(), 2);
    }

    #[test]
    fn test_edit_tree() {
        let mut doc = Document::parse(DOC).unwrap();
        let root = doc.root();
        let dives = doc.first_named(root, "dives").unwrap();

        let added = doc.append_element(dives, "dive");
        doc.set_attribute(added, "number", "3");
        let numbers: Vec<_> = doc
            .elements_named(dives, "dive")
            .filter_map(|d| doc.attribute(d, "number"))
            .collect();
        assert_eq!(numbers, vec!["1", "3"]);

        let trip = doc.first_named(dives, "trip").unwrap();
        let first = doc.insert_element_before(trip, "dive");
        doc.set_attribute(first, "number", "0");
        let order: Vec<_> = doc.elements(dives).map(|e| doc.name(e).to_string()).collect();
        assert_eq!(order, vec!["dive", "dive", "trip", "dive"]);

        doc.set_attribute(first, "number", "00");
        assert_eq!(doc.attribute(first, "number"), Some("00"));
        assert_eq!(doc.remove_attribute(first, "number"), Some("00".to_string()));
        assert!(!doc.has_attribute(first, "number"));

        doc.set_text(first, "x < y");
        assert!(doc.to_markup().contains("<dive>x &lt; y</dive>"));

        doc.remove(first);
        assert_eq!(doc.elements(dives).count(), 3);
        assert_eq!(doc.parent(first), None);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            Document::parse("<open>"),
            Err(DocumentError::Parse(_))
        ));
        assert!(Document::parse("").is_err());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("xsi:schemaLocation"), "schemaLocation");
        assert_eq!(local_name("gpx"), "gpx");
    }
}
