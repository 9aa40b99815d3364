use std::collections::BTreeMap;

use super::{Document, NodeId, local_name};
use crate::utils::{escape_attribute, escape_text};

/// Plain nested-record view of an element: attributes, text, and child
/// records grouped by tag name in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<(String, Vec<Structure>)>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: &str, value: impl ToString) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: impl ToString) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, tag: &str, child: Structure) -> Self {
        self.push_child(tag, child);
        self
    }

    pub fn push_child(&mut self, tag: &str, child: Structure) {
        match self.children.iter_mut().find(|(name, _)| name == tag) {
            Some((_, group)) => group.push(child),
            None => self.children.push((tag.to_string(), vec![child])),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn children(&self, tag: &str) -> &[Structure] {
        self.children
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, group)| group.as_slice())
            .unwrap_or_default()
    }

    pub fn child(&self, tag: &str) -> Option<&Structure> {
        self.children(tag).first()
    }

    /// Text of the first child named `tag`.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).map(|c| c.text.as_str())
    }
}

/// Converts an element to a [`Structure`], descending `depth` levels.
///
/// Text is the concatenation of the element's own text nodes, trimmed when the
/// element also has element children (so indentation is not kept).
pub fn to_struct(document: &Document, id: NodeId, depth: usize) -> Structure {
    let attributes = document
        .attributes(id)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let text = document.own_text(id);
    let text = if document.elements(id).next().is_some() {
        text.trim().to_string()
    } else {
        text
    };

    let mut structure = Structure {
        attributes,
        text,
        children: Vec::new(),
    };
    if depth > 0 {
        for child in document.elements(id) {
            structure.push_child(
                local_name(document.name(child)),
                to_struct(document, child, depth - 1),
            );
        }
    }
    structure
}

/// Renders a [`Structure`] as indented markup rooted at `tag`.
pub fn to_markup(structure: &Structure, tag: &str) -> String {
    let mut out = String::new();
    write_markup(structure, tag, 0, &mut out);
    out
}

fn write_markup(structure: &Structure, tag: &str, level: usize, out: &mut String) {
    let indent = "  ".repeat(level);
    out.push_str(&indent);
    out.push('<');
    out.push_str(tag);
    for (key, value) in &structure.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attribute(value));
        out.push('"');
    }

    let has_children = structure.children.iter().any(|(_, g)| !g.is_empty());
    if structure.text.is_empty() && !has_children {
        out.push_str("/>\n");
        return;
    }

    out.push('>');
    out.push_str(&escape_text(&structure.text));
    if has_children {
        out.push('\n');
        for (name, group) in &structure.children {
            for child in group {
                write_markup(child, name, level + 1, out);
            }
        }
        out.push_str(&indent);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}
