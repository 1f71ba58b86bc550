//! Minimal element tree over quick-xml events

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ColladaError;

/// An XML element with its attributes, text and child elements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Local name (namespace prefix stripped)
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child named `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Direct children named `name`
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Follow a chain of direct children
    pub fn path(&self, names: &[&str]) -> Option<&Element> {
        names
            .iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// First descendant named `name`, depth first
    pub fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

fn open(start: &BytesStart) -> Result<Element, ColladaError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| ColladaError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| ColladaError::Xml(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        attributes,
        ..Default::default()
    })
}

fn close(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Parse a document into its root element
pub fn parse(data: &[u8]) -> Result<Element, ColladaError> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ColladaError::Xml(format!("at byte {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Start(start) => stack.push(open(&start)?),
            Event::Empty(start) => {
                let element = open(&start)?;
                close(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ColladaError::Xml("unbalanced end tag".to_string()))?;
                close(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| ColladaError::Xml(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ColladaError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| ColladaError::Xml("empty document".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let root = parse(
            br#"<?xml version="1.0"?>
            <a x="1"><b>hello &amp; bye</b><c y="2"/><b>two</b></a>"#,
        )
        .unwrap();

        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.child("b").unwrap().text(), "hello & bye");
        assert_eq!(root.children_named("b").count(), 2);
        assert_eq!(root.child("c").unwrap().attr("y"), Some("2"));
    }

    #[test]
    fn test_namespace_prefix_stripped() {
        let root = parse(br#"<ns:root xmlns:ns="urn:x"><ns:item/></ns:root>"#).unwrap();
        assert_eq!(root.name, "root");
        assert!(root.find("item").is_some());
    }

    #[test]
    fn test_path_and_find() {
        let root = parse(b"<a><b><c><d>deep</d></c></b></a>").unwrap();
        assert_eq!(root.path(&["b", "c", "d"]).unwrap().text(), "deep");
        assert_eq!(root.find("d").unwrap().text(), "deep");
        assert!(root.path(&["b", "x"]).is_none());
    }

    #[test]
    fn test_unbalanced_document_fails() {
        assert!(parse(b"<a><b></a>").is_err());
        assert!(parse(b"").is_err());
    }
}
