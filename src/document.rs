// Schema-agnostic markup tree with the handful of accessors the fare engine
// needs. Namespace prefixes are dropped so `ns2:Offer` and `Offer` are the
// same element.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ProcessingError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse a complete document and return its root element.
    pub fn parse(xml: &str) -> Result<XmlNode, ProcessingError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let node = Self::open_element(&e)?;
                    stack.push(node);
                }
                Ok(Event::Empty(e)) => {
                    let node = Self::open_element(&e)?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().ok_or_else(|| {
                        ProcessingError::XmlParseError("unexpected closing tag".to_string())
                    })?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Text(e)) => {
                    let txt = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|e| ProcessingError::XmlParseError(e.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&txt);
                    }
                }
                Ok(Event::CData(e)) => {
                    let txt = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|e| ProcessingError::XmlParseError(e.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&txt);
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    let entity = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|e| ProcessingError::XmlParseError(e.to_string()))?;
                    let resolved = resolve_entity(&entity).ok_or_else(|| {
                        ProcessingError::XmlParseError(format!("unknown entity &{};", entity))
                    })?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&resolved);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ProcessingError::XmlParseError(format!(
                        "Error at position {}: {:?}",
                        reader.error_position(),
                        e
                    )))
                }
                _ => (),
            }
        }

        if let Some(open) = stack.last() {
            return Err(ProcessingError::XmlParseError(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        root.ok_or_else(|| ProcessingError::XmlParseError("document has no root element".into()))
    }

    fn open_element(e: &quick_xml::events::BytesStart<'_>) -> Result<XmlNode, ProcessingError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in e.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| ProcessingError::XmlParseError(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(XmlNode {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn attach(
        stack: &mut [XmlNode],
        root: &mut Option<XmlNode>,
        node: XmlNode,
    ) -> Result<(), ProcessingError> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None if root.is_none() => *root = Some(node),
            None => {
                return Err(ProcessingError::XmlParseError(format!(
                    "second root element <{}>",
                    node.name
                )))
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own text content, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn elements(&self) -> &[XmlNode] {
        &self.children
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name, in document order.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Attribute value, else the text of the first child with that name.
    /// Blank values count as absent.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| self.child(name).map(XmlNode::text).filter(|v| !v.is_empty()))
    }

    /// Walk a chain of direct children.
    pub fn path(&self, names: &[&str]) -> Option<&XmlNode> {
        names
            .iter()
            .try_fold(self, |node, name| node.child(name))
    }

    /// First descendant (depth-first, document order) with the given name.
    pub fn descendant(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Every descendant with the given name, in document order.
    pub fn descendants(&self, name: &str) -> Vec<&XmlNode> {
        self.find_all(|n| n.name == name)
    }

    /// Every descendant matching the predicate, in document order.
    pub fn find_all(&self, predicate: impl Fn(&XmlNode) -> bool) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        self.collect_matching(&predicate, &mut found);
        found
    }

    fn collect_matching<'a>(
        &'a self,
        predicate: &dyn Fn(&XmlNode) -> bool,
        found: &mut Vec<&'a XmlNode>,
    ) {
        for child in &self.children {
            if predicate(child) {
                found.push(child);
            }
            child.collect_matching(predicate, found);
        }
    }
}

fn resolve_entity(entity: &str) -> Option<String> {
    if let Some(reference) = entity.strip_prefix('#') {
        let code = match reference.strip_prefix('x').or_else(|| reference.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => reference.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(entity).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
    <ns:Root xmlns:ns="http://www.iata.org/IATA/2015/00/2018.2/IATA_OfferPriceRS">
      <ns:Price CurCode="AUD">
        <ns:TotalAmount CurCode="AUD">130.00</ns:TotalAmount>
        <ns:Desc>Fuel &amp; insurance</ns:Desc>
      </ns:Price>
      <ns:Item id="a"/>
      <ns:Item id="b"><ns:Inner><ns:Item id="c"/></ns:Inner></ns:Item>
    </ns:Root>
    "#;

    #[test]
    fn test_parse_strips_prefixes() {
        let root = XmlNode::parse(DOC).unwrap();
        assert_eq!(root.name(), "Root");
        let price = root.child("Price").unwrap();
        assert_eq!(price.attribute("CurCode"), Some("AUD"));
        assert_eq!(price.value("TotalAmount"), Some("130.00"));
    }

    #[test]
    fn test_value_prefers_attribute_then_child_text() {
        let root = XmlNode::parse(r#"<A code="X"><code>Y</code><other> Z </other></A>"#).unwrap();
        assert_eq!(root.value("code"), Some("X"));
        assert_eq!(root.value("other"), Some("Z"));
        assert_eq!(root.value("missing"), None);
    }

    #[test]
    fn test_blank_values_are_absent() {
        let root = XmlNode::parse(r#"<A code=" "><Empty>  </Empty></A>"#).unwrap();
        assert_eq!(root.value("code"), None);
        assert_eq!(root.value("Empty"), None);
    }

    #[test]
    fn test_entities_are_resolved() {
        let root = XmlNode::parse(DOC).unwrap();
        assert_eq!(root.path(&["Price", "Desc"]).unwrap().text(), "Fuel & insurance");
        let numeric = XmlNode::parse("<A>&#65;&#x42;</A>").unwrap();
        assert_eq!(numeric.text(), "AB");
    }

    #[test]
    fn test_children_and_descendants_keep_document_order() {
        let root = XmlNode::parse(DOC).unwrap();
        let direct: Vec<_> = root
            .children("Item")
            .filter_map(|n| n.attribute("id"))
            .collect();
        assert_eq!(direct, vec!["a", "b"]);

        let all: Vec<_> = root
            .descendants("Item")
            .into_iter()
            .filter_map(|n| n.attribute("id"))
            .collect();
        assert_eq!(all, vec!["a", "b", "c"]);
        assert_eq!(root.descendant("Inner").map(|n| n.name()), Some("Inner"));
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(XmlNode::parse("<A><B></A>").is_err());
        assert!(XmlNode::parse("<A>").is_err());
        assert!(XmlNode::parse("   ").is_err());
    }
}
