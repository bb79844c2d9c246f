//! Tree serializer - indented XML dump and canonical XPath addressing
//!
//! This module handles:
//! - Printing a subtree as indented markup for debugging and assertions
//! - Canonical XPath generation for node identification
//! - Rendered text with a configurable line terminator

use serde::{Deserialize, Serialize};

use crate::arena::DomArena;
use crate::error::Result;
use crate::text::{collect_text, reduce_whitespace, LINE_SEPARATOR};
use crate::types::*;

/// Serializer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Added once per depth level
    pub indent_unit: String,
    pub line_separator: String,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            indent_unit: "  ".to_string(),
            line_separator: LINE_SEPARATOR.to_string(),
        }
    }
}

/// Tree serializer
pub struct DomSerializer {
    config: SerializerConfig,
}

impl DomSerializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Print the subtree rooted at `node_id`, one node per line.
    ///
    /// Text is printed as stored, so multi-line text spans several lines.
    pub fn as_xml_indented(&self, arena: &DomArena, node_id: NodeId) -> Result<String> {
        let mut output = String::with_capacity(1024);
        self.serialize_node(arena, node_id, 0, &mut output)?;
        Ok(output)
    }

    /// Rendered text using the configured line terminator
    pub fn as_text(&self, arena: &DomArena, node_id: NodeId) -> Result<String> {
        let raw = collect_text(arena, node_id)?;
        Ok(reduce_whitespace(&raw, &self.config.line_separator))
    }

    fn serialize_node(
        &self,
        arena: &DomArena,
        node_id: NodeId,
        depth: usize,
        output: &mut String,
    ) -> Result<()> {
        let node = arena.get(node_id)?;
        let indent = self.config.indent_unit.repeat(depth);
        let newline = self.config.line_separator.as_str();

        match node.kind() {
            NodeKind::Element(element) => {
                // Format: <tag id="123" class="foo">
                output.push_str(&indent);
                output.push('<');
                output.push_str(&element.tag_name);
                for attr in &element.attributes {
                    output.push(' ');
                    output.push_str(&attr.name);
                    output.push_str("=\"");
                    push_escaped(output, &attr.value, true);
                    output.push('"');
                }

                if node.first_child.is_none() {
                    output.push_str("/>");
                    output.push_str(newline);
                    return Ok(());
                }
                output.push('>');
                output.push_str(newline);

                for child_id in arena.children(node_id)? {
                    self.serialize_node(arena, child_id, depth + 1, output)?;
                }

                output.push_str(&indent);
                output.push_str("</");
                output.push_str(&element.tag_name);
                output.push('>');
                output.push_str(newline);
            }
            NodeKind::Text(data) => {
                output.push_str(&indent);
                push_escaped(output, data, false);
                output.push_str(newline);
            }
            NodeKind::CData(data) => {
                output.push_str(&indent);
                output.push_str("<![CDATA[");
                output.push_str(data);
                output.push_str("]]>");
                output.push_str(newline);
            }
            NodeKind::Comment(data) => {
                output.push_str(&indent);
                output.push_str("<!--");
                output.push_str(data);
                output.push_str("-->");
                output.push_str(newline);
            }
            NodeKind::ProcessingInstruction { target, data } => {
                output.push_str(&indent);
                output.push_str("<?");
                output.push_str(target);
                if !data.is_empty() {
                    output.push(' ');
                    output.push_str(data);
                }
                output.push_str("?>");
                output.push_str(newline);
            }
            NodeKind::Document | NodeKind::DocumentFragment => {
                output.push_str(&indent);
                output.push_str(node.node_name());
                output.push_str(newline);
                for child_id in arena.children(node_id)? {
                    self.serialize_node(arena, child_id, depth + 1, output)?;
                }
            }
        }

        Ok(())
    }

    /// Canonical XPath of a node: `""` without a parent, otherwise the
    /// parent's path plus `/name`, with a 1-based `[position]` when the
    /// parent has several children of that name.
    pub fn canonical_xpath(&self, arena: &DomArena, node_id: NodeId) -> Result<String> {
        let mut path_parts = Vec::new();
        let mut current_id = node_id;

        while let Some(parent_id) = arena.get(current_id)?.parent {
            let name = arena.node_name(current_id)?;

            let mut position = 0;
            let mut same_named = 0;
            for sibling in arena.children(parent_id)? {
                if arena.node_name(sibling)? == name {
                    same_named += 1;
                    if sibling == current_id {
                        position = same_named;
                    }
                }
            }

            if same_named > 1 {
                path_parts.push(format!("{}[{}]", name, position));
            } else {
                path_parts.push(name.to_string());
            }
            current_id = parent_id;
        }

        if path_parts.is_empty() {
            return Ok(String::new());
        }
        path_parts.reverse();
        Ok(format!("/{}", path_parts.join("/")))
    }
}

impl Default for DomSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn push_escaped(output: &mut String, text: &str, in_attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' if in_attribute => output.push_str("&quot;"),
            _ => output.push(ch),
        }
    }
}

impl DomArena {
    /// Indented markup of the subtree, default serializer settings
    pub fn as_xml_indented(&self, node_id: NodeId) -> Result<String> {
        DomSerializer::new().as_xml_indented(self, node_id)
    }

    pub fn canonical_xpath(&self, node_id: NodeId) -> Result<String> {
        DomSerializer::new().canonical_xpath(self, node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DomService;

    fn unix() -> DomSerializer {
        DomSerializer::with_config(SerializerConfig {
            line_separator: "\n".to_string(),
            ..SerializerConfig::default()
        })
    }

    #[test]
    fn test_serialize_simple_dom() {
        let cdp_json = serde_json::json!({
            "root": {
                "nodeType": 9,
                "nodeName": "#document",
                "children": [{
                    "nodeType": 1,
                    "nodeName": "html",
                    "attributes": ["lang", "en"],
                    "children": [{
                        "nodeType": 1,
                        "nodeName": "p",
                        "children": [
                            {"nodeType": 3, "nodeName": "#text", "nodeValue": "  a < b  "},
                            {"nodeType": 4, "nodeName": "#cdata-section", "nodeValue": " <raw> "},
                            {"nodeType": 8, "nodeName": "#comment", "nodeValue": "note"}
                        ]
                    }, {
                        "nodeType": 1,
                        "nodeName": "br"
                    }]
                }]
            }
        });

        let mut service = DomService::new();
        let doc = service.parse_document(&cdp_json).unwrap();

        let output = unix().as_xml_indented(service.arena(), doc).unwrap();
        assert_eq!(
            output,
            "#document\n\
             \x20 <html lang=\"en\">\n\
             \x20   <p>\n\
             \x20       a &lt; b  \n\
             \x20     <![CDATA[ <raw> ]]>\n\
             \x20     <!--note-->\n\
             \x20   </p>\n\
             \x20   <br/>\n\
             \x20 </html>\n"
        );
    }

    #[test]
    fn test_every_node_gets_a_line() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        let div = arena.create_element(Some(doc), "div").unwrap();
        let blank = arena.create_text(Some(doc), " \n\t ").unwrap();
        let pi = arena
            .create_processing_instruction(Some(doc), "xml-stylesheet", "href=\"a.css\"")
            .unwrap();
        arena.append_child(div, blank).unwrap();
        arena.append_child(div, pi).unwrap();
        arena.set_attribute(div, "title", "say \"hi\"").unwrap();

        let output = unix().as_xml_indented(&arena, div).unwrap();
        assert_eq!(
            output,
            "<div title=\"say &quot;hi&quot;\">\n   \n\t \n  <?xml-stylesheet href=\"a.css\"?>\n</div>\n"
        );
    }

    #[test]
    fn test_canonical_xpath() {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        let html = arena.create_element(Some(doc), "html").unwrap();
        let body = arena.create_element(Some(doc), "body").unwrap();
        let first = arena.create_element(Some(doc), "div").unwrap();
        let second = arena.create_element(Some(doc), "div").unwrap();
        let span = arena.create_element(Some(doc), "span").unwrap();
        arena.append_child(doc, html).unwrap();
        arena.append_child(html, body).unwrap();
        arena.append_child(body, first).unwrap();
        arena.append_child(body, span).unwrap();
        arena.append_child(body, second).unwrap();

        assert_eq!(arena.canonical_xpath(doc).unwrap(), "");
        assert_eq!(arena.canonical_xpath(html).unwrap(), "/html");
        assert_eq!(arena.canonical_xpath(first).unwrap(), "/html/body/div[1]");
        assert_eq!(arena.canonical_xpath(second).unwrap(), "/html/body/div[2]");
        assert_eq!(arena.canonical_xpath(span).unwrap(), "/html/body/span");

        let detached = arena.create_element(Some(doc), "p").unwrap();
        assert_eq!(arena.canonical_xpath(detached).unwrap(), "");
    }

    #[test]
    fn test_config_from_json() {
        let config: SerializerConfig =
            serde_json::from_value(serde_json::json!({ "indent_unit": "\t" })).unwrap();
        assert_eq!(config.indent_unit, "\t");
        assert_eq!(config.line_separator, LINE_SEPARATOR);
    }
}
