//! JSON to XML conversion.
//!
//! ```text
//! {"a": 1}               → <root><a>1</a></root>
//! {"a": [1, 2]}          → <root><a>1</a><a>2</a></root>
//! {"@id": "7", "#text": "x"} → <root id="7">x</root>
//! [1, 2]                 → <root><item>1</item><item>2</item></root>
//! null                   → <root/>
//! ```

use serde_json::Value;

use crate::xml::document::{XmlDocument, XmlElement, XmlNode};

/// Element name used for items of a top-level (or nested) anonymous array.
pub const ARRAY_ITEM_NAME: &str = "item";

/// Convert a JSON value into a document rooted at `root`.
pub fn json_to_xml(value: &Value, root: &str) -> XmlDocument {
    XmlDocument::new(value_to_element(sanitize_name(root), value))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn value_to_element(name: String, value: &Value) -> XmlElement {
    let mut element = XmlElement::new(name);
    fill(&mut element, value);
    element
}

fn fill(element: &mut XmlElement, value: &Value) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                if let Some(attr) = key.strip_prefix('@') {
                    if let Some(text) = scalar_text(child) {
                        element.set_attribute(sanitize_name(attr), text);
                        continue;
                    }
                }
                if key == "#text" {
                    if let Some(text) = scalar_text(child) {
                        element.children.push(XmlNode::Text(text));
                        continue;
                    }
                }
                let name = sanitize_name(key);
                match child {
                    Value::Array(items) => {
                        for item in items {
                            element.push_child(value_to_element(name.clone(), item));
                        }
                    }
                    other => element.push_child(value_to_element(name, other)),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                element.push_child(value_to_element(ARRAY_ITEM_NAME.to_string(), item));
            }
        }
        scalar => {
            if let Some(text) = scalar_text(scalar) {
                element.children.push(XmlNode::Text(text));
            }
        }
    }
}

/// Turn an arbitrary JSON key into a valid XML element name.
pub fn sanitize_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let needs_prefix = match name.chars().next() {
        None => true,
        Some(c) => c.is_ascii_digit() || c == '-' || c == '.',
    };
    if needs_prefix {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_status_object() {
        let doc = json_to_xml(&json!({"status": "ok"}), "root");
        assert_eq!(doc.to_string(), "<root><status>ok</status></root>");
    }

    #[test]
    fn converts_nested_values() {
        let doc = json_to_xml(
            &json!({
                "@id": 7,
                "tags": ["a", "b"],
                "meta": {"draft": false, "owner": null},
                "1st": 1.5
            }),
            "root",
        );
        let root = &doc.root;
        assert_eq!(root.attribute("id"), Some("7"));
        assert_eq!(doc.select_all("/root/tags").len(), 2);
        assert_eq!(doc.select("/root/meta/draft").unwrap().text(), "false");
        assert!(doc.select("/root/meta/owner").unwrap().children.is_empty());
        assert_eq!(doc.select("/root/_1st").unwrap().text(), "1.5");
    }

    #[test]
    fn top_level_arrays_become_items() {
        let doc = json_to_xml(&json!([1, {"x": "y"}]), "root");
        assert_eq!(doc.to_string(), "<root><item>1</item><item><x>y</x></item></root>");
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_name("a b"), "a_b");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(sanitize_name("9lives"), "_9lives");
    }
}
