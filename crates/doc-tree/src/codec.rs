//! JSON round-trip for whole subtrees.
//!
//! The shape is deliberately plain: `{"tag": .., "props": {..},
//! "children": [..]}` with `props` and `children` omitted when empty.
//! Decoding always builds fresh detached nodes.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::node::Node;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("node cell must be a JSON object")]
    NotAnObject,
    #[error("missing or empty \"tag\" field")]
    MissingTag,
    #[error("\"props\" must be a JSON object")]
    BadProps,
    #[error("\"children\" must be a JSON array")]
    BadChildren,
}

pub fn to_cell(node: &Node) -> Value {
    let mut out = Map::new();
    out.insert("tag".to_owned(), Value::String(node.tag().to_owned()));
    let props = node.properties();
    if !props.is_empty() {
        out.insert("props".to_owned(), Value::Object(props.into_iter().collect()));
    }
    let children = node.children();
    if !children.is_empty() {
        out.insert(
            "children".to_owned(),
            Value::Array(children.iter().map(to_cell).collect()),
        );
    }
    Value::Object(out)
}

pub fn from_cell(cell: &Value) -> Result<Node, CodecError> {
    let obj = cell.as_object().ok_or(CodecError::NotAnObject)?;
    let tag = obj
        .get("tag")
        .and_then(Value::as_str)
        .filter(|tag| !tag.is_empty())
        .ok_or(CodecError::MissingTag)?;
    let node = Node::new(tag);
    if let Some(props) = obj.get("props") {
        let props = props.as_object().ok_or(CodecError::BadProps)?;
        for (key, value) in props {
            node.set_property(key, value.clone(), None);
        }
    }
    if let Some(children) = obj.get("children") {
        let children = children.as_array().ok_or(CodecError::BadChildren)?;
        for child in children {
            node.append_child(from_cell(child)?, None);
        }
    }
    Ok(node)
}
