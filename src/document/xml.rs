//! XML encoding of structural documents.
//!
//! Writing follows Xero's wrapping convention: a list under a known plural key
//! wraps each item in the singular element (`Phones` -> `Phone`), while a list under
//! any other key is merged straight into the parent element.

use std::str::FromStr;

use quick_xml::{
    Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use rust_decimal::Decimal;

use super::{
    Document, NO_SEND_FIELDS, Value, date::parse_date, is_boolean_field, is_datetime_field,
    is_plural, singular,
};
use crate::error::{Error, Result};

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Serializes `document` as the children of a `root` element.
pub fn to_wire(root: &str, document: &Document) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, root, |w| write_document(w, document))?;
    into_string(writer)
}

/// Builds a save body for the resource `plural`.
///
/// A list becomes `<Plural><Singular>..</Singular>..</Plural>`; a single document becomes
/// `<Singular>..</Singular>`.
pub fn save_body(plural: &str, single: &str, data: &Value) -> Result<String> {
    match data {
        Value::Map(document) => to_wire(single, document),
        Value::List(items) => {
            let mut writer = Writer::new(Vec::new());
            write_element(&mut writer, plural, |w| {
                for item in items {
                    let Value::Map(document) = item else {
                        return Err(Error::Xml(format!(
                            "every {plural} item must be a document"
                        )));
                    };
                    write_element(w, single, |w| write_document(w, document))?;
                }
                Ok(())
            })?;
            into_string(writer)
        }
        _ => Err(Error::Xml(format!(
            "a {single} body must be a document or a list of documents"
        ))),
    }
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(writer.into_inner()).map_err(|e| Error::Xml(e.to_string()))
}

fn write_element<F>(writer: &mut Writer<Vec<u8>>, name: &str, body: F) -> Result<()>
where
    F: FnOnce(&mut Writer<Vec<u8>>) -> Result<()>,
{
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| Error::Xml(e.to_string()))?;
    body(writer)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| Error::Xml(e.to_string()))?;
    Ok(())
}

fn write_text(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(|e| Error::Xml(e.to_string()))?;
    Ok(())
}

fn write_document(writer: &mut Writer<Vec<u8>>, document: &Document) -> Result<()> {
    for (key, value) in document.iter() {
        if NO_SEND_FIELDS.contains(&key) {
            continue;
        }
        write_element(writer, key, |w| write_value(w, key, value))?;
    }
    Ok(())
}

/// Writes the content of the element `key`, which is already open.
fn write_value(writer: &mut Writer<Vec<u8>>, key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Map(document) => write_document(writer, document),
        Value::List(items) => match singular(key) {
            Some(single) => {
                for item in items {
                    write_element(writer, single, |w| match item {
                        Value::Map(document) => write_document(w, document),
                        scalar => write_text(w, &scalar.to_string()),
                    })?;
                }
                Ok(())
            }
            None => {
                for item in items {
                    match item {
                        Value::Map(document) => write_document(writer, document)?,
                        scalar => {
                            write_element(writer, "Value", |w| write_text(w, &scalar.to_string()))?;
                        }
                    }
                }
                Ok(())
            }
        },
        Value::Null => Ok(()),
        scalar if is_boolean_field(key) => {
            write_text(writer, if scalar.is_truthy() { "true" } else { "false" })
        }
        scalar => write_text(writer, &scalar.to_string()),
    }
}

/// Parses an XML body into a document value rooted at the document element.
pub fn parse(text: &str) -> Result<Value> {
    let tree = roxmltree::Document::parse(text).map_err(|e| Error::Xml(e.to_string()))?;
    Ok(element_value(tree.root_element()))
}

fn element_value(node: roxmltree::Node<'_, '_>) -> Value {
    if node.attribute((XSI_NAMESPACE, "nil")) == Some("true") {
        return Value::Null;
    }

    let tag = node.tag_name().name();
    let children: Vec<_> = node.children().filter(roxmltree::Node::is_element).collect();

    if children.is_empty() {
        let text = node.text().unwrap_or_default();
        if text.is_empty() && is_plural(tag) {
            return Value::List(Vec::new());
        }
        return leaf_value(tag, text);
    }

    let child_name = |n: &roxmltree::Node<'_, '_>| n.tag_name().name().to_owned();
    let first = child_name(&children[0]);
    let uniform = children.iter().all(|c| child_name(c) == first);
    let is_list = (is_plural(tag) && singular(tag) == Some(first.as_str()))
        || (uniform && first == "Value")
        || (uniform && children.len() > 1);

    if is_list {
        return Value::List(children.into_iter().map(element_value).collect());
    }

    let mut document = Document::new();
    for child in children {
        let key = child.tag_name().name();
        let value = element_value(child);
        match document.get_mut(key) {
            Some(Value::List(existing)) => existing.push(value),
            Some(existing) => {
                let previous = std::mem::take(existing);
                *existing = Value::List(vec![previous, value]);
            }
            None => {
                document.insert(key, value);
            }
        }
    }
    Value::Map(document)
}

fn leaf_value(key: &str, text: &str) -> Value {
    if is_boolean_field(key) {
        match text.trim() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
    }
    if let Some(value) = parse_date(text.trim(), is_datetime_field(key)) {
        return value;
    }
    if super::DECIMAL_FIELDS.contains(&key)
        && let Ok(d) = Decimal::from_str(text.trim())
    {
        return Value::Decimal(d);
    }
    if super::INTEGER_FIELDS.contains(&key)
        && let Ok(i) = text.trim().parse::<i64>()
    {
        return Value::Integer(i);
    }
    Value::String(text.to_owned())
}
