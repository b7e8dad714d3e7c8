use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Number;

use super::{Document, Value, date};
use crate::error::Result;

/// Parses a JSON body, converting recognized date strings held in objects.
pub fn parse(body: &[u8]) -> Result<Value> {
    let raw: serde_json::Value = serde_json::from_slice(body)?;
    Ok(from_json(raw, false))
}

/// Converts a `serde_json::Value`; `in_object` enables the date hook for strings.
#[must_use]
pub fn from_json(value: serde_json::Value, in_object: bool) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => number(&n),
        serde_json::Value::String(s) if in_object => {
            date::parse_date(&s, false).unwrap_or(Value::String(s))
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(|v| from_json(v, false)).collect())
        }
        serde_json::Value::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, from_json(v, true)))
                .collect::<Document>(),
        ),
    }
}

fn number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Integer(i);
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_or(Value::String(text), Value::Decimal)
}

/// Converts a document value into JSON for the JSON sub-APIs.
#[must_use]
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Decimal(d) => Number::from_str(&d.normalize().to_string())
            .map_or_else(|_| serde_json::Value::String(d.to_string()), serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => serde_json::Value::String(date::format_iso_date(*d)),
        Value::DateTime(dt) => serde_json::Value::String(date::format_iso_datetime(*dt)),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(document) => serde_json::Value::Object(
            document
                .iter()
                .map(|(k, v)| (k.to_owned(), to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use time::macros::{date, datetime};

    #[test]
    fn date_hook_applies_to_object_values() {
        let body = json!({
            "Status": "OK",
            "DateTimeUTC": "/Date(1426849200000+1300)/",
            "Invoices": [{
                "Date": "2015-06-06T00:00:00",
                "UpdatedDateUTC": "/Date(0+0000)/",
                "Total": 12.5,
                "LineCount": 2
            }],
            "Tags": ["2015-06-06T00:00:00"]
        });
        let parsed = parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            parsed.get("DateTimeUTC"),
            Some(&Value::DateTime(datetime!(2015-03-21 00:00:00)))
        );
        let invoice = &parsed.get("Invoices").and_then(Value::as_list).unwrap()[0];
        assert_eq!(invoice.get("Date"), Some(&Value::Date(date!(2015 - 06 - 06))));
        assert_eq!(invoice.get("UpdatedDateUTC"), Some(&Value::Null));
        assert_eq!(invoice.get("Total"), Some(&Value::Decimal(dec!(12.5))));
        assert_eq!(invoice.get("LineCount"), Some(&Value::Integer(2)));
        // bare array members are not object values
        assert_eq!(
            parsed.get("Tags"),
            Some(&Value::List(vec![Value::from("2015-06-06T00:00:00")]))
        );
    }

    #[test]
    fn documents_convert_to_json() {
        let doc = Document::new()
            .with("name", "Fit out")
            .with("deadlineUtc", datetime!(2024-01-02 03:04:05))
            .with("estimateAmount", dec!(99.50))
            .with("missing", Value::Null);
        assert_eq!(
            to_json(&Value::Map(doc)),
            json!({
                "name": "Fit out",
                "deadlineUtc": "2024-01-02T03:04:05",
                "estimateAmount": 99.5,
                "missing": null
            })
        );
    }
}
