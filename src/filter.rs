//! Compiles keyword style filters into Xero's `where` predicate language.
//!
//! ```
//! use xero_connect::filter::Filter;
//!
//! let compiled = Filter::new()
//!     .eq("Status", "VOIDED")
//!     .raw(r#"Name.ToLower()=="x""#)
//!     .compile("Invoices")
//!     .unwrap();
//! assert_eq!(
//!     compiled.params,
//!     vec![("where".to_owned(), r#"Name.ToLower()=="x"&&Status=="VOIDED""#.to_owned())]
//! );
//! ```

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::document::{
    Value,
    date::{format_http_date, format_iso_date, format_iso_datetime},
    is_boolean_field, is_date_field, is_datetime_field,
};
use crate::error::{Error, Result};

/// How an extra per-resource query parameter is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    Bool,
    Date,
    Text,
    Uuid,
    List,
}

/// Query parameters a resource accepts outside the `where` clause.
fn extra_params(resource: &str) -> &'static [(&'static str, ParamType)] {
    match resource {
        "Invoices" => &[
            ("createdByMyApp", ParamType::Bool),
            ("summaryOnly", ParamType::Bool),
            ("IDs", ParamType::List),
            ("InvoiceNumbers", ParamType::List),
            ("ContactIDs", ParamType::List),
            ("Statuses", ParamType::List),
        ],
        "PurchaseOrders" => &[
            ("DateFrom", ParamType::Date),
            ("DateTo", ParamType::Date),
            ("Status", ParamType::Text),
        ],
        "Quotes" => &[
            ("ContactID", ParamType::Uuid),
            ("ExpiryDateFrom", ParamType::Date),
            ("ExpiryDateTo", ParamType::Date),
            ("DateFrom", ParamType::Date),
            ("DateTo", ParamType::Date),
            ("Status", ParamType::Text),
            ("QuoteNumber", ParamType::Text),
        ],
        "Journals" => &[("paymentsOnly", ParamType::Bool)],
        "Budgets" => &[("DateFrom", ParamType::Date), ("DateTo", ParamType::Date)],
        "Contacts" => &[
            ("IDs", ParamType::List),
            ("includeArchived", ParamType::Bool),
            ("summaryOnly", ParamType::Bool),
            ("searchTerm", ParamType::Text),
        ],
        "TrackingCategories" => &[("includeArchived", ParamType::Bool)],
        _ => &[],
    }
}

/// Value of the `If-Modified-Since` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Since {
    DateTime(PrimitiveDateTime),
    /// Sent quoted, as given.
    Literal(String),
}

impl From<PrimitiveDateTime> for Since {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<&str> for Since {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl From<String> for Since {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Query parameters and headers produced by [`Filter::compile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledFilter {
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

/// A filter over one resource collection.
///
/// Predicate keys follow the `Field__operator` convention: `contains`,
/// `startswith`, `endswith`, `tolower`, `toupper`, `gt`, `lt`, `gte`, `lte`, `ne`
/// and `isnull`. A single `_` in a field name selects a nested field, so
/// `Contact_ContactID` filters on `Contact.ContactID`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<(String, Value)>,
    raw: Option<String>,
    since: Option<Since>,
    order: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
    offset: Option<u64>,
    extras: Vec<(String, Value)>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate, e.g. `("Date__gt", date)`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((key.into(), value.into()));
        self
    }

    /// Equality on `field`.
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, value)
    }

    /// A literal predicate placed ahead of the generated ones.
    #[must_use]
    pub fn raw(mut self, predicate: impl Into<String>) -> Self {
        self.raw = Some(predicate.into());
        self
    }

    #[must_use]
    pub fn since(mut self, since: impl Into<Since>) -> Self {
        self.since = Some(since.into());
        self
    }

    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// A resource specific query parameter such as `IDs` on invoices.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.push((name.into(), value.into()));
        self
    }

    /// Compiles the filter for `resource` (e.g. `Invoices`).
    pub fn compile(&self, resource: &str) -> Result<CompiledFilter> {
        let mut compiled = CompiledFilter::default();

        if let Some(since) = &self.since {
            let value = match since {
                Since::DateTime(dt) => format_http_date(*dt),
                Since::Literal(s) => format!("\"{s}\""),
            };
            compiled
                .headers
                .push(("If-Modified-Since".to_owned(), value));
        }

        if let Some(order) = &self.order {
            compiled.params.push(("order".to_owned(), order.clone()));
        }
        if let Some(offset) = self.offset {
            compiled.params.push(("offset".to_owned(), offset.to_string()));
        }
        if let Some(page) = self.page {
            compiled.params.push(("page".to_owned(), page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            compiled
                .params
                .push(("pageSize".to_owned(), page_size.to_string()));
        }

        let allowed = extra_params(resource);
        for (name, value) in &self.extras {
            let Some((_, kind)) = allowed.iter().find(|(n, _)| n == name) else {
                return Err(Error::InvalidFilter(format!(
                    "{resource} does not accept the `{name}` parameter"
                )));
            };
            compiled
                .params
                .push((name.clone(), render_extra(name, *kind, value)?));
        }

        let mut clauses: Vec<String> = self.raw.iter().cloned().collect();
        let (null_checks, others): (Vec<_>, Vec<_>) = self
            .predicates
            .iter()
            .partition(|(key, _)| key.contains("isnull"));
        for (key, value) in null_checks.into_iter().chain(others) {
            clauses.push(predicate(key, value)?);
        }
        if !clauses.is_empty() {
            compiled.params.push(("where".to_owned(), clauses.join("&&")));
        }

        Ok(compiled)
    }
}

fn comparison(op: &str) -> Option<&'static str> {
    Some(match op {
        "gt" => ">",
        "lt" => "<",
        "gte" => ">=",
        "lte" => "<=",
        "ne" => "!=",
        _ => return None,
    })
}

fn predicate(key: &str, value: &Value) -> Result<String> {
    let parts: Vec<&str> = key.split("__").collect();
    match parts.as_slice() {
        [_] => Ok(format!("{}=={}", key.replace('_', "."), literal(key, value))),
        [field, op] => {
            let path = field.replace('_', ".");
            match *op {
                "contains" | "startswith" | "endswith" => {
                    Ok(format!("{path}.{op}({})", literal(key, value)))
                }
                "tolower" | "toupper" => Ok(format!("{path}.{op}()=={}", literal(key, value))),
                "isnull" => Ok(format!(
                    "{path}{}=null",
                    if value.is_truthy() { "=" } else { "!" }
                )),
                op => match comparison(op) {
                    Some(symbol) => Ok(format!("{path}{symbol}{}", literal(field, value))),
                    None => Err(Error::InvalidFilter(format!(
                        "unsupported operator `{op}` in `{key}`"
                    ))),
                },
            }
        }
        _ => Err(Error::InvalidFilter(format!("malformed filter key `{key}`"))),
    }
}

/// Renders the right hand side of a predicate. `key` selects the field type.
fn literal(key: &str, value: &Value) -> String {
    let last = key.rsplit('_').next().unwrap_or(key);
    if last.ends_with("ID") {
        return format!("Guid(\"{}\")", guid(&value.to_string()));
    }
    if is_boolean_field(key) {
        return if value.is_truthy() { "true" } else { "false" }.to_owned();
    }
    match value {
        Value::Date(d) if is_date_field(key) => {
            format!("DateTime({},{},{})", d.year(), u8::from(d.month()), d.day())
        }
        Value::DateTime(dt) if is_date_field(key) => format!(
            "DateTime({},{},{})",
            dt.year(),
            u8::from(dt.month()),
            dt.day()
        ),
        Value::DateTime(dt) if is_datetime_field(key) => format_iso_datetime(*dt),
        Value::Date(d) if is_datetime_field(key) => format_iso_date(*d),
        other => format!("\"{other}\""),
    }
}

/// Dashless form of a UUID; other identifiers pass through.
fn guid(value: &str) -> String {
    Uuid::parse_str(value).map_or_else(|_| value.to_owned(), |u| u.simple().to_string())
}

fn strict_guid(name: &str, value: &str) -> Result<String> {
    Uuid::parse_str(value)
        .map(|u| u.simple().to_string())
        .map_err(|_| Error::InvalidFilter(format!("`{name}` expects UUIDs, got `{value}`")))
}

fn render_extra(name: &str, kind: ParamType, value: &Value) -> Result<String> {
    Ok(match kind {
        ParamType::Bool => if value.is_truthy() { "true" } else { "false" }.to_owned(),
        ParamType::Date => match value {
            Value::Date(d) => format!("{}-{}-{}", d.year(), u8::from(d.month()), d.day()),
            Value::DateTime(dt) => format!("{}-{}-{}", dt.year(), u8::from(dt.month()), dt.day()),
            other => other.to_string(),
        },
        ParamType::Uuid => strict_guid(name, &value.to_string())?,
        ParamType::Text => value.to_string(),
        ParamType::List => {
            let items = match value {
                Value::List(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            let rendered = items
                .iter()
                .map(|item| {
                    if name.ends_with("IDs") {
                        strict_guid(name, &item.to_string())
                    } else {
                        Ok(item.to_string())
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            rendered.join(",")
        }
    })
}
