//! The structural document model shared by the XML and JSON wire formats.
//!
//! A [`Document`] is an insertion-ordered map of [`Value`]s. Field tables decide
//! how untyped text leaves are interpreted when a response is parsed, and which
//! keys are never sent back to Xero.

use std::fmt;

use rust_decimal::Decimal;
use time::{Date, PrimitiveDateTime};

pub mod date;
pub mod json;
pub mod xml;

pub use date::parse_date;
pub use xml::{save_body, to_wire};

use crate::error::{Error, Result};

/// Parses a response body according to its declared content type.
///
/// JSON goes through the date hook; anything that looks like XML is read as an
/// element tree.
pub fn from_wire(body: &[u8], content_type: Option<&str>) -> Result<Value> {
    let content_type = content_type.unwrap_or_default();
    if content_type.starts_with("application/json") {
        return json::parse(body);
    }
    let text = std::str::from_utf8(body).map_err(|e| Error::Xml(e.to_string()))?;
    if content_type.contains("xml") || text.trim_start().starts_with('<') {
        return xml::parse(text.trim_start());
    }
    Err(Error::Xml(format!(
        "cannot read a document from content type {content_type:?}"
    )))
}

/// Fields that always carry a time component.
pub const DATETIME_FIELDS: &[&str] = &[
    "UpdatedDateUTC",
    "Updated",
    "FullyPaidOnDate",
    "DateTimeUTC",
    "CreatedDateUTC",
    "JournalDate",
];

/// Fields that hold a calendar date.
pub const DATE_FIELDS: &[&str] = &[
    "DueDate",
    "Date",
    "PaymentDate",
    "StartDate",
    "EndDate",
    "PeriodLockDate",
    "DateOfBirth",
    "OpeningBalanceDate",
    "PaymentDueDate",
    "ReportingDate",
    "DeliveryDate",
    "ExpectedArrivalDate",
];

pub const BOOLEAN_FIELDS: &[&str] = &[
    "IsSupplier",
    "IsCustomer",
    "IsDemoCompany",
    "PaysTax",
    "IsAuthorisedToApproveTimesheets",
    "IsAuthorisedToApproveLeave",
    "HasHELPDebt",
    "AustralianResidentForTaxPurposes",
    "TaxFreeThresholdClaimed",
    "HasSFSSDebt",
    "EligibleToReceiveLeaveLoading",
    "IsExemptFromTax",
    "IsExemptFromSuper",
    "SentToContact",
    "IsSubscriber",
    "HasAttachments",
    "ShowOnCashBasisReports",
    "IncludeInEmails",
    "CanApplyToRevenue",
    "CanApplyToLiabilities",
    "CanApplyToExpenses",
    "CanApplyToEquity",
    "CanApplyToAssets",
    "IsReconciled",
    "EnablePaymentsToAccount",
    "ShowInExpenseClaims",
    "DiscountEnteredAsPercent",
    "IsPurchased",
    "IsSold",
    "IsTrackedAsInventory",
];

/// Monetary and quantity fields, parsed as [`Decimal`].
pub const DECIMAL_FIELDS: &[&str] = &[
    "Hours",
    "NumberOfUnit",
    "Quantity",
    "UnitAmount",
    "LineAmount",
    "TaxAmount",
    "SubTotal",
    "TotalTax",
    "Total",
    "AmountDue",
    "AmountPaid",
    "AmountCredited",
    "DiscountRate",
    "Amount",
    "AppliedAmount",
    "CurrencyRate",
];

pub const INTEGER_FIELDS: &[&str] = &["FinancialYearEndDay", "FinancialYearEndMonth"];

/// Server computed fields Xero rejects on write.
pub const NO_SEND_FIELDS: &[&str] = &[
    "UpdatedDateUTC",
    "HasValidationErrors",
    "IsDiscounted",
    "DateString",
    "HasErrors",
    "DueDateString",
    "HasAccount",
    "ID",
];

/// Plural collection names and the element name of one member.
pub const OBJECT_NAMES: &[(&str, &str)] = &[
    ("Addresses", "Address"),
    ("Attachments", "Attachment"),
    ("Accounts", "Account"),
    ("BankAccounts", "BankAccount"),
    ("BankTransactions", "BankTransaction"),
    ("BankTransfers", "BankTransfer"),
    ("BrandingThemes", "BrandingTheme"),
    ("BatchPayments", "BatchPayment"),
    ("ContactGroups", "ContactGroup"),
    ("ContactPersons", "ContactPerson"),
    ("Contacts", "Contact"),
    ("CreditNotes", "CreditNote"),
    ("Currencies", "Currency"),
    ("DeductionLines", "DeductionLine"),
    ("Employees", "Employee"),
    ("EarningsLines", "EarningsLine"),
    ("ExpenseClaims", "ExpenseClaim"),
    ("Invoices", "Invoice"),
    ("Items", "Item"),
    ("Journals", "Journal"),
    ("LeaveAccrualLines", "LeaveAccrualLine"),
    ("LeaveBalances", "LeaveBalance"),
    ("LeaveLines", "LeaveLine"),
    ("ManualJournals", "ManualJournal"),
    ("Organisation", "Organisation"),
    ("Overpayments", "Overpayment"),
    ("Payments", "Payment"),
    ("PayrollCalendars", "PayrollCalendar"),
    ("PayRuns", "PayRun"),
    ("Phones", "Phone"),
    ("Prepayments", "Prepayment"),
    ("Projects", "Project"),
    ("Receipts", "Receipt"),
    ("ReimbursementLines", "ReimbursementLine"),
    ("RepeatingInvoices", "RepeatingInvoice"),
    ("Reports", "Report"),
    ("SuperannuationLines", "SuperannuationLine"),
    ("SuperLines", "SuperLine"),
    ("SuperMemberships", "SuperMembership"),
    ("TaxComponents", "TaxComponent"),
    ("TaxLines", "TaxLine"),
    ("TaxRates", "TaxRate"),
    ("Timesheets", "Timesheet"),
    ("TimesheetLines", "TimesheetLine"),
    ("NumberOfUnits", "NumberOfUnit"),
    ("TimesheetEarningsLines", "TimesheetEarningsLine"),
    ("TrackingCategories", "TrackingCategory"),
    ("Tracking", "TrackingCategory"),
    ("Users", "User"),
    ("Associations", "Association"),
    ("Files", "File"),
    ("Folders", "Folder"),
    ("Inbox", "Inbox"),
    ("LineItems", "LineItem"),
    ("JournalLines", "JournalLine"),
    ("PurchaseOrders", "PurchaseOrder"),
    ("Quotes", "Quote"),
];

/// The singular element name for a known plural, e.g. `Phones` -> `Phone`.
#[must_use]
pub fn singular(plural: &str) -> Option<&'static str> {
    OBJECT_NAMES
        .iter()
        .find(|(p, _)| *p == plural)
        .map(|(_, s)| *s)
}

#[must_use]
pub fn is_plural(key: &str) -> bool {
    singular(key).is_some()
}

pub(crate) fn is_date_field(key: &str) -> bool {
    DATE_FIELDS.contains(&key)
}

pub(crate) fn is_datetime_field(key: &str) -> bool {
    DATETIME_FIELDS.contains(&key)
}

pub(crate) fn is_boolean_field(key: &str) -> bool {
    BOOLEAN_FIELDS.contains(&key)
}

/// One node of a structural document.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Date(Date),
    DateTime(PrimitiveDateTime),
    List(Vec<Value>),
    Map(Document),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&Document> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Looks up `key` when this value is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Loose truthiness used where Xero expects a boolean literal.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Decimal(d) => !d.is_zero(),
            Self::String(s) => !s.is_empty(),
            Self::Date(_) | Self::DateTime(_) => true,
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            // integers and decimals compare numerically
            (a, b) => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

/// Text rendering used for XML leaves and quoted filter literals.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => f.write_str(&date::format_wire_date(*d)),
            Self::DateTime(dt) => f.write_str(&date::format_wire_datetime(*dt)),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(_) => f.write_str("{..}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(value: uuid::Uuid) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An insertion-ordered string keyed map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder form of [`Document::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut document = Self::new();
        for (k, v) in iter {
            document.insert(k, v);
        }
        document
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
