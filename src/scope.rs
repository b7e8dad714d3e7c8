use oauth2::Scope as OAuth2Scope;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FromIterator;
use std::str::FromStr;

/// Represents a category of Xero API scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeCategory {
    Identity,
    Accounting,
    Assets,
    BankFeeds,
    Files,
    Payroll,
    PaymentServices,
    Projects,
}

/// Represents permission level for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadWrite,
    ReadOnly,
}

/// Predefined Xero API scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    // Identity scopes
    OfflineAccess,
    OpenId,
    Profile,
    Email,

    // Accounting scopes
    AccountingTransactions(Permission),
    AccountingReports,
    AccountingReportsTenninetynine,
    AccountingBudgets,
    AccountingJournals,
    AccountingSettings(Permission),
    AccountingContacts(Permission),
    AccountingAttachments(Permission),

    Assets(Permission),
    BankFeeds,
    Files(Permission),

    // Payroll scopes
    PayrollEmployees(Permission),
    PayrollPayruns(Permission),
    PayrollPayslip(Permission),
    PayrollSettings(Permission),
    PayrollTimesheets(Permission),

    PaymentServices,
    Projects(Permission),
}

impl ScopeType {
    /// The wire name of the scope.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OfflineAccess => "offline_access",
            Self::OpenId => "openid",
            Self::Profile => "profile",
            Self::Email => "email",

            Self::AccountingTransactions(Permission::ReadWrite) => "accounting.transactions",
            Self::AccountingTransactions(Permission::ReadOnly) => "accounting.transactions.read",
            Self::AccountingReports => "accounting.reports.read",
            Self::AccountingReportsTenninetynine => "accounting.reports.tenninetynine.read",
            Self::AccountingBudgets => "accounting.budgets.read",
            Self::AccountingJournals => "accounting.journals.read",
            Self::AccountingSettings(Permission::ReadWrite) => "accounting.settings",
            Self::AccountingSettings(Permission::ReadOnly) => "accounting.settings.read",
            Self::AccountingContacts(Permission::ReadWrite) => "accounting.contacts",
            Self::AccountingContacts(Permission::ReadOnly) => "accounting.contacts.read",
            Self::AccountingAttachments(Permission::ReadWrite) => "accounting.attachments",
            Self::AccountingAttachments(Permission::ReadOnly) => "accounting.attachments.read",

            Self::Assets(Permission::ReadWrite) => "assets",
            Self::Assets(Permission::ReadOnly) => "assets.read",
            Self::BankFeeds => "bankfeeds",
            Self::Files(Permission::ReadWrite) => "files",
            Self::Files(Permission::ReadOnly) => "files.read",

            Self::PayrollEmployees(Permission::ReadWrite) => "payroll.employees",
            Self::PayrollEmployees(Permission::ReadOnly) => "payroll.employees.read",
            Self::PayrollPayruns(Permission::ReadWrite) => "payroll.payruns",
            Self::PayrollPayruns(Permission::ReadOnly) => "payroll.payruns.read",
            Self::PayrollPayslip(Permission::ReadWrite) => "payroll.payslip",
            Self::PayrollPayslip(Permission::ReadOnly) => "payroll.payslip.read",
            Self::PayrollSettings(Permission::ReadWrite) => "payroll.settings",
            Self::PayrollSettings(Permission::ReadOnly) => "payroll.settings.read",
            Self::PayrollTimesheets(Permission::ReadWrite) => "payroll.timesheets",
            Self::PayrollTimesheets(Permission::ReadOnly) => "payroll.timesheets.read",

            Self::PaymentServices => "paymentservices",
            Self::Projects(Permission::ReadWrite) => "projects",
            Self::Projects(Permission::ReadOnly) => "projects.read",
        }
    }

    /// Get the category of this scope
    #[must_use]
    pub fn category(self) -> ScopeCategory {
        match self {
            Self::OfflineAccess | Self::OpenId | Self::Profile | Self::Email => {
                ScopeCategory::Identity
            }

            Self::AccountingTransactions(_)
            | Self::AccountingReports
            | Self::AccountingReportsTenninetynine
            | Self::AccountingBudgets
            | Self::AccountingJournals
            | Self::AccountingSettings(_)
            | Self::AccountingContacts(_)
            | Self::AccountingAttachments(_) => ScopeCategory::Accounting,

            Self::Assets(_) => ScopeCategory::Assets,
            Self::BankFeeds => ScopeCategory::BankFeeds,
            Self::Files(_) => ScopeCategory::Files,

            Self::PayrollEmployees(_)
            | Self::PayrollPayruns(_)
            | Self::PayrollPayslip(_)
            | Self::PayrollSettings(_)
            | Self::PayrollTimesheets(_) => ScopeCategory::Payroll,

            Self::PaymentServices => ScopeCategory::PaymentServices,
            Self::Projects(_) => ScopeCategory::Projects,
        }
    }

    const ALL: [Self; 34] = [
        Self::OfflineAccess,
        Self::OpenId,
        Self::Profile,
        Self::Email,
        Self::AccountingTransactions(Permission::ReadWrite),
        Self::AccountingTransactions(Permission::ReadOnly),
        Self::AccountingReports,
        Self::AccountingReportsTenninetynine,
        Self::AccountingBudgets,
        Self::AccountingJournals,
        Self::AccountingSettings(Permission::ReadWrite),
        Self::AccountingSettings(Permission::ReadOnly),
        Self::AccountingContacts(Permission::ReadWrite),
        Self::AccountingContacts(Permission::ReadOnly),
        Self::AccountingAttachments(Permission::ReadWrite),
        Self::AccountingAttachments(Permission::ReadOnly),
        Self::Assets(Permission::ReadWrite),
        Self::Assets(Permission::ReadOnly),
        Self::BankFeeds,
        Self::Files(Permission::ReadWrite),
        Self::Files(Permission::ReadOnly),
        Self::PayrollEmployees(Permission::ReadWrite),
        Self::PayrollEmployees(Permission::ReadOnly),
        Self::PayrollPayruns(Permission::ReadWrite),
        Self::PayrollPayruns(Permission::ReadOnly),
        Self::PayrollPayslip(Permission::ReadWrite),
        Self::PayrollPayslip(Permission::ReadOnly),
        Self::PayrollSettings(Permission::ReadWrite),
        Self::PayrollSettings(Permission::ReadOnly),
        Self::PayrollTimesheets(Permission::ReadWrite),
        Self::PayrollTimesheets(Permission::ReadOnly),
        Self::PaymentServices,
        Self::Projects(Permission::ReadWrite),
        Self::Projects(Permission::ReadOnly),
    ];
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing a scope from a string
#[derive(Debug, Clone)]
pub struct ParseScopeError(String);

impl fmt::Display for ParseScopeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid scope string: {}", self.0)
    }
}

impl std::error::Error for ParseScopeError {}

impl FromStr for ScopeType {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| ParseScopeError(s.to_string()))
    }
}

/// A set of scopes requested during OAuth2 authorization.
///
/// Serializes as a list of scope strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    scopes: Vec<OAuth2Scope>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::default_scope()
    }
}

impl Scope {
    /// Creates a new scope collection
    #[must_use]
    pub fn new(scope_types: Vec<ScopeType>) -> Self {
        scope_types.into_iter().collect()
    }

    /// `offline_access`, `accounting.transactions.read` and `accounting.contacts.read`.
    #[must_use]
    pub fn default_scope() -> Self {
        Self::new(vec![
            ScopeType::OfflineAccess,
            ScopeType::AccountingTransactions(Permission::ReadOnly),
            ScopeType::AccountingContacts(Permission::ReadOnly),
        ])
    }

    /// Creates a scope from a single scope type
    #[must_use]
    pub fn from_type(scope_type: ScopeType) -> Self {
        Self::new(vec![scope_type])
    }

    /// Creates a scope from a raw string
    #[must_use]
    pub fn from_string(scope: String) -> Self {
        Self {
            scopes: vec![OAuth2Scope::new(scope)],
        }
    }

    /// Add a scope to the collection
    #[must_use]
    pub fn add(mut self, scope_type: ScopeType) -> Self {
        self.scopes.push(OAuth2Scope::new(scope_type.to_string()));
        self
    }

    /// Combine with another scope collection
    #[must_use]
    pub fn combine(mut self, other: Self) -> Self {
        self.scopes.extend(other.scopes);
        self
    }

    #[must_use]
    pub fn contains(&self, scope_type: ScopeType) -> bool {
        self.scopes.iter().any(|s| s.as_str() == scope_type.as_str())
    }

    /// Converts the scopes into OAuth2 scopes.
    #[must_use]
    pub fn into_oauth2_scopes(self) -> Vec<OAuth2Scope> {
        self.scopes
    }

    /// Get a reference to the contained OAuth2 scopes
    #[must_use]
    pub fn as_oauth2_scopes(&self) -> &[OAuth2Scope] {
        &self.scopes
    }

    #[must_use]
    pub fn offline_access() -> Self {
        Self::from_type(ScopeType::OfflineAccess)
    }

    /// `openid`, `profile` and `email`.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(vec![ScopeType::OpenId, ScopeType::Profile, ScopeType::Email])
    }

    /// Create a scope for full access to transactions
    #[must_use]
    pub fn accounting_transactions() -> Self {
        Self::from_type(ScopeType::AccountingTransactions(Permission::ReadWrite))
    }

    #[must_use]
    pub fn accounting_contacts() -> Self {
        Self::from_type(ScopeType::AccountingContacts(Permission::ReadWrite))
    }

    #[must_use]
    pub fn accounting_settings() -> Self {
        Self::from_type(ScopeType::AccountingSettings(Permission::ReadWrite))
    }

    #[must_use]
    pub fn accounting_attachments() -> Self {
        Self::from_type(ScopeType::AccountingAttachments(Permission::ReadWrite))
    }

    #[must_use]
    pub fn files() -> Self {
        Self::from_type(ScopeType::Files(Permission::ReadWrite))
    }

    #[must_use]
    pub fn projects() -> Self {
        Self::from_type(ScopeType::Projects(Permission::ReadWrite))
    }

    #[must_use]
    pub fn bank_feeds() -> Self {
        Self::from_type(ScopeType::BankFeeds)
    }

    #[must_use]
    pub fn payment_services() -> Self {
        Self::from_type(ScopeType::PaymentServices)
    }
}

impl FromIterator<ScopeType> for Scope {
    fn from_iter<I: IntoIterator<Item = ScopeType>>(iter: I) -> Self {
        Self {
            scopes: iter
                .into_iter()
                .map(|st| OAuth2Scope::new(st.to_string()))
                .collect(),
        }
    }
}

impl From<ScopeType> for Scope {
    fn from(scope_type: ScopeType) -> Self {
        Self::from_type(scope_type)
    }
}

impl From<Vec<ScopeType>> for Scope {
    fn from(scope_types: Vec<ScopeType>) -> Self {
        Self::new(scope_types)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_scope_back() {
        for scope in ScopeType::ALL {
            assert_eq!(scope.as_str().parse::<ScopeType>().unwrap(), scope);
        }
        assert!("accounting.everything".parse::<ScopeType>().is_err());
    }

    #[test]
    fn default_scope_requests_offline_access() {
        let scope = Scope::default();
        assert!(scope.contains(ScopeType::OfflineAccess));
        assert_eq!(
            scope.to_string(),
            "offline_access accounting.transactions.read accounting.contacts.read"
        );
    }

    #[test]
    fn categories_follow_the_api() {
        assert_eq!(
            ScopeType::Files(Permission::ReadOnly).category(),
            ScopeCategory::Files
        );
        assert_eq!(
            ScopeType::PayrollTimesheets(Permission::ReadWrite).category(),
            ScopeCategory::Payroll
        );
        assert_eq!(ScopeType::OpenId.category(), ScopeCategory::Identity);
    }

    #[test]
    fn serializes_as_string_list() {
        let scope = Scope::identity();
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json, serde_json::json!(["openid", "profile", "email"]));
        assert_eq!(serde_json::from_value::<Scope>(json).unwrap(), scope);
    }
}
