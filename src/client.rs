use std::time::Duration;

use crate::credentials::Authorize;
use crate::dispatch::{Dispatcher, RateLimitInfo};
use crate::endpoints::Api;
use crate::error::Result;
use crate::manager::{JsonManager, Manager};

/// Accounting resources exposed through [`Xero::accounting`].
pub const ACCOUNTING_OBJECTS: &[&str] = &[
    "Attachments",
    "Accounts",
    "BankTransactions",
    "BankTransfers",
    "BrandingThemes",
    "BatchPayments",
    "ContactGroups",
    "Contacts",
    "CreditNotes",
    "Currencies",
    "Employees",
    "ExpenseClaims",
    "Invoices",
    "Items",
    "Journals",
    "ManualJournals",
    "Organisations",
    "Overpayments",
    "PaymentServices",
    "Payments",
    "Prepayments",
    "PurchaseOrders",
    "Receipts",
    "RepeatingInvoices",
    "Reports",
    "TaxRates",
    "TrackingCategories",
    "Users",
    "Quotes",
];

pub const PAYROLL_OBJECTS: &[&str] = &[
    "Employees",
    "SuperFunds",
    "Timesheets",
    "PayItems",
    "PayRuns",
    "PayrollCalendars",
    "Payslip",
    "LeaveApplications",
];

pub const FILES_OBJECTS: &[&str] = &["Associations", "Files", "Folders", "Inbox"];

pub const PROJECTS_OBJECTS: &[&str] = &["Projects", "Projectsusers", "Tasks", "Time"];

pub const BANK_FEEDS_OBJECTS: &[&str] = &["FeedConnections", "Statements"];

/// Entry point bundling credentials with a [`Dispatcher`].
///
/// Managers borrow both, so a refresh through [`Xero::credentials_mut`] is visible to the
/// next manager created.
///
/// ```no_run
/// # async fn run() -> xero_connect::error::Result<()> {
/// use xero_connect::{Filter, OAuth2Credentials, Xero, oauth::KeyPair};
///
/// let credentials = OAuth2Credentials::new(KeyPair::from_env()?, None, None);
/// let xero = Xero::new(credentials)?;
/// let drafts = xero
///     .accounting("Invoices")
///     .filter(&Filter::new().eq("Status", "DRAFT"))
///     .await?;
/// # drop(drafts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Xero<C: Authorize> {
    credentials: C,
    dispatcher: Dispatcher,
    unit_price_4dps: bool,
    timeout: Option<Duration>,
}

impl<C: Authorize> Xero<C> {
    pub fn new(credentials: C) -> Result<Self> {
        Ok(Self::with_dispatcher(credentials, Dispatcher::new()?))
    }

    #[must_use]
    pub fn with_dispatcher(credentials: C, dispatcher: Dispatcher) -> Self {
        Self {
            credentials,
            dispatcher,
            unit_price_4dps: false,
            timeout: None,
        }
    }

    /// Sends `unitdp=4` on accounting and payroll reads and writes.
    #[must_use]
    pub fn unit_price_4dps(mut self, enabled: bool) -> Self {
        self.unit_price_4dps = enabled;
        self
    }

    /// Timeout applied to every call made through this client.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut C {
        &mut self.credentials
    }

    #[must_use]
    pub fn into_credentials(self) -> C {
        self.credentials
    }

    /// Rate limits reported by the last response.
    #[must_use]
    pub fn rate_limit_info(&self) -> RateLimitInfo {
        self.dispatcher.rate_limit_info()
    }

    fn xml_manager(&self, name: &str, api: Api) -> Manager<'_, C> {
        let manager = Manager::new(name, api, &self.dispatcher, &self.credentials)
            .unit_price_4dps(self.unit_price_4dps);
        match self.timeout {
            Some(timeout) => manager.timeout(timeout),
            None => manager,
        }
    }

    fn json_manager(&self, name: &str, api: Api) -> JsonManager<'_, C> {
        let manager = JsonManager::new(name, api, &self.dispatcher, &self.credentials);
        match self.timeout {
            Some(timeout) => manager.timeout(timeout),
            None => manager,
        }
    }

    /// Manager for an accounting resource, e.g. `"Invoices"`. See [`ACCOUNTING_OBJECTS`].
    #[must_use]
    pub fn accounting(&self, name: &str) -> Manager<'_, C> {
        self.xml_manager(name, Api::Accounting)
    }

    #[must_use]
    pub fn payroll(&self, name: &str) -> Manager<'_, C> {
        self.xml_manager(name, Api::Payroll)
    }

    #[must_use]
    pub fn files(&self, name: &str) -> JsonManager<'_, C> {
        self.json_manager(name, Api::Files)
    }

    #[must_use]
    pub fn projects(&self, name: &str) -> JsonManager<'_, C> {
        self.json_manager(name, Api::Projects)
    }

    #[must_use]
    pub fn bank_feeds(&self, name: &str) -> JsonManager<'_, C> {
        self.json_manager(name, Api::BankFeeds)
    }

    #[must_use]
    pub fn contacts(&self) -> Manager<'_, C> {
        self.accounting("Contacts")
    }

    #[must_use]
    pub fn invoices(&self) -> Manager<'_, C> {
        self.accounting("Invoices")
    }

    #[must_use]
    pub fn payments(&self) -> Manager<'_, C> {
        self.accounting("Payments")
    }

    #[must_use]
    pub fn credit_notes(&self) -> Manager<'_, C> {
        self.accounting("CreditNotes")
    }

    #[must_use]
    pub fn organisations(&self) -> Manager<'_, C> {
        self.accounting("Organisations")
    }
}
