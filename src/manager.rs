//! Operation builders for one named resource collection.
//!
//! [`Manager`] speaks the XML generation (accounting and payroll); [`JsonManager`]
//! speaks the JSON sub-APIs (files, projects and bank feeds). Each operation builds a
//! [`RequestDescriptor`] and hands it to the [`Dispatcher`].

use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::credentials::Authorize;
use crate::dispatch::{Body, Dispatcher, HEADER_IDEMPOTENCY_KEY, Payload, RequestDescriptor};
use crate::document::{self, Document, Value, json::to_json, save_body, to_wire};
use crate::endpoints::Api;
use crate::error::{Error, Result};
use crate::filter::Filter;

/// Longest history note Xero accepts.
pub const MAX_HISTORY_DETAILS_LEN: usize = 2500;

/// Options for `save` and `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// With `false`, Xero reports validation errors per item instead of failing the batch.
    pub summarize_errors: bool,
    pub idempotency_key: Option<String>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            summarize_errors: true,
            idempotency_key: None,
        }
    }
}

impl SaveOptions {
    #[must_use]
    pub fn summarize_errors(mut self, summarize_errors: bool) -> Self {
        self.summarize_errors = summarize_errors;
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// An attachment upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment<'d> {
    pub file_name: &'d str,
    pub data: &'d [u8],
    pub content_type: &'d str,
    /// Publish the attachment on the online invoice.
    pub include_online: bool,
    pub idempotency_key: Option<&'d str>,
}

/// Operations on one XML-generation resource such as `Invoices` or payroll `Employees`.
pub struct Manager<'a, C: Authorize + ?Sized> {
    name: String,
    singular: String,
    api: Api,
    unit_price_4dps: bool,
    timeout: Option<Duration>,
    dispatcher: &'a Dispatcher,
    credentials: &'a C,
}

impl<'a, C: Authorize + ?Sized> Manager<'a, C> {
    #[must_use]
    pub fn new(name: &str, api: Api, dispatcher: &'a Dispatcher, credentials: &'a C) -> Self {
        Self {
            name: name.to_owned(),
            singular: document::singular(name).unwrap_or(name).to_owned(),
            api,
            unit_price_4dps: false,
            timeout: None,
            dispatcher,
            credentials,
        }
    }

    /// Requests and sends unit prices with four decimal places (`unitdp=4`).
    #[must_use]
    pub fn unit_price_4dps(mut self, enabled: bool) -> Self {
        self.unit_price_4dps = enabled;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut all = vec![self.name.as_str()];
        all.extend_from_slice(segments);
        self.credentials.endpoints().resource_url(self.api, &all)
    }

    fn request(&self, method: Method, url: Url) -> RequestDescriptor {
        RequestDescriptor::new(self.api, method, url, &self.name)
    }

    fn extra_params(&self) -> Vec<(&'static str, &'static str)> {
        if self.unit_price_4dps {
            vec![("unitdp", "4")]
        } else {
            Vec::new()
        }
    }

    fn require(&self, operation: &'static str, resources: &[&str]) -> Result<()> {
        if resources.contains(&self.name.as_str()) {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation {
                operation,
                resource: self.name.clone(),
            })
        }
    }

    async fn send(&self, request: RequestDescriptor) -> Result<Payload> {
        self.dispatcher
            .execute(&request, self.credentials, self.timeout)
            .await
    }

    pub(crate) fn get_request(&self, id: &str) -> Result<RequestDescriptor> {
        Ok(self
            .request(Method::GET, self.url(&[id])?)
            .params(self.extra_params())
            .single_object(true))
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get(&self, id: &str) -> Result<Payload> {
        self.send(self.get_request(id)?).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn all(&self) -> Result<Payload> {
        let request = self
            .request(Method::GET, self.url(&[])?)
            .params(self.extra_params());
        self.send(request).await
    }

    pub(crate) fn filter_request(&self, filter: &Filter) -> Result<RequestDescriptor> {
        let compiled = filter.compile(&self.name)?;
        Ok(self
            .request(Method::GET, self.url(&[])?)
            .params(self.extra_params())
            .params(compiled.params)
            .headers(compiled.headers))
    }

    #[instrument(skip(self, filter), fields(resource = %self.name))]
    pub async fn filter(&self, filter: &Filter) -> Result<Payload> {
        self.send(self.filter_request(filter)?).await
    }

    pub(crate) fn save_request(
        &self,
        method: Method,
        data: &Value,
        options: &SaveOptions,
    ) -> Result<RequestDescriptor> {
        let body = save_body(&self.name, &self.singular, data)?;
        let mut request = self
            .request(method, self.url(&[])?)
            .params(self.extra_params())
            .body(Body::Xml(body));
        if !options.summarize_errors {
            request = request.param("summarizeErrors", "false");
        }
        if let Some(key) = &options.idempotency_key {
            request = request.header(HEADER_IDEMPOTENCY_KEY, key);
        }
        Ok(request)
    }

    /// POSTs one document or a list of documents; Xero creates or updates.
    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn save(&self, data: &Value, options: &SaveOptions) -> Result<Payload> {
        self.send(self.save_request(Method::POST, data, options)?)
            .await
    }

    /// PUTs one document or a list of documents; Xero only creates.
    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn put(&self, data: &Value, options: &SaveOptions) -> Result<Payload> {
        self.send(self.save_request(Method::PUT, data, options)?)
            .await
    }

    pub(crate) fn delete_request(&self, id: &str) -> Result<RequestDescriptor> {
        // payments are deleted by posting a DELETED status
        if self.name == "Payments" {
            let body = to_wire(&self.singular, &Document::new().with("Status", "DELETED"))?;
            return Ok(self
                .request(Method::POST, self.url(&[id])?)
                .body(Body::Xml(body)));
        }
        Ok(self.request(Method::DELETE, self.url(&[id])?))
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn delete(&self, id: &str) -> Result<Payload> {
        self.send(self.delete_request(id)?).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_history(&self, id: &str) -> Result<Payload> {
        let request = self.request(Method::GET, self.url(&[id, "history", ""])?);
        self.send(request).await
    }

    /// Builds `PUT {resource}/{id}/history`.
    ///
    /// The body is the `HistoryRecords` collection Xero documents for this endpoint,
    /// so the same shape can later carry several records. A bare `HistoryRecord` root
    /// is accepted too, but is not what the API reference shows.
    pub(crate) fn put_history_request(
        &self,
        id: &str,
        details: &str,
        idempotency_key: Option<&str>,
    ) -> Result<RequestDescriptor> {
        if details.chars().count() > MAX_HISTORY_DETAILS_LEN {
            return Err(Error::InvalidArgument(format!(
                "Xero allows a maximum of {MAX_HISTORY_DETAILS_LEN} characters for history details"
            )));
        }
        let record = Document::new().with("Details", details);
        let body = to_wire(
            "HistoryRecords",
            &Document::new().with("HistoryRecord", record),
        )?;
        let mut request = self
            .request(Method::PUT, self.url(&[id, "history"])?)
            .body(Body::Xml(body));
        if let Some(key) = idempotency_key {
            request = request.header(HEADER_IDEMPOTENCY_KEY, key);
        }
        Ok(request)
    }

    /// Adds a note to the object's history.
    #[instrument(skip(self, details), fields(resource = %self.name))]
    pub async fn put_history(
        &self,
        id: &str,
        details: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Payload> {
        self.send(self.put_history_request(id, details, idempotency_key)?)
            .await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_attachments(&self, id: &str) -> Result<Payload> {
        let request = self.request(Method::GET, self.url(&[id, "Attachments", ""])?);
        self.send(request).await
    }

    /// Raw bytes of one attachment, addressed by file name.
    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_attachment_data(&self, id: &str, file_name: &str) -> Result<Vec<u8>> {
        let request = self
            .request(Method::GET, self.url(&[id, "Attachments", file_name])?)
            .header(reqwest::header::ACCEPT.as_str(), "*/*");
        match self.send(request).await? {
            Payload::Raw(bytes) => Ok(bytes),
            Payload::Document(_) => Err(Error::Xml(
                "expected attachment bytes, received a JSON document".to_owned(),
            )),
        }
    }

    pub(crate) fn put_attachment_request(
        &self,
        id: &str,
        attachment: &Attachment<'_>,
    ) -> Result<RequestDescriptor> {
        let mut request = self
            .request(
                Method::PUT,
                self.url(&[id, "Attachments", attachment.file_name])?,
            )
            .header(reqwest::header::CONTENT_TYPE.as_str(), attachment.content_type)
            .body(Body::Bytes(attachment.data.to_vec()));
        if attachment.include_online {
            request = request.param("IncludeOnline", "true");
        }
        if let Some(key) = attachment.idempotency_key {
            request = request.header(HEADER_IDEMPOTENCY_KEY, key);
        }
        Ok(request)
    }

    #[instrument(skip(self, attachment), fields(resource = %self.name, file_name = attachment.file_name))]
    pub async fn put_attachment_data(
        &self,
        id: &str,
        attachment: &Attachment<'_>,
    ) -> Result<Payload> {
        self.send(self.put_attachment_request(id, attachment)?)
            .await
    }

    /// Emails an invoice to its contact.
    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn email(&self, id: &str) -> Result<Payload> {
        self.require("email", &["Invoices"])?;
        let request = self
            .request(Method::POST, self.url(&[id, "Email"])?)
            .single_object(true);
        self.send(request).await
    }

    /// The URL of the online version of an invoice.
    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn online_invoice(&self, id: &str) -> Result<Payload> {
        self.require("online_invoice", &["Invoices"])?;
        let request = self
            .request(Method::GET, self.url(&[id, "OnlineInvoice"])?)
            .single_object(true);
        self.send(request).await
    }

    /// Actions the organisation's subscription allows.
    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn actions(&self) -> Result<Payload> {
        self.require("actions", &["Organisations"])?;
        let request = self.request(Method::GET, self.url(&["Actions"])?);
        self.send(request).await
    }

    pub(crate) fn put_allocation_request(
        &self,
        id: &str,
        allocation: &Document,
    ) -> Result<RequestDescriptor> {
        self.require("put_allocation", ALLOCATION_RESOURCES)?;
        let mut allocation = allocation.clone();
        if let Some(amount) = allocation.remove("Amount") {
            allocation.insert("AppliedAmount", amount);
        }
        let body = to_wire("Allocation", &allocation)?;
        Ok(self
            .request(Method::PUT, self.url(&[id, "Allocations"])?)
            .body(Body::Xml(body)))
    }

    /// Allocates a credit note, prepayment or overpayment against an invoice.
    ///
    /// An `Amount` key is sent as `AppliedAmount`.
    #[instrument(skip(self, allocation), fields(resource = %self.name))]
    pub async fn put_allocation(&self, id: &str, allocation: &Document) -> Result<Payload> {
        self.send(self.put_allocation_request(id, allocation)?)
            .await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn delete_allocation(&self, id: &str, allocation_id: &str) -> Result<Payload> {
        self.require("delete_allocation", ALLOCATION_RESOURCES)?;
        let request = self
            .request(Method::DELETE, self.url(&[id, "Allocations", allocation_id])?)
            .single_object(true);
        self.send(request).await
    }
}

const ALLOCATION_RESOURCES: &[&str] = &["CreditNotes", "Prepayments", "Overpayments"];

/// Operations on one resource of a JSON sub-API (files, projects, bank feeds).
pub struct JsonManager<'a, C: Authorize + ?Sized> {
    name: String,
    api: Api,
    timeout: Option<Duration>,
    dispatcher: &'a Dispatcher,
    credentials: &'a C,
}

impl<'a, C: Authorize + ?Sized> JsonManager<'a, C> {
    #[must_use]
    pub fn new(name: &str, api: Api, dispatcher: &'a Dispatcher, credentials: &'a C) -> Self {
        Self {
            name: name.to_owned(),
            api,
            timeout: None,
            dispatcher,
            credentials,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut all = vec![self.name.as_str()];
        all.extend_from_slice(segments);
        self.credentials.endpoints().resource_url(self.api, &all)
    }

    fn request(&self, method: Method, url: Url) -> RequestDescriptor {
        RequestDescriptor::new(self.api, method, url, &self.name)
    }

    fn require(&self, operation: &'static str, api: Api) -> Result<()> {
        if self.api == api {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation {
                operation,
                resource: self.name.clone(),
            })
        }
    }

    async fn send(&self, request: RequestDescriptor) -> Result<Payload> {
        self.dispatcher
            .execute(&request, self.credentials, self.timeout)
            .await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get(&self, id: &str) -> Result<Payload> {
        let request = self
            .request(Method::GET, self.url(&[id])?)
            .single_object(true);
        self.send(request).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn all(&self) -> Result<Payload> {
        let request = self.request(Method::GET, self.url(&[])?);
        self.send(request).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn delete(&self, id: &str) -> Result<Payload> {
        let request = self.request(Method::DELETE, self.url(&[id])?);
        self.send(request).await
    }

    /// Targets `{name}/{Id}` when the document carries an `Id`, else the collection.
    pub(crate) fn write_request(
        &self,
        method: Method,
        data: &Value,
        summarize_errors: bool,
    ) -> Result<RequestDescriptor> {
        let url = match data.get("Id").and_then(Value::as_str) {
            Some(id) => self.url(&[id])?,
            None => self.url(&[])?,
        };
        let mut request = self.request(method, url).body(Body::Json(to_json(data)));
        if !summarize_errors {
            request = request.param("summarizeErrors", "false");
        }
        Ok(request)
    }

    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn create(&self, data: &Value) -> Result<Payload> {
        self.send(self.write_request(Method::POST, data, true)?)
            .await
    }

    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn save(&self, data: &Value, summarize_errors: bool) -> Result<Payload> {
        self.require("save", Api::Files)?;
        self.send(self.write_request(Method::PUT, data, summarize_errors)?)
            .await
    }

    /// Files contained in a folder.
    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_files(&self, folder_id: &str) -> Result<Payload> {
        self.require("get_files", Api::Files)?;
        let request = self.request(Method::GET, self.url(&[folder_id, "Files"])?);
        self.send(request).await
    }

    pub(crate) fn upload_request(
        &self,
        folder_id: Option<&str>,
        file_name: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<RequestDescriptor> {
        self.require("upload_file", Api::Files)?;
        let url = match folder_id {
            Some(folder_id) => self.url(&[folder_id])?,
            None => self.url(&[])?,
        };
        Ok(self.request(Method::POST, url).body(Body::Multipart {
            file_name: file_name.to_owned(),
            data: data.to_vec(),
            content_type: content_type.map(str::to_owned),
        }))
    }

    /// Uploads a file into a folder, or the inbox when no folder is given.
    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn upload_file(
        &self,
        folder_id: Option<&str>,
        file_name: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<Payload> {
        self.send(self.upload_request(folder_id, file_name, data, content_type)?)
            .await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_associations(&self, id: &str) -> Result<Payload> {
        self.require("get_associations", Api::Files)?;
        let request = self.request(Method::GET, self.url(&[id, "Associations", ""])?);
        self.send(request).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_association(&self, file_id: &str, object_id: &str) -> Result<Payload> {
        self.require("get_association", Api::Files)?;
        let request = self.request(
            Method::GET,
            self.url(&[file_id, "Associations", object_id])?,
        );
        self.send(request).await
    }

    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn make_association(&self, id: &str, data: &Value) -> Result<Payload> {
        self.require("make_association", Api::Files)?;
        let request = self
            .request(Method::POST, self.url(&[id, "Associations"])?)
            .body(Body::Json(to_json(data)));
        self.send(request).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn delete_association(&self, file_id: &str, object_id: &str) -> Result<Payload> {
        self.require("delete_association", Api::Files)?;
        let request = self.request(
            Method::DELETE,
            self.url(&[file_id, "Associations", object_id])?,
        );
        self.send(request).await
    }

    /// Raw content of a file.
    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_content(&self, file_id: &str) -> Result<Payload> {
        self.require("get_content", Api::Files)?;
        let request = self
            .request(Method::GET, self.url(&[file_id, "Content"])?)
            .header(reqwest::header::ACCEPT.as_str(), "*/*");
        self.send(request).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_tasks(&self, project_id: &str) -> Result<Payload> {
        self.require("get_tasks", Api::Projects)?;
        let request = self.request(Method::GET, self.url(&[project_id, "Tasks"])?);
        self.send(request).await
    }

    #[instrument(skip(self), fields(resource = %self.name))]
    pub async fn get_time(&self, project_id: &str) -> Result<Payload> {
        self.require("get_time", Api::Projects)?;
        let request = self.request(Method::GET, self.url(&[project_id, "Time"])?);
        self.send(request).await
    }

    /// PATCHes a project, e.g. `{"status": "CLOSED"}`.
    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn set_status(&self, project_id: &str, data: &Value) -> Result<Payload> {
        self.require("set_status", Api::Projects)?;
        let request = self
            .request(Method::PATCH, self.url(&[project_id])?)
            .body(Body::Json(to_json(data)));
        self.send(request).await
    }

    /// Asks Xero to remove bank feed statements or connections.
    #[instrument(skip(self, data), fields(resource = %self.name))]
    pub async fn delete_requests(&self, data: &Value) -> Result<Payload> {
        self.require("delete_requests", Api::BankFeeds)?;
        let request = self
            .request(Method::POST, self.url(&["DeleteRequests"])?)
            .body(Body::Json(to_json(data)));
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::PrivateCredentials;

    const KEY: &str = include_str!("../tests/fixtures/private_key.pem");

    fn credentials() -> PrivateCredentials {
        PrivateCredentials::new("consumer", KEY, None).unwrap()
    }

    fn xml(request: &RequestDescriptor) -> &str {
        match &request.body {
            Body::Xml(xml) => xml,
            other => panic!("expected xml, got {other:?}"),
        }
    }

    #[test]
    fn save_wraps_lists_in_plural_root() {
        let dispatcher = Dispatcher::new().unwrap();
        let credentials = credentials();
        let manager = Manager::new("Contacts", Api::Accounting, &dispatcher, &credentials)
            .unit_price_4dps(true);
        let data = Value::from(vec![
            Value::Map(Document::new().with("Name", "A")),
            Value::Map(Document::new().with("Name", "B")),
        ]);
        let request = manager
            .save_request(
                Method::POST,
                &data,
                &SaveOptions::default()
                    .summarize_errors(false)
                    .idempotency_key("abc"),
            )
            .unwrap();
        assert_eq!(
            xml(&request),
            "<Contacts><Contact><Name>A</Name></Contact><Contact><Name>B</Name></Contact></Contacts>"
        );
        assert_eq!(
            request.params,
            vec![
                ("unitdp".to_owned(), "4".to_owned()),
                ("summarizeErrors".to_owned(), "false".to_owned()),
            ]
        );
        assert_eq!(request.header_value("idempotency-key"), Some("abc"));
        assert_eq!(
            request.url.as_str(),
            "https://api.xero.com/api.xro/2.0/Contacts"
        );
    }

    #[test]
    fn payments_are_deleted_by_status() {
        let dispatcher = Dispatcher::new().unwrap();
        let credentials = credentials();
        let manager = Manager::new("Payments", Api::Accounting, &dispatcher, &credentials);
        let request = manager.delete_request("p1").unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(xml(&request), "<Payment><Status>DELETED</Status></Payment>");

        let manager = Manager::new("Invoices", Api::Accounting, &dispatcher, &credentials);
        assert_eq!(manager.delete_request("i1").unwrap().method, Method::DELETE);
    }

    #[test]
    fn history_notes_are_bounded() {
        let dispatcher = Dispatcher::new().unwrap();
        let credentials = credentials();
        let manager = Manager::new("Invoices", Api::Accounting, &dispatcher, &credentials);
        let request = manager
            .put_history_request("i1", "Paid by phone", None)
            .unwrap();
        assert_eq!(
            xml(&request),
            "<HistoryRecords><HistoryRecord><Details>Paid by phone</Details></HistoryRecord></HistoryRecords>"
        );
        assert!(request.url.as_str().ends_with("/Invoices/i1/history"));
        assert!(matches!(
            manager.put_history_request("i1", &"x".repeat(2501), None),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn allocations_rename_amount() {
        let dispatcher = Dispatcher::new().unwrap();
        let credentials = credentials();
        let manager = Manager::new("CreditNotes", Api::Accounting, &dispatcher, &credentials);
        let allocation = Document::new()
            .with("Invoice", Document::new().with("InvoiceID", "abc"))
            .with("Amount", rust_decimal::Decimal::new(1000, 2));
        let request = manager.put_allocation_request("cn1", &allocation).unwrap();
        assert_eq!(
            xml(&request),
            "<Allocation><Invoice><InvoiceID>abc</InvoiceID></Invoice>\
             <AppliedAmount>10.00</AppliedAmount></Allocation>"
        );

        let invoices = Manager::new("Invoices", Api::Accounting, &dispatcher, &credentials);
        assert!(matches!(
            invoices.put_allocation_request("i1", &allocation),
            Err(Error::UnsupportedOperation { operation: "put_allocation", .. })
        ));
    }

    #[test]
    fn attachments_keep_caller_content_type() {
        let dispatcher = Dispatcher::new().unwrap();
        let credentials = credentials();
        let manager = Manager::new("Invoices", Api::Accounting, &dispatcher, &credentials);
        let request = manager
            .put_attachment_request(
                "i1",
                &Attachment {
                    file_name: "receipt 1.pdf",
                    data: b"%PDF",
                    content_type: "application/pdf",
                    include_online: true,
                    idempotency_key: None,
                },
            )
            .unwrap();
        assert_eq!(request.header_value("Content-Type"), Some("application/pdf"));
        assert_eq!(
            request.url.as_str(),
            "https://api.xero.com/api.xro/2.0/Invoices/i1/Attachments/receipt%201.pdf"
        );
        assert_eq!(
            request.params,
            vec![("IncludeOnline".to_owned(), "true".to_owned())]
        );
    }

    #[test]
    fn json_writes_target_the_document_id() {
        let dispatcher = Dispatcher::new().unwrap();
        let credentials = credentials();
        let manager = JsonManager::new("Folders", Api::Files, &dispatcher, &credentials);
        let data = Value::Map(Document::new().with("Id", "f1").with("Name", "Receipts"));
        let request = manager.write_request(Method::PUT, &data, false).unwrap();
        assert_eq!(
            request.url.as_str(),
            "https://api.xero.com/files.xro/1.0/Folders/f1"
        );
        assert_eq!(
            request.body,
            Body::Json(serde_json::json!({"Id": "f1", "Name": "Receipts"}))
        );

        let projects = JsonManager::new("Projects", Api::Projects, &dispatcher, &credentials);
        assert!(matches!(
            projects.upload_request(None, "a.txt", b"a", None),
            Err(Error::UnsupportedOperation { .. })
        ));
    }
}
