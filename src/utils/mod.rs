use uuid::Uuid;

/// Maximum length Xero accepts for an `Idempotency-Key` header.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Parses an `application/x-www-form-urlencoded` body.
///
/// Pairs without a value are dropped, so a plain-text body yields an empty list.
#[must_use]
pub fn parse_qs(text: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(text.trim().as_bytes())
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Generates a 128 character idempotency key from four random UUIDs, as Xero recommends.
#[must_use]
pub fn generate_idempotency_key() -> String {
    (0..4).map(|_| Uuid::new_v4().simple().to_string()).collect()
}

/// The user agent sent when neither the caller nor the credentials name one.
#[must_use]
pub fn default_user_agent() -> String {
    format!("xero-connect/{}", env!("CARGO_PKG_VERSION"))
}

/// Picks the first configured user agent, falling back to [`default_user_agent`].
#[must_use]
pub fn resolve_user_agent(explicit: Option<&str>, fallback: Option<&str>) -> String {
    explicit
        .or(fallback)
        .map_or_else(default_user_agent, str::to_owned)
}
