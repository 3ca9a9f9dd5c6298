//! [Nominatim](https://nominatim.org) backend for [`wayfind_core::Provider`].

mod normalize;

use std::fmt::{self, Write as _};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use exn::ResultExt;
use isahc::prelude::*;
use isahc::{HttpClient, Request};
use wayfind_core::provider::{ProviderError, Signal};
use wayfind_core::{Address, BBox, Context, Provider};

pub use normalize::normalize;

/// Public OpenStreetMap instance.
pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
const PROVIDER_NAME: &str = "nominatim";
const DEFAULT_USER_AGENT: &str = concat!("wayfind/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone)]
pub struct Options {
    pub endpoint: String,
    /// Sent as `User-Agent`. The public instance rejects anonymous clients.
    pub user_agent: Option<String>,
    /// Contact address, sent as `Referer: mailto:<email>`.
    pub email: Option<String>,
    pub limit: usize,
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            user_agent: None,
            email: None,
            limit: 8,
            timeout: Duration::from_secs(15),
        }
    }
}

pub struct Nominatim {
    client: HttpClient,
    options: Options,
}

impl Nominatim {
    pub fn new(options: Options) -> exn::Result<Self, Error> {
        let client = HttpClient::new().or_raise(|| Error("create HTTP client".into()))?;
        Ok(Self { client, options })
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Full request URL for `query` under `context`.
    #[must_use]
    pub fn url(&self, query: &str, context: &Context) -> String {
        let params = params(query, context, self.options.limit);
        format!("{}?{}", self.options.endpoint, encode_params(&params))
    }

    async fn fetch(&self, query: &str, context: &Context) -> Result<Vec<Address>, ProviderError> {
        let url = self.url(query, context);
        let user_agent = self
            .options
            .user_agent
            .as_deref()
            .unwrap_or(DEFAULT_USER_AGENT);

        let mut builder = Request::get(&url)
            .timeout(self.options.timeout)
            .header("User-Agent", user_agent)
            .header("Accept", "application/json");
        if let Some(email) = &self.options.email {
            builder = builder.header("Referer", format!("mailto:{email}"));
        }
        let request = builder
            .body(())
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        tracing::debug!(%url, "nominatim request");
        let mut response = self
            .client
            .send_async(request)
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        parse(&body)
    }
}

impl Provider for Nominatim {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn search(
        &self,
        query: String,
        context: Context,
        signal: Signal,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Address>, ProviderError>> + Send + '_>> {
        Box::pin(async move { signal.guard(self.fetch(&query, &context)).await })
    }
}

/// Decode a `jsonv2` search response. Anything but an array is treated as
/// an empty result.
pub fn parse(body: &str) -> Result<Vec<Address>, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("invalid JSON: {e}")))?;
    match value {
        serde_json::Value::Array(items) => Ok(items.into_iter().map(normalize).collect()),
        other => {
            tracing::debug!(kind = json_kind(&other), "unexpected response shape");
            Ok(Vec::new())
        }
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn params(query: &str, context: &Context, limit: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", query.to_owned()),
        ("format", "jsonv2".to_owned()),
        ("addressdetails", "1".to_owned()),
        ("limit", limit.to_string()),
    ];

    if let Some(locale) = &context.locale {
        params.push(("accept-language", locale.clone()));
    }

    if !context.country_codes.is_empty() {
        let codes = context
            .country_codes
            .iter()
            .map(|c| c.to_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        params.push(("countrycodes", codes));
    }

    if let Some(bbox) = context.region_bias.bbox() {
        params.push(("viewbox", viewbox(&bbox)));
        if context.region_bias.is_strict() {
            params.push(("bounded", "1".to_owned()));
        }
    }

    params
}

/// Nominatim orders viewbox corners as `x1,y1,x2,y2` = west,north,east,south.
fn viewbox(bbox: &BBox) -> String {
    format!("{},{},{},{}", bbox.west, bbox.north, bbox.east, bbox.south)
}

/// `application/x-www-form-urlencoded` query string. Unreserved bytes pass
/// through, spaces become `+`.
fn encode_params(params: &[(&str, String)]) -> String {
    let mut out = String::new();
    for (key, value) in params {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(key);
        out.push('=');
        for byte in value.bytes() {
            if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
                out.push(char::from(byte));
            } else if byte == b' ' {
                out.push('+');
            } else {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}
