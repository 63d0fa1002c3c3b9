//! Auto-fill transport seam and the built-in mock backend.
//!
//! The engine never performs I/O itself; callers hand requests to an
//! [`AutoFillTransport`] and feed the outcome back. [`MockTransport`]
//! resolves the `/api/*` demo endpoints from static tables, useful for tests
//! and the CLI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::FormError;

/// Wire shape of an auto-fill response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// External collaborator performing the actual lookup.
///
/// An `Err` from the transport is treated by the engine exactly like a
/// `success: false` response.
pub trait AutoFillTransport {
    fn request(&self, endpoint: &str, params: &Map<String, Value>)
        -> Result<ApiResponse, FormError>;
}

/// Static-table transport for the demo endpoints.
///
/// `/api/address` maps Bulgarian postal codes to city/state/region/country;
/// `/api/company` maps VAT numbers to company details. Unknown `/api/*`
/// endpoints fail with a message; anything else is a transport error.
pub struct MockTransport {
    address_by_zip: BTreeMap<&'static str, Value>,
    company_by_vat: BTreeMap<&'static str, Value>,
}

impl MockTransport {
    pub fn new() -> Self {
        let mut address_by_zip = BTreeMap::new();
        for (zip, city) in [
            ("1000", "Sofia"),
            ("4000", "Plovdiv"),
            ("5000", "Veliko Tarnovo"),
            ("6000", "Stara Zagora"),
            ("7000", "Ruse"),
            ("8000", "Burgas"),
            ("9000", "Varna"),
        ] {
            let state = if zip == "1000" { "Sofia City" } else { city };
            address_by_zip.insert(
                zip,
                json!({
                    "city": city,
                    "state": state,
                    "region": state,
                    "country": "Bulgaria",
                }),
            );
        }

        let mut company_by_vat = BTreeMap::new();
        company_by_vat.insert(
            "BG123456789",
            json!({
                "companyName": "Tech Solutions Ltd",
                "address": "123 Main St",
                "companyAddress": "123 Main St",
                "city": "Sofia",
                "companyCity": "Sofia",
            }),
        );
        company_by_vat.insert(
            "DE123456789",
            json!({
                "companyName": "Berlin Data GmbH",
                "address": "Alexanderplatz 8",
                "companyAddress": "Alexanderplatz 8",
                "city": "Berlin",
                "companyCity": "Berlin",
            }),
        );

        Self {
            address_by_zip,
            company_by_vat,
        }
    }

    fn resolve_address(&self, params: &Map<String, Value>) -> ApiResponse {
        let zip = first_param(
            params,
            &["zipCode", "postalCode", "personalPostalCode", "businessPostalCode"],
        );
        if zip.is_empty() {
            return ApiResponse::failed("Postal code is required for address auto-fill");
        }
        match self.address_by_zip.get(zip.as_str()) {
            Some(data) => ApiResponse::ok(data.as_object().cloned().unwrap_or_default()),
            None => ApiResponse::failed(format!("No Bulgarian city found for postal code {zip}")),
        }
    }

    fn resolve_company(&self, params: &Map<String, Value>) -> ApiResponse {
        let vat = first_param(
            params,
            &["vatNumber", "companyVatNumber", "businessVatNumber"],
        )
        .to_uppercase();
        if vat.is_empty() {
            return ApiResponse::failed("VAT number is required for company auto-fill");
        }
        match self.company_by_vat.get(vat.as_str()) {
            Some(data) => ApiResponse::ok(data.as_object().cloned().unwrap_or_default()),
            None => ApiResponse::failed(format!("No company found for VAT number {vat}")),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoFillTransport for MockTransport {
    fn request(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
    ) -> Result<ApiResponse, FormError> {
        if !endpoint.starts_with("/api/") {
            return Err(FormError::Transport(format!(
                "endpoint \"{endpoint}\" is not handled by the mock transport"
            )));
        }
        Ok(match endpoint {
            "/api/address" => self.resolve_address(params),
            "/api/company" => self.resolve_company(params),
            _ => ApiResponse::failed(format!("Mock endpoint \"{endpoint}\" is not implemented")),
        })
    }
}

/// First non-empty parameter among the accepted aliases, stringified and trimmed.
fn first_param(params: &Map<String, Value>, names: &[&str]) -> String {
    for name in names {
        if let Some(value) = params.get(*name) {
            let text = match value {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}
