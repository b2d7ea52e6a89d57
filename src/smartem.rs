use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::config::SmartemSettings;
use crate::domain::AcquisitionId;
use crate::error::DlsError;

/// One SmartEM entity as returned by the API: a JSON object carrying at least a `uuid`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord(Value);

impl RemoteRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.0.get("uuid").and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Read-only view of the SmartEM decision-support API.
///
/// `get_atlas` and `get_quality_prediction` return `Ok(None)` when the entity
/// simply does not exist; `Err` is reserved for transport or server failures.
pub trait SessionSource: Send + Sync {
    fn list_acquisitions(&self) -> Result<Vec<RemoteRecord>, DlsError>;
    fn get_acquisition(&self, id: &AcquisitionId) -> Result<RemoteRecord, DlsError>;
    fn get_grids(&self, acquisition_id: &AcquisitionId) -> Result<Vec<RemoteRecord>, DlsError>;
    fn get_grid_squares(&self, grid_id: &str) -> Result<Vec<RemoteRecord>, DlsError>;
    fn get_foil_holes(&self, grid_square_id: &str) -> Result<Vec<RemoteRecord>, DlsError>;
    fn get_micrographs(&self, foil_hole_id: &str) -> Result<Vec<RemoteRecord>, DlsError>;
    fn get_atlas(&self, grid_id: &str) -> Result<Option<RemoteRecord>, DlsError>;
    fn get_quality_prediction(&self, grid_square_id: &str)
    -> Result<Option<RemoteRecord>, DlsError>;
}

#[derive(Clone)]
pub struct SmartemHttpClient {
    client: Client,
    base_url: String,
}

impl SmartemHttpClient {
    pub fn new(settings: &SmartemSettings) -> Result<Self, DlsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("fandango-dls/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DlsError::SmartemHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| DlsError::SmartemHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get_json(&self, path: &str) -> Result<Value, DlsError> {
        let response = self.send(&self.endpoint(path))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| DlsError::SmartemPayload(err.to_string()))
    }

    /// Like `get_json`, but a 404 means the entity does not exist.
    fn get_optional_json(&self, path: &str) -> Result<Option<Value>, DlsError> {
        let response = self.send(&self.endpoint(path))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::handle_status(response)?;
        response
            .json()
            .map(Some)
            .map_err(|err| DlsError::SmartemPayload(err.to_string()))
    }

    fn get_list(&self, path: &str) -> Result<Vec<RemoteRecord>, DlsError> {
        records_from_list(self.get_json(path)?)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, DlsError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "SmartEM request failed".to_string());
        Err(DlsError::SmartemStatus { status, message })
    }

    /// Sends once; failures are reported to the caller, never re-sent.
    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, DlsError> {
        debug!(%url, "smartem request");
        self.client
            .get(url)
            .send()
            .map_err(|err| DlsError::SmartemHttp(err.to_string()))
    }
}

impl SessionSource for SmartemHttpClient {
    fn list_acquisitions(&self) -> Result<Vec<RemoteRecord>, DlsError> {
        self.get_list("acquisitions")
    }

    fn get_acquisition(&self, id: &AcquisitionId) -> Result<RemoteRecord, DlsError> {
        record_from_object(self.get_json(&format!("acquisitions/{id}"))?)
    }

    fn get_grids(&self, acquisition_id: &AcquisitionId) -> Result<Vec<RemoteRecord>, DlsError> {
        self.get_list(&format!("acquisitions/{acquisition_id}/grids"))
    }

    fn get_grid_squares(&self, grid_id: &str) -> Result<Vec<RemoteRecord>, DlsError> {
        self.get_list(&format!("grids/{grid_id}/gridsquares"))
    }

    fn get_foil_holes(&self, grid_square_id: &str) -> Result<Vec<RemoteRecord>, DlsError> {
        self.get_list(&format!("gridsquares/{grid_square_id}/foilholes"))
    }

    fn get_micrographs(&self, foil_hole_id: &str) -> Result<Vec<RemoteRecord>, DlsError> {
        self.get_list(&format!("foilholes/{foil_hole_id}/micrographs"))
    }

    fn get_atlas(&self, grid_id: &str) -> Result<Option<RemoteRecord>, DlsError> {
        match self.get_optional_json(&format!("grids/{grid_id}/atlas"))? {
            Some(value) => optional_record(value),
            None => Ok(None),
        }
    }

    fn get_quality_prediction(
        &self,
        grid_square_id: &str,
    ) -> Result<Option<RemoteRecord>, DlsError> {
        match self.get_optional_json(&format!("gridsquares/{grid_square_id}/quality_predictions"))? {
            Some(value) => optional_record(value),
            None => Ok(None),
        }
    }
}

/// Interprets a payload that may hold zero or one entity.
///
/// `null` and `[]` are absent; a list yields its last (most recent) element.
pub fn optional_record(value: Value) -> Result<Option<RemoteRecord>, DlsError> {
    match value {
        Value::Null => Ok(None),
        Value::Array(mut items) => match items.pop() {
            Some(item) => record_from_object(item).map(Some),
            None => Ok(None),
        },
        other => record_from_object(other).map(Some),
    }
}

pub fn records_from_list(value: Value) -> Result<Vec<RemoteRecord>, DlsError> {
    match value {
        Value::Array(items) => items.into_iter().map(record_from_object).collect(),
        other => Err(DlsError::SmartemPayload(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

fn record_from_object(value: Value) -> Result<RemoteRecord, DlsError> {
    if value.is_object() {
        Ok(RemoteRecord::new(value))
    } else {
        Err(DlsError::SmartemPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use serde_json::json;

    #[test]
    fn quality_prediction_list_takes_latest() {
        let value = json!([
            {"uuid": "qp-1", "value": 0.2},
            {"uuid": "qp-2", "value": 0.9}
        ]);
        let record = optional_record(value).unwrap().unwrap();
        assert_eq!(record.uuid(), Some("qp-2"));
    }

    #[test]
    fn empty_or_null_payload_is_absent() {
        assert!(optional_record(json!([])).unwrap().is_none());
        assert!(optional_record(Value::Null).unwrap().is_none());
    }

    #[test]
    fn list_payload_must_be_array() {
        assert!(records_from_list(json!({"uuid": "x"})).is_err());
        assert_eq!(records_from_list(json!([{"uuid": "x"}])).unwrap().len(), 1);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let settings = SmartemSettings {
            api_url: "http://localhost:8000/".to_string(),
            timeout: Duration::from_secs(5),
        };
        let client = SmartemHttpClient::new(&settings).unwrap();
        assert_eq!(
            client.endpoint("/grids/abc/atlas"),
            "http://localhost:8000/grids/abc/atlas"
        );
    }
}
