use std::sync::Mutex;

use chrono::NaiveDate;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{AriaCredentials, AriaSettings};
use crate::domain::VisitId;
use crate::error::DlsError;

pub const ENTITY_TYPE_VISIT: &str = "visit";
pub const RECORD_DLS_CRYOEM: &str = "DLS_CRYOEM";
pub const RECORD_GENERIC: &str = "Generic";
pub const FIELD_JSON: &str = "JSON";
pub const FIELD_DATA_LOCATION: &str = "DATA_LOCATION";

/// ARIA entity that owns buckets. Deposition always targets a visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataManager {
    pub entity_id: u64,
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub id: String,
    pub entity_id: u64,
    pub entity_type: String,
    pub embargoed_until: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: String,
    pub bucket_id: String,
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub id: String,
    pub record_id: String,
    pub field_type: String,
    pub content: Value,
}

pub trait DepositionTarget: Send + Sync {
    fn login(&self) -> Result<(), DlsError>;
    fn new_data_manager(&self, visit_id: VisitId) -> Result<DataManager, DlsError>;
    fn create_bucket(&self, owner: &DataManager, embargo: NaiveDate) -> Result<Bucket, DlsError>;
    fn create_record(&self, bucket_id: &str, schema: &str) -> Result<Record, DlsError>;
    fn create_field(
        &self,
        record_id: &str,
        field_type: &str,
        content: &Value,
    ) -> Result<Field, DlsError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct AriaHttpClient {
    client: Client,
    api_url: String,
    token_url: String,
    credentials: AriaCredentials,
    token: Mutex<Option<String>>,
}

impl AriaHttpClient {
    /// Returns `None` when no client credentials are configured.
    pub fn from_settings(settings: &AriaSettings) -> Result<Option<Self>, DlsError> {
        let Some(credentials) = settings.credentials.clone() else {
            return Ok(None);
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("fandango-dls/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DlsError::AriaHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| DlsError::AriaHttp(err.to_string()))?;
        Ok(Some(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            token_url: settings.token_url.clone(),
            credentials,
            token: Mutex::new(None),
        }))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn bearer(&self) -> Result<String, DlsError> {
        let guard = self
            .token
            .lock()
            .map_err(|_| DlsError::AriaAuth("token lock poisoned".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| DlsError::AriaAuth("not logged in".to_string()))
    }

    fn post(&self, path: &str, body: Value) -> Result<Value, DlsError> {
        let url = self.endpoint(path);
        let token = self.bearer()?;
        debug!(%url, "aria request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(|err| DlsError::AriaHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| DlsError::AriaHttp(err.to_string()))
    }

    fn send(request: RequestBuilder) -> Result<Response, DlsError> {
        request
            .send()
            .map_err(|err| DlsError::AriaHttp(err.to_string()))
    }

    fn handle_status(response: Response) -> Result<Response, DlsError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "ARIA request failed".to_string());
        Err(DlsError::AriaStatus { status, message })
    }
}

impl DepositionTarget for AriaHttpClient {
    fn login(&self) -> Result<(), DlsError> {
        let request = self.client.post(&self.token_url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ]);
        let response = Self::send(request)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(DlsError::AriaAuth(format!(
                "token endpoint returned status {status}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .map_err(|err| DlsError::AriaAuth(err.to_string()))?;
        let mut guard = self
            .token
            .lock()
            .map_err(|_| DlsError::AriaAuth("token lock poisoned".to_string()))?;
        *guard = Some(token.access_token);
        Ok(())
    }

    fn new_data_manager(&self, visit_id: VisitId) -> Result<DataManager, DlsError> {
        Ok(DataManager {
            entity_id: visit_id.get(),
            entity_type: ENTITY_TYPE_VISIT.to_string(),
        })
    }

    fn create_bucket(&self, owner: &DataManager, embargo: NaiveDate) -> Result<Bucket, DlsError> {
        let embargoed_until = embargo.format("%Y-%m-%d").to_string();
        let response = self.post(
            &format!("{}s/{}/buckets", owner.entity_type, owner.entity_id),
            json!({
                "entity_id": owner.entity_id,
                "entity_type": owner.entity_type,
                "embargoed_until": embargoed_until,
            }),
        )?;
        Ok(Bucket {
            id: entity_id(&response)?,
            entity_id: owner.entity_id,
            entity_type: owner.entity_type.clone(),
            embargoed_until,
        })
    }

    fn create_record(&self, bucket_id: &str, schema: &str) -> Result<Record, DlsError> {
        let response = self.post(
            &format!("buckets/{bucket_id}/records"),
            json!({ "bucket": bucket_id, "schema": schema }),
        )?;
        Ok(Record {
            id: entity_id(&response)?,
            bucket_id: bucket_id.to_string(),
            schema: schema.to_string(),
        })
    }

    fn create_field(
        &self,
        record_id: &str,
        field_type: &str,
        content: &Value,
    ) -> Result<Field, DlsError> {
        let response = self.post(
            &format!("records/{record_id}/fields"),
            json!({ "record": record_id, "type": field_type, "content": content }),
        )?;
        Ok(Field {
            id: entity_id(&response)?,
            record_id: record_id.to_string(),
            field_type: field_type.to_string(),
            content: content.clone(),
        })
    }
}

/// Reads the `id` member of an ARIA create response; numeric ids are stringified.
pub fn entity_id(response: &Value) -> Result<String, DlsError> {
    match response.get("id") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(DlsError::AriaHttp(
            "response is missing an entity id".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_accepts_strings_and_numbers() {
        assert_eq!(entity_id(&json!({"id": "b-1"})).unwrap(), "b-1");
        assert_eq!(entity_id(&json!({"id": 42})).unwrap(), "42");
        assert!(entity_id(&json!({"uuid": "x"})).is_err());
    }
}
