use crate::collaborators::CrmBackend;
use crate::config::Config;
use crate::models::{FieldUpdate, RecordType};
use crate::resilience::UpstreamError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

const SERVICE: &str = "CRM";

/// Client for the CRM's JSON:API integration endpoints.
#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CrmClient {
    /// Creates a new `CrmClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the CRM API.
    /// * `token` - The API token for authentication.
    /// * `timeout` - Per-request timeout.
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Fatal(format!("Failed to create CRM client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        Self::new(
            config.crm_base_url.clone(),
            config.crm_token.clone(),
            config.upstream_timeout(),
        )
    }

    fn collection_url(&self, record_type: RecordType) -> String {
        format!("{}/integration/{}s", self.base_url, record_type.as_str())
    }
}

/// Field updates as a JSON:API attributes object. A repeated field keeps its last value.
fn attributes(field_updates: &[FieldUpdate]) -> Map<String, Value> {
    field_updates
        .iter()
        .map(|u| (u.field.clone(), u.value.clone()))
        .collect()
}

/// Pulls the created record's id out of a create response.
///
/// Accepts `data.id` or a top-level `id` / `record_id`, as a string or a number.
pub fn extract_record_id(response: &Value) -> Option<String> {
    let candidates = [
        response.get("data").and_then(|d| d.get("id")),
        response.get("id"),
        response.get("record_id"),
    ];

    candidates.into_iter().flatten().find_map(|id| match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
impl CrmBackend for CrmClient {
    async fn create_record(
        &self,
        record_type: RecordType,
        field_updates: &[FieldUpdate],
    ) -> Result<String, UpstreamError> {
        let url = self.collection_url(record_type);
        tracing::info!(
            "Creating {} in CRM with {} field(s)",
            record_type.as_str(),
            field_updates.len()
        );

        let body = json!({
            "data": {
                "type": record_type.as_str(),
                "attributes": attributes(field_updates)
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamError::from_status(SERVICE, status, &error_text));
        }

        let response_data: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

        match extract_record_id(&response_data) {
            Some(id) => {
                tracing::info!("✓ {} created in CRM: {}", record_type.as_str(), id);
                Ok(id)
            }
            None => {
                tracing::warn!("Unexpected CRM create response: {:?}", response_data);
                Err(UpstreamError::Fatal(
                    "CRM create response missing 'id' field".to_string(),
                ))
            }
        }
    }

    async fn update_record(
        &self,
        record_type: RecordType,
        record_id: &str,
        field_updates: &[FieldUpdate],
    ) -> Result<(), UpstreamError> {
        let url = format!("{}/{}", self.collection_url(record_type), record_id);
        tracing::info!("Updating {} {} in CRM", record_type.as_str(), record_id);

        let body = json!({
            "data": {
                "type": record_type.as_str(),
                "id": record_id,
                "attributes": attributes(field_updates)
            }
        });

        let response = self
            .client
            .patch(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamError::from_status(SERVICE, status, &error_text));
        }

        tracing::info!("✓ {} {} updated in CRM", record_type.as_str(), record_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = CrmClient::new(
            "https://crm.example.com/".to_string(),
            "token".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.collection_url(RecordType::Lead),
            "https://crm.example.com/integration/leads"
        );
    }

    #[test]
    fn test_extract_record_id_variants() {
        assert_eq!(
            extract_record_id(&json!({"data": {"id": "abc"}})).as_deref(),
            Some("abc")
        );
        assert_eq!(extract_record_id(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(
            extract_record_id(&json!({"record_id": "r-1"})).as_deref(),
            Some("r-1")
        );
        assert_eq!(extract_record_id(&json!({"ok": true})), None);
    }

    #[test]
    fn test_attributes_map_each_field() {
        let attrs = attributes(&[
            FieldUpdate::new("full_name", "Jane Doe"),
            FieldUpdate::new("title", "CFO"),
        ]);
        assert_eq!(attrs.get("title"), Some(&json!("CFO")));
        assert_eq!(attrs.len(), 2);
    }
}
