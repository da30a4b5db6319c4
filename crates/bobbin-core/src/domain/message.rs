//! Dispatch message: the transient queue payload that tells a worker which job to run.

use serde::{Deserialize, Serialize};

use super::errors::QueueError;
use super::ids::JobId;
use super::params::JobParams;

/// Wire shape `{ "id": ..., "params": {...} }`.
///
/// Unknown keys are ignored and `job_id` is accepted for `id`, so producers and
/// workers can be deployed independently. The Job Store stays authoritative for
/// whether the job exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    #[serde(alias = "job_id")]
    pub id: JobId,

    #[serde(default, deserialize_with = "super::params::nullable")]
    pub params: JobParams,
}

impl DispatchMessage {
    pub fn new(id: JobId, params: JobParams) -> Self {
        Self { id, params }
    }

    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Encode(e.to_string()))
    }

    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_legacy_job_id_key_and_ignores_unknown_fields() {
        let body = r#"{"job_id":"abc","params":{"sql_1":"true"},"trace":"x","v":2}"#;
        let msg = DispatchMessage::decode(body).unwrap();
        assert_eq!(msg.id.as_str(), "abc");
        assert_eq!(msg.params.enabled().collect::<Vec<_>>(), vec!["sql_1"]);
    }

    #[test]
    fn missing_params_decode_as_empty() {
        let msg = DispatchMessage::decode(r#"{"id":"abc"}"#).unwrap();
        assert!(msg.params.is_empty());
    }

    #[test]
    fn null_params_decode_as_empty() {
        let msg = DispatchMessage::decode(r#"{"job_id":"abc","params":null}"#).unwrap();
        assert!(msg.params.is_empty());
    }

    #[test]
    fn encoded_form_uses_id_key() {
        let msg = DispatchMessage::new(JobId::parse("abc").unwrap(), JobParams::new());
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["id"], "abc");
        assert!(value.get("job_id").is_none());
    }

    #[test]
    fn rejects_bodies_without_an_id() {
        assert!(DispatchMessage::decode(r#"{"params":{}}"#).is_err());
        assert!(DispatchMessage::decode("not json").is_err());
    }
}
