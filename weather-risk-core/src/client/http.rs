use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::model::{PredictionRequest, RawPredictionResponse};
use crate::{LocationDateKey, PredictionError};

use super::PredictionClient;

/// POSTs `{lat, lon, date_str}` to the scoring service.
#[derive(Debug, Clone)]
pub struct HttpPredictionClient {
    endpoint: String,
    http: Client,
}

impl HttpPredictionClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            http: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Error envelope the scoring service uses on 4xx responses.
#[derive(Debug, Deserialize)]
struct ServiceError {
    error: String,
}

#[async_trait]
impl PredictionClient for HttpPredictionClient {
    #[instrument(skip_all, fields(date_stamp = %key.date_stamp()), level = "debug")]
    async fn predict(&self, key: &LocationDateKey) -> Result<RawPredictionResponse, PredictionError> {
        let res = self
            .http
            .post(&self.endpoint)
            .json(&PredictionRequest::from(key))
            .send()
            .await
            .map_err(PredictionError::Unreachable)?;

        let status = res.status();
        let body = res.text().await.map_err(PredictionError::Unreachable)?;

        if !status.is_success() {
            return Err(PredictionError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed = decode_envelope(&body)?;

        tracing::debug!(
            temperature = parsed.temperature.as_ref().map_or(0, |g| g.len()),
            wind = parsed.wind.as_ref().map_or(0, |g| g.len()),
            precipitation = parsed.precipitation.as_ref().map_or(0, |g| g.len()),
            "prediction received"
        );

        Ok(parsed)
    }
}

/// The envelope must be a JSON object. Derived struct decoding would also
/// take an array positionally, which the service never sends.
fn decode_envelope(body: &str) -> Result<RawPredictionResponse, PredictionError> {
    let value: Value = serde_json::from_str(body).map_err(|e| PredictionError::Decode(e.to_string()))?;

    if !value.is_object() {
        return Err(PredictionError::Decode(format!(
            "expected a JSON object, got {}",
            json_type(&value)
        )));
    }

    serde_json::from_value(value).map_err(|e| PredictionError::Decode(e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ServiceError>(body) {
        Ok(err) => err.error,
        Err(_) => truncate_body(body),
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
