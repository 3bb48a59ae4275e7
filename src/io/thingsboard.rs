//! ThingsBoard REST position source
//!
//! Flow:
//! - POST /api/auth/login with tenant credentials, cache the JWT
//! - GET /api/plugins/telemetry/DEVICE/{id}/values/timeseries?keys=lat,lng,lon
//! - On 401 the cached token is dropped and the query is retried once after a fresh login
//!
//! ThingsBoard returns the latest value per key as
//! `{"lat":[{"ts":1700000000000,"value":"34.02"}],"lng":[...]}`. Values arrive as
//! strings unless strict data types are enabled on the server, so both shapes are accepted.

use crate::domain::types::PositionSample;
use crate::io::position_source::{PositionSource, SourceError};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest error body kept in `SourceError::Status`
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Clone)]
pub struct ThingsBoardConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Telemetry key holding latitude
    pub lat_key: String,
    /// Candidate longitude keys, first present wins
    pub lng_keys: Vec<String>,
    pub timeout: Duration,
}

impl Default for ThingsBoardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            username: String::new(),
            password: String::new(),
            lat_key: "lat".to_string(),
            lng_keys: vec!["lng".to_string(), "lon".to_string()],
            timeout: Duration::from_secs(12),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// One timeseries point
#[derive(Debug, Clone, Deserialize)]
pub struct TsPoint {
    pub ts: i64,
    #[serde(deserialize_with = "deserialize_number")]
    pub value: f64,
}

/// Latest-values response, keyed by telemetry key
pub type TimeseriesResponse = HashMap<String, Vec<TsPoint>>;

fn deserialize_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct NumberVisitor;

    impl<'de> Visitor<'de> for NumberVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or numeric string")
        }

        fn visit_f64<E>(self, value: f64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_u64<E>(self, value: u64) -> Result<f64, E>
        where
            E: de::Error,
        {
            Ok(value as f64)
        }

        fn visit_str<E>(self, value: &str) -> Result<f64, E>
        where
            E: de::Error,
        {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("not a number: {:?}", value)))
        }
    }

    deserializer.deserialize_any(NumberVisitor)
}

/// Decode a raw response body into the latest position sample
pub fn decode_latest(
    body: &str,
    lat_key: &str,
    lng_keys: &[String],
) -> Result<Option<PositionSample>, SourceError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }

    let response: TimeseriesResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;

    Ok(latest_sample(&response, lat_key, lng_keys))
}

/// Pick the newest lat/lng pair. The sample time is the later of the two points.
pub fn latest_sample(
    response: &TimeseriesResponse,
    lat_key: &str,
    lng_keys: &[String],
) -> Option<PositionSample> {
    let newest = |key: &str| response.get(key).and_then(|points| points.iter().max_by_key(|p| p.ts));

    let lat = newest(lat_key)?;
    let lng = lng_keys.iter().find_map(|key| newest(key))?;

    Some(PositionSample::new(lat.value, lng.value, lat.ts.max(lng.ts)))
}

/// Position source backed by the ThingsBoard REST API
pub struct ThingsBoardSource {
    config: ThingsBoardConfig,
    http: reqwest::Client,
    /// Cached JWT, cleared on 401
    token: Mutex<Option<String>>,
}

impl ThingsBoardSource {
    pub fn new(config: ThingsBoardConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(config.timeout).http1_only().build()?;
        Ok(Self { config, http, token: Mutex::new(None) })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn timeseries_url(&self, device_id: &str) -> String {
        let mut keys = Vec::with_capacity(1 + self.config.lng_keys.len());
        keys.push(self.config.lat_key.as_str());
        keys.extend(self.config.lng_keys.iter().map(String::as_str));
        format!(
            "{}/api/plugins/telemetry/DEVICE/{}/values/timeseries?keys={}",
            self.base_url(),
            device_id,
            keys.join(",")
        )
    }

    async fn login(&self) -> Result<String, SourceError> {
        let url = format!("{}/api/auth/login", self.base_url());
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { username: &self.config.username, password: &self.config.password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Auth(format!("status {}: {}", status.as_u16(), truncate(&body))));
        }

        let login: LoginResponse =
            response.json().await.map_err(|e| SourceError::Auth(e.to_string()))?;
        info!(base_url = %self.base_url(), "thingsboard_logged_in");
        Ok(login.token)
    }

    async fn token(&self) -> Result<String, SourceError> {
        let cached = self.token.lock().clone();
        if let Some(token) = cached {
            return Ok(token);
        }
        let token = self.login().await?;
        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    async fn query(&self, url: &str, token: &str) -> Result<reqwest::Response, SourceError> {
        let response = self
            .http
            .get(url)
            .header("X-Authorization", format!("Bearer {}", token))
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl PositionSource for ThingsBoardSource {
    async fn fetch_latest(&self, device_id: &str) -> Result<Option<PositionSample>, SourceError> {
        let url = self.timeseries_url(device_id);

        let token = self.token().await?;
        let mut response = self.query(&url, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("thingsboard_token_rejected");
            *self.token.lock() = None;
            let token = self.token().await?;
            response = self.query(&url, &token).await?;
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Status { status: status.as_u16(), body: truncate(&body) });
        }

        debug!(device_id = %device_id, bytes = %body.len(), "thingsboard_timeseries_received");
        decode_latest(&body, &self.config.lat_key, &self.config.lng_keys)
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}
