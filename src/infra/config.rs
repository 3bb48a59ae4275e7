//! Configuration loading from TOML files and environment
//!
//! Sources, later wins:
//! 1. Built-in defaults
//! 2. TOML file given by --config <path> (or HOME_WATCH_CONFIG)
//! 3. HOME_WATCH_* environment variables
//!
//! The merged result is validated once at startup. Any problem is fatal:
//! a wrong radius or a missing destination would otherwise produce wrong
//! alerts (or none) for as long as the watcher runs.

use crate::domain::geofence::GeofenceError;
use crate::domain::types::ZoneDefinition;
use crate::io::smtp::SmtpConfig;
use crate::io::thingsboard::ThingsBoardConfig;
use crate::services::notify_worker::RetryPolicy;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use time::UtcOffset;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid home zone: {0}")]
    InvalidZone(#[from] GeofenceError),
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("environment variable {var}={value:?} could not be parsed")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ZoneSection {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub radius_m: Option<f64>,
    /// Extra exit margin while home (meters)
    #[serde(default)]
    pub hysteresis_m: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeviceSection {
    /// ThingsBoard device id (UUID)
    #[serde(default)]
    pub id: Option<String>,
    /// Name used in messages, defaults to the id
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self { interval_secs: default_poll_interval_secs() }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThingsBoardSection {
    #[serde(default = "default_tb_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_lat_key")]
    pub lat_key: String,
    #[serde(default = "default_lng_keys")]
    pub lng_keys: Vec<String>,
    #[serde(default = "default_tb_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ThingsBoardSection {
    fn default() -> Self {
        Self {
            base_url: default_tb_base_url(),
            username: None,
            password: None,
            lat_key: default_lat_key(),
            lng_keys: default_lng_keys(),
            timeout_ms: default_tb_timeout_ms(),
        }
    }
}

fn default_tb_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_lat_key() -> String {
    "lat".to_string()
}

fn default_lng_keys() -> Vec<String> {
    vec!["lng".to_string(), "lon".to_string()]
}

fn default_tb_timeout_ms() -> u64 {
    12_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifySection {
    /// Recipient address
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Send "Away" when the first sample after startup is outside the zone
    #[serde(default)]
    pub notify_initial_away: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Log notifications instead of sending mail
    #[serde(default)]
    pub dry_run: bool,
    /// Offset used when printing times in messages (e.g. -420 for PDT)
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            destination: None,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_name: default_from_name(),
            notify_initial_away: false,
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            queue_size: default_queue_size(),
            dry_run: false,
            tz_offset_minutes: 0,
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Home Alerts".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    30_000
}

fn default_queue_size() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogSection {
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    /// Log a metrics summary every N poll cycles (0 disables)
    #[serde(default = "default_report_every_cycles")]
    pub report_every_cycles: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { report_every_cycles: default_report_every_cycles() }
    }
}

fn default_report_every_cycles() -> u64 {
    120
}

/// Raw file layout, every section optional
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub zone: ZoneSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub thingsboard: ThingsBoardSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv { var, value })
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply HOME_WATCH_* overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOME_WATCH_HOME_LATITUDE") {
            self.zone.latitude = Some(parse_env("HOME_WATCH_HOME_LATITUDE", v)?);
        }
        if let Some(v) = lookup("HOME_WATCH_HOME_LONGITUDE") {
            self.zone.longitude = Some(parse_env("HOME_WATCH_HOME_LONGITUDE", v)?);
        }
        if let Some(v) = lookup("HOME_WATCH_RADIUS_M") {
            self.zone.radius_m = Some(parse_env("HOME_WATCH_RADIUS_M", v)?);
        }
        if let Some(v) = lookup("HOME_WATCH_HYSTERESIS_M") {
            self.zone.hysteresis_m = parse_env("HOME_WATCH_HYSTERESIS_M", v)?;
        }
        if let Some(v) = lookup("HOME_WATCH_DEVICE_ID") {
            self.device.id = Some(v);
        }
        if let Some(v) = lookup("HOME_WATCH_DEVICE_LABEL") {
            self.device.label = Some(v);
        }
        if let Some(v) = lookup("HOME_WATCH_POLL_INTERVAL_SECS") {
            self.poll.interval_secs = parse_env("HOME_WATCH_POLL_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("HOME_WATCH_NOTIFY_TO") {
            self.notify.destination = Some(v);
        }
        if let Some(v) = lookup("HOME_WATCH_SMTP_USERNAME") {
            self.notify.smtp_username = Some(v);
        }
        if let Some(v) = lookup("HOME_WATCH_SMTP_PASSWORD") {
            self.notify.smtp_password = Some(v);
        }
        if let Some(v) = lookup("HOME_WATCH_DRY_RUN") {
            self.notify.dry_run = parse_env("HOME_WATCH_DRY_RUN", v)?;
        }
        if let Some(v) = lookup("HOME_WATCH_TB_URL") {
            self.thingsboard.base_url = v;
        }
        if let Some(v) = lookup("HOME_WATCH_TB_USERNAME") {
            self.thingsboard.username = Some(v);
        }
        if let Some(v) = lookup("HOME_WATCH_TB_PASSWORD") {
            self.thingsboard.password = Some(v);
        }
        Ok(())
    }
}

/// Trimmed, non-empty value or `Missing(key)`
fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn check_address(value: &str, key: &'static str) -> Result<(), ConfigError> {
    value
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidValue { key, reason: e.to_string() })
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    zone: ZoneDefinition,
    hysteresis_m: f64,
    device_id: String,
    device_label: String,
    poll_interval: Duration,
    tb_base_url: String,
    tb_username: String,
    tb_password: String,
    tb_lat_key: String,
    tb_lng_keys: Vec<String>,
    tb_timeout: Duration,
    destination: String,
    smtp_host: String,
    smtp_port: u16,
    smtp_username: String,
    smtp_password: String,
    from_name: String,
    notify_initial_away: bool,
    retry_policy: RetryPolicy,
    notify_queue_size: usize,
    dry_run: bool,
    display_offset: UtcOffset,
    log_json: bool,
    report_every_cycles: u64,
}

impl Config {
    /// Minimal valid configuration: dry-run delivery, defaults everywhere else
    pub fn new(zone: ZoneDefinition, device_id: &str, destination: &str) -> Self {
        let notify = NotifySection::default();
        let tb = ThingsBoardSection::default();
        Self {
            config_file: "default".to_string(),
            zone,
            hysteresis_m: 0.0,
            device_id: device_id.to_string(),
            device_label: device_id.to_string(),
            poll_interval: Duration::from_secs(default_poll_interval_secs()),
            tb_base_url: tb.base_url,
            tb_username: String::new(),
            tb_password: String::new(),
            tb_lat_key: tb.lat_key,
            tb_lng_keys: tb.lng_keys,
            tb_timeout: Duration::from_millis(tb.timeout_ms),
            destination: destination.to_string(),
            smtp_host: notify.smtp_host,
            smtp_port: notify.smtp_port,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_name: notify.from_name,
            notify_initial_away: false,
            retry_policy: RetryPolicy::new(
                notify.max_retries,
                Duration::from_millis(notify.retry_base_ms),
                Duration::from_millis(notify.retry_max_ms),
            ),
            notify_queue_size: notify.queue_size,
            dry_run: true,
            display_offset: UtcOffset::UTC,
            log_json: false,
            report_every_cycles: default_report_every_cycles(),
        }
    }

    /// Validate raw settings into a usable configuration
    pub fn from_toml(raw: TomlConfig, config_file: &str) -> Result<Self, ConfigError> {
        let TomlConfig { zone, device, poll, thingsboard, notify, log, metrics } = raw;

        let latitude = zone.latitude.ok_or(ConfigError::Missing("zone.latitude"))?;
        let longitude = zone.longitude.ok_or(ConfigError::Missing("zone.longitude"))?;
        let radius_m = zone.radius_m.ok_or(ConfigError::Missing("zone.radius_m"))?;
        let home = ZoneDefinition::new(latitude, longitude, radius_m)?;

        if !zone.hysteresis_m.is_finite() || zone.hysteresis_m < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "zone.hysteresis_m",
                reason: format!("{} (must be >= 0)", zone.hysteresis_m),
            });
        }

        let device_id = required(device.id, "device.id")?;
        let device_label = device
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| device_id.clone());

        if poll.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll.interval_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }

        let destination = required(notify.destination, "notify.destination")?;
        check_address(&destination, "notify.destination")?;

        let tb_username = required(thingsboard.username, "thingsboard.username")?;
        let tb_password = required(thingsboard.password, "thingsboard.password")?;
        if thingsboard.lng_keys.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "thingsboard.lng_keys",
                reason: "at least one longitude key is required".to_string(),
            });
        }

        let (smtp_username, smtp_password) = if notify.dry_run {
            (notify.smtp_username.unwrap_or_default(), notify.smtp_password.unwrap_or_default())
        } else {
            let username = required(notify.smtp_username, "notify.smtp_username")?;
            check_address(&username, "notify.smtp_username")?;
            (username, required(notify.smtp_password, "notify.smtp_password")?)
        };

        if notify.queue_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "notify.queue_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if notify.retry_base_ms > notify.retry_max_ms {
            return Err(ConfigError::InvalidValue {
                key: "notify.retry_base_ms",
                reason: format!("{} exceeds retry_max_ms {}", notify.retry_base_ms, notify.retry_max_ms),
            });
        }

        let offset_secs = notify.tz_offset_minutes.checked_mul(60).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "notify.tz_offset_minutes",
                reason: format!("{} is out of range", notify.tz_offset_minutes),
            }
        })?;
        let display_offset = UtcOffset::from_whole_seconds(offset_secs).map_err(|e| {
            ConfigError::InvalidValue { key: "notify.tz_offset_minutes", reason: e.to_string() }
        })?;

        Ok(Self {
            config_file: config_file.to_string(),
            zone: home,
            hysteresis_m: zone.hysteresis_m,
            device_id,
            device_label,
            poll_interval: Duration::from_secs(poll.interval_secs),
            tb_base_url: thingsboard.base_url,
            tb_username,
            tb_password,
            tb_lat_key: thingsboard.lat_key,
            tb_lng_keys: thingsboard.lng_keys,
            tb_timeout: Duration::from_millis(thingsboard.timeout_ms),
            destination,
            smtp_host: notify.smtp_host,
            smtp_port: notify.smtp_port,
            smtp_username,
            smtp_password,
            from_name: notify.from_name,
            notify_initial_away: notify.notify_initial_away,
            retry_policy: RetryPolicy::new(
                notify.max_retries,
                Duration::from_millis(notify.retry_base_ms),
                Duration::from_millis(notify.retry_max_ms),
            ),
            notify_queue_size: notify.queue_size,
            dry_run: notify.dry_run,
            display_offset,
            log_json: log.json,
            report_every_cycles: metrics.report_every_cycles,
        })
    }

    /// Load configuration from a TOML file, without environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::load_with_env(Some(path.as_ref()), |_| None)
    }

    /// Load configuration from an optional file plus environment overrides.
    /// `lookup` is `std::env::var` in production, a map in tests.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut raw, source) = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                let raw = TomlConfig::from_toml_str(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?;
                (raw, path.display().to_string())
            }
            None => (TomlConfig::default(), "env".to_string()),
        };

        raw.apply_env(lookup).context("Invalid environment override")?;
        Self::from_toml(raw, &source).with_context(|| format!("Invalid configuration ({})", source))
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn zone(&self) -> &ZoneDefinition {
        &self.zone
    }

    pub fn hysteresis_m(&self) -> f64 {
        self.hysteresis_m
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn notify_initial_away(&self) -> bool {
        self.notify_initial_away
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    pub fn notify_queue_size(&self) -> usize {
        self.notify_queue_size
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn display_offset(&self) -> UtcOffset {
        self.display_offset
    }

    pub fn log_json(&self) -> bool {
        self.log_json
    }

    pub fn report_every_cycles(&self) -> u64 {
        self.report_every_cycles
    }

    /// Connection settings for the ThingsBoard position source
    pub fn thingsboard(&self) -> ThingsBoardConfig {
        ThingsBoardConfig {
            base_url: self.tb_base_url.clone(),
            username: self.tb_username.clone(),
            password: self.tb_password.clone(),
            lat_key: self.tb_lat_key.clone(),
            lng_keys: self.tb_lng_keys.clone(),
            timeout: self.tb_timeout,
        }
    }

    /// Connection settings for the SMTP notifier
    pub fn smtp(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            from_name: self.from_name.clone(),
            destination: self.destination.clone(),
            ..Default::default()
        }
    }

    // Builder methods for tests and tools
    pub fn with_hysteresis_m(mut self, hysteresis_m: f64) -> Self {
        self.hysteresis_m = hysteresis_m;
        self
    }

    pub fn with_device_label(mut self, label: &str) -> Self {
        self.device_label = label.to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_notify_initial_away(mut self, enabled: bool) -> Self {
        self.notify_initial_away = enabled;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_display_offset(mut self, offset: UtcOffset) -> Self {
        self.display_offset = offset;
        self
    }
}
