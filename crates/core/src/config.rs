use std::env;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an area list given either as a JSON array (`["a","b"]`) or as a
/// comma-separated string (`a,b`). Blank entries are dropped.
pub fn parse_area_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<String>>(trimmed) {
            Ok(list) => {
                return list
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            Err(e) => {
                tracing::warn!(error = %e, "area list is not a JSON string array, splitting on commas");
            }
        }
    }
    trimmed
        .trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub source: SourceConfig,
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SHEDWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SHEDWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            source: SourceConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-west-2"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    /// Load the shared AWS SDK config: region, optional static credentials
    /// and optional endpoint override on top of the default provider chain.
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(self.region.clone()));

        if let (Some(key_id), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                self.session_token.clone(),
                None,
                "shedwatch-static",
            );
            loader = loader.credentials_provider(creds);
        }

        if let Some(endpoint) = self.endpoint() {
            loader = loader.endpoint_url(endpoint);
        }

        loader.load().await
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }

    /// Endpoint override with a scheme, if one is configured.
    pub fn endpoint(&self) -> Option<String> {
        self.endpoint_url.as_ref().map(|endpoint| {
            if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{endpoint}")
            }
        })
    }
}

// ── Upstream outage API ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl SourceConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(
                p,
                "OUTAGE_API_BASE_URL",
                "https://eskom-calendar-api.shuttleapp.rs",
            ),
            timeout_secs: profiled_env_u64(p, "OUTAGE_API_TIMEOUT_SECS", 10),
        }
    }
}

// ── Timer provider ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Areas ingested at cold start when no explicit list is given.
    pub default_areas: Vec<String>,
    /// Where fired timers deliver their payload (e.g. the fired-timer queue ARN).
    pub target_arn: Option<String>,
    pub target_role_arn: Option<String>,
    /// Periodic re-ingest of the default areas; 0 disables it.
    pub reingest_interval_secs: u64,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            default_areas: profiled_env_opt(p, "SCHEDULE_GROUPS")
                .map(|raw| parse_area_list(&raw))
                .unwrap_or_default(),
            target_arn: profiled_env_opt(p, "SCHEDULE_TARGET_ARN"),
            target_role_arn: profiled_env_opt(p, "SCHEDULE_TARGET_ROLE_ARN"),
            reingest_interval_secs: profiled_env_u64(p, "REINGEST_INTERVAL_SECS", 0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.target_arn.is_some() && self.target_role_arn.is_some()
    }
}

// ── Fired-timer queue ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: String,
    pub dlq_url: Option<String>,
    pub visibility_timeout_secs: u32,
    pub max_messages: u32,
    pub poll_interval_ms: u64,
    /// Receives after which a message that still fails is dropped.
    pub max_receives: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_or(p, "FIRED_QUEUE_URL", ""),
            dlq_url: profiled_env_opt(p, "FIRED_DLQ_URL"),
            visibility_timeout_secs: profiled_env_u32(p, "FIRED_VISIBILITY_TIMEOUT_SECS", 30),
            max_messages: profiled_env_u32(p, "FIRED_MAX_MESSAGES", 10),
            poll_interval_ms: profiled_env_u64(p, "FIRED_POLL_INTERVAL_MS", 1000),
            max_receives: profiled_env_u32(p, "FIRED_MAX_RECEIVES", 5).max(1),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.queue_url.is_empty()
    }
}

// ── Subscriber directory / delivery log storage ───────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub subscribers_table: Option<String>,
    pub subscribers_area_index: String,
    pub logs_table: Option<String>,
    /// JSON file used as a static subscriber directory.
    pub subscribers_file: Option<String>,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            subscribers_table: profiled_env_opt(p, "SUBSCRIBERS_TABLE"),
            subscribers_area_index: profiled_env_or(p, "SUBSCRIBERS_AREA_INDEX", "areaNameIndex"),
            logs_table: profiled_env_opt(p, "LOGS_TABLE"),
            subscribers_file: profiled_env_opt(p, "SUBSCRIBERS_FILE"),
        }
    }
}

// ── Webhook delivery ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_timeout_secs: u64,
    /// Capacity of the fire-and-forget delivery log queue.
    pub delivery_log_buffer: usize,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_timeout_secs: profiled_env_u64(p, "WEBHOOK_TIMEOUT_SECS", 10),
            delivery_log_buffer: profiled_env_u64(p, "DELIVERY_LOG_BUFFER", 256) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_list_from_json_array() {
        assert_eq!(
            parse_area_list(r#"["city-of-cape-town-area-15", "tshwane-5"]"#),
            vec!["city-of-cape-town-area-15", "tshwane-5"]
        );
    }

    #[test]
    fn area_list_from_commas() {
        assert_eq!(parse_area_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(parse_area_list("").is_empty());
    }

    #[test]
    fn area_list_tolerates_loose_brackets() {
        assert_eq!(parse_area_list("[a, b]"), vec!["a", "b"]);
    }

    #[test]
    fn profiled_keys_take_precedence() {
        env::set_var("SHEDTEST_OUTAGE_API_TIMEOUT_SECS", "42");
        let cfg = Config::for_profile("shedtest");
        assert_eq!(cfg.profile, "SHEDTEST");
        assert_eq!(cfg.source.timeout_secs, 42);
        env::remove_var("SHEDTEST_OUTAGE_API_TIMEOUT_SECS");
    }

    #[test]
    fn endpoint_gets_a_scheme() {
        let aws = AwsConfig {
            region: "us-west-2".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: Some("localhost:4566".into()),
        };
        assert_eq!(aws.endpoint().as_deref(), Some("https://localhost:4566"));
        assert!(!aws.has_static_credentials());
    }
}
