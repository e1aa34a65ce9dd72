use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::TimeDelta;

use crate::capacity::model::NotificationTemplate;
use crate::capacity::CheckerConfig;
use crate::db::DbConfig;
use crate::push::{FcmConfig, TokenSource};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    /// `None` when `DATABASE_URL` is unset; only allowed in dev mode.
    pub database: Option<DbConfig>,
    pub checker: CheckerConfig,
    /// Zero disables the periodic worker.
    pub check_interval: Duration,
    pub job_timeout: Duration,
    /// `None` when FCM credentials are not configured.
    pub fcm: Option<FcmConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr: SocketAddr = match var("LATERQ_LISTEN_ADDR") {
            Some(addr) => addr,
            None => format!("0.0.0.0:{}", var("PORT").unwrap_or_else(|| "8080".to_string())),
        }
        .parse()
        .context("invalid listen address")?;

        let log_level = var("LATERQ_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let dev_mode = var("LATERQ_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let database = match var("DATABASE_URL") {
            Some(database_url) => Some(DbConfig {
                database_url,
                max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 10)?,
                min_connections: parse_or(&var, "DB_MIN_CONNECTIONS", 1)?,
                ..Default::default()
            }),
            None if dev_mode => None,
            None => anyhow::bail!("DATABASE_URL must be set outside dev mode"),
        };

        let defaults = NotificationTemplate::default();
        let template = NotificationTemplate {
            title: var("LATERQ_NOTIFICATION_TITLE").unwrap_or(defaults.title),
            body: var("LATERQ_NOTIFICATION_BODY").unwrap_or(defaults.body),
            link_base: var("LATERQ_TASK_LINK_BASE").unwrap_or(defaults.link_base),
        };

        let capacity_secs: i64 = parse_or(
            &var,
            "LATERQ_CAPACITY_SECONDS",
            CheckerConfig::default().capacity.num_seconds(),
        )?;
        if capacity_secs < 0 {
            anyhow::bail!("LATERQ_CAPACITY_SECONDS must not be negative");
        }
        let capacity = TimeDelta::try_seconds(capacity_secs)
            .with_context(|| format!("LATERQ_CAPACITY_SECONDS out of range: {capacity_secs}"))?;

        let check_interval = Duration::from_secs(parse_or(&var, "LATERQ_CHECK_INTERVAL_SECS", 3600)?);
        let job_timeout = Duration::from_secs(parse_or(&var, "LATERQ_JOB_TIMEOUT_SECS", 300)?);

        let use_metadata = var("FCM_USE_METADATA_TOKEN")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);
        let token_source = match (var("FCM_ACCESS_TOKEN"), use_metadata) {
            (Some(_), true) => {
                anyhow::bail!("FCM_ACCESS_TOKEN and FCM_USE_METADATA_TOKEN are mutually exclusive")
            }
            (Some(token), false) => Some(TokenSource::Static(token)),
            (None, true) => Some(TokenSource::MetadataServer {
                url: var("FCM_METADATA_TOKEN_URL")
                    .unwrap_or_else(|| crate::push::METADATA_TOKEN_URL.to_string()),
            }),
            (None, false) => None,
        };

        let fcm = match (var("FCM_PROJECT_ID"), token_source) {
            (Some(project_id), Some(token_source)) => {
                let mut fcm = FcmConfig::new(project_id, token_source);
                if let Some(endpoint) = var("FCM_ENDPOINT") {
                    fcm.endpoint = endpoint;
                }
                fcm.timeout = Duration::from_secs(parse_or(&var, "FCM_TIMEOUT_SECS", 10)?);
                Some(fcm)
            }
            (None, None) => None,
            _ => anyhow::bail!(
                "FCM_PROJECT_ID requires FCM_ACCESS_TOKEN or FCM_USE_METADATA_TOKEN, and vice versa"
            ),
        };

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            database,
            checker: CheckerConfig {
                capacity,
                template,
            },
            check_interval,
            job_timeout,
            fcm,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {key}: {raw}")),
        None => Ok(default),
    }
}
