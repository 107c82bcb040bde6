//! Service configuration read from the environment.

use crate::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_CREDENTIAL_VAR: &str = "API_KEY";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;

/// Runtime settings. The credential itself is not stored here; it is read per call.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub api_base: String,
    pub model: String,
    /// Name of the environment variable holding the service credential.
    pub credential_var: String,
    /// Outbox directory for server-side sharing.
    pub share_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    /// Sessions with no request for this long are evicted.
    pub session_idle_timeout: Duration,
}

impl Config {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_addr: SocketAddr = get("POSTER_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("POSTER_BIND is not a valid socket address")?;

        let max_upload_bytes = match get("POSTER_MAX_UPLOAD_BYTES") {
            Some(value) => value
                .parse::<usize>()
                .context("POSTER_MAX_UPLOAD_BYTES is not a valid byte count")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let session_idle_secs = match get("POSTER_SESSION_IDLE_SECS") {
            Some(value) => value
                .parse::<u64>()
                .context("POSTER_SESSION_IDLE_SECS is not a valid number of seconds")?,
            None => DEFAULT_SESSION_IDLE_SECS,
        };

        Ok(Self {
            bind_addr,
            api_base: get("POSTER_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: get("POSTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            credential_var: get("POSTER_CREDENTIAL_VAR")
                .unwrap_or_else(|| DEFAULT_CREDENTIAL_VAR.to_string()),
            share_dir: get("POSTER_SHARE_DIR").map(PathBuf::from),
            max_upload_bytes,
            session_idle_timeout: Duration::from_secs(session_idle_secs),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            credential_var: DEFAULT_CREDENTIAL_VAR.to_string(),
            share_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }
}
