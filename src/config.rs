//! Retrieval and Gmail endpoint configuration

use crate::error::{Error, Result};
use crate::limiter::cost;
use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use url::Url;

/// Default Gmail search: unread mail the user has not labelled yet.
pub const DEFAULT_QUERY: &str = "is:unread has:nouserlabels";

/// Largest page the Gmail listing endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Default Gmail REST base for the authenticated user.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me/";

/// Tunables for the retrieval pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Search query passed to the listing endpoint.
    pub query: String,
    /// Listing page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub page_size: u32,
    /// Number of fetch workers.
    pub workers: usize,
    /// Attempts per message (and per listing page) before giving up.
    pub max_attempts: u32,
    /// Long-run quota refill rate.
    pub quota_per_second: f64,
    /// Bucket capacity. Must cover the costliest single call.
    pub quota_burst: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            page_size: MAX_PAGE_SIZE,
            workers: default_workers(),
            max_attempts: 3,
            quota_per_second: 250.0,
            quota_burst: 250,
        }
    }
}

impl RetrievalConfig {
    /// Load retrieval configuration from environment variables
    ///
    /// Reads from `.env` file if present. All variables are optional:
    /// - `SWEEP_QUERY` (default: `is:unread has:nouserlabels`)
    /// - `SWEEP_PAGE_SIZE` (default: `500`)
    /// - `SWEEP_WORKERS` (default: available parallelism)
    /// - `SWEEP_MAX_ATTEMPTS` (default: `3`)
    /// - `SWEEP_QUOTA_PER_SECOND` (default: `250`)
    /// - `SWEEP_QUOTA_BURST` (default: `250`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but invalid.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            query: lookup("SWEEP_QUERY").unwrap_or(defaults.query),
            page_size: parse_or(&lookup, "SWEEP_PAGE_SIZE", defaults.page_size)?
                .clamp(1, MAX_PAGE_SIZE),
            workers: parse_or(&lookup, "SWEEP_WORKERS", defaults.workers)?,
            max_attempts: parse_or(&lookup, "SWEEP_MAX_ATTEMPTS", defaults.max_attempts)?,
            quota_per_second: parse_or(
                &lookup,
                "SWEEP_QUOTA_PER_SECOND",
                defaults.quota_per_second,
            )?,
            quota_burst: parse_or(&lookup, "SWEEP_QUOTA_BURST", defaults.quota_burst)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if !(self.quota_per_second.is_finite() && self.quota_per_second > 0.0) {
            return Err(Error::Config("quota_per_second must be positive".into()));
        }
        let largest = cost::BATCH_DELETE.max(cost::BATCH_MODIFY);
        if self.quota_burst < largest {
            return Err(Error::Config(format!(
                "quota_burst must be at least {largest}, the cost of a batch call"
            )));
        }
        Ok(())
    }
}

/// Gmail REST endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmailConfig {
    pub api_base: Url,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default Gmail API base is a valid URL"),
        }
    }
}

impl GmailConfig {
    /// Load the endpoint from `GMAIL_API_BASE`, falling back to the
    /// public Gmail API.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `GMAIL_API_BASE` is not a valid URL.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        match env::var("GMAIL_API_BASE") {
            Ok(raw) => Self::with_base(&raw),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Use a custom API base. A trailing slash is added when missing so
    /// relative endpoint paths join underneath it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `raw` is not a valid URL.
    pub fn with_base(raw: &str) -> Result<Self> {
        let mut raw = raw.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let api_base =
            Url::parse(&raw).map_err(|e| Error::Config(format!("Invalid GMAIL_API_BASE: {e}")))?;
        Ok(Self { api_base })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, NonZeroUsize::get)
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {key}: {e}")))
    })
}
