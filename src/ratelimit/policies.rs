//! Named rate limit policies.
//!
//! A policy fixes `max_requests` and `window_seconds` for a class of routes.
//! Built-in presets cover the marketplace's route classes and can be
//! overridden or extended from YAML:
//!
//! ```yaml
//! policies:
//!   api:
//!     max_requests: 200
//!     window_seconds: 60
//!   search:
//!     max_requests: 50
//!     window_seconds: 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::entry::RateLimitConfig;
use crate::error::{MercadoError, Result};

/// General API routes.
pub const API: &str = "api";
/// Sign-in, sign-up and password reset.
pub const AUTH: &str = "auth";
/// Subscription and payment routes.
pub const BILLING: &str = "billing";
/// Image uploads.
pub const UPLOAD: &str = "upload";
/// Chat messages.
pub const MESSAGES: &str = "messages";

/// A validated `max_requests` per `window_seconds` budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct RateLimitPolicy {
    max_requests: u32,
    window_seconds: u64,
}

#[derive(Deserialize)]
struct RawPolicy {
    max_requests: u32,
    window_seconds: u64,
}

impl TryFrom<RawPolicy> for RateLimitPolicy {
    type Error = MercadoError;

    fn try_from(raw: RawPolicy) -> Result<Self> {
        Self::new(raw.max_requests, raw.window_seconds)
    }
}

impl RateLimitPolicy {
    /// Create a policy. Both values must be positive.
    pub fn new(max_requests: u32, window_seconds: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(MercadoError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_seconds == 0 {
            return Err(MercadoError::Config(
                "window_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window_seconds,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Bind this policy to an identifier for a single check.
    pub fn for_identifier(&self, identifier: impl Into<String>) -> RateLimitConfig {
        RateLimitConfig::new(self.max_requests, self.window_seconds, identifier)
    }
}

/// A set of named policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicies {
    #[serde(default)]
    policies: HashMap<String, RateLimitPolicy>,
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        let presets = [
            (API, 100, 60),
            (AUTH, 5, 60),
            (BILLING, 10, 60),
            (UPLOAD, 10, 60),
            (MESSAGES, 30, 60),
        ];

        let policies = presets
            .into_iter()
            .map(|(name, max_requests, window_seconds)| {
                (
                    name.to_string(),
                    RateLimitPolicy {
                        max_requests,
                        window_seconds,
                    },
                )
            })
            .collect();

        Self { policies }
    }
}

impl RateLimitPolicies {
    /// Load policies from a YAML file, layered over the presets.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load policies from a YAML string, layered over the presets.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overrides: RateLimitPolicies = serde_yaml::from_str(yaml).map_err(|e| {
            MercadoError::Config(format!("Failed to parse rate limit policies: {}", e))
        })?;

        let mut policies = Self::default();
        policies.policies.extend(overrides.policies);
        Ok(policies)
    }

    /// Get a policy by name.
    pub fn get(&self, name: &str) -> Option<RateLimitPolicy> {
        self.policies.get(name).copied()
    }

    /// Get a policy by name, failing if it is not defined.
    pub fn require(&self, name: &str) -> Result<RateLimitPolicy> {
        self.get(name).ok_or_else(|| {
            MercadoError::Config(format!("rate limit policy '{}' is not defined", name))
        })
    }

    /// Add or replace a policy.
    pub fn insert(&mut self, name: impl Into<String>, policy: RateLimitPolicy) {
        self.policies.insert(name.into(), policy);
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
