//! Typed configuration for an API conformance run.
//!
//! Mirrors the settings a conformance suite needs: where the server under test
//! lives, the optional development search index, how long to wait for search
//! results, which test requestors exist and which backend implementation each
//! migrated endpoint currently runs. Values are loaded once, validated, and
//! then passed around explicitly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, SearchPollError};
use crate::poller::{DEFAULT_MAX_WAIT_SECONDS, PollConfig, PollSettings};

fn default_maximum_search_time() -> f64 {
    DEFAULT_MAX_WAIT_SECONDS
}

/// Configuration for one conformance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Server under test: protocol, host and port only
    pub server: Url,

    /// Development search index. Enables forced commits when set; leave unset
    /// when testing a live server whose index is not reachable.
    #[serde(default)]
    pub search_server: Option<Url>,

    /// Seconds to keep retrying search requests before giving up
    #[serde(default = "default_maximum_search_time")]
    pub maximum_search_time: f64,

    /// Run internal-only test groups in addition to the customer-facing ones
    #[serde(default)]
    pub include_internal: bool,

    #[serde(default)]
    pub superuser: Option<Superuser>,

    #[serde(default)]
    pub requestors: Requestors,

    /// Which implementation each migrated endpoint runs. Missing entries are `legacy`.
    #[serde(default)]
    pub endpoint_backends: BTreeMap<Endpoint, Backend>,

    #[serde(default)]
    pub poll: PollSettings,
}

/// The administrative user the suite acts as when provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superuser {
    pub name: String,
    /// Private key path on the machine running the suite
    pub key_path: PathBuf,
}

/// Test clients and users, keyed by the role they play in the tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requestors {
    #[serde(default)]
    pub clients: BTreeMap<String, Requestor>,
    #[serde(default)]
    pub users: BTreeMap<String, Requestor>,
}

/// A single client or user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requestor {
    pub name: String,

    /// The suite creates this requestor itself
    #[serde(default)]
    pub create_me: bool,

    /// Private key for a pre-existing requestor
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

impl Requestor {
    /// Pre-existing requestors are used as-is and must bring their own key.
    pub fn is_preexisting(&self) -> bool {
        !self.create_me
    }
}

/// Endpoints that exist in two implementations during the migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Environment,
    Client,
    Sandbox,
    Data,
    Role,
    Cookbook,
}

impl Endpoint {
    pub const ALL: [Endpoint; 6] = [
        Endpoint::Environment,
        Endpoint::Client,
        Endpoint::Sandbox,
        Endpoint::Data,
        Endpoint::Role,
        Endpoint::Cookbook,
    ];
}

/// Implementation serving an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Legacy,
    Current,
}

impl SuiteConfig {
    /// Minimal configuration pointing at `server`, everything else defaulted.
    pub fn new(server: Url) -> Self {
        Self {
            server,
            search_server: None,
            maximum_search_time: DEFAULT_MAX_WAIT_SECONDS,
            include_internal: false,
            superuser: None,
            requestors: Requestors::default(),
            endpoint_backends: BTreeMap::new(),
            poll: PollSettings::default(),
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SuiteConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    #[tracing::instrument]
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        tracing::debug!(
            server = %config.server,
            commit = config.search_server.is_some(),
            requestors = config.requestors.clients.len() + config.requestors.users.len(),
            "Loaded suite configuration"
        );
        Ok(config)
    }

    /// Check the settings that would otherwise fail later in the run.
    pub fn validate(&self) -> Result<()> {
        if self.server.host_str().is_none() {
            return Err(SearchPollError::Configuration(format!(
                "server URL '{}' has no host",
                self.server
            )));
        }

        if let Some(search_server) = &self.search_server
            && (search_server.host_str().is_none()
                || !matches!(search_server.scheme(), "http" | "https"))
        {
            return Err(SearchPollError::Configuration(format!(
                "search_server '{}' must be an http(s) URL with a host",
                search_server
            )));
        }

        if let Some(superuser) = &self.superuser
            && superuser.name.trim().is_empty()
        {
            return Err(SearchPollError::Configuration(
                "superuser name must not be empty".to_string(),
            ));
        }

        let all_requestors = self
            .requestors
            .clients
            .iter()
            .map(|(role, r)| ("client", role, r))
            .chain(self.requestors.users.iter().map(|(role, r)| ("user", role, r)));
        for (kind, role, requestor) in all_requestors {
            if requestor.name.trim().is_empty() {
                return Err(SearchPollError::Configuration(format!(
                    "{} '{}' has no name",
                    kind, role
                )));
            }
        }

        // Also validates maximum_search_time and the interval settings.
        self.poll_config().map(|_| ())
    }

    /// Derive the poll configuration for search requests.
    pub fn poll_config(&self) -> Result<PollConfig> {
        PollConfig::with_settings(
            self.maximum_search_time,
            self.search_server.clone(),
            self.poll.clone(),
        )
    }

    /// Implementation currently serving `endpoint`.
    pub fn backend(&self, endpoint: Endpoint) -> Backend {
        self.endpoint_backends
            .get(&endpoint)
            .copied()
            .unwrap_or_default()
    }

    pub fn client(&self, role: &str) -> Option<&Requestor> {
        self.requestors.clients.get(role)
    }

    pub fn user(&self, role: &str) -> Option<&Requestor> {
        self.requestors.users.get(role)
    }

    /// Requestors the suite must create before running, clients first.
    pub fn requestors_to_create(&self) -> impl Iterator<Item = &Requestor> {
        self.requestors
            .clients
            .values()
            .chain(self.requestors.users.values())
            .filter(|r| r.create_me)
    }
}
