//! Service configuration.
//!
//! Layering, lowest to highest precedence: built-in defaults, an optional
//! TOML file, `KYCFLOW_*` environment variables (a `.env` file is loaded
//! into the environment first), then command-line flags.
//!
//! ```toml
//! [server]
//! port = 8000
//! rate_limit = 600
//!
//! [workflow]
//! tick_ms = 30
//! progress_step = 1
//! engine_timeout_secs = 30
//! heartbeat_secs = 1
//!
//! [engine]
//! kind = "http"
//! url = "http://scoring.internal/v1/evaluate"
//!
//! [project]
//! environment = "staging"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use kycflow_core::{
    FixedGate, HttpScoringEngine, OutcomeGate, ReferenceEngine, SecondParityGate,
    ValidationEngine, WorkflowConfig,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

// ──────────────────────────────────────────────
// Sections
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServiceConfig {
    pub(crate) server: ServerConfig,
    pub(crate) workflow: WorkflowSection,
    pub(crate) engine: EngineSection,
    pub(crate) project: ProjectSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    /// Requests per minute per client IP.
    pub(crate) rate_limit: u64,
    /// None disables authentication.
    pub(crate) api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8000,
            rate_limit: 600,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct WorkflowSection {
    pub(crate) tick_ms: u64,
    pub(crate) progress_step: u8,
    pub(crate) engine_timeout_secs: u64,
    pub(crate) heartbeat_secs: u64,
    pub(crate) event_buffer: usize,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        WorkflowSection {
            tick_ms: 30,
            progress_step: 1,
            engine_timeout_secs: 30,
            heartbeat_secs: 1,
            event_buffer: kycflow_core::publisher::DEFAULT_CAPACITY,
        }
    }
}

impl WorkflowSection {
    pub(crate) fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            tick: Duration::from_millis(self.tick_ms.max(1)),
            step: self.progress_step,
            engine_timeout: Duration::from_secs(self.engine_timeout_secs.max(1)),
            ..WorkflowConfig::default()
        }
    }

    pub(crate) fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

/// Which scoring backend to wire in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EngineKind {
    /// Demo behaviour: succeeds on even wall-clock seconds
    #[default]
    Reference,
    /// Reference scores, always successful
    Success,
    /// Reference findings, always failed
    Failed,
    /// Remote scoring service (requires a URL)
    Http,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" => Ok(EngineKind::Reference),
            "success" => Ok(EngineKind::Success),
            "failed" => Ok(EngineKind::Failed),
            "http" => Ok(EngineKind::Http),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct EngineSection {
    pub(crate) kind: EngineKind,
    pub(crate) url: Option<String>,
    pub(crate) token: Option<String>,
    /// Simulated analysis time of the reference engines.
    pub(crate) latency_ms: u64,
    /// Fixed seed for reference scores.
    pub(crate) seed: Option<u64>,
}

impl EngineSection {
    pub(crate) fn build(&self) -> Result<Arc<dyn ValidationEngine>, ConfigError> {
        let gate: Box<dyn OutcomeGate> = match self.kind {
            EngineKind::Reference => Box::new(SecondParityGate),
            EngineKind::Success => Box::new(FixedGate(true)),
            EngineKind::Failed => Box::new(FixedGate(false)),
            EngineKind::Http => {
                let url = self.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
                    ConfigError::Invalid("engine kind 'http' requires engine.url".to_string())
                })?;
                let mut engine = HttpScoringEngine::new(url);
                if let Some(token) = &self.token {
                    engine = engine.with_auth_token(token.clone());
                }
                return Ok(Arc::new(engine));
            }
        };
        let engine = match self.seed {
            Some(seed) => ReferenceEngine::seeded(gate, seed),
            None => ReferenceEngine::new(gate),
        };
        Ok(Arc::new(
            engine.with_latency(Duration::from_millis(self.latency_ms)),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ProjectSection {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) environment: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        ProjectSection {
            name: "kycflow".to_string(),
            description: "Document verification workflow API".to_string(),
            environment: "development".to_string(),
        }
    }
}

// ──────────────────────────────────────────────
// Loading
// ──────────────────────────────────────────────

impl ServiceConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => ServiceConfig::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub(crate) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Apply `KYCFLOW_*` overrides. Empty values are ignored.
    pub(crate) fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("KYCFLOW_PORT") {
            self.server.port = parse_env("KYCFLOW_PORT", &v)?;
        }
        if let Some(v) = get("KYCFLOW_RATE_LIMIT") {
            self.server.rate_limit = parse_env("KYCFLOW_RATE_LIMIT", &v)?;
        }
        if let Some(v) = get("KYCFLOW_API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Some(v) = get("KYCFLOW_TICK_MS") {
            self.workflow.tick_ms = parse_env("KYCFLOW_TICK_MS", &v)?;
        }
        if let Some(v) = get("KYCFLOW_ENGINE") {
            self.engine.kind = parse_env("KYCFLOW_ENGINE", &v)?;
        }
        if let Some(v) = get("KYCFLOW_ENGINE_URL") {
            self.engine.url = Some(v);
        }
        if let Some(v) = get("KYCFLOW_ENGINE_TOKEN") {
            self.engine.token = Some(v);
        }
        if let Some(v) = get("KYCFLOW_ENVIRONMENT") {
            self.project.environment = v;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
