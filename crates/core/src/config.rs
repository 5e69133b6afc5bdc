//! Configuration -- `deploycheck.toml` parsing and runtime settings
//!
//! [`DeploycheckConfig`] is the top-level structure holding every section.
//!
//! # Loading priority
//! 1. CLI arguments (highest)
//! 2. Environment variables (`DEPLOYCHECK_WAIT_TIMEOUT_SECS=300` form)
//! 3. Configuration file (`deploycheck.toml`)
//! 4. Defaults (`Default` impls)
//!
//! Relative `chart.chart_path` and `chart.values_file` values are resolved
//! against the directory containing the configuration file.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), deploycheck_core::error::DeploycheckError> {
//! use deploycheck_core::config::DeploycheckConfig;
//!
//! // load from file + environment overrides
//! let config = DeploycheckConfig::load("deploycheck.toml").await?;
//!
//! // parse a TOML string directly
//! let config = DeploycheckConfig::parse("[wait]\ntimeout_secs = 60")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DeploycheckError};

/// Upper bound for every timeout and deadline (one day).
const MAX_TIMEOUT_SECS: u64 = 86_400;
/// Upper bound for the polling interval cap (one hour).
const MAX_INTERVAL_MS: u64 = 3_600_000;
/// Upper bound for the backoff growth factor.
const MAX_MULTIPLIER: f64 = 10.0;

/// deploycheck configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploycheckConfig {
    /// Logging
    #[serde(default)]
    pub general: GeneralConfig,
    /// External tool invocation
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Chart, values file and release naming
    #[serde(default)]
    pub chart: ChartConfig,
    /// Polling policy for observable state
    #[serde(default)]
    pub wait: WaitConfig,
    /// Load scenario settings
    #[serde(default)]
    pub load: LoadConfig,
    /// Scaling scenario settings
    #[serde(default)]
    pub scaling: ScalingConfig,
}

impl DeploycheckConfig {
    /// Loads the TOML file, applies environment overrides, resolves relative
    /// chart paths and validates the result.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeploycheckError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        if let Some(base) = path.parent() {
            config.chart.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads the TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DeploycheckError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeploycheckError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DeploycheckError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, DeploycheckError> {
        toml::from_str(toml_str).map_err(|e| {
            DeploycheckError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Overrides values from environment variables.
    ///
    /// Naming: `DEPLOYCHECK_{SECTION}_{FIELD}`, e.g. `DEPLOYCHECK_CLUSTER_KUBECTL_BIN`.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DEPLOYCHECK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DEPLOYCHECK_GENERAL_LOG_FORMAT");

        // Cluster
        override_string(&mut self.cluster.helm_bin, "DEPLOYCHECK_CLUSTER_HELM_BIN");
        override_string(&mut self.cluster.kubectl_bin, "DEPLOYCHECK_CLUSTER_KUBECTL_BIN");
        override_string(
            &mut self.cluster.kube_context,
            "DEPLOYCHECK_CLUSTER_KUBE_CONTEXT",
        );
        override_u64(
            &mut self.cluster.command_timeout_secs,
            "DEPLOYCHECK_CLUSTER_COMMAND_TIMEOUT_SECS",
        );

        // Chart
        override_path(&mut self.chart.chart_path, "DEPLOYCHECK_CHART_CHART_PATH");
        override_path(&mut self.chart.values_file, "DEPLOYCHECK_CHART_VALUES_FILE");
        override_string(
            &mut self.chart.release_prefix,
            "DEPLOYCHECK_CHART_RELEASE_PREFIX",
        );
        override_string(
            &mut self.chart.namespace_prefix,
            "DEPLOYCHECK_CHART_NAMESPACE_PREFIX",
        );
        override_string(
            &mut self.chart.frontend_suffix,
            "DEPLOYCHECK_CHART_FRONTEND_SUFFIX",
        );
        override_bool(
            &mut self.chart.unique_names,
            "DEPLOYCHECK_CHART_UNIQUE_NAMES",
        );
        override_bool(
            &mut self.chart.manage_namespace,
            "DEPLOYCHECK_CHART_MANAGE_NAMESPACE",
        );

        // Wait
        override_u64(
            &mut self.wait.initial_interval_ms,
            "DEPLOYCHECK_WAIT_INITIAL_INTERVAL_MS",
        );
        override_u64(
            &mut self.wait.max_interval_ms,
            "DEPLOYCHECK_WAIT_MAX_INTERVAL_MS",
        );
        override_f64(&mut self.wait.multiplier, "DEPLOYCHECK_WAIT_MULTIPLIER");
        override_u64(&mut self.wait.timeout_secs, "DEPLOYCHECK_WAIT_TIMEOUT_SECS");

        // Load
        override_u32(&mut self.load.requests, "DEPLOYCHECK_LOAD_REQUESTS");
        override_u16(&mut self.load.local_port, "DEPLOYCHECK_LOAD_LOCAL_PORT");
        override_u16(&mut self.load.remote_port, "DEPLOYCHECK_LOAD_REMOTE_PORT");
        override_string(&mut self.load.endpoint, "DEPLOYCHECK_LOAD_ENDPOINT");
        override_string(&mut self.load.prompt, "DEPLOYCHECK_LOAD_PROMPT");
        override_u64(
            &mut self.load.request_timeout_secs,
            "DEPLOYCHECK_LOAD_REQUEST_TIMEOUT_SECS",
        );
        override_f64(
            &mut self.load.min_success_ratio,
            "DEPLOYCHECK_LOAD_MIN_SUCCESS_RATIO",
        );
        override_u64(
            &mut self.load.tunnel_ready_timeout_secs,
            "DEPLOYCHECK_LOAD_TUNNEL_READY_TIMEOUT_SECS",
        );

        // Scaling
        override_u32(
            &mut self.scaling.scale_up_replicas,
            "DEPLOYCHECK_SCALING_SCALE_UP_REPLICAS",
        );
        override_u32(
            &mut self.scaling.scale_down_replicas,
            "DEPLOYCHECK_SCALING_SCALE_DOWN_REPLICAS",
        );
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), DeploycheckError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.cluster.helm_bin.is_empty() {
            return Err(invalid("cluster.helm_bin", "must not be empty"));
        }
        if self.cluster.kubectl_bin.is_empty() {
            return Err(invalid("cluster.kubectl_bin", "must not be empty"));
        }
        check_timeout("cluster.command_timeout_secs", self.cluster.command_timeout_secs)?;

        if self.chart.chart_path.as_os_str().is_empty() {
            return Err(invalid("chart.chart_path", "must not be empty"));
        }
        if self.chart.release_prefix.is_empty() {
            return Err(invalid("chart.release_prefix", "must not be empty"));
        }
        if self.chart.namespace_prefix.is_empty() {
            return Err(invalid("chart.namespace_prefix", "must not be empty"));
        }

        if self.wait.initial_interval_ms == 0 {
            return Err(invalid("wait.initial_interval_ms", "must be greater than 0"));
        }
        if self.wait.max_interval_ms < self.wait.initial_interval_ms {
            return Err(invalid(
                "wait.max_interval_ms",
                "must be >= wait.initial_interval_ms",
            ));
        }
        if self.wait.max_interval_ms > MAX_INTERVAL_MS {
            return Err(invalid(
                "wait.max_interval_ms",
                format!("must not exceed {MAX_INTERVAL_MS}"),
            ));
        }
        if !(1.0..=MAX_MULTIPLIER).contains(&self.wait.multiplier) {
            return Err(invalid(
                "wait.multiplier",
                format!("must be within 1.0-{MAX_MULTIPLIER}"),
            ));
        }
        check_timeout("wait.timeout_secs", self.wait.timeout_secs)?;

        if self.load.requests == 0 {
            return Err(invalid("load.requests", "must be greater than 0"));
        }
        if self.load.local_port == 0 || self.load.remote_port == 0 {
            return Err(invalid("load.local_port", "ports must be non-zero"));
        }
        if !self.load.endpoint.starts_with('/') {
            return Err(invalid("load.endpoint", "must start with '/'"));
        }
        check_timeout("load.request_timeout_secs", self.load.request_timeout_secs)?;
        if !(0.0..=1.0).contains(&self.load.min_success_ratio) {
            return Err(invalid("load.min_success_ratio", "must be within 0.0-1.0"));
        }
        check_timeout(
            "load.tunnel_ready_timeout_secs",
            self.load.tunnel_ready_timeout_secs,
        )?;

        if self.scaling.scale_up_replicas == 0 {
            return Err(invalid(
                "scaling.scale_up_replicas",
                "must be greater than 0",
            ));
        }
        if self.scaling.scale_down_replicas > self.scaling.scale_up_replicas {
            return Err(invalid(
                "scaling.scale_down_replicas",
                "must not exceed scaling.scale_up_replicas",
            ));
        }

        Ok(())
    }
}

fn check_timeout(field: &str, secs: u64) -> Result<(), DeploycheckError> {
    if secs == 0 {
        return Err(invalid(field, "must be greater than 0"));
    }
    if secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            field,
            format!("must not exceed {MAX_TIMEOUT_SECS} seconds"),
        ));
    }
    Ok(())
}

fn invalid(field: &str, reason: impl Into<String>) -> DeploycheckError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// External tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// `helm` binary (name on PATH or absolute path)
    pub helm_bin: String,
    /// `kubectl` binary (name on PATH or absolute path)
    pub kubectl_bin: String,
    /// kubeconfig context; empty means the current context
    pub kube_context: String,
    /// Upper bound for a single synchronous command
    pub command_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            helm_bin: "helm".to_owned(),
            kubectl_bin: "kubectl".to_owned(),
            kube_context: String::new(),
            command_timeout_secs: 120,
        }
    }
}

impl ClusterConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// The configured context, if any.
    pub fn context(&self) -> Option<&str> {
        if self.kube_context.is_empty() {
            None
        } else {
            Some(&self.kube_context)
        }
    }
}

/// Chart and naming settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Chart directory
    pub chart_path: PathBuf,
    /// Values file passed with `-f`
    pub values_file: PathBuf,
    /// Release name prefix
    pub release_prefix: String,
    /// Namespace prefix
    pub namespace_prefix: String,
    /// Suffix appended to the release name to form the front-end
    /// Deployment/Service name
    pub frontend_suffix: String,
    /// Append a random suffix to release/namespace names per run
    pub unique_names: bool,
    /// Create the namespace before and delete it after each scenario
    pub manage_namespace: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            chart_path: PathBuf::from("deploy/helm/chart"),
            values_file: PathBuf::from("pipeline-values.yaml"),
            release_prefix: "test-release".to_owned(),
            namespace_prefix: "test-namespace".to_owned(),
            frontend_suffix: "-frontend".to_owned(),
            unique_names: true,
            manage_namespace: true,
        }
    }
}

impl ChartConfig {
    /// Makes relative chart/values paths relative to `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        if self.chart_path.is_relative() {
            self.chart_path = base.join(&self.chart_path);
        }
        if self.values_file.is_relative() {
            self.values_file = base.join(&self.values_file);
        }
    }
}

/// Polling policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// First delay between observations (ms)
    pub initial_interval_ms: u64,
    /// Delay cap (ms)
    pub max_interval_ms: u64,
    /// Growth factor applied after each observation
    pub multiplier: f64,
    /// Deadline for one wait (s)
    pub timeout_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 10_000,
            multiplier: 2.0,
            timeout_secs: 180,
        }
    }
}

/// Load scenario settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Number of sequential requests
    pub requests: u32,
    /// Local end of the port-forward
    pub local_port: u16,
    /// Service port on the cluster side
    pub remote_port: u16,
    /// Request path
    pub endpoint: String,
    /// Value of the `text` field in the request body
    pub prompt: String,
    /// Per-request timeout (s)
    pub request_timeout_secs: u64,
    /// Fraction of requests that must return 200. `1.0` fails on the first
    /// non-200 response.
    pub min_success_ratio: f64,
    /// How long to wait for the tunnel to accept connections (s)
    pub tunnel_ready_timeout_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            requests: 50,
            local_port: 3000,
            remote_port: 80,
            endpoint: "/generate".to_owned(),
            prompt: "test load performance".to_owned(),
            request_timeout_secs: 5,
            min_success_ratio: 1.0,
            tunnel_ready_timeout_secs: 15,
        }
    }
}

/// Scaling scenario settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Replica count for the scale-up step
    pub scale_up_replicas: u32,
    /// Replica count for the scale-down step
    pub scale_down_replicas: u32,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            scale_up_replicas: 3,
            scale_down_replicas: 1,
        }
    }
}

// --- environment override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_path(target: &mut PathBuf, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = PathBuf::from(val);
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(b) => *target = b,
            Err(_) => warn!(
                env_key = env_key,
                value = val.as_str(),
                "ignoring invalid boolean environment override"
            ),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(v) => *target = v,
            Err(_) => warn!(
                env_key = env_key,
                value = val.as_str(),
                "ignoring invalid numeric environment override"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_f64(target: &mut f64, env_key: &str) {
    override_parsed(target, env_key);
}
