// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration Types
//
// Defines the configuration schema for a swarm coordinator, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Claim TTL defaults
// - Capital pool seed balance and discovery bonus
// - Wave scheduling, knowledge decay, resurrection and mutation tunables
// - Snapshot persistence

use crate::domain::genome::{default_specializations, default_venues, MutationPolicy};
use crate::domain::knowledge::DecayModel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "swarm.100monkeys.ai/v1";
pub const KIND: &str = "CoordinatorConfig";

/// Top-level Kubernetes-style coordinator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// API version (must be "swarm.100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CoordinatorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: CoordinatorSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable swarm name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorSpec {
    #[serde(default)]
    pub claims: ClaimConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub resurrection: ResurrectionConfig,

    #[serde(default)]
    pub genome: GenomeConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimConfig {
    /// TTL used when a caller does not supply one
    #[serde(with = "humantime_serde", default = "default_claim_ttl")]
    pub default_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,

    /// Fraction of positive realized PnL credited to the discovering clone
    #[serde(default = "default_discovery_bonus")]
    pub discovery_bonus_fraction: f64,

    /// How long settled and aborted reservations stay in the table
    #[serde(with = "humantime_serde", default = "default_closed_retention")]
    pub closed_retention: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_wave_count")]
    pub wave_count: u64,

    #[serde(with = "humantime_serde", default = "default_wave_interval")]
    pub wave_interval: Duration,

    /// Urgency strictly above this bypasses wave assignment
    #[serde(default = "default_override_threshold")]
    pub override_threshold: f64,

    /// Upper bound of the uniform jitter added to the wave delay
    #[serde(with = "humantime_serde", default = "default_max_jitter")]
    pub max_jitter: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_decay_per_hop")]
    pub decay_per_hop: f64,

    #[serde(default = "default_noise_amplitude")]
    pub noise_amplitude: f64,

    /// Peers each holder forwards a fragment to per hop
    #[serde(default = "default_fanout")]
    pub fanout: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResurrectionConfig {
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// Missed intervals (k) before a clone is suspected
    #[serde(default = "default_missed_limit")]
    pub missed_heartbeat_limit: u32,

    #[serde(default = "default_resurrection_threshold")]
    pub resurrection_threshold: f64,

    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeConfig {
    #[serde(default = "default_numeric_jitter")]
    pub numeric_jitter: f64,

    #[serde(default = "default_redraw_probability")]
    pub categorical_redraw_probability: f64,

    #[serde(default = "default_venues")]
    pub venues: Vec<String>,

    #[serde(default = "default_specializations")]
    pub specializations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// JSON snapshot file; snapshots are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

fn default_claim_ttl() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_balance() -> f64 {
    10_000.0
}

fn default_discovery_bonus() -> f64 {
    0.10
}

fn default_closed_retention() -> Duration {
    Duration::from_secs(3600)
}

fn default_wave_count() -> u64 {
    10
}

fn default_wave_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_override_threshold() -> f64 {
    0.95
}

fn default_max_jitter() -> Duration {
    Duration::from_millis(20)
}

fn default_decay_per_hop() -> f64 {
    0.1
}

fn default_noise_amplitude() -> f64 {
    0.02
}

fn default_fanout() -> usize {
    3
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_missed_limit() -> u32 {
    3
}

fn default_resurrection_threshold() -> f64 {
    0.7
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_numeric_jitter() -> f64 {
    0.20
}

fn default_redraw_probability() -> f64 {
    0.10
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_claim_ttl(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            discovery_bonus_fraction: default_discovery_bonus(),
            closed_retention: default_closed_retention(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wave_count: default_wave_count(),
            wave_interval: default_wave_interval(),
            override_threshold: default_override_threshold(),
            max_jitter: default_max_jitter(),
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            decay_per_hop: default_decay_per_hop(),
            noise_amplitude: default_noise_amplitude(),
            fanout: default_fanout(),
        }
    }
}

impl Default for ResurrectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            missed_heartbeat_limit: default_missed_limit(),
            resurrection_threshold: default_resurrection_threshold(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            numeric_jitter: default_numeric_jitter(),
            categorical_redraw_probability: default_redraw_probability(),
            venues: default_venues(),
            specializations: default_specializations(),
        }
    }
}

impl KnowledgeConfig {
    pub fn decay_model(&self) -> DecayModel {
        DecayModel {
            decay_per_hop: self.decay_per_hop,
            noise_amplitude: self.noise_amplitude,
        }
    }
}

impl GenomeConfig {
    pub fn mutation_policy(&self) -> MutationPolicy {
        MutationPolicy {
            numeric_jitter: self.numeric_jitter,
            categorical_redraw_probability: self.categorical_redraw_probability,
            venues: self.venues.clone(),
            specializations: self.specializations.clone(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "swarm".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: CoordinatorSpec::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SWARM_CONFIG_PATH environment variable
    /// 2. ./swarm-config.yaml (working directory)
    /// 3. ~/.swarm/config.yaml (user home)
    /// 4. /etc/swarm/config.yaml (system, Unix) or C:\ProgramData\Swarm\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SWARM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./swarm-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".swarm").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/swarm/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Swarm\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails hard when missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SWARM_INITIAL_BALANCE") {
            match val.parse::<f64>() {
                Ok(balance) => {
                    tracing::info!("Environment override: SWARM_INITIAL_BALANCE={}", balance);
                    self.spec.ledger.initial_balance = balance;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SWARM_INITIAL_BALANCE: '{}'. Expected a number. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SWARM_CLAIM_TTL") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(ttl) => {
                    tracing::info!("Environment override: SWARM_CLAIM_TTL={:?}", ttl);
                    self.spec.claims.default_ttl = ttl;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SWARM_CLAIM_TTL: '{}'. Expected a duration like '5s'. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        if spec.claims.default_ttl.is_zero() {
            anyhow::bail!("claims.default_ttl must be greater than zero");
        }

        if !spec.ledger.initial_balance.is_finite() || spec.ledger.initial_balance < 0.0 {
            anyhow::bail!("ledger.initial_balance must be a non-negative number");
        }

        if !(0.0..=1.0).contains(&spec.ledger.discovery_bonus_fraction) {
            anyhow::bail!("ledger.discovery_bonus_fraction must be within [0, 1]");
        }

        if spec.scheduler.wave_count == 0 {
            anyhow::bail!("scheduler.wave_count must be at least 1");
        }

        if !(0.0..=1.0).contains(&spec.scheduler.override_threshold) {
            anyhow::bail!("scheduler.override_threshold must be within [0, 1]");
        }

        if !(0.0..=1.0).contains(&spec.knowledge.decay_per_hop) || spec.knowledge.decay_per_hop == 0.0 {
            anyhow::bail!("knowledge.decay_per_hop must be within (0, 1]");
        }

        if spec.knowledge.noise_amplitude < 0.0
            || spec.knowledge.noise_amplitude >= spec.knowledge.decay_per_hop
        {
            anyhow::bail!(
                "knowledge.noise_amplitude must be within [0, decay_per_hop) to keep decay monotone"
            );
        }

        if spec.knowledge.fanout == 0 {
            anyhow::bail!("knowledge.fanout must be at least 1");
        }

        if spec.resurrection.missed_heartbeat_limit == 0 {
            anyhow::bail!("resurrection.missed_heartbeat_limit must be at least 1");
        }

        if spec.resurrection.heartbeat_interval.is_zero() {
            anyhow::bail!("resurrection.heartbeat_interval must be greater than zero");
        }

        if !(0.0..=1.0).contains(&spec.resurrection.resurrection_threshold) {
            anyhow::bail!("resurrection.resurrection_threshold must be within [0, 1]");
        }

        if !(0.0..1.0).contains(&spec.genome.numeric_jitter) {
            anyhow::bail!("genome.numeric_jitter must be within [0, 1)");
        }

        if !(0.0..=1.0).contains(&spec.genome.categorical_redraw_probability) {
            anyhow::bail!("genome.categorical_redraw_probability must be within [0, 1]");
        }

        if spec.genome.venues.is_empty() {
            anyhow::bail!("genome.venues cannot be empty");
        }

        Ok(())
    }
}
