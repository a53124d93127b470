// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use swarm_core::domain::config::CoordinatorConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./swarm-config.yaml)
        #[arg(short, long, default_value = "./swarm-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = CoordinatorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SWARM_CONFIG_PATH: {}",
            std::env::var("SWARM_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./swarm-config.yaml");
        println!("  4. ~/.swarm/config.yaml");
        println!("  5. /etc/swarm/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Swarm:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    println!("{}", "Claims & Capital:".bold());
    println!("  Default claim TTL: {:?}", spec.claims.default_ttl);
    println!("  Initial balance: {:.2}", spec.ledger.initial_balance);
    println!(
        "  Discovery bonus: {:.0}%",
        spec.ledger.discovery_bonus_fraction * 100.0
    );
    println!("  Closed reservation retention: {:?}", spec.ledger.closed_retention);
    println!();

    println!("{}", "Scheduling:".bold());
    println!(
        "  {} waves every {:?} (+ up to {:?} jitter)",
        spec.scheduler.wave_count, spec.scheduler.wave_interval, spec.scheduler.max_jitter
    );
    println!("  Urgency override above: {}", spec.scheduler.override_threshold);
    println!();

    println!("{}", "Knowledge:".bold());
    println!(
        "  Decay per hop: {} (noise ±{}), fanout {}",
        spec.knowledge.decay_per_hop, spec.knowledge.noise_amplitude, spec.knowledge.fanout
    );
    println!();

    println!("{}", "Resurrection:".bold());
    println!(
        "  Heartbeat every {:?}, suspect after {} missed",
        spec.resurrection.heartbeat_interval, spec.resurrection.missed_heartbeat_limit
    );
    println!("  Coverage threshold: {}", spec.resurrection.resurrection_threshold);
    println!("  Sweep interval: {:?}", spec.resurrection.sweep_interval);
    println!();

    println!("{}", "Genome:".bold());
    println!("  Venues: {}", spec.genome.venues.join(", "));
    println!("  Specializations: {}", spec.genome.specializations.len());
    println!();

    println!("{}", "Persistence:".bold());
    match &spec.persistence.snapshot_path {
        Some(path) => println!("  Snapshot: {}", path.display()),
        None => println!("  Snapshot: {}", "(disabled)".dimmed()),
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CoordinatorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_templates_are_valid() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = swarm_core::domain::config::CoordinatorConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }
}
