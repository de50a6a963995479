// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::config::consts::{
    DEFAULT_CACHE_DIR, DEFAULT_COOLDOWN_MS, DEFAULT_ENDPOINT, DEFAULT_FUEL_LEVEL,
    DEFAULT_OVERLAY_TIMEOUT_MS, MAX_FUEL_LEVEL, MIN_FUEL_LEVEL,
};

/// Main configuration structure for the compilation pipeline.
///
/// Typically loaded from a YAML file.
///
/// # Example
/// ```yaml
/// engine:
///   module: engines/pdftex.wasm
///   cooldown_ms: 200
///   endpoint: https://mirror.example/texlive
///   fuel:
///     default: 5000000000
/// cache:
///   dir: .texkiln-cache
/// overlay:
///   enabled: true
///   config_timeout_ms: 4000
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

/// Compute engine configuration.
///
/// # Fields
/// * `module` - Path to the engine's WASM module
/// * `fuel` - Fuel budget configuration for execution limits
/// * `cooldown_ms` - Pause between queue drains after a real compile
/// * `endpoint` - Remote distribution for package/font resolution
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    pub module: String,
    #[serde(default)]
    pub fuel: FuelConfig,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Fuel budget configuration for engine commands.
///
/// Fuel limits prevent a runaway compile from wedging the host. All values
/// are optional and validated against built-in bounds.
#[derive(Debug, Default, Deserialize)]
pub struct FuelConfig {
    pub default: Option<u64>,
    pub minimum: Option<u64>,
    pub maximum: Option<u64>,
}

impl FuelConfig {
    /// Get the default fuel level, using the built-in default if not configured.
    pub fn get_default(&self) -> u64 {
        self.default.unwrap_or(DEFAULT_FUEL_LEVEL)
    }

    /// Get the minimum fuel level, using the built-in default if not configured.
    pub fn get_minimum(&self) -> u64 {
        self.minimum.unwrap_or(MIN_FUEL_LEVEL)
    }

    /// Get the maximum fuel level, using the built-in default if not configured.
    pub fn get_maximum(&self) -> u64 {
        self.maximum.unwrap_or(MAX_FUEL_LEVEL)
    }

    /// Validate and clamp a fuel level to the configured bounds.
    pub fn validate_and_clamp(&self, requested: u64) -> u64 {
        requested.clamp(self.get_minimum(), self.get_maximum())
    }
}

/// Host cache configuration.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: default_cache_dir() }
    }
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

/// Virtual file overlay configuration.
#[derive(Debug, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_overlay_timeout_ms")]
    pub config_timeout_ms: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self { enabled: true, config_timeout_ms: DEFAULT_OVERLAY_TIMEOUT_MS }
    }
}

fn default_true() -> bool {
    true
}

fn default_overlay_timeout_ms() -> u64 {
    DEFAULT_OVERLAY_TIMEOUT_MS
}

/// Load configuration from a YAML file without validation.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&raw)?;
    Ok(config)
}

/// Load configuration and verify it is internally consistent.
pub fn load_and_validate_config<P: AsRef<Path>>(
    path: P,
) -> Result<Config, Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.engine.module.trim().is_empty() {
        return Err("engine.module must point at the engine WASM binary".into());
    }
    if config.engine.endpoint.trim().is_empty() {
        return Err("engine.endpoint must not be empty".into());
    }
    let fuel = &config.engine.fuel;
    if fuel.get_minimum() > fuel.get_maximum() {
        return Err(format!(
            "fuel.minimum ({}) exceeds fuel.maximum ({})",
            fuel.get_minimum(),
            fuel.get_maximum()
        )
        .into());
    }
    Ok(())
}
