//! Configuration parsing for the grid client.

use anyhow::{Context, Result};
use grid_topology::{CellKey, CellSet, GridContext, PatchMeta, StoreConfig};
use serde::Deserialize;
use std::path::Path;

/// Root configuration for `gridctl`.
#[derive(Debug, Deserialize)]
pub struct Config {
	/// Remote topology service.
	#[serde(default)]
	pub service: Option<ServiceConfig>,
	/// Patch served by the in-memory service (`--offline`).
	#[serde(default)]
	pub patch: Option<PatchMeta>,
	/// Store limits.
	#[serde(default = "default_store")]
	pub store: StoreConfig,
	/// Feature selections for the in-memory service's `pick`.
	#[serde(default)]
	pub features: Vec<FeatureConfig>,
}

/// Remote topology service endpoint.
#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
	/// Topology root, e.g. `http://127.0.0.1:8000/api/topo`.
	pub base_url: String,
	/// Request timeout in seconds.
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
}

/// Cells a feature file selects.
#[derive(Debug, Deserialize)]
pub struct FeatureConfig {
	pub dir: String,
	/// `[level, global_id]` pairs.
	pub cells: Vec<(u8, u32)>,
}

fn default_timeout_secs() -> u64 {
	30
}

fn default_store() -> StoreConfig {
	StoreConfig::with_max_cell_count(1 << 20)
}

impl FeatureConfig {
	pub fn cell_set(&self) -> CellSet {
		CellSet::from_keys(
			self.cells
				.iter()
				.map(|&(level, global_id)| CellKey::new(level, global_id)),
		)
	}
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		Self::parse(&content)
	}

	pub fn parse(content: &str) -> Result<Self> {
		let config: Config =
			toml::from_str(content).with_context(|| "Failed to parse config TOML")?;

		if config.service.is_none() && config.patch.is_none() {
			anyhow::bail!("Config needs a [service] or a [patch] section");
		}
		if let Some(service) = &config.service {
			if service.base_url.is_empty() {
				anyhow::bail!("service.base_url must not be empty");
			}
			if service.timeout_secs == 0 {
				anyhow::bail!("service.timeout_secs must be positive");
			}
		}
		if let Some(patch) = &config.patch {
			if patch.subdivide_rules.is_empty() {
				anyhow::bail!("patch.subdivide_rules must have at least one rule");
			}
			if let Some(rule) = patch.subdivide_rules.iter().find(|r| r[0] == 0 || r[1] == 0) {
				anyhow::bail!("patch.subdivide_rules has a zero ratio: {:?}", rule);
			}
			let [xmin, ymin, xmax, ymax] = patch.bounds;
			if xmin >= xmax || ymin >= ymax {
				anyhow::bail!("patch.bounds are inverted: {:?}", patch.bounds);
			}
			patch
				.to_context()
				.with_context(|| format!("Invalid patch '{}'", patch.name))?;
		}
		config
			.store
			.validate()
			.with_context(|| "Invalid [store] section")?;

		Ok(config)
	}

	/// Grid context of the offline patch.
	pub fn offline_context(&self) -> Result<GridContext> {
		let patch = self
			.patch
			.as_ref()
			.context("--offline needs a [patch] section")?;
		Ok(patch.to_context()?)
	}
}
