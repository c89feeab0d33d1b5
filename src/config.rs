use crate::cli::NodeArgs;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Scheduling limits of one cluster node.
///
/// Defaults describe an UPPMAX `core` partition node. A TOML file can
/// override any subset of fields and CLI flags override the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeProfile {
    /// SLURM partition the jobs are submitted to.
    pub partition: String,
    pub max_cores: u32,
    /// Lanes demultiplexed side by side in one `mkfastq` script.
    pub extraction_items_per_node: u32,
    /// Samples counted side by side in one `count` script.
    pub processing_items_per_node: u32,
    pub mem_per_core_gb: u32,
}

impl Default for NodeProfile {
    fn default() -> Self {
        NodeProfile {
            partition: String::from("core"),
            max_cores: 16,
            extraction_items_per_node: 4,
            processing_items_per_node: 4,
            mem_per_core_gb: 7,
        }
    }
}

impl NodeProfile {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let profile = Self::from_toml_str(&s)?;
        log::debug!("Loaded node profile from {}", path.display());
        Ok(profile)
    }

    /// Check every capacity is usable. Batches larger than the core count
    /// would leave items with no cores, so they are rejected too.
    pub fn validate(&self) -> Result<()> {
        if self.partition.trim().is_empty() {
            return Err(Error::Configuration("partition must not be empty".to_owned()));
        }
        for (name, value) in [
            ("max_cores", self.max_cores),
            ("extraction_items_per_node", self.extraction_items_per_node),
            ("processing_items_per_node", self.processing_items_per_node),
            ("mem_per_core_gb", self.mem_per_core_gb),
        ] {
            if value == 0 {
                return Err(Error::Configuration(format!("{} must be positive", name)));
            }
        }
        for (name, value) in [
            ("extraction_items_per_node", self.extraction_items_per_node),
            ("processing_items_per_node", self.processing_items_per_node),
        ] {
            if value > self.max_cores {
                return Err(Error::Configuration(format!(
                    "{} ({}) exceeds max_cores ({})",
                    name, value, self.max_cores
                )));
            }
        }
        Ok(())
    }
}

/// Resolve the node profile: defaults, then `--config`, then per-field flags.
pub fn resolve(args: &NodeArgs) -> Result<NodeProfile> {
    let mut profile = match &args.config {
        Some(path) => NodeProfile::from_path(path)?,
        None => NodeProfile::default(),
    };
    if let Some(partition) = &args.partition {
        profile.partition = partition.clone();
    }
    if let Some(cores) = args.max_cores {
        profile.max_cores = cores;
    }
    if let Some(n) = args.extraction_per_node {
        profile.extraction_items_per_node = n;
    }
    if let Some(n) = args.processing_per_node {
        profile.processing_items_per_node = n;
    }
    profile.validate()?;
    Ok(profile)
}
