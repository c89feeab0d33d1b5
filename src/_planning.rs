//! Module for planning how a samplesheet is split into batch scripts.
//!
//! Lanes feed the `mkfastq` extraction stage, samples feed the `count`
//! processing stage, and when there is more than one sample a single
//! `aggr` script combines them. Each stage's items are cut into batches
//! that fit on one node of the cluster.
//!
//! # Enums
//!
//! - [`Stage`](enum.Stage.html): The three ordered pipeline phases.
//!   - `Extraction`: `cellranger mkfastq`, one item per lane.
//!   - `Processing`: `cellranger count`, one item per sample.
//!   - `Aggregation`: `cellranger aggr`, no items, whole node.
//!
//! # Structs
//!
//! - [`Runtime`](struct.Runtime.html): Estimated wall time, displays in SLURM `--time` syntax.
//! - [`BatchUnit`](struct.BatchUnit.html): One generated script's worth of work.
//! - [`Plan`](struct.Plan.html): All units of a run, grouped by stage.
//!
//! # Functions
//!
//! - [`plan`](fn.plan.html): Build a [`Plan`] from samplesheet lanes and samples.
//!   - Arguments:
//!     - `lanes`: Lane ids as read from the samplesheet (duplicates allowed).
//!     - `samples`: Sample ids in samplesheet order.
//!     - `node`: The node profile to size batches against.
//!   - Returns:
//!     - `Result`: A `Result` containing the `Plan` or a planning `Error`.
//!
use crate::config::NodeProfile;
use crate::error::{Error, Result};
use fnv::FnvHashSet;
use std::fmt;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// The pipeline phases, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Demultiplex raw BCLs into FASTQs, batched by lane.
    Extraction,
    /// Count each sample against the reference, batched by sample.
    Processing,
    /// Aggregate all sample counts, only when there is more than one sample.
    Aggregation,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Extraction, Stage::Processing, Stage::Aggregation];

    /// File name prefix of the scripts generated for this stage.
    pub fn script_prefix(self) -> &'static str {
        match self {
            Stage::Extraction => "mkfastq",
            Stage::Processing => "count",
            Stage::Aggregation => "aggregation",
        }
    }

    /// Linear runtime model, in seconds: `per_item * items + overhead + margin`.
    /// Fitted from past runs; jobs can and do run past it.
    fn runtime_model(self) -> (u64, u64, u64) {
        match self {
            Stage::Extraction => (486, 3771, 7200),
            Stage::Processing => (9033, 139080, 14400),
            Stage::Aggregation => (1098, 11282, 7200),
        }
    }

    /// Estimated wall time for a script of this stage handling `items` items.
    pub fn estimate_runtime(self, items: usize) -> Runtime {
        let (per_item, overhead, margin) = self.runtime_model();
        Runtime::from_secs(per_item * items as u64 + overhead + margin)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Processing => "processing",
            Stage::Aggregation => "aggregation",
        };
        f.write_str(name)
    }
}

/// A wall time estimate in whole seconds.
///
/// Displays as `H:MM:SS` when under a day and `D-HH:MM:SS` otherwise, both of
/// which SLURM accepts for `--time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(u64);

impl Runtime {
    pub fn from_secs(secs: u64) -> Self {
        Runtime(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.as_secs() / SECS_PER_DAY;
        let rest = self.as_secs() % SECS_PER_DAY;
        let (hours, minutes, seconds) = (rest / 3600, (rest % 3600) / 60, rest % 60);
        if days == 0 {
            write!(f, "{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            write!(f, "{}-{:02}:{:02}:{:02}", days, hours, minutes, seconds)
        }
    }
}

/// One generated script's worth of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUnit {
    pub stage: Stage,
    /// Unique within a plan, e.g. `mkfastq_1.sh`.
    pub script_name: String,
    /// Lane or sample ids handled by this script. Empty for aggregation.
    pub items: Vec<String>,
    pub cores_per_item: u32,
    /// In GB.
    pub mem_per_item: u32,
    pub runtime: Runtime,
}

impl BatchUnit {
    /// Script name without the `.sh` extension, used for job and log names.
    pub fn stem(&self) -> &str {
        self.script_name
            .strip_suffix(".sh")
            .unwrap_or(&self.script_name)
    }
}

/// Every script to generate for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub extraction: Vec<BatchUnit>,
    pub processing: Vec<BatchUnit>,
    pub aggregation: Option<BatchUnit>,
    /// Samples after dropping repeats, in samplesheet order.
    pub samples: Vec<String>,
}

impl Plan {
    /// Units of one stage, in batch order.
    pub fn stage(&self, stage: Stage) -> &[BatchUnit] {
        match stage {
            Stage::Extraction => &self.extraction,
            Stage::Processing => &self.processing,
            Stage::Aggregation => self.aggregation.as_slice(),
        }
    }

    /// All units in submission order.
    pub fn units(&self) -> impl Iterator<Item = &BatchUnit> {
        Stage::ALL.into_iter().flat_map(move |s| self.stage(s).iter())
    }

    pub fn script_names(&self, stage: Stage) -> Vec<String> {
        self.stage(stage)
            .iter()
            .map(|u| u.script_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.extraction.len() + self.processing.len() + self.aggregation.iter().len()
    }
}

/// Compare lane ids numerically when both are integers, otherwise as text.
fn lane_order(numeric: bool, a: &str, b: &str) -> std::cmp::Ordering {
    if numeric {
        let (x, y) = (a.parse::<u64>().ok(), b.parse::<u64>().ok());
        x.cmp(&y).then_with(|| a.cmp(b))
    } else {
        a.cmp(b)
    }
}

/// Deduplicate and sort lanes ascending.
///
/// Numeric ids are deduplicated by value, so `01` and `1` name one lane and
/// the first spelling in sort order is kept.
fn sorted_lanes(lanes: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = lanes
        .iter()
        .cloned()
        .collect::<FnvHashSet<String>>()
        .into_iter()
        .collect();
    let numeric = unique.iter().all(|l| l.parse::<u64>().is_ok());
    unique.sort_by(|a, b| lane_order(numeric, a, b));
    if numeric {
        let before = unique.len();
        unique.dedup_by(|a, b| a.parse::<u64>().ok() == b.parse::<u64>().ok());
        if unique.len() != before {
            log::debug!("Lane ids with the same number merged; {} lanes remain", unique.len());
        }
    }
    unique
}

/// Drop repeated samples, keeping each first occurrence in samplesheet order.
fn samples_in_order(samples: &[String]) -> Vec<String> {
    let mut seen = FnvHashSet::default();
    let unique: Vec<String> = samples
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect();
    if unique.len() != samples.len() {
        log::debug!(
            "Samplesheet repeats samples; keeping {} of {} entries",
            unique.len(),
            samples.len()
        );
    }
    unique
}

/// Memory for `cores` cores, in GB.
fn memory_gb(cores: u32, node: &NodeProfile) -> Result<u32> {
    cores.checked_mul(node.mem_per_core_gb).ok_or_else(|| {
        Error::Configuration(format!(
            "{} cores at {} GB each does not fit in a memory request",
            cores, node.mem_per_core_gb
        ))
    })
}

/// Cut `items` into node-sized batches, one script each.
fn batch(
    stage: Stage,
    items: &[String],
    per_node: u32,
    node: &NodeProfile,
) -> Result<Vec<BatchUnit>> {
    items
        .chunks(per_node as usize)
        .enumerate()
        .map(|(i, chunk)| {
            if chunk.is_empty() {
                return Err(Error::PlanningInvariantViolation(format!(
                    "{} batch {} has no items",
                    stage,
                    i + 1
                )));
            }
            let cores_per_item = node.max_cores / chunk.len() as u32;
            Ok(BatchUnit {
                stage,
                script_name: format!("{}_{}.sh", stage.script_prefix(), i + 1),
                items: chunk.to_vec(),
                cores_per_item,
                mem_per_item: memory_gb(cores_per_item, node)?,
                runtime: stage.estimate_runtime(chunk.len()),
            })
        })
        .collect()
}

/// Plan the scripts for a run.
///
/// # Arguments
///
/// * `lanes` - Lane ids from the samplesheet. Repeats collapse to one and the
///   result is sorted, so input order does not matter.
/// * `samples` - Sample ids from the samplesheet. Batched in the order given.
/// * `node` - Capacity of one cluster node.
///
/// # Returns
///
/// Returns a `Result` containing the [`Plan`], or `InvalidInput` when either
/// list is empty and `Configuration` when the node profile cannot hold a batch.
///
/// # Example
///
/// ```rust,ignore
/// let lanes = vec!["2".to_string(), "1".to_string()];
/// let samples = vec!["S1".to_string(), "S2".to_string()];
/// let plan = plan(&lanes, &samples, &NodeProfile::default()).unwrap();
/// assert_eq!(plan.extraction[0].items, vec!["1", "2"]);
/// assert!(plan.aggregation.is_some());
/// ```
pub fn plan(lanes: &[String], samples: &[String], node: &NodeProfile) -> Result<Plan> {
    node.validate()?;
    if lanes.is_empty() {
        return Err(Error::InvalidInput("samplesheet lists no lanes".to_owned()));
    }
    if samples.is_empty() {
        return Err(Error::InvalidInput(
            "samplesheet lists no samples".to_owned(),
        ));
    }

    let lanes = sorted_lanes(lanes);
    let samples = samples_in_order(samples);

    let extraction = batch(
        Stage::Extraction,
        &lanes,
        node.extraction_items_per_node,
        node,
    )?;
    let processing = batch(
        Stage::Processing,
        &samples,
        node.processing_items_per_node,
        node,
    )?;
    let aggregation = if samples.len() > 1 {
        Some(BatchUnit {
            stage: Stage::Aggregation,
            script_name: format!("{}.sh", Stage::Aggregation.script_prefix()),
            items: Vec::new(),
            cores_per_item: node.max_cores,
            mem_per_item: memory_gb(node.max_cores, node)?,
            runtime: Stage::Aggregation.estimate_runtime(samples.len()),
        })
    } else {
        None
    };

    log::debug!(
        "Planned {} extraction, {} processing and {} aggregation scripts",
        extraction.len(),
        processing.len(),
        aggregation.iter().len()
    );

    Ok(Plan {
        extraction,
        processing,
        aggregation,
        samples,
    })
}
