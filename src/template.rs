//! Filling bash templates with per-script values.
//!
//! A template line starting with `?` is a marker naming a key; the line after
//! it is the target. If exactly one known key appears on the marker and it
//! has a value, the target is kept with the value spliced in:
//!
//! - target ends with a quote: value goes inside the quotes (`LANES=""` → `LANES="1 2"`)
//! - target ends with `=`: value is appended directly (`LOCALC=` → `LOCALC=4`)
//! - anything else: value is appended after a space (`#SBATCH -A` → `#SBATCH -A proj`)
//!
//! In every other case both marker and target are dropped, which is how
//! optional lines such as `#SBATCH --qos=` disappear.
use crate::_planning::Stage;
use crate::error::{Error, Result};
use fnv::{FnvHashMap, FnvHashSet};
use std::path::Path;

const MKFASTQ_TEMPLATE: &str = "mkfastq_template.bash";
const COUNT_TEMPLATE: &str = "count_template.bash";
const AGGR_TEMPLATE: &str = "aggr_template.bash";
const DRIVER_TEMPLATE: &str = "run_proj_template.bash";

/// Known template keys. A key may be known but unset, in which case its
/// target line is dropped.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    values: FnvHashMap<String, Option<String>>,
}

impl TemplateValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: ToString>(&mut self, key: &str, value: V) -> &mut Self {
        self.values.insert(key.to_owned(), Some(value.to_string()));
        self
    }

    /// Register `key` with no value.
    pub fn unset(&mut self, key: &str) -> &mut Self {
        self.values.insert(key.to_owned(), None);
        self
    }

    pub fn set_opt<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        match value {
            Some(v) => self.set(key, v),
            None => self.unset(key),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_deref())
    }

    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

fn splice(target: &str, value: &str) -> String {
    match target.chars().last() {
        Some(q @ ('"' | '\'')) => format!("{}{}{}", &target[..target.len() - 1], value, q),
        Some('=') => format!("{}{}", target, value),
        _ => format!("{} {}", target, value),
    }
}

/// Render `template` with `values`.
pub fn render(template: &str, values: &TemplateValues) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut lines = template.lines().enumerate();
    while let Some((n, line)) = lines.next() {
        let marker = match line.strip_prefix('?') {
            Some(marker) => marker,
            None => {
                out.push_str(line);
                out.push('\n');
                continue;
            }
        };
        let target = match lines.next() {
            Some((_, target)) => target,
            None => {
                return Err(Error::Template(format!(
                    "marker on line {} has no line after it",
                    n + 1
                )))
            }
        };
        let matched: FnvHashSet<&str> = marker
            .split_whitespace()
            .filter(|token| values.contains(token))
            .collect();
        let value = match matched.len() {
            1 => matched.iter().next().and_then(|key| values.get(key)),
            _ => None,
        };
        match value {
            Some(value) => {
                out.push_str(&splice(target.trim(), value));
                out.push('\n');
            }
            None => log::debug!("Dropping template line {}: {}", n + 2, target.trim()),
        }
    }
    Ok(out)
}

/// The bash templates for every stage plus the driver preamble.
#[derive(Debug, Clone)]
pub struct Templates {
    mkfastq: String,
    count: String,
    aggr: String,
    driver: String,
}

impl Templates {
    /// Templates compiled into the binary.
    pub fn builtin() -> Self {
        Templates {
            mkfastq: include_str!("../templates/mkfastq_template.bash").to_owned(),
            count: include_str!("../templates/count_template.bash").to_owned(),
            aggr: include_str!("../templates/aggr_template.bash").to_owned(),
            driver: include_str!("../templates/run_proj_template.bash").to_owned(),
        }
    }

    /// Load all four templates from `dir`. Every file must be present.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let load = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| {
                Error::InvalidInput(format!("could not read template {}: {}", path.display(), e))
            })
        };
        Ok(Templates {
            mkfastq: load(MKFASTQ_TEMPLATE)?,
            count: load(COUNT_TEMPLATE)?,
            aggr: load(AGGR_TEMPLATE)?,
            driver: load(DRIVER_TEMPLATE)?,
        })
    }

    pub fn for_stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::Extraction => &self.mkfastq,
            Stage::Processing => &self.count,
            Stage::Aggregation => &self.aggr,
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }
}
