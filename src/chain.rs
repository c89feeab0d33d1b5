//! Building the `sbatch` submission chain for a plan.
//!
//! Every extraction job is submitted on its own. Every processing job waits
//! for all extraction jobs (`afterok`), and aggregation waits for all
//! processing jobs. Job ids are captured into shell variables `job1`,
//! `job2`, ... numbered across the whole chain.
use crate::_planning::{Plan, Stage};
use std::fmt;

/// A shell variable holding a submitted job's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobVar(u32);

impl JobVar {
    pub fn number(&self) -> u32 {
        self.0
    }

    /// Variable name as assigned, e.g. `job3`.
    pub fn name(&self) -> String {
        format!("job{}", self.number())
    }
}

/// Displays as a reference, e.g. `$job3`.
impl fmt::Display for JobVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name())
    }
}

#[derive(Debug, Default)]
struct JobCounter(u32);

impl JobCounter {
    fn next(&mut self) -> JobVar {
        self.0 += 1;
        JobVar(self.0)
    }
}

/// `--dependency=afterok:...` over a non-empty set of jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency(Vec<JobVar>);

impl Dependency {
    /// `None` when there is nothing to wait for, so an empty clause can't be built.
    pub fn after_ok(jobs: &[JobVar]) -> Option<Self> {
        if jobs.is_empty() {
            None
        } else {
            Some(Dependency(jobs.to_vec()))
        }
    }

    pub fn jobs(&self) -> &[JobVar] {
        &self.0
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("--dependency=afterok")?;
        for job in self.jobs() {
            write!(f, ":{}", job)?;
        }
        Ok(())
    }
}

/// One `sbatch` line of the driver script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub stage: Stage,
    pub script: String,
    /// Variable the job id is stored in, if any later job needs it.
    pub capture: Option<JobVar>,
    pub dependency: Option<Dependency>,
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cmd = String::from("sbatch");
        if let Some(dep) = &self.dependency {
            cmd.push(' ');
            cmd.push_str(&dep.to_string());
        }
        cmd.push(' ');
        cmd.push_str(&self.script);
        match self.capture {
            Some(var) => write!(f, "{}=$({} | awk '{{print $4}}')", var.name(), cmd),
            None => f.write_str(&cmd),
        }
    }
}

/// Build the submission chain for the three stages' scripts.
///
/// A stage without scripts is skipped; the next stage then waits on the
/// closest earlier stage that has jobs, or on nothing.
pub fn build_chain(
    extraction: &[String],
    processing: &[String],
    aggregation: &[String],
) -> Vec<Submission> {
    let mut counter = JobCounter::default();
    let mut submissions = Vec::with_capacity(extraction.len() + processing.len() + aggregation.len());
    let mut upstream: Vec<JobVar> = Vec::new();

    for (stage, scripts) in [
        (Stage::Extraction, extraction),
        (Stage::Processing, processing),
        (Stage::Aggregation, aggregation),
    ] {
        if scripts.is_empty() {
            continue;
        }
        let dependency = Dependency::after_ok(&upstream);
        let mut issued = Vec::with_capacity(scripts.len());
        for script in scripts {
            // Nothing waits on aggregation.
            let capture = (stage != Stage::Aggregation).then(|| counter.next());
            issued.extend(capture);
            submissions.push(Submission {
                stage,
                script: script.clone(),
                capture,
                dependency: dependency.clone(),
            });
        }
        upstream = issued;
    }
    submissions
}

/// Build the submission chain for every script in `plan`.
pub fn chain_for(plan: &Plan) -> Vec<Submission> {
    build_chain(
        &plan.script_names(Stage::Extraction),
        &plan.script_names(Stage::Processing),
        &plan.script_names(Stage::Aggregation),
    )
}

/// The driver script: `preamble`, a blank line, then one line per
/// submission with a blank line between stages.
pub fn render_driver(preamble: &str, submissions: &[Submission]) -> String {
    let mut out = String::from(preamble);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    let mut previous = None;
    for submission in submissions {
        if previous.is_some() && previous != Some(submission.stage) {
            out.push('\n');
        }
        out.push_str(&submission.to_string());
        out.push('\n');
        previous = Some(submission.stage);
    }
    out
}
