//! Module for generating the SLURM scripts of a project.
//!
//! The plan is computed and validated before anything touches the filesystem,
//! so a bad samplesheet or node profile leaves no half-built project behind.
//!
//! # Enums
//!
//! - [`Reference`](enum.Reference.html): Reference genome passed to `cellranger count`.
//! - [`AggrNorm`](enum.AggrNorm.html): Depth normalization mode for `cellranger aggr`.
//!
//! # Functions
//!
//! - [`generate`](fn.generate.html): Build a project folder with all scripts and the driver.
//! - [`print_plan`](fn.print_plan.html): Print the plan and driver chain only.
//!
use crate::_planning::{plan, BatchUnit, Plan, Stage};
use crate::chain::{chain_for, render_driver};
use crate::cli::{GenerateArgs, NodeArgs, SamplesheetArgs};
use crate::config::{self, NodeProfile};
use crate::error::{Error, Result};
use crate::project::{copy_into, project_name, symlink_force, ProjectLayout};
use crate::samplesheet;
use crate::template::{render, TemplateValues, Templates};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Requested wall time under the short QoS.
const SHORT_QOS_TIME: &str = "15:00";
const SHORT_QOS: &str = "short";
const DRIVER_NAME: &str = "run_project.sh";
const AGGR_CSV_NAME: &str = "aggregation_meta.csv";

/// Reference genome for `cellranger count`.
#[derive(Debug, ValueEnum, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reference {
    /// Mouse, mm10.
    #[default]
    Mm,
    /// Human, GRCh38.
    Hg,
}

impl Reference {
    pub fn refdata(self) -> &'static str {
        match self {
            Reference::Mm => "refdata-cellranger-mm10-1.2.0",
            Reference::Hg => "refdata-cellranger-GRCh38-1.2.0",
        }
    }
}

/// Normalization depth across the input libraries for `cellranger aggr`.
#[derive(Debug, ValueEnum, Clone, Copy, Default, PartialEq, Eq)]
pub enum AggrNorm {
    /// Subsample to equal confidently mapped reads per cell.
    #[default]
    Mapped,
    /// Subsample to equal total reads per cell.
    Raw,
    /// No normalization.
    None,
}

impl AggrNorm {
    /// Value as `cellranger aggr --normalize` expects it.
    pub fn as_arg(self) -> &'static str {
        match self {
            AggrNorm::Mapped => "mapped",
            AggrNorm::Raw => "raw",
            AggrNorm::None => "None",
        }
    }
}

#[derive(Debug, Serialize)]
struct AggrRow<'a> {
    library_id: &'a str,
    molecule_h5: String,
}

/// Write the `library_id,molecule_h5` CSV `cellranger aggr` reads.
fn write_aggr_csv(path: &Path, layout: &ProjectLayout, samples: &[String]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for sample in samples {
        wtr.serialize(AggrRow {
            library_id: sample,
            molecule_h5: layout
                .counts
                .join(sample)
                .join("outs")
                .join("molecule_info.h5")
                .display()
                .to_string(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn existing(path: &Path, what: &str) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|e| {
        Error::InvalidInput(format!("the {} path {} is not valid: {}", what, path.display(), e))
    })
}

fn read_plan(path: &Path, sheet: &SamplesheetArgs, profile: &NodeProfile) -> Result<Plan> {
    let rows = samplesheet::read(path, &sheet.lane_column, &sheet.sample_column)?;
    plan(&rows.lanes, &rows.samples, profile)
}

/// Values shared by every script of the project.
fn base_values(
    args: &GenerateArgs,
    layout: &ProjectLayout,
    datapath: &Path,
    samplesheet: &Path,
    partition: &str,
    max_cores: u32,
) -> TemplateValues {
    let mut values = TemplateValues::new();
    values
        .set("uppmax_project_name", &args.account)
        .set("partition", partition)
        .set("num_cores", max_cores)
        .set_opt("use_qos_short", args.qos.then_some(SHORT_QOS))
        .set("hiseq_datapath", datapath.display())
        .set("reference_genome", args.reference.refdata())
        .set("cranger_aggr_norm", args.aggr_norm.as_arg())
        .set("project_root", layout.root.display())
        .unset("aggr_csv_meta_file")
        .unset("aggregation_id");
    if let Some(name) = samplesheet.file_name() {
        values.set("samplesheet_loc", name.to_string_lossy());
    }
    values
}

/// Values for one script on top of the shared ones.
fn unit_values(
    base: &TemplateValues,
    unit: &BatchUnit,
    job_name: &str,
    layout: &ProjectLayout,
    qos: bool,
) -> TemplateValues {
    let mut values = base.clone();
    let items = (!unit.items.is_empty()).then(|| unit.items.join(" "));
    values
        .set("job_description", format!("{}_{}", job_name, unit.stem()))
        .set(
            "sbatch_output",
            layout.slurm_out.join(format!("{}.out", unit.stem())).display(),
        )
        .set_opt("bash_lane_or_sample_list", items)
        .set("cranger_localcores", unit.cores_per_item)
        .set("cranger_localmem", unit.mem_per_item);
    if qos {
        values.set("time_request", SHORT_QOS_TIME);
    } else {
        values.set("time_request", unit.runtime);
    }
    values
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr())
        .with_message("scripts");
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:30} {pos}/{len} {msg}") {
        bar.set_style(style);
    }
    bar
}

/// Create the project folder, every batch script and the driver.
///
/// # Arguments
///
/// * `args` - Parsed `generate` arguments.
///
/// # Returns
///
/// Returns the project root on success.
pub fn generate(args: GenerateArgs) -> Result<PathBuf> {
    let samplesheet_path = existing(&args.samplesheet.samplesheet, "samplesheet")?;
    let datapath = existing(&args.datapath, "hiseq data")?;
    let link_dir = existing(&args.link_dir, "link")?;
    let profile = config::resolve(&args.node)?;
    let templates = match &args.templates_dir {
        Some(dir) => Templates::from_dir(dir)?,
        None => Templates::builtin(),
    };

    log::info!("Calculating the plan for this project...");
    let run_plan = read_plan(&samplesheet_path, &args.samplesheet, &profile)?;

    let name = project_name(&datapath, &samplesheet_path)?;
    let layout = ProjectLayout::reserve(&args.projects_dir, &name)?;
    let aggr_csv = layout.metadata.join(AGGR_CSV_NAME);

    let mut base = base_values(
        &args,
        &layout,
        &datapath,
        &samplesheet_path,
        &profile.partition,
        profile.max_cores,
    );
    if run_plan.aggregation.is_some() {
        base.set("aggr_csv_meta_file", aggr_csv.display())
            .set("aggregation_id", format!("AGGR_{}", name));
    }

    // Render everything up front so a template error leaves no project behind.
    let job_name = args.job_name.replace(' ', "_");
    let scripts = run_plan
        .units()
        .map(|unit| {
            let values = unit_values(&base, unit, &job_name, &layout, args.qos);
            render(templates.for_stage(unit.stage), &values).map(|script| (unit, script))
        })
        .collect::<Result<Vec<_>>>()?;
    let driver_text = render_driver(templates.driver(), &chain_for(&run_plan));

    layout.create_dirs()?;
    copy_into(&samplesheet_path, &layout.metadata)?;
    log::info!("The samplesheet has been put in {}", layout.metadata.display());
    if run_plan.aggregation.is_some() {
        write_aggr_csv(&aggr_csv, &layout, &run_plan.samples)?;
    }

    log::info!("Creating the appropriate scripts...");
    let bar = progress_bar(run_plan.len() as u64);
    for (unit, script) in scripts {
        fs::write(layout.root.join(&unit.script_name), script)?;
        log::debug!(
            "Wrote {} ({} items, {} cores/item, {})",
            unit.script_name,
            unit.items.len(),
            unit.cores_per_item,
            unit.runtime
        );
        bar.inc(1);
    }
    bar.finish_and_clear();

    let driver = layout.root.join(DRIVER_NAME);
    fs::write(&driver, driver_text)?;
    make_executable(&driver)?;
    symlink_force(&driver, &link_dir.join(format!("run_project_{}", name)))?;

    log::info!("Done. Submit the project with {}", driver.display());
    Ok(layout.root)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Print the plan and the driver chain to stdout.
pub fn print_plan(sheet: &SamplesheetArgs, node: &NodeArgs) -> Result<()> {
    let profile = config::resolve(node)?;
    let run_plan = read_plan(&sheet.samplesheet, sheet, &profile)?;
    println!(
        "{:<12} {:<16} {:>10} {:>8} {:>12}  items",
        "stage", "script", "cores/item", "mem/item", "runtime"
    );
    for stage in Stage::ALL {
        for unit in run_plan.stage(stage) {
            println!(
                "{:<12} {:<16} {:>10} {:>7}G {:>12}  {}",
                unit.stage.to_string(),
                unit.script_name,
                unit.cores_per_item,
                unit.mem_per_item,
                unit.runtime.to_string(),
                unit.items.join(" ")
            );
        }
    }
    println!("\n# partition: {}", profile.partition);
    for submission in chain_for(&run_plan) {
        println!("{}", submission);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn node_args() -> NodeArgs {
        NodeArgs {
            config: None,
            partition: None,
            max_cores: None,
            extraction_per_node: Some(2),
            processing_per_node: Some(2),
        }
    }

    fn args(projects_dir: &Path, datapath: &Path, qos: bool) -> GenerateArgs {
        let link_dir = projects_dir.parent().unwrap_or(projects_dir);
        GenerateArgs {
            account: "snic2017-7-1".to_owned(),
            job_name: "my job".to_owned(),
            qos,
            datapath: datapath.to_path_buf(),
            reference: Reference::Hg,
            aggr_norm: AggrNorm::None,
            projects_dir: projects_dir.to_path_buf(),
            link_dir: link_dir.to_path_buf(),
            templates_dir: None,
            samplesheet: SamplesheetArgs {
                samplesheet: PathBuf::from("tests/test_samplesheet.csv"),
                lane_column: "Lane".to_owned(),
                sample_column: "Sample".to_owned(),
            },
            node: node_args(),
        }
    }

    #[test]
    fn test_generate_project() {
        let tmp = tempdir().unwrap();
        let projects = tmp.path().join("projects");
        let datapath = tmp.path().join("170202_ST-E00215_0123_AHGXXXXX");
        fs::create_dir(&projects).unwrap();
        fs::create_dir(&datapath).unwrap();

        let root = generate(args(&projects, &datapath, false)).unwrap();
        assert!(root.ends_with("project_HGXXXXX_test_samplesheet"));

        // 3 lanes in batches of 2, 5 samples in batches of 2, plus aggregation.
        for script in [
            "mkfastq_1.sh",
            "mkfastq_2.sh",
            "count_1.sh",
            "count_2.sh",
            "count_3.sh",
            "aggregation.sh",
            "run_project.sh",
        ] {
            assert!(root.join(script).is_file(), "missing {}", script);
        }
        assert!(root.join("metadata/test_samplesheet.csv").is_file());

        let mkfastq = fs::read_to_string(root.join("mkfastq_1.sh")).unwrap();
        assert!(mkfastq.contains("#SBATCH -A snic2017-7-1\n"));
        assert!(mkfastq.contains("#SBATCH -J my_job_mkfastq_1\n"));
        assert!(mkfastq.contains("#SBATCH -n 16\n"));
        assert!(mkfastq.contains("LANES=\"1 2\"\n"));
        assert!(mkfastq.contains("LOCALC=8\n"));
        assert!(mkfastq.contains("LOCALM=56\n"));
        // 486 * 2 + 3771 + 7200
        assert!(mkfastq.contains("#SBATCH -t 3:19:03\n"));
        assert!(!mkfastq.contains("--qos"));

        let count = fs::read_to_string(root.join("count_1.sh")).unwrap();
        assert!(count.contains("SAMPLES=\"Sample_B Sample_A\"\n"));
        assert!(count.contains("REFERENCE=\"refdata-cellranger-GRCh38-1.2.0\"\n"));
        let count3 = fs::read_to_string(root.join("count_3.sh")).unwrap();
        assert!(count3.contains("SAMPLES=\"Sample_E\"\n"));
        assert!(count3.contains("LOCALC=16\n"));

        let aggr = fs::read_to_string(root.join("aggregation.sh")).unwrap();
        assert!(aggr.contains("AGGR_ID=\"AGGR_HGXXXXX_test_samplesheet\"\n"));
        assert!(aggr.contains("NORMALIZE=\"None\"\n"));
        assert!(!aggr.contains("SAMPLES"));

        let meta = fs::read_to_string(root.join("metadata/aggregation_meta.csv")).unwrap();
        let mut meta_lines = meta.lines();
        assert_eq!(meta_lines.next(), Some("library_id,molecule_h5"));
        let first = meta_lines.next().unwrap();
        assert!(first.starts_with("Sample_B,"));
        assert!(first.ends_with("counts/Sample_B/outs/molecule_info.h5"));
        assert_eq!(meta_lines.count(), 4);

        let driver = fs::read_to_string(root.join("run_project.sh")).unwrap();
        assert!(driver.contains("job1=$(sbatch mkfastq_1.sh | awk '{print $4}')\n"));
        assert!(driver.contains(
            "job5=$(sbatch --dependency=afterok:$job1:$job2 count_3.sh | awk '{print $4}')\n"
        ));
        assert!(driver.ends_with("sbatch --dependency=afterok:$job3:$job4:$job5 aggregation.sh\n"));

        let link = tmp.path().join("run_project_HGXXXXX_test_samplesheet");
        assert_eq!(fs::read_link(&link).unwrap(), root.join("run_project.sh"));
    }

    #[test]
    fn test_short_qos_overrides_runtime() {
        let tmp = tempdir().unwrap();
        let projects = tmp.path().join("projects");
        let datapath = tmp.path().join("170202_ST-E00215_0123_BHGQOS");
        fs::create_dir(&projects).unwrap();
        fs::create_dir(&datapath).unwrap();

        let root = generate(args(&projects, &datapath, true)).unwrap();
        for script in ["mkfastq_1.sh", "count_1.sh", "aggregation.sh"] {
            let text = fs::read_to_string(root.join(script)).unwrap();
            assert!(text.contains("#SBATCH -t 15:00\n"));
            assert!(text.contains("#SBATCH --qos=short\n"));
        }
        assert!(tmp.path().join("run_project_HGQOS_test_samplesheet").exists());
    }

    #[test]
    fn test_invalid_samplesheet_writes_nothing() {
        let tmp = tempdir().unwrap();
        let projects = tmp.path().join("projects");
        let datapath = tmp.path().join("170202_ST-E00215_0123_AHGEMPTY");
        fs::create_dir(&projects).unwrap();
        fs::create_dir(&datapath).unwrap();

        let mut bad = args(&projects, &datapath, false);
        bad.samplesheet.samplesheet = PathBuf::from("tests/test_empty_samplesheet.csv");
        assert!(matches!(generate(bad), Err(Error::InvalidInput(_))));
        assert_eq!(fs::read_dir(&projects).unwrap().count(), 0);
    }

    #[test]
    fn test_broken_template_writes_nothing() {
        let tmp = tempdir().unwrap();
        let projects = tmp.path().join("projects");
        let datapath = tmp.path().join("170202_ST-E00215_0123_AHGBROKEN");
        let templates = tmp.path().join("templates");
        fs::create_dir(&projects).unwrap();
        fs::create_dir(&datapath).unwrap();
        fs::create_dir(&templates).unwrap();
        for name in ["mkfastq_template.bash", "aggr_template.bash", "run_proj_template.bash"] {
            fs::write(templates.join(name), "#!/bin/bash\n").unwrap();
        }
        fs::write(templates.join("count_template.bash"), "#!/bin/bash\n?job_description").unwrap();

        let mut broken = args(&projects, &datapath, false);
        broken.templates_dir = Some(templates);
        assert!(matches!(generate(broken), Err(Error::Template(_))));
        assert_eq!(fs::read_dir(&projects).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_datapath() {
        let tmp = tempdir().unwrap();
        let bad = args(tmp.path(), &tmp.path().join("nope_AX"), false);
        assert!(matches!(generate(bad), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_read_plan() {
        let sheet = SamplesheetArgs {
            samplesheet: PathBuf::from("tests/test_samplesheet.csv"),
            lane_column: "Lane".to_owned(),
            sample_column: "Sample".to_owned(),
        };
        let profile = config::resolve(&node_args()).unwrap();
        let run_plan = read_plan(&sheet.samplesheet, &sheet, &profile).unwrap();
        assert_eq!(profile.partition, "core");
        assert_eq!(run_plan.extraction.len(), 2);
        assert_eq!(run_plan.processing.len(), 3);
        assert!(run_plan.aggregation.is_some());
    }
}
