use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::generate::{AggrNorm, Reference};

#[derive(Debug, Parser)]
#[clap(version, about = "Prepare SLURM scripts for the 10x Genomics Cell Ranger pipeline", long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(short, long, global = true)]
    /// Log debug messages
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[clap(about = "Create a project folder with its mkfastq, count and aggr scripts")]
    Generate(GenerateArgs),
    #[clap(about = "Print the batch plan and submission chain without writing anything")]
    Plan {
        #[clap(flatten)]
        samplesheet: SamplesheetArgs,

        #[clap(flatten)]
        node: NodeArgs,
    },
    #[clap(about = "Collect the count outputs of related projects into a deliverable")]
    Deliver {
        #[clap(short, long, value_parser, required = true, multiple_values = true)]
        /// Projects to include; they must share the 10X_YY_NNN_## part of their names
        project: Vec<String>,

        #[clap(short, long)]
        /// Also include the fastqs
        fastq: bool,

        #[clap(short, long, value_parser)]
        /// Name of the deliverable (default: the shared project key)
        output: Option<String>,

        #[clap(long, value_parser, default_value = "projects")]
        /// Folder holding the projects
        projects_dir: PathBuf,

        #[clap(long, value_parser, default_value = "deliverables")]
        /// Folder the deliverable is created in
        deliverables_dir: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[clap(short = 'A', value_parser)]
    /// UPPMAX project (SLURM account) name
    pub account: String,

    #[clap(short = 'J', value_parser)]
    /// Job name, prefixed to every script's name
    pub job_name: String,

    #[clap(short, long)]
    /// Use the short QoS for testing: 15 minutes, high priority
    pub qos: bool,

    #[clap(short = 'd', long = "hiseq-datapath", value_parser)]
    /// Path of the raw HiSeq run folder
    pub datapath: PathBuf,

    #[clap(short, long = "ref", default_value_t, value_enum)]
    /// Reference genome
    pub reference: Reference,

    #[clap(long, default_value_t, value_enum)]
    /// Normalization depth across the input libraries for aggr
    pub aggr_norm: AggrNorm,

    #[clap(long, value_parser, default_value = "projects")]
    /// Folder the project folder is created in
    pub projects_dir: PathBuf,

    #[clap(long, value_parser, default_value = ".")]
    /// Folder the run_project_<name> link to the driver is placed in
    pub link_dir: PathBuf,

    #[clap(long, value_parser)]
    /// Folder with custom mkfastq/count/aggr/run_proj templates
    pub templates_dir: Option<PathBuf>,

    #[clap(flatten)]
    pub samplesheet: SamplesheetArgs,

    #[clap(flatten)]
    pub node: NodeArgs,
}

#[derive(Debug, Args)]
pub struct SamplesheetArgs {
    #[clap(short, long = "samplesheet", value_parser)]
    /// Path of the samplesheet CSV
    pub samplesheet: PathBuf,

    #[clap(long, value_parser, default_value = "Lane")]
    /// Samplesheet column holding lane ids
    pub lane_column: String,

    #[clap(long, value_parser, default_value = "Sample")]
    /// Samplesheet column holding sample ids
    pub sample_column: String,
}

#[derive(Debug, Args)]
pub struct NodeArgs {
    #[clap(long, value_parser)]
    /// TOML file describing the cluster node
    pub config: Option<PathBuf>,

    #[clap(short, long, value_parser)]
    /// SLURM partition
    pub partition: Option<String>,

    #[clap(long, value_parser)]
    /// Cores per node
    pub max_cores: Option<u32>,

    #[clap(long, value_parser)]
    /// Lanes per mkfastq script
    pub extraction_per_node: Option<u32>,

    #[clap(long, value_parser)]
    /// Samples per count script
    pub processing_per_node: Option<u32>,
}
