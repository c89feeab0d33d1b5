mod _planning;
mod chain;
mod cli;
mod config;
mod deliver;
mod error;
mod generate;
mod logger;
mod project;
mod samplesheet;
mod template;
use crate::cli::{Cli, Commands};
use clap::Parser;

fn main() {
    let args = Cli::parse();
    logger::init(args.verbose);

    let res = match args.command {
        Commands::Generate(generate_args) => {
            crate::generate::generate(generate_args).map(|_| ())
        }
        Commands::Plan { samplesheet, node } => {
            crate::generate::print_plan(&samplesheet, &node)
        }
        Commands::Deliver {
            project,
            fastq,
            output,
            projects_dir,
            deliverables_dir,
        } => crate::deliver::deliver(project, fastq, output, projects_dir, deliverables_dir)
            .map(|_| ()),
    };

    if let Err(e) = res {
        log::error!("{}", e);
        std::process::exit(1)
    }
}
