use crate::error::{Error, Result};
use fs_extra::dir::CopyOptions;
use std::{
    fs,
    path::{Path, PathBuf},
};

const FASTQ_DIR: &str = "fastq_files";

/// The `10X_YY_NNN_##` part of a project folder name, i.e. `_` fields 2..6.
///
/// # Example
///
/// ```rust,ignore
/// assert_eq!(
///     project_key("project_HGXXXXX_10X_17_001_01"),
///     Some("10X_17_001_01".to_string())
/// );
/// ```
pub fn project_key(project: &str) -> Option<String> {
    let fields: Vec<&str> = project.split('_').collect();
    if fields.len() < 6 {
        None
    } else {
        Some(fields[2..6].join("_"))
    }
}

/// The key every project shares, or `InvalidInput` if they differ.
pub fn common_key(projects: &[String]) -> Result<String> {
    let mut keys = projects.iter().map(|p| {
        project_key(p).ok_or_else(|| {
            Error::InvalidInput(format!("'{}' is not a valid project name", p))
        })
    });
    let first = keys
        .next()
        .ok_or_else(|| Error::InvalidInput("no projects given".to_owned()))??;
    for key in keys {
        if key? != first {
            return Err(Error::InvalidInput(
                "projects are not part of the same biological project".to_owned(),
            ));
        }
    }
    Ok(first)
}

/// `dir` if it is an existing directory, `InvalidInput` otherwise.
fn source_dir(dir: PathBuf) -> Result<PathBuf> {
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(Error::InvalidInput(format!("{} does not exist", dir.display())))
    }
}

/// Copy every entry of `from` into `to`.
fn copy_contents(from: &Path, to: &Path) -> Result<u64> {
    let entries = fs::read_dir(from)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()?;
    Ok(fs_extra::copy_items(&entries, to, &CopyOptions::new())?)
}

fn copy_all(
    sources: &[(&String, PathBuf, Option<PathBuf>)],
    target: &Path,
    fastq_target: &Path,
) -> Result<()> {
    for (project, counts, fastqs) in sources {
        let bytes = copy_contents(counts, target)?;
        log::info!("Copied {} bytes of counts from {}", bytes, project);
        if let Some(fastqs) = fastqs {
            let bytes = copy_contents(fastqs, fastq_target)?;
            log::info!("Copied {} bytes of fastqs from {}", bytes, project);
        }
    }
    Ok(())
}

/// Gather the `counts/` (and with `fastq`, `fastqs/`) of each project into
/// `<deliverables_dir>/<output>`.
pub fn deliver(
    projects: Vec<String>,
    fastq: bool,
    output: Option<String>,
    projects_dir: PathBuf,
    deliverables_dir: PathBuf,
) -> Result<PathBuf> {
    let key = common_key(&projects)?;
    if !deliverables_dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "'{}' directory does not exist",
            deliverables_dir.display()
        )));
    }
    let target = deliverables_dir.join(output.unwrap_or(key));
    if target.exists() {
        return Err(Error::InvalidInput(format!(
            "{} already exists",
            target.display()
        )));
    }
    // Every source must exist before the deliverable folder is made.
    let sources = projects
        .iter()
        .map(|project| {
            let root = projects_dir.join(project);
            let counts = source_dir(root.join("counts"))?;
            let fastqs = if fastq {
                Some(source_dir(root.join("fastqs"))?)
            } else {
                None
            };
            Ok::<_, Error>((project, counts, fastqs))
        })
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir(&target)?;
    let fastq_target = target.join(FASTQ_DIR);
    let copied = if fastq {
        fs::create_dir(&fastq_target).map_err(Error::from)
    } else {
        Ok(())
    }
    .and_then(|_| copy_all(&sources, &target, &fastq_target));
    if let Err(e) = copied {
        log::warn!("Removing incomplete deliverable {}", target.display());
        fs::remove_dir_all(&target)?;
        return Err(e);
    }
    log::info!("Deliverable ready at {}", target.display());
    Ok(target)
}
