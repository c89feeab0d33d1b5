use crate::error::{Error, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Directories of one project, all absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub fastqs: PathBuf,
    pub counts: PathBuf,
    pub aggregation: PathBuf,
    pub metadata: PathBuf,
    pub slurm_out: PathBuf,
}

impl ProjectLayout {
    fn under(root: PathBuf) -> Self {
        ProjectLayout {
            fastqs: root.join("fastqs"),
            counts: root.join("counts"),
            aggregation: root.join("aggregation"),
            metadata: root.join("metadata"),
            slurm_out: root.join("slurm_out"),
            root,
        }
    }

    /// Pick a free, absolute `<projects_dir>/project_<name>` without creating it.
    ///
    /// If the directory is taken, `_1`, `_2`, ... are tried in turn.
    pub fn reserve(projects_dir: &Path, name: &str) -> Result<Self> {
        if !projects_dir.is_dir() {
            return Err(Error::InvalidInput(format!(
                "projects directory {} does not exist",
                projects_dir.display()
            )));
        }
        let projects_dir = fs::canonicalize(projects_dir)?;
        let base = format!("project_{}", name);
        let mut root = projects_dir.join(&base);
        let mut suffix = 1;
        while root.exists() {
            log::warn!("{} already exists", root.display());
            root = projects_dir.join(format!("{}_{}", base, suffix));
            suffix += 1;
        }
        Ok(Self::under(root))
    }

    /// Create the project folder and its subdirectories.
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir(&self.root)?;
        for dir in [
            &self.fastqs,
            &self.counts,
            &self.metadata,
            &self.aggregation,
            &self.slurm_out,
        ] {
            fs::create_dir(dir)?;
        }
        log::info!("Created project folder {}", self.root.display());
        Ok(())
    }
}

/// Derive the project name from the raw-data folder and the samplesheet.
///
/// The last `_` field of the run folder is the flowcell id prefixed with its
/// position letter; the letter is dropped and the samplesheet stem appended.
///
/// # Example
///
/// ```rust,ignore
/// let name = project_name(
///     Path::new("/proj/data/170202_ST-E00215_0123_AHGXXXXX"),
///     Path::new("10X_17_001_01.csv"),
/// ).unwrap();
/// assert_eq!(name, "HGXXXXX_10X_17_001_01");
/// ```
pub fn project_name(datapath: &Path, samplesheet: &Path) -> Result<String> {
    let run = datapath
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::InvalidInput(format!("cannot name a project after {}", datapath.display()))
        })?;
    let flowcell: String = run
        .rsplit('_')
        .next()
        .unwrap_or(run)
        .chars()
        .skip(1)
        .collect();
    if flowcell.is_empty() {
        return Err(Error::InvalidInput(format!(
            "run folder '{}' has no flowcell id",
            run
        )));
    }
    let sheet = samplesheet
        .file_stem()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "cannot name a project after {}",
                samplesheet.display()
            ))
        })?;
    Ok(format!("{}_{}", flowcell, sheet))
}

/// Copy `file` into `dir`, keeping its name.
pub fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("{} is not a file", file.display())))?;
    let dest = dir.join(name);
    fs::copy(file, &dest)?;
    Ok(dest)
}

/// `ln -sf target link`.
#[cfg(unix)]
pub fn symlink_force(target: &Path, link: &Path) -> Result<()> {
    use std::{io, os::unix::fs::symlink};
    match symlink(target, link) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            fs::remove_file(link)?;
            symlink(target, link)?;
        }
        other => other?,
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn symlink_force(target: &Path, link: &Path) -> Result<()> {
    log::warn!(
        "Symlinks are unix only; not linking {} to {}",
        link.display(),
        target.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create(projects_dir: &Path, name: &str) -> Result<ProjectLayout> {
        let layout = ProjectLayout::reserve(projects_dir, name)?;
        layout.create_dirs()?;
        Ok(layout)
    }

    #[test]
    fn test_project_name() {
        let name = project_name(
            Path::new("/proj/data/170202_ST-E00215_0123_AHGXXXXX/"),
            Path::new("/home/me/10X_17_001_01.csv"),
        )
        .unwrap();
        assert_eq!(name, "HGXXXXX_10X_17_001_01");
    }

    #[test]
    fn test_project_name_needs_flowcell() {
        assert!(matches!(
            project_name(Path::new("/data/run_A"), Path::new("s.csv")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            project_name(Path::new("/"), Path::new("s.csv")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_create_layout() {
        let tmp = tempdir().unwrap();
        let layout = create(tmp.path(), "HG_demo").unwrap();
        assert!(layout.root.ends_with("project_HG_demo"));
        for dir in [
            &layout.fastqs,
            &layout.counts,
            &layout.metadata,
            &layout.aggregation,
            &layout.slurm_out,
        ] {
            assert!(dir.is_dir());
        }
    }

    #[test]
    fn test_taken_names_get_suffix() {
        let tmp = tempdir().unwrap();
        let first = create(tmp.path(), "x").unwrap();
        let second = create(tmp.path(), "x").unwrap();
        let third = create(tmp.path(), "x").unwrap();
        assert!(first.root.ends_with("project_x"));
        assert!(second.root.ends_with("project_x_1"));
        assert!(third.root.ends_with("project_x_2"));
    }

    #[test]
    fn test_reserve_touches_nothing() {
        let tmp = tempdir().unwrap();
        let layout = ProjectLayout::reserve(tmp.path(), "x").unwrap();
        assert!(layout.root.is_absolute());
        assert!(!layout.root.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_projects_dir() {
        let tmp = tempdir().unwrap();
        assert!(matches!(
            create(&tmp.path().join("nope"), "x"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_force_replaces() {
        let tmp = tempdir().unwrap();
        let (a, b, link) = (tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("l"));
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        symlink_force(&a, &link).unwrap();
        symlink_force(&b, &link).unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "b");
    }
}
