//! Resolution of the auxiliary files a project refers to

use std::path::{Path, PathBuf};

/// Folder of the project holding copies of the FASTA and spectrum files
pub const DATA_FOLDER: &str = "data";

/// Candidate locations for `recorded`, in lookup order: the recorded path
/// itself, then its file name in the project folder, the project `data/`
/// folder and the fallback folder.
pub fn candidates(recorded: &Path, project_folder: &Path, fallback: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![recorded.to_path_buf()];
    if let Some(name) = recorded.file_name() {
        candidates.push(project_folder.join(name));
        candidates.push(project_folder.join(DATA_FOLDER).join(name));
        if let Some(fallback) = fallback {
            candidates.push(fallback.join(name));
        }
    }
    candidates
}

/// First existing candidate, if any
pub fn resolve(recorded: &Path, project_folder: &Path, fallback: Option<&Path>) -> Option<PathBuf> {
    let found = candidates(recorded, project_folder, fallback)
        .into_iter()
        .find(|path| path.is_file());
    match &found {
        Some(path) if path != recorded => {
            log::info!("{} found at {}", recorded.display(), path.display())
        }
        None => log::warn!("{} not found", recorded.display()),
        _ => {}
    }
    found
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_order() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let project = dir.path().join("project");
        let fallback = dir.path().join("fallback");
        std::fs::create_dir_all(project.join(DATA_FOLDER))?;
        std::fs::create_dir_all(&fallback)?;

        let recorded = Path::new("/nowhere/to/be/found/human.fasta");
        assert_eq!(resolve(recorded, &project, Some(&fallback)), None);

        std::fs::write(fallback.join("human.fasta"), b"")?;
        assert_eq!(
            resolve(recorded, &project, Some(&fallback)),
            Some(fallback.join("human.fasta"))
        );
        assert_eq!(resolve(recorded, &project, None), None);

        std::fs::write(project.join(DATA_FOLDER).join("human.fasta"), b"")?;
        assert_eq!(
            resolve(recorded, &project, Some(&fallback)),
            Some(project.join(DATA_FOLDER).join("human.fasta"))
        );

        std::fs::write(project.join("human.fasta"), b"")?;
        assert_eq!(
            resolve(recorded, &project, Some(&fallback)),
            Some(project.join("human.fasta"))
        );

        let existing = fallback.join("human.fasta");
        assert_eq!(resolve(&existing, &project, None), Some(existing.clone()));
        Ok(())
    }
}
