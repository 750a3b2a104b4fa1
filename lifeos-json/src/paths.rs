use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Directory used when neither an explicit data dir nor a platform data dir
/// is available, relative to the working directory.
pub const FALLBACK_DIR: &str = ".lifeos";

/// Files the JSON store keeps under a data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub file: PathBuf,
    pub backups: PathBuf,
}

impl StorePaths {
    pub fn under(root: &Path) -> Self {
        Self {
            file: root.join("recall.json"),
            backups: root.join("backups"),
        }
    }
}

/// Resolves the data directory. An explicit directory wins, then the
/// platform data dir for LifeOS, then [`FALLBACK_DIR`].
pub fn data_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    ProjectDirs::from("app", "lifeos", "recall")
        .map(|pd| pd.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DIR))
}
