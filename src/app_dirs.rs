use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("reflex"))
        } else {
            ProjectDirs::from("", "", "reflex").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("records.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("reflex.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_in_state_dir() {
        if let Some(dir) = AppDirs::state_dir() {
            assert_eq!(AppDirs::db_path(), Some(dir.join("records.db")));
            assert_eq!(AppDirs::log_path(), Some(dir.join("reflex.log")));
        }
    }
}
