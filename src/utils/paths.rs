use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

const DATA_DIR_ENV: &str = "SCREENMIND_DATA_DIR";
const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "screenmind.sqlite3";

/// Where the two durable stores live on disk.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Resolution order: explicit path, `SCREENMIND_DATA_DIR`, then the
    /// platform data directory.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let data_dir = match explicit {
            Some(path) => path,
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(value) if !value.is_empty() => PathBuf::from(value),
                _ => dirs::data_dir()
                    .ok_or_else(|| anyhow!("no platform data directory; pass --data-dir"))?
                    .join("screenmind"),
            },
        };

        Ok(Self { data_dir })
    }

    pub fn at(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("failed to create data directory {}", self.data_dir.display())
        })
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_directory_wins() {
        let paths = AppPaths::resolve(Some(PathBuf::from("/tmp/sm-test"))).unwrap();
        assert_eq!(paths.settings_file(), PathBuf::from("/tmp/sm-test/settings.json"));
        assert_eq!(
            paths.database_file(),
            PathBuf::from("/tmp/sm-test/screenmind.sqlite3")
        );
    }
}
