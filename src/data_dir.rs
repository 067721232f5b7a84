use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The KEYRANK_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/keyrank/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os("KEYRANK_DATA_DIR") {
                Some(val) => PathBuf::from(val),
                None => xdg::BaseDirectories::with_prefix("keyrank")
                    .get_data_home()
                    .ok_or_else(|| {
                        Error::Config(
                            "could not determine XDG data home directory"
                                .into(),
                        )
                    })?,
            },
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index configuration written by `keyrank init`.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn records_db(&self) -> PathBuf {
        self.root.join("records.redb")
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file().is_file()
    }
}
