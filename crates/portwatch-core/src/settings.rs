//! Persisted user settings (`settings.toml`).

use crate::criteria::{SortColumn, SortDirection, SortSpec};
use crate::window::DEFAULT_OVERSCAN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5_000;
pub const MIN_REFRESH_INTERVAL_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub default_sort: SortColumn,
    pub default_sort_direction: SortDirection,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            default_sort: SortColumn::Port,
            default_sort_direction: SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub refresh_interval_ms: u64,
    pub overscan: usize,
    pub display: DisplaySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            overscan: DEFAULT_OVERSCAN,
            display: DisplaySettings::default(),
        }
    }
}

impl AppSettings {
    /// Missing file means defaults. A file that exists but does not parse is
    /// an error so a typo is not silently replaced on the next save.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let settings: AppSettings =
            toml::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(settings.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let payload = toml::to_string_pretty(&self.clone().normalized())?;
        write_atomic(path, &payload).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn normalized(mut self) -> Self {
        self.refresh_interval_ms = clamp_interval(self.refresh_interval_ms);
        self
    }

    pub fn default_sort(&self) -> SortSpec {
        SortSpec {
            column: self.display.default_sort,
            direction: self.display.default_sort_direction,
        }
    }

    /// Returns `true` if the stored interval changed.
    pub fn adjust_interval(&mut self, delta_ms: i64) -> bool {
        let current = self.refresh_interval_ms;
        let next = if delta_ms.is_negative() {
            current.saturating_sub(delta_ms.unsigned_abs())
        } else {
            current.saturating_add(delta_ms as u64)
        };
        self.refresh_interval_ms = clamp_interval(next);
        self.refresh_interval_ms != current
    }
}

pub fn clamp_interval(ms: u64) -> u64 {
    ms.max(MIN_REFRESH_INTERVAL_MS)
}

fn write_atomic(path: &Path, payload: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!(".{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };
    fs::write(&temp_path, payload)?;
    fs::rename(&temp_path, path)
}
