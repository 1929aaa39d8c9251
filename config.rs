use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggerConfig {
    /// Concurrent EXIF extraction workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Photos staged per database transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Catalog file created inside the scanned folder.
    #[serde(default = "default_database_name")]
    pub database_name: String,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            database_name: default_database_name(),
        }
    }
}

impl TaggerConfig {
    pub fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.batch_size = self.batch_size.max(1);
        if self.database_name.trim().is_empty() {
            self.database_name = default_database_name();
        }
        self
    }
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    250
}

fn default_database_name() -> String {
    "photo_library.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryPaths {
    pub root: PathBuf,
    pub db_path: PathBuf,
}

impl LibraryPaths {
    pub fn discover(folder: &Path, config: &TaggerConfig) -> Result<Self, crate::error::Error> {
        if !folder.is_dir() {
            return Err(crate::error::Error::Path(format!(
                "Not a directory: {}",
                folder.display()
            )));
        }
        let root = folder.canonicalize()?;
        let db_path = root.join(&config.database_name);
        Ok(Self { root, db_path })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tagger: TaggerConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, crate::error::Error> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&raw)?;
        settings.tagger = settings.tagger.normalized();
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "tagger": { "workers": 0 } }"#).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.tagger.workers, 1);
        assert_eq!(settings.tagger.batch_size, 250);
        assert_eq!(settings.tagger.database_name, "photo_library.db");
    }

    #[test]
    fn discover_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir.jpg");
        std::fs::write(&file, b"x").unwrap();
        assert!(LibraryPaths::discover(&file, &TaggerConfig::default()).is_err());

        let paths = LibraryPaths::discover(dir.path(), &TaggerConfig::default()).unwrap();
        assert!(paths.root.is_absolute());
        assert!(paths.db_path.ends_with("photo_library.db"));
    }
}
