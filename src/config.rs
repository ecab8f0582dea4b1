// Tue Jan 13 2026 - Alex

use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root the `PatchFile` paths are resolved against.
    pub input_root: PathBuf,
    /// Where patched files are written when a definition names an output path.
    pub output_root: Option<PathBuf>,
    pub definitions_path: Option<PathBuf>,
    pub listing_dir: Option<PathBuf>,
    pub assembler_path: Option<PathBuf>,
    pub assembler_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: None,
            definitions_path: None,
            listing_dir: None,
            assembler_path: None,
            assembler_timeout_seconds: 30,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path.as_ref(), json).map_err(|e| e.to_string())
    }

    pub fn with_input_root(mut self, root: PathBuf) -> Self {
        self.input_root = root;
        self
    }

    pub fn with_output_root(mut self, root: PathBuf) -> Self {
        self.output_root = Some(root);
        self
    }

    pub fn with_definitions_path(mut self, path: PathBuf) -> Self {
        self.definitions_path = Some(path);
        self
    }

    pub fn with_listing_dir(mut self, dir: PathBuf) -> Self {
        self.listing_dir = Some(dir);
        self
    }

    pub fn with_assembler(mut self, path: PathBuf) -> Self {
        self.assembler_path = Some(path);
        self
    }

    pub fn with_assembler_timeout(mut self, seconds: u64) -> Self {
        self.assembler_timeout_seconds = seconds;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.input_root.is_dir() {
            return Err(format!("input_root {} is not a directory", self.input_root.display()));
        }
        if let Some(asm) = &self.assembler_path {
            if !asm.is_file() {
                return Err(format!("assembler {} does not exist", asm.display()));
            }
        }
        if self.assembler_timeout_seconds == 0 {
            return Err("assembler_timeout_seconds must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"definitions_path": "patches.json"}"#).unwrap();
        assert_eq!(config.definitions_path, Some(PathBuf::from("patches.json")));
        assert_eq!(config.assembler_timeout_seconds, 30);
        assert_eq!(config.input_root, PathBuf::from("."));
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new().with_input_root(dir.path().to_path_buf());
        assert!(config.validate().is_ok());

        assert!(config.clone().with_assembler_timeout(0).validate().is_err());
        assert!(config
            .clone()
            .with_assembler(dir.path().join("missing.exe"))
            .validate()
            .is_err());
        assert!(Config::new()
            .with_input_root(dir.path().join("nope"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config::new()
            .with_listing_dir(dir.path().join("listings"))
            .with_output_root(dir.path().join("out"));
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
