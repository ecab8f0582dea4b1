// Wed Jan 14 2026 - Alex

use super::error::PatchError;
use super::model::PatchDefinition;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// The full tree of patch definitions as persisted on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchStore {
    #[serde(default)]
    pub definitions: Vec<PatchDefinition>,
}

impl PatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, PatchError> {
        let store: PatchStore = serde_json::from_str(json)?;
        store.validate()?;
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String, PatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads the store; a missing file yields an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PatchError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No patch definitions at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let store = Self::from_json(&fs::read_to_string(path)?)?;
        info!("Loaded {} patch definitions from {}", store.definitions.len(), path.display());
        Ok(store)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PatchError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        info!("Wrote {} patch definitions to {}", self.definitions.len(), path.display());
        Ok(())
    }

    pub fn definition(&self, name: &str) -> Option<&PatchDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn definition_mut_or_insert(&mut self, name: &str) -> &mut PatchDefinition {
        match self.definitions.iter().position(|d| d.name == name) {
            Some(i) => &mut self.definitions[i],
            None => {
                self.definitions.push(PatchDefinition::new(name));
                let last = self.definitions.len() - 1;
                &mut self.definitions[last]
            }
        }
    }

    pub fn validate(&self) -> Result<(), PatchError> {
        let mut seen = HashSet::new();
        for definition in &self.definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(PatchError::Duplicate {
                    kind: "patch definition",
                    key: definition.name.clone(),
                });
            }
            definition.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::model::{ObsoleteFile, Patch, TargetFile};

    fn sample_store() -> PatchStore {
        let mut store = PatchStore::new();
        let def = store.definition_mut_or_insert("RootAccess");
        let version = def.version_mut_or_insert("8.10.14219");
        let mut file = TargetFile::new("Windows\\System32\\SecRuntime.dll", vec![0x01; 20]);
        file.hash_patched = vec![0xFE; 20];
        file.set_patch(Patch::new(0x0001A2B4, vec![0x06, 0xD1], vec![0x07, 0xE0]).unwrap());
        file.set_patch(Patch::new(0x00000158, vec![0, 0, 0, 0], vec![0x12, 0x34, 0xAB, 0xCD]).unwrap());
        file.obsolete.push(ObsoleteFile::new("\\Windows\\System32\\Old.dll"));
        version.replace_file(file);
        store
    }

    #[test]
    fn test_round_trip() {
        let store = sample_store();
        let json = store.to_json().unwrap();
        assert!(json.contains("\"address\": \"0x0001A2B4\""));
        assert!(json.contains("\"patched_bytes\": \"1234ABCD\""));
        assert!(json.contains("\"path\": \"Windows\\\\System32\\\\Old.dll\""));

        let restored = PatchStore::from_json(&json).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn test_rejects_growing_patch() {
        let json = r#"{"definitions":[{"name":"A","versions":[{"description":"v","files":[
            {"path":"a.dll","hash_original":"00","hash_patched":"00",
             "patches":[{"address":"0x00000010","original_bytes":"00","patched_bytes":"0102"}]}]}]}]}"#;
        assert!(matches!(PatchStore::from_json(json), Err(PatchError::LengthMismatch { .. })));
    }

    #[test]
    fn test_rejects_bad_hex() {
        let json = r#"{"definitions":[{"name":"A","versions":[{"description":"v","files":[
            {"path":"a.dll","hash_original":"0G","hash_patched":"00"}]}]}]}"#;
        assert!(matches!(PatchStore::from_json(json), Err(PatchError::Json(_))));
    }

    #[test]
    fn test_load_missing_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defs").join("patches.json");
        assert!(PatchStore::load(&path).unwrap().definitions.is_empty());

        let store = sample_store();
        store.save(&path).unwrap();
        assert_eq!(PatchStore::load(&path).unwrap(), store);
    }
}
