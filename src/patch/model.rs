// Wed Jan 14 2026 - Alex

use super::error::PatchError;
use super::hex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Bytes at a raw file offset before and after patching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(with = "hex::address")]
    pub address: u32,
    #[serde(with = "hex::bytes")]
    pub original_bytes: Vec<u8>,
    #[serde(with = "hex::bytes")]
    pub patched_bytes: Vec<u8>,
}

impl Patch {
    pub fn new(address: u32, original_bytes: Vec<u8>, patched_bytes: Vec<u8>) -> Result<Self, PatchError> {
        if original_bytes.len() != patched_bytes.len() {
            return Err(PatchError::LengthMismatch {
                address,
                original: original_bytes.len(),
                patched: patched_bytes.len(),
            });
        }
        Ok(Self {
            address,
            original_bytes,
            patched_bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.patched_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patched_bytes.is_empty()
    }

    pub fn end(&self) -> usize {
        self.address as usize + self.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsoleteFile {
    pub path: String,
}

impl ObsoleteFile {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    pub path: String,
    #[serde(with = "hex::bytes")]
    pub hash_original: Vec<u8>,
    #[serde(with = "hex::bytes")]
    pub hash_patched: Vec<u8>,
    #[serde(default)]
    pub patches: Vec<Patch>,
    #[serde(default)]
    pub obsolete: Vec<ObsoleteFile>,
}

impl TargetFile {
    pub fn new(path: &str, hash_original: Vec<u8>) -> Self {
        Self {
            path: normalize_path(path),
            hash_patched: hash_original.clone(),
            hash_original,
            patches: Vec::new(),
            obsolete: Vec::new(),
        }
    }

    pub fn is_path(&self, path: &str) -> bool {
        self.path.eq_ignore_ascii_case(&normalize_path(path))
    }

    /// Inserts `patch`, replacing any patch at the same address.
    pub fn set_patch(&mut self, patch: Patch) {
        match self.patches.binary_search_by_key(&patch.address, |p| p.address) {
            Ok(i) => self.patches[i] = patch,
            Err(i) => self.patches.insert(i, patch),
        }
    }

    pub fn patch_at(&self, address: u32) -> Option<&Patch> {
        self.patches.iter().find(|p| p.address == address)
    }

    pub fn validate(&self) -> Result<(), PatchError> {
        let mut seen = HashSet::new();
        for patch in &self.patches {
            if patch.original_bytes.len() != patch.patched_bytes.len() {
                return Err(PatchError::LengthMismatch {
                    address: patch.address,
                    original: patch.original_bytes.len(),
                    patched: patch.patched_bytes.len(),
                });
            }
            if !seen.insert(patch.address) {
                return Err(PatchError::Duplicate {
                    kind: "patch address",
                    key: format!("{}@0x{:08X}", self.path, patch.address),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetVersion {
    pub description: String,
    #[serde(default)]
    pub files: Vec<TargetFile>,
}

impl TargetVersion {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            files: Vec::new(),
        }
    }

    pub fn file(&self, path: &str) -> Option<&TargetFile> {
        self.files.iter().find(|f| f.is_path(path))
    }

    pub fn file_mut(&mut self, path: &str) -> Option<&mut TargetFile> {
        self.files.iter_mut().find(|f| f.is_path(path))
    }

    /// Drops any file with the same path and stores `file` in its place.
    pub fn replace_file(&mut self, file: TargetFile) -> &mut TargetFile {
        self.files.retain(|f| !f.is_path(&file.path));
        self.files.push(file);
        let last = self.files.len() - 1;
        &mut self.files[last]
    }

    fn validate(&self) -> Result<(), PatchError> {
        let mut seen = HashSet::new();
        for file in &self.files {
            if !seen.insert(file.path.to_lowercase()) {
                return Err(PatchError::Duplicate {
                    kind: "target file",
                    key: file.path.clone(),
                });
            }
            file.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDefinition {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<TargetVersion>,
}

impl PatchDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            versions: Vec::new(),
        }
    }

    pub fn version(&self, description: &str) -> Option<&TargetVersion> {
        self.versions
            .iter()
            .find(|v| v.description.eq_ignore_ascii_case(description))
    }

    pub fn version_mut_or_insert(&mut self, description: &str) -> &mut TargetVersion {
        match self
            .versions
            .iter()
            .position(|v| v.description.eq_ignore_ascii_case(description))
        {
            Some(i) => &mut self.versions[i],
            None => {
                self.versions.push(TargetVersion::new(description));
                let last = self.versions.len() - 1;
                &mut self.versions[last]
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PatchError> {
        let mut seen = HashSet::new();
        for version in &self.versions {
            if !seen.insert(version.description.to_lowercase()) {
                return Err(PatchError::Duplicate {
                    kind: "target version",
                    key: format!("{}/{}", self.name, version.description),
                });
            }
            version.validate()?;
        }
        Ok(())
    }
}

/// Strips leading path separators and uses `\` throughout.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches(['\\', '/']).replace('/', "\\")
}

/// Joins a store path (either separator) onto `root`.
pub fn resolve_path(root: &Path, relative: &str) -> PathBuf {
    relative
        .split(['\\', '/'])
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_rejects_size_change() {
        assert!(Patch::new(0x10, vec![1, 2], vec![3, 4]).is_ok());
        assert!(matches!(
            Patch::new(0x10, vec![1, 2], vec![3]),
            Err(PatchError::LengthMismatch { address: 0x10, original: 2, patched: 1 })
        ));
    }

    #[test]
    fn test_patches_keyed_by_address() {
        let mut file = TargetFile::new("\\Windows\\System32\\winload.efi", vec![0xAA; 20]);
        assert_eq!(file.path, "Windows\\System32\\winload.efi");

        file.set_patch(Patch::new(0x20, vec![0], vec![1]).unwrap());
        file.set_patch(Patch::new(0x10, vec![0], vec![1]).unwrap());
        file.set_patch(Patch::new(0x20, vec![0], vec![2]).unwrap());

        assert_eq!(file.patches.len(), 2);
        assert_eq!(file.patches[0].address, 0x10);
        assert_eq!(file.patch_at(0x20).unwrap().patched_bytes, vec![2]);
    }

    #[test]
    fn test_files_and_versions_case_insensitive() {
        let mut def = PatchDefinition::new("SecureBootHack");
        let version = def.version_mut_or_insert("10.0.14393");
        version.replace_file(TargetFile::new("/EFI/boot.efi", vec![1]));
        version.replace_file(TargetFile::new("efi\\BOOT.EFI", vec![2]));
        assert_eq!(version.files.len(), 1);
        assert_eq!(version.files[0].hash_original, vec![2]);

        def.version_mut_or_insert("10.0.14393".to_uppercase().as_str());
        assert_eq!(def.versions.len(), 1);
        assert!(def.version("10.0.14393").unwrap().file("EFI/Boot.efi").is_some());
    }

    #[test]
    fn test_resolve_path() {
        let root = Path::new("root");
        assert_eq!(resolve_path(root, "\\a\\b/c.dll"), root.join("a").join("b").join("c.dll"));
    }

    #[test]
    fn test_validate_duplicates() {
        let mut def = PatchDefinition::new("X");
        def.versions.push(TargetVersion::new("A"));
        def.versions.push(TargetVersion::new("a"));
        assert!(matches!(def.validate(), Err(PatchError::Duplicate { kind: "target version", .. })));
    }
}
