// Wed Jan 14 2026 - Alex

use super::error::PatchError;
use super::model::{resolve_path, TargetFile, TargetVersion};
use super::store::PatchStore;
use crate::utils::hash::{sha1, to_hex};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Patched,
    AlreadyPatched,
    UnsupportedVersion,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ApplyOutcome::Patched => "patched",
            ApplyOutcome::AlreadyPatched => "already patched",
            ApplyOutcome::UnsupportedVersion => "unsupported version",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub definition: String,
    pub version: Option<String>,
    pub files: Vec<(String, ApplyOutcome)>,
    pub removed: Vec<String>,
}

impl ApplyReport {
    pub fn is_supported(&self) -> bool {
        self.version.is_some()
    }
}

/// Hash-gated application of one file's patches to its contents.
pub fn apply_to_buffer(file: &TargetFile, data: &mut [u8]) -> Result<ApplyOutcome, PatchError> {
    let hash = sha1(data);

    if hash[..] == file.hash_original[..] {
        for patch in &file.patches {
            let end = patch.end();
            if end > data.len() {
                return Err(PatchError::OutOfBounds {
                    address: patch.address,
                    len: patch.len(),
                });
            }
            data[patch.address as usize..end].copy_from_slice(&patch.patched_bytes);
        }
        if sha1(data)[..] != file.hash_patched[..] {
            warn!("{}: patched contents do not match the recorded hash", file.path);
        }
        Ok(ApplyOutcome::Patched)
    } else if hash[..] == file.hash_patched[..] {
        Ok(ApplyOutcome::AlreadyPatched)
    } else {
        debug!("{}: hash {} matches neither side", file.path, to_hex(&hash));
        Ok(ApplyOutcome::UnsupportedVersion)
    }
}

fn classify(file: &TargetFile, path: &Path) -> ApplyOutcome {
    match fs::read(path) {
        Ok(data) => {
            let hash = sha1(&data);
            if hash[..] == file.hash_original[..] {
                ApplyOutcome::Patched
            } else if hash[..] == file.hash_patched[..] {
                ApplyOutcome::AlreadyPatched
            } else {
                ApplyOutcome::UnsupportedVersion
            }
        }
        Err(_) => ApplyOutcome::UnsupportedVersion,
    }
}

fn version_matches(version: &TargetVersion, root: &Path) -> bool {
    !version.files.is_empty()
        && version
            .files
            .iter()
            .all(|file| classify(file, &resolve_path(root, &file.path)) != ApplyOutcome::UnsupportedVersion)
}

/// Applies the named definition to the tree under `root`.
///
/// The first version whose files all match either their original or their
/// patched hash is applied; when none does, nothing is written. A file whose
/// patches cannot be applied aborts the run before any file is rewritten.
pub fn apply_definition(store: &PatchStore, name: &str, root: &Path) -> Result<ApplyReport, PatchError> {
    let definition = store
        .definition(name)
        .ok_or_else(|| PatchError::DefinitionNotFound(name.to_string()))?;

    let mut report = ApplyReport {
        definition: definition.name.clone(),
        version: None,
        files: Vec::new(),
        removed: Vec::new(),
    };

    let Some(version) = definition.versions.iter().find(|v| version_matches(v, root)) else {
        for version in &definition.versions {
            for file in &version.files {
                let outcome = classify(file, &resolve_path(root, &file.path));
                if outcome == ApplyOutcome::UnsupportedVersion
                    && !report.files.iter().any(|(path, _)| path.eq_ignore_ascii_case(&file.path))
                {
                    report.files.push((file.path.clone(), outcome));
                }
            }
        }
        warn!("{}: no supported version found under {}", name, root.display());
        return Ok(report);
    };

    info!("{}: applying version {}", name, version.description);
    report.version = Some(version.description.clone());

    // Nothing is written until every file of the version has been patched in memory.
    let mut staged = Vec::with_capacity(version.files.len());
    for file in &version.files {
        let path = resolve_path(root, &file.path);
        let mut data = fs::read(&path)?;
        let outcome = apply_to_buffer(file, &mut data)?;
        staged.push((file, path, data, outcome));
    }

    for (file, path, data, outcome) in staged {
        if outcome == ApplyOutcome::Patched {
            fs::write(&path, &data)?;
        }
        info!("{}: {}", file.path, outcome);
        report.files.push((file.path.clone(), outcome));
    }

    for file in &version.files {
        for obsolete in &file.obsolete {
            let obsolete_path = resolve_path(root, &obsolete.path);
            if obsolete_path.exists() {
                fs::remove_file(&obsolete_path)?;
                info!("Removed obsolete file {}", obsolete.path);
                report.removed.push(obsolete.path.clone());
            }
        }
    }

    Ok(report)
}
