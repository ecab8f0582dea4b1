// Wed Jan 14 2026 - Alex

use super::error::PatchError;
use super::model::Patch;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Write {
    offset: u32,
    original: Vec<u8>,
    patched: Vec<u8>,
}

/// Append-only record of every write made to a file buffer.
///
/// Materialising keeps one patch per offset: the latest bytes written there,
/// diffed against what the file held before the first write. A shorter
/// rewrite keeps the tail of the earlier one.
#[derive(Debug, Clone, Default)]
pub struct PatchLog {
    writes: Vec<Write>,
}

impl PatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Overwrites `data[offset..]` with `bytes` and logs the change.
    pub fn write(&mut self, data: &mut [u8], offset: u32, bytes: &[u8]) -> Result<(), PatchError> {
        let start = offset as usize;
        let target = data
            .get_mut(start..start + bytes.len())
            .ok_or(PatchError::OutOfBounds { address: offset, len: bytes.len() })?;

        self.writes.push(Write {
            offset,
            original: target.to_vec(),
            patched: bytes.to_vec(),
        });
        target.copy_from_slice(bytes);
        Ok(())
    }

    pub fn materialize(&self) -> Vec<Patch> {
        let mut merged: BTreeMap<u32, (Vec<u8>, Vec<u8>)> = BTreeMap::new();

        for write in &self.writes {
            match merged.get_mut(&write.offset) {
                Some((original, patched)) => {
                    let overlap = original.len().min(write.original.len());
                    if write.patched.len() >= patched.len() {
                        original.extend_from_slice(&write.original[overlap..]);
                        *patched = write.patched.clone();
                    } else {
                        patched[..write.patched.len()].copy_from_slice(&write.patched);
                    }
                }
                None => {
                    merged.insert(write.offset, (write.original.clone(), write.patched.clone()));
                }
            }
        }

        merged
            .into_iter()
            .map(|(address, (original_bytes, patched_bytes))| Patch {
                address,
                original_bytes,
                patched_bytes,
            })
            .collect()
    }
}
