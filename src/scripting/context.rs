// Thu Jan 15 2026 - Alex

use crate::analysis::CodeMap;
use crate::image::BinaryImage;
use crate::patch::{PatchLog, PatchStore};
use crate::utils::RunLog;
use indexmap::IndexMap;

/// The definition and version new file records are filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDefinition {
    pub name: String,
    pub version: String,
    pub relative_path: String,
    pub relative_output_path: String,
}

impl ActiveDefinition {
    /// Output path with `%VERSION%` replaced by the version description.
    pub fn output_path(&self) -> String {
        self.relative_output_path.replace("%VERSION%", &self.version)
    }
}

/// The one file currently under patch.
pub struct OpenFile {
    /// Path as given to `PatchFile`.
    pub name: String,
    /// Path as recorded in the store.
    pub path: String,
    pub image: Box<dyn BinaryImage>,
    /// Working copy of the file; every write goes through `log`.
    pub data: Vec<u8>,
    pub code: CodeMap,
    pub log: PatchLog,
    pub hash_original: Vec<u8>,
    /// Address labels, in creation order.
    pub labels: IndexMap<String, u32>,
}

impl OpenFile {
    pub fn new(name: &str, path: String, image: Box<dyn BinaryImage>, code: CodeMap, hash_original: Vec<u8>) -> Self {
        let data = image.data().to_vec();
        Self {
            name: name.to_string(),
            path,
            image,
            data,
            code,
            log: PatchLog::new(),
            hash_original,
            labels: IndexMap::new(),
        }
    }
}

/// Mutable state of one script run.
pub struct InterpreterContext {
    pub store: PatchStore,
    pub definition: Option<ActiveDefinition>,
    pub file: Option<OpenFile>,
    /// Virtual address the next binary operation works on.
    pub cursor: u32,
    /// Outcome of the last search.
    pub found: bool,
    pub history: Vec<u32>,
    /// Index of the next script line to execute.
    pub ip: usize,
    pub log: RunLog,
}

impl InterpreterContext {
    pub fn new(store: PatchStore) -> Self {
        Self {
            store,
            definition: None,
            file: None,
            cursor: 0,
            found: false,
            history: Vec::new(),
            ip: 0,
            log: RunLog::new(),
        }
    }

    pub fn has_open_file(&self) -> bool {
        self.file.is_some()
    }
}
