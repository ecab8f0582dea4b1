// Wed Jan 14 2026 - Alex

pub mod apply;
pub mod error;
pub mod hex;
pub mod patch_log;
pub mod model;
pub mod store;

pub use apply::{apply_definition, apply_to_buffer, ApplyOutcome, ApplyReport};
pub use error::PatchError;
pub use patch_log::PatchLog;
pub use model::{normalize_path, resolve_path, ObsoleteFile, Patch, PatchDefinition, TargetFile, TargetVersion};
pub use store::PatchStore;
