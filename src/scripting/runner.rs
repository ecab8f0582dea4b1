// Thu Jan 15 2026 - Alex

use super::context::InterpreterContext;
use super::error::ScriptError;
use super::interpreter::Interpreter;
use super::parser::Script;
use crate::assembler::{ArmAsm, Assembler, NoAssembler};
use crate::config::Config;
use crate::patch::PatchStore;
use crate::utils::format_duration;
use log::{error, info};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Outcome of one script run.
#[derive(Debug, Clone)]
pub struct ScriptReport {
    pub success: bool,
    pub log: Vec<String>,
    pub error: Option<String>,
    pub store: PatchStore,
}

/// Entry point for patch authoring: parses a script, runs it against a fresh
/// context and persists the definitions when it completes.
pub struct ScriptRunner {
    config: Config,
    assembler: Box<dyn Assembler>,
}

impl ScriptRunner {
    pub fn new(config: Config) -> Self {
        let assembler: Box<dyn Assembler> = match &config.assembler_path {
            Some(path) => Box::new(
                ArmAsm::new(path).with_timeout(Duration::from_secs(config.assembler_timeout_seconds)),
            ),
            None => Box::new(NoAssembler),
        };
        Self { config, assembler }
    }

    pub fn with_assembler(mut self, assembler: Box<dyn Assembler>) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run_file<P: AsRef<Path>>(&self, path: P) -> ScriptReport {
        match fs::read_to_string(path.as_ref()) {
            Ok(source) => self.run_source(&source),
            Err(e) => {
                let error = ScriptError::Io(e);
                error!("{}", error);
                ScriptReport {
                    success: false,
                    log: Vec::new(),
                    error: Some(error.to_string()),
                    store: PatchStore::new(),
                }
            }
        }
    }

    pub fn run_source(&self, source: &str) -> ScriptReport {
        let started = Instant::now();
        let store = match self.load_store() {
            Ok(store) => store,
            Err(e) => {
                error!("{}", e);
                return ScriptReport {
                    success: false,
                    log: Vec::new(),
                    error: Some(e.to_string()),
                    store: PatchStore::new(),
                };
            }
        };

        let mut ctx = InterpreterContext::new(store);
        let result = self.execute(source, &mut ctx);

        match &result {
            Ok(()) => ctx.log.info(format!("Script completed in {}", format_duration(started.elapsed()))),
            Err(e) => {
                error!("{}", e);
            }
        }

        ScriptReport {
            success: result.is_ok(),
            log: ctx.log.lines(),
            error: result.err().map(|e| e.to_string()),
            store: ctx.store,
        }
    }

    /// Parses and runs `source` in `ctx`, then closes any open file and
    /// writes the definitions if a store path is configured.
    pub fn execute(&self, source: &str, ctx: &mut InterpreterContext) -> Result<(), ScriptError> {
        let script = Script::parse(source)?;
        info!("Running script with {} commands", script.len());

        let interpreter = Interpreter::new(&self.config, self.assembler.as_ref());
        interpreter.execute(&script, ctx)?;
        interpreter.close_file(ctx).map_err(|source| ScriptError::Execution {
            line: script.lines.last().map_or(0, |l| l.line_number),
            command: "<end of script>".to_string(),
            source,
        })?;

        if let Some(path) = &self.config.definitions_path {
            ctx.store.save(path)?;
        }
        Ok(())
    }

    fn load_store(&self) -> Result<PatchStore, ScriptError> {
        match &self.config.definitions_path {
            Some(path) => Ok(PatchStore::load(path)?),
            None => Ok(PatchStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::pe::tests::minimal_pe;

    #[test]
    fn test_run_persists_definitions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.exe"), minimal_pe(&[0x06, 0xD1, 0x70, 0x47])).unwrap();
        let definitions = dir.path().join("defs").join("patches.json");
        let config = Config::new()
            .with_input_root(dir.path().to_path_buf())
            .with_definitions_path(definitions.clone());

        let report = ScriptRunner::new(config).run_source(
            "PatchDefinition \"Unlock\", \"1.0\"\nPatchFile \"app.exe\"\nFindFirstBytes \"06 D1\"\nMakeJumpUnconditional bne\n",
        );
        assert!(report.success, "{:?}", report.error);
        assert!(report.log.iter().any(|l| l.starts_with("Closed app.exe with 1 patches")));

        let store = PatchStore::load(&definitions).unwrap();
        let file = store.definition("Unlock").unwrap().version("1.0").unwrap().file("app.exe").unwrap();
        assert_eq!(file.patches.len(), 1);
        assert_eq!(file.patches[0].patched_bytes, vec![0x06, 0xE0]);
    }

    #[test]
    fn test_failed_run_reports_error_and_keeps_store_unsaved() {
        let dir = tempfile::tempdir().unwrap();
        let definitions = dir.path().join("patches.json");
        let config = Config::new()
            .with_input_root(dir.path().to_path_buf())
            .with_definitions_path(definitions.clone());

        let report = ScriptRunner::new(config).run_source("PatchDefinition \"Unlock\", \"1.0\"\nIfNotFoundThrowError \"stop here\"\n");
        assert!(!report.success);
        assert!(report.error.unwrap().contains("stop here"));
        assert!(!definitions.exists());
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let report = ScriptRunner::new(Config::new()).run_source("NotACommand 1\n");
        assert!(!report.success);
        assert!(report.error.unwrap().contains("NotACommand"));
    }

    #[test]
    fn test_missing_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = ScriptRunner::new(Config::new()).run_file(dir.path().join("missing.pts"));
        assert!(!report.success);
        assert!(report.log.is_empty());
    }
}
