// Wed Jan 14 2026 - Alex

use super::error::AssemblerError;
use super::source::build_source;
use super::{Assembler, CodeType};
use goblin::pe::Coff;
use log::{debug, warn};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Bridge to an external `armasm`-compatible assembler producing COFF objects.
pub struct ArmAsm {
    executable: PathBuf,
    timeout: Duration,
    work_dir: PathBuf,
}

impl ArmAsm {
    pub fn new<P: AsRef<Path>>(executable: P) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            timeout: Duration::from_secs(30),
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_work_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.work_dir = dir.as_ref().to_path_buf();
        self
    }

    fn run(&self, code_type: CodeType, source_path: &Path, object_path: &Path) -> Result<(), AssemblerError> {
        let mut command = Command::new(&self.executable);
        if code_type != CodeType::Arm {
            command.arg("-16");
        }
        command
            .arg("-o")
            .arg(object_path)
            .arg(source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running {:?}", command);
        let mut child = command.spawn()?;
        let started = Instant::now();

        // Both pipes are read while the child runs.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                child.kill().ok();
                child.wait().ok();
                return Err(AssemblerError::Timeout(self.timeout.as_secs()));
            }
            thread::sleep(Duration::from_millis(20));
        };

        if !status.success() || !object_path.exists() {
            let mut diagnostic = collect(stdout);
            diagnostic.push_str(&collect(stderr));
            return Err(AssemblerError::Failed(diagnostic.trim().to_string()));
        }
        Ok(())
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer).ok();
        buffer
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

impl Assembler for ArmAsm {
    fn compile(&self, origin: u32, code_type: CodeType, body: &str) -> Result<Vec<u8>, AssemblerError> {
        let (source, padding) = build_source(origin, code_type, body);

        let stem = format!("patch_{}_{}", std::process::id(), SEQUENCE.fetch_add(1, Ordering::Relaxed));
        let source_path = self.work_dir.join(format!("{}.asm", stem));
        let object_path = self.work_dir.join(format!("{}.obj", stem));
        fs::write(&source_path, source)?;

        let result = self
            .run(code_type, &source_path, &object_path)
            .and_then(|_| fs::read(&object_path).map_err(AssemblerError::from))
            .and_then(|object| extract_code(&object, padding));

        for path in [&source_path, &object_path] {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }

        result
    }
}

/// Raw bytes of the object's code section with `padding` leading bytes removed.
pub fn extract_code(object: &[u8], padding: u32) -> Result<Vec<u8>, AssemblerError> {
    let coff = Coff::parse(object)?;
    let section = coff
        .sections
        .iter()
        .find(|s| s.name().map_or(false, |n| n == ".text"))
        .ok_or(AssemblerError::NoCodeSection)?;

    let start = section.pointer_to_raw_data as usize;
    let end = start + section.size_of_raw_data as usize;
    let raw = object
        .get(start..end)
        .ok_or_else(|| AssemblerError::InvalidObject("code section out of bounds".to_string()))?;

    let code = raw.get(padding as usize..).unwrap_or_default();
    if code.is_empty() {
        return Err(AssemblerError::Empty);
    }
    Ok(code.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coff_object(code: &[u8]) -> Vec<u8> {
        let data_offset = 20 + 40;
        let symtab_offset = data_offset + code.len();

        let mut obj = Vec::new();
        obj.extend_from_slice(&0x01C4u16.to_le_bytes());
        obj.extend_from_slice(&1u16.to_le_bytes());
        obj.extend_from_slice(&0u32.to_le_bytes());
        obj.extend_from_slice(&(symtab_offset as u32).to_le_bytes());
        obj.extend_from_slice(&0u32.to_le_bytes());
        obj.extend_from_slice(&0u16.to_le_bytes());
        obj.extend_from_slice(&0u16.to_le_bytes());

        obj.extend_from_slice(b".text\0\0\0");
        obj.extend_from_slice(&0u32.to_le_bytes());
        obj.extend_from_slice(&0u32.to_le_bytes());
        obj.extend_from_slice(&(code.len() as u32).to_le_bytes());
        obj.extend_from_slice(&(data_offset as u32).to_le_bytes());
        obj.extend_from_slice(&0u32.to_le_bytes());
        obj.extend_from_slice(&0u32.to_le_bytes());
        obj.extend_from_slice(&0u16.to_le_bytes());
        obj.extend_from_slice(&0u16.to_le_bytes());
        obj.extend_from_slice(&0x6000_0020u32.to_le_bytes());

        obj.extend_from_slice(code);
        obj.extend_from_slice(&4u32.to_le_bytes());
        obj
    }

    #[test]
    fn test_extract_strips_padding() {
        let object = coff_object(&[0, 0, 0, 0, 0x00, 0xBF, 0x70, 0x47]);
        assert_eq!(extract_code(&object, 4).unwrap(), vec![0x00, 0xBF, 0x70, 0x47]);
        assert_eq!(extract_code(&object, 0).unwrap().len(), 8);
        assert!(matches!(extract_code(&object, 8), Err(AssemblerError::Empty)));
    }

    #[test]
    fn test_missing_executable_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let asm = ArmAsm::new(dir.path().join("no-such-armasm")).with_work_dir(dir.path());
        let result = asm.compile(0x1000, CodeType::Thumb2, "nop");
        assert!(matches!(result, Err(AssemblerError::Io(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_with_large_output_keeps_diagnostics() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noisy-armasm");
        fs::write(
            &script,
            "#!/bin/sh\nhead -c 300000 /dev/zero | tr '\\0' 'x' >&2\necho 'error A1163E: Unknown opcode' >&2\nexit 1\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let asm = ArmAsm::new(&script)
            .with_work_dir(dir.path())
            .with_timeout(Duration::from_secs(20));

        let started = Instant::now();
        let mut result = asm.compile(0x1000, CodeType::Thumb2, "bogus");
        // A freshly written script can briefly be busy for exec.
        for _ in 0..5 {
            match &result {
                Err(AssemblerError::Io(_)) => {
                    thread::sleep(Duration::from_millis(50));
                    result = asm.compile(0x1000, CodeType::Thumb2, "bogus");
                }
                _ => break,
            }
        }

        match result {
            Err(AssemblerError::Failed(message)) => {
                assert!(message.contains("A1163E"));
                assert!(message.len() > 300000);
            }
            other => panic!("expected a failure with diagnostics, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(20));
    }
}
