// Thu Jan 15 2026 - Alex

use super::command::{Command, Constraints, RegisterConstraint, Scope, Target};
use super::context::{ActiveDefinition, InterpreterContext, OpenFile};
use super::error::{ExecutionError, ScriptError};
use super::parser::Script;
use crate::analysis::{encoder, CodeFlowAnalyzer, CodeMap, Instruction, ListingCache};
use crate::assembler::Assembler;
use crate::config::Config;
use crate::image::{pe_checksum, BinaryImage, ImageError, PeImage};
use crate::patch::{normalize_path, resolve_path, TargetFile};
use crate::pattern::{BytePattern, InstructionPattern};
use crate::utils::hash::{sha1, to_hex};
use log::debug;
use std::fs;

/// How far register constraints look around a candidate instruction.
const CONSTRAINT_WINDOW: usize = 16;
const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// Executes parsed scripts against an [`InterpreterContext`].
pub struct Interpreter<'a> {
    config: &'a Config,
    assembler: &'a dyn Assembler,
    step_limit: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(config: &'a Config, assembler: &'a dyn Assembler) -> Self {
        Self {
            config,
            assembler,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Runs `script` from its first line until the instruction pointer
    /// passes the end. The first failing command aborts the run.
    pub fn execute(&self, script: &Script, ctx: &mut InterpreterContext) -> Result<(), ScriptError> {
        let mut steps = 0;
        ctx.ip = 0;

        while let Some(line) = script.lines.get(ctx.ip) {
            ctx.ip += 1;
            steps += 1;

            let result = if steps > self.step_limit {
                Err(ExecutionError::StepLimit(self.step_limit))
            } else {
                debug!("{:>4}: {}", line.line_number, line.text);
                self.run_command(&line.command, script, ctx)
            };

            result.map_err(|source| ScriptError::Execution {
                line: line.line_number,
                command: line.text.clone(),
                source,
            })?;
        }

        Ok(())
    }

    pub fn run_command(
        &self,
        command: &Command,
        script: &Script,
        ctx: &mut InterpreterContext,
    ) -> Result<(), ExecutionError> {
        match command {
            Command::PatchDefinition {
                name,
                version,
                relative_path,
                relative_output_path,
            } => {
                self.close_file(ctx)?;
                ctx.store.definition_mut_or_insert(name).version_mut_or_insert(version);
                ctx.definition = Some(ActiveDefinition {
                    name: name.clone(),
                    version: version.clone(),
                    relative_path: relative_path.clone(),
                    relative_output_path: relative_output_path.clone(),
                });
                ctx.log.info(format!("Patch definition {} for version {}", name, version));
                Ok(())
            }
            Command::PatchFile { path } => self.patch_file(ctx, path),
            Command::ClosePatchFile => self.close_file(ctx),
            Command::WriteDefinitions => self.write_definitions(ctx),
            Command::FindData {
                scope,
                pattern,
                description,
            } => find_data(ctx, *scope, pattern, description),
            Command::FindInstructionPattern { scope, pattern, index } => {
                find_instruction_pattern(ctx, *scope, pattern, *index)
            }
            Command::FindValue { scope, value } => {
                let value = *value;
                find_instruction(ctx, *scope, &format!("value 0x{:X}", value), |code, p| {
                    code.at(p).and_then(Instruction::literal_value) == Some(value)
                })
            }
            Command::FindConditionalJump { scope } => find_instruction(ctx, *scope, "conditional jump", |code, p| {
                code.at(p).map_or(false, Instruction::is_conditional_jump)
            }),
            Command::FindFunctionCall {
                scope,
                target,
                constraints,
            } => find_call(ctx, *scope, target, constraints),
            Command::JumpToReference { target, constraints } => jump_to_reference(ctx, target, constraints),
            Command::JumpToImport { name } => {
                let address = open_file(ctx)?.image.find_import(name).map(|s| s.address);
                jump_to_symbol(ctx, address, "import", name);
                Ok(())
            }
            Command::JumpToExport { name } => {
                let address = open_file(ctx)?.image.find_export(name).map(|s| s.address);
                jump_to_symbol(ctx, address, "export", name);
                Ok(())
            }
            Command::JumpToTarget => {
                let cursor = ctx.cursor;
                let instr = open_file(ctx)?
                    .code
                    .get(cursor)
                    .ok_or(ExecutionError::NoInstruction(cursor))?;
                let target = instr.literal_value().ok_or(ExecutionError::NoTarget(cursor))?;
                jump(ctx, target);
                Ok(())
            }
            Command::JumpToAddress { address } => {
                if open_file(ctx)?.image.section_for_va(*address).is_none() {
                    return Err(ExecutionError::BadAddress(*address));
                }
                jump(ctx, *address);
                Ok(())
            }
            Command::JumpToLabel { name } => {
                let address = open_file(ctx)?
                    .labels
                    .get(name)
                    .copied()
                    .ok_or_else(|| ExecutionError::LabelNotFound(name.clone()))?;
                jump(ctx, address);
                Ok(())
            }
            Command::JumpBack => {
                ctx.cursor = ctx.history.pop().ok_or(ExecutionError::EmptyHistory)?;
                ctx.log.info(format!("Back to 0x{:08X}", ctx.cursor));
                Ok(())
            }
            Command::CreateLabel { name } => {
                let cursor = ctx.cursor;
                let file = ctx.file.as_mut().ok_or(ExecutionError::NoOpenFile)?;
                if file.labels.contains_key(name) {
                    return Err(ExecutionError::DuplicateLabel(name.clone()));
                }
                file.labels.insert(name.clone(), cursor);
                ctx.log.info(format!("Label {} = 0x{:08X}", name, cursor));
                Ok(())
            }
            Command::Go { label } => go(script, ctx, label),
            Command::IfFoundGo { label } => {
                if ctx.found {
                    go(script, ctx, label)?;
                }
                Ok(())
            }
            Command::IfNotFoundGo { label } => {
                if !ctx.found {
                    go(script, ctx, label)?;
                }
                Ok(())
            }
            Command::IfFoundThrowError { message } => {
                if ctx.found {
                    return Err(ExecutionError::Raised(message.clone()));
                }
                Ok(())
            }
            Command::IfNotFoundThrowError { message } => {
                if !ctx.found {
                    return Err(ExecutionError::Raised(message.clone()));
                }
                Ok(())
            }
            Command::MakeJumpUnconditional { mnemonic } => make_jump_unconditional(ctx, mnemonic),
            Command::PatchCode { code_type, body } => {
                let cursor = ctx.cursor;
                let file = ctx.file.as_mut().ok_or(ExecutionError::NoOpenFile)?;

                let mut source = String::new();
                for (name, address) in &file.labels {
                    source.push_str(&format!("{} EQU 0x{:08X}\n", name, address));
                }
                source.push_str(body);

                let bytes = self.assembler.compile(cursor, *code_type, &source)?;
                write_at(file, cursor, &bytes)?;

                let end = cursor.wrapping_add(bytes.len() as u32);
                ctx.cursor = file.code.next_boundary(end).unwrap_or(end);
                ctx.log.info(format!("Patched {} bytes of {} code at 0x{:08X}", bytes.len(), code_type, cursor));
                Ok(())
            }
            Command::PatchBytes { bytes } => patch_data(ctx, bytes, "bytes"),
            Command::PatchAscii { text } => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                patch_data(ctx, &bytes, "ASCII string")
            }
            Command::PatchUnicode { text } => {
                let mut bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
                bytes.extend_from_slice(&[0, 0]);
                patch_data(ctx, &bytes, "Unicode string")
            }
            Command::PatchChecksum => {
                let file = ctx.file.as_mut().ok_or(ExecutionError::NoOpenFile)?;
                let offset = file.image.checksum_offset().ok_or(ImageError::NoChecksumField)?;
                let checksum = pe_checksum(&file.data, offset);
                file.log.write(&mut file.data, offset as u32, &checksum.to_le_bytes())?;
                ctx.log.info(format!("Checksum set to 0x{:08X}", checksum));
                Ok(())
            }
            Command::Log { message } => {
                ctx.log.info(message.clone());
                Ok(())
            }
        }
    }

    fn patch_file(&self, ctx: &mut InterpreterContext, path: &str) -> Result<(), ExecutionError> {
        self.close_file(ctx)?;
        let definition = ctx.definition.as_ref().ok_or(ExecutionError::NoDefinition)?;
        let source = resolve_path(&self.config.input_root, &record_path(definition, path));
        let image = PeImage::load(&source)?;
        self.open_image(ctx, path, Box::new(image))
    }

    /// Makes `image` the file under patch, replacing its record in the
    /// active definition.
    pub fn open_image(
        &self,
        ctx: &mut InterpreterContext,
        name: &str,
        image: Box<dyn BinaryImage>,
    ) -> Result<(), ExecutionError> {
        self.close_file(ctx)?;
        let definition = ctx.definition.clone().ok_or(ExecutionError::NoDefinition)?;
        let path = record_path(&definition, name);

        let hash = sha1(image.data()).to_vec();
        let code = self.load_code(image.as_ref(), &path, &hash)?;
        ctx.log.info(format!(
            "Opened {} ({} instructions, sha1 {})",
            path,
            code.len(),
            to_hex(&hash)
        ));

        ctx.store
            .definition_mut_or_insert(&definition.name)
            .version_mut_or_insert(&definition.version)
            .replace_file(TargetFile::new(&path, hash.clone()));

        ctx.cursor = image.image_base();
        ctx.found = false;
        ctx.history.clear();
        ctx.file = Some(OpenFile::new(name, path, image, code, hash));
        Ok(())
    }

    fn load_code(&self, image: &dyn BinaryImage, path: &str, hash: &[u8]) -> Result<CodeMap, ExecutionError> {
        let Some(dir) = &self.config.listing_dir else {
            return Ok(CodeFlowAnalyzer::new(image).analyze());
        };

        let hash = to_hex(hash);
        let listing = dir.join(format!("{}.asm", path.replace(['\\', '/'], "_")));
        if let Some(code) = ListingCache::load(&listing, &hash)? {
            debug!("Using cached listing {}", listing.display());
            return Ok(code);
        }

        let code = CodeFlowAnalyzer::new(image).analyze();
        ListingCache::save(&code, &hash, &listing)?;
        Ok(code)
    }

    /// Commits the open file's patches to its record and writes the patched
    /// copy when the definition names an output path.
    pub fn close_file(&self, ctx: &mut InterpreterContext) -> Result<(), ExecutionError> {
        let patch_count = sync_record(ctx)?;
        let Some(file) = ctx.file.take() else {
            return Ok(());
        };

        if let (Some(definition), Some(root)) = (&ctx.definition, &self.config.output_root) {
            if !definition.relative_output_path.is_empty() {
                let output = resolve_path(&resolve_path(root, &definition.output_path()), &file.name);
                if let Some(parent) = output.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&output, &file.data)?;
                ctx.log.info(format!("Wrote patched file to {}", output.display()));
            }
        }

        ctx.log.info(format!("Closed {} with {} patches", file.path, patch_count));
        Ok(())
    }

    fn write_definitions(&self, ctx: &mut InterpreterContext) -> Result<(), ExecutionError> {
        sync_record(ctx)?;
        let path = self
            .config
            .definitions_path
            .as_ref()
            .ok_or(ExecutionError::NoDefinitionsPath)?;
        ctx.store.save(path)?;
        ctx.log.info(format!("Definitions written to {}", path.display()));
        Ok(())
    }
}

fn record_path(definition: &ActiveDefinition, name: &str) -> String {
    let base = normalize_path(&definition.relative_path);
    let name = normalize_path(name);
    if base.is_empty() {
        name
    } else {
        format!("{}\\{}", base.trim_end_matches('\\'), name)
    }
}

/// Copies the open file's current diff and hash into its store record.
fn sync_record(ctx: &mut InterpreterContext) -> Result<usize, ExecutionError> {
    let Some(file) = ctx.file.as_ref() else {
        return Ok(0);
    };
    let definition = ctx.definition.as_ref().ok_or(ExecutionError::NoDefinition)?;
    let version = ctx
        .store
        .definition_mut_or_insert(&definition.name)
        .version_mut_or_insert(&definition.version);

    if version.file(&file.path).is_none() {
        version.replace_file(TargetFile::new(&file.path, file.hash_original.clone()));
    }

    let patches = file.log.materialize();
    let count = patches.len();
    if let Some(record) = version.file_mut(&file.path) {
        record.hash_original = file.hash_original.clone();
        record.hash_patched = sha1(&file.data).to_vec();
        record.patches = patches;
    }
    Ok(count)
}

fn open_file(ctx: &InterpreterContext) -> Result<&OpenFile, ExecutionError> {
    ctx.file.as_ref().ok_or(ExecutionError::NoOpenFile)
}

fn write_at(file: &mut OpenFile, va: u32, bytes: &[u8]) -> Result<u32, ExecutionError> {
    let offset = file.image.va_to_offset(va)?;
    file.log.write(&mut file.data, offset, bytes)?;
    Ok(offset)
}

fn patch_data(ctx: &mut InterpreterContext, bytes: &[u8], what: &str) -> Result<(), ExecutionError> {
    let cursor = ctx.cursor;
    let file = ctx.file.as_mut().ok_or(ExecutionError::NoOpenFile)?;
    write_at(file, cursor, bytes)?;
    ctx.cursor = cursor.wrapping_add(bytes.len() as u32);
    ctx.log.info(format!("Patched {} {} at 0x{:08X}", bytes.len(), what, cursor));
    Ok(())
}

/// Records the outcome of a search and moves the cursor on success.
fn settle(ctx: &mut InterpreterContext, address: Option<u32>, what: &str) {
    match address {
        Some(address) => {
            ctx.cursor = address;
            ctx.found = true;
            ctx.log.info(format!("Found {} at 0x{:08X}", what, address));
        }
        None => {
            ctx.found = false;
            ctx.log.info(format!("Not found: {}", what));
        }
    }
}

fn jump(ctx: &mut InterpreterContext, address: u32) {
    ctx.history.push(ctx.cursor);
    ctx.cursor = address;
    ctx.log.info(format!("Jumped to 0x{:08X}", address));
}

fn jump_to_symbol(ctx: &mut InterpreterContext, address: Option<u32>, kind: &str, name: &str) {
    match address {
        Some(address) => {
            jump(ctx, address);
            ctx.found = true;
        }
        None => {
            ctx.found = false;
            ctx.log.warn(format!("Not found: {} {}", kind, name));
        }
    }
}

fn go(script: &Script, ctx: &mut InterpreterContext, label: &str) -> Result<(), ExecutionError> {
    ctx.ip = script
        .label_position(label)
        .ok_or_else(|| ExecutionError::LabelNotFound(label.to_string()))?;
    Ok(())
}

/// Code map positions to scan, in scan order.
fn positions(code: &CodeMap, cursor: u32, scope: Scope) -> Box<dyn Iterator<Item = usize>> {
    let len = code.len();
    match scope {
        Scope::First => Box::new(0..len),
        Scope::Next => Box::new(code.position_at_or_after(cursor.saturating_add(1))..len),
        Scope::Previous => match cursor.checked_sub(1).and_then(|c| code.position_at_or_before(c)) {
            Some(last) => Box::new((0..=last).rev()),
            None => Box::new(std::iter::empty()),
        },
    }
}

fn find_data(
    ctx: &mut InterpreterContext,
    scope: Scope,
    pattern: &BytePattern,
    description: &str,
) -> Result<(), ExecutionError> {
    let file = open_file(ctx)?;
    let mut start = match scope {
        Scope::First => 0,
        Scope::Next | Scope::Previous => match file.image.va_to_offset(ctx.cursor) {
            Ok(offset) => offset as usize + 1,
            Err(_) => {
                debug!("Cursor 0x{:08X} has no file offset, searching from the start", ctx.cursor);
                0
            }
        },
    };

    let mut address = None;
    while let Some(hit) = pattern.find_from(&file.data, start) {
        if let Some(va) = file.image.offset_to_va(hit as u32) {
            address = Some(va);
            break;
        }
        start = hit + 1;
    }

    settle(ctx, address, description);
    Ok(())
}

fn find_instruction<F>(ctx: &mut InterpreterContext, scope: Scope, what: &str, mut predicate: F) -> Result<(), ExecutionError>
where
    F: FnMut(&CodeMap, usize) -> bool,
{
    let code = &open_file(ctx)?.code;
    let address = positions(code, ctx.cursor, scope)
        .find(|&p| predicate(code, p))
        .and_then(|p| code.at(p))
        .map(|instr| instr.address);
    settle(ctx, address, what);
    Ok(())
}

fn find_instruction_pattern(
    ctx: &mut InterpreterContext,
    scope: Scope,
    pattern: &InstructionPattern,
    index: i64,
) -> Result<(), ExecutionError> {
    let code = &open_file(ctx)?.code;
    let hit = positions(code, ctx.cursor, scope)
        .find(|&p| pattern.matches_run((p..p + pattern.len()).map_while(|i| code.at(i))));

    let address = match hit {
        Some(p) => {
            let instr = usize::try_from(p as i64 + index)
                .ok()
                .and_then(|i| code.at(i))
                .ok_or(ExecutionError::IndexOutOfRange(index))?;
            Some(instr.address)
        }
        None => None,
    };

    settle(ctx, address, &format!("pattern \"{}\"", pattern.source()));
    Ok(())
}

fn resolve_target(image: &dyn BinaryImage, target: &Target) -> Option<(u32, bool)> {
    match target {
        Target::Address(address) => Some((*address, false)),
        Target::Symbol(name) => image
            .find_export(name)
            .map(|s| (s.address, false))
            .or_else(|| image.find_import(name).map(|s| (s.address, true))),
    }
}

fn describe(target: &Target) -> String {
    match target {
        Target::Address(address) => format!("0x{:08X}", address),
        Target::Symbol(name) => name.clone(),
    }
}

fn find_call(
    ctx: &mut InterpreterContext,
    scope: Scope,
    target: &Target,
    constraints: &Constraints,
) -> Result<(), ExecutionError> {
    let what = format!("call to {}", describe(target));
    let Some((address, via_import)) = resolve_target(open_file(ctx)?.image.as_ref(), target) else {
        settle(ctx, None, &what);
        return Ok(());
    };

    // Imported functions are reached through a load of their IAT slot.
    find_instruction(ctx, scope, &what, |code, p| {
        code.at(p).map_or(false, |instr| {
            (instr.is_call() && instr.branch_target() == Some(address))
                || (via_import && instr.literal_value() == Some(address))
        }) && satisfies(code, p, constraints)
    })
}

fn jump_to_reference(ctx: &mut InterpreterContext, target: &Target, constraints: &Constraints) -> Result<(), ExecutionError> {
    let what = format!("reference to {}", describe(target));
    let file = open_file(ctx)?;
    let found = resolve_target(file.image.as_ref(), target).and_then(|(address, _)| {
        let code = &file.code;
        positions(code, 0, Scope::First)
            .find(|&p| {
                code.at(p).and_then(Instruction::literal_value) == Some(address) && satisfies(code, p, constraints)
            })
            .and_then(|p| code.at(p))
            .map(|instr| instr.address)
    });

    match found {
        Some(address) => {
            jump(ctx, address);
            ctx.found = true;
            ctx.log.info(format!("Found {} at 0x{:08X}", what, address));
        }
        None => settle(ctx, None, &what),
    }
    Ok(())
}

fn satisfies(code: &CodeMap, position: usize, constraints: &Constraints) -> bool {
    if let Some(pre) = &constraints.pre {
        let writer = (position.saturating_sub(CONSTRAINT_WINDOW)..position)
            .rev()
            .filter_map(|i| code.at(i))
            .find(|instr| instr.written_register().as_deref() == Some(pre.register.as_str()));
        if !constraint_holds(pre, writer) {
            return false;
        }
    }

    if let Some(post) = &constraints.post {
        let reader = (position + 1..=position + CONSTRAINT_WINDOW)
            .filter_map(|i| code.at(i))
            .find(|instr| instr.reads_register(&post.register));
        if !constraint_holds(post, reader) {
            return false;
        }
    }

    true
}

fn constraint_holds(constraint: &RegisterConstraint, found: Option<&Instruction>) -> bool {
    match (found, &constraint.pattern) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(instr), Some(pattern)) => pattern.matches_run(std::iter::once(instr)),
    }
}

/// Turns the conditional jump at the cursor into an unconditional one when it
/// is the expected mnemonic, or into a NOP of the same width when it is some
/// other conditional jump.
fn make_jump_unconditional(ctx: &mut InterpreterContext, mnemonic: &str) -> Result<(), ExecutionError> {
    let cursor = ctx.cursor;
    let file = ctx.file.as_mut().ok_or(ExecutionError::NoOpenFile)?;
    let instr = file
        .code
        .get(cursor)
        .cloned()
        .ok_or(ExecutionError::NoInstruction(cursor))?;

    if !instr.is_conditional_jump() {
        return Err(ExecutionError::NotConditionalJump {
            address: cursor,
            text: instr.text(),
        });
    }

    let wanted = mnemonic.strip_suffix(".w").unwrap_or(mnemonic);
    let size = instr.size();
    let (bytes, action) = if instr.mnemonic == mnemonic || instr.base_mnemonic() == wanted {
        let target = instr.branch_target().ok_or(ExecutionError::NoTarget(cursor))?;
        let bytes = encoder::encode_branch(size, cursor, target).ok_or(ExecutionError::BranchOutOfRange {
            from: cursor,
            to: target,
            size,
        })?;
        (bytes, format!("branch to 0x{:08X}", target))
    } else {
        let bytes = encoder::encode_nop(size).ok_or(ExecutionError::UnsupportedWidth { address: cursor, size })?;
        (bytes, "nop".to_string())
    };

    write_at(file, cursor, &bytes)?;
    ctx.log.info(format!("Replaced {} at 0x{:08X} with {}", instr.text(), cursor, action));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{AssemblerError, CodeType, NoAssembler};
    use crate::image::pe::tests::minimal_pe;
    use crate::image::FlatImage;
    use crate::patch::{Patch, PatchStore};
    use std::cell::RefCell;
    use std::path::Path;

    // bne +0x10; movs r0, #0x2a; bl +0xc; nop x4; bx lr
    const CODE: [u8; 18] = [
        0x06, 0xD1, 0x2A, 0x20, 0x00, 0xF0, 0x04, 0xF8, 0x00, 0xBF, 0x00, 0xBF, 0x00, 0xBF, 0x00, 0xBF, 0x70, 0x47,
    ];
    const HEADER: &str = "PatchDefinition \"Unlock\", \"1.0\"\nPatchFile \"app.exe\"\n";

    fn workspace() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.exe"), minimal_pe(&CODE)).unwrap();
        let config = Config::new().with_input_root(dir.path().to_path_buf());
        (dir, config)
    }

    fn workspace_with(image: Vec<u8>) -> (tempfile::TempDir, Config) {
        let (dir, config) = workspace();
        fs::write(dir.path().join("app.exe"), image).unwrap();
        (dir, config)
    }

    fn image_with_strings() -> Vec<u8> {
        let mut data = minimal_pe(&CODE);
        data[0x240..0x245].copy_from_slice(b"Hello");
        data[0x250..0x255].copy_from_slice(b"Hello");
        data[0x260..0x264].copy_from_slice(&[b'H', 0, b'i', 0]);
        data
    }

    fn run_with(config: &Config, assembler: &dyn Assembler, source: &str) -> (InterpreterContext, Result<(), ScriptError>) {
        let script = Script::parse(source).unwrap();
        let mut ctx = InterpreterContext::new(PatchStore::new());
        let result = Interpreter::new(config, assembler).execute(&script, &mut ctx);
        (ctx, result)
    }

    fn run(config: &Config, source: &str) -> (InterpreterContext, Result<(), ScriptError>) {
        run_with(config, &NoAssembler, source)
    }

    fn patches(ctx: &InterpreterContext) -> Vec<Patch> {
        ctx.store
            .definition("Unlock")
            .and_then(|d| d.version("1.0"))
            .and_then(|v| v.file("app.exe"))
            .map(|f| f.patches.clone())
            .unwrap_or_default()
    }

    fn execution_error(result: Result<(), ScriptError>) -> (usize, ExecutionError) {
        match result {
            Err(ScriptError::Execution { line, source, .. }) => (line, source),
            other => panic!("expected an execution error, got {:?}", other),
        }
    }

    #[test]
    fn test_make_jump_unconditional() {
        let (_dir, config) = workspace();
        let (ctx, result) = run(
            &config,
            &format!("{}FindFirstBytes \"06 D1\"\nMakeJumpUnconditional bne\nClosePatchFile\n", HEADER),
        );
        result.unwrap();

        let patches = patches(&ctx);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].address, 0x200);
        assert_eq!(patches[0].original_bytes, vec![0x06, 0xD1]);
        assert_eq!(patches[0].patched_bytes, vec![0x06, 0xE0]);

        let record = ctx.store.definition("Unlock").unwrap().version("1.0").unwrap().file("APP.EXE").unwrap();
        assert_ne!(record.hash_original, record.hash_patched);
        assert!(!ctx.has_open_file());
    }

    #[test]
    fn test_other_conditional_jump_becomes_nop() {
        let (_dir, config) = workspace();
        let (ctx, result) = run(
            &config,
            &format!("{}FindNextConditionalJump\nMakeJumpUnconditional beq\nClosePatchFile\n", HEADER),
        );
        result.unwrap();
        assert_eq!(patches(&ctx)[0].patched_bytes, vec![0x00, 0xBF]);
    }

    #[test]
    fn test_make_jump_unconditional_rejects_plain_instruction() {
        let (_dir, config) = workspace();
        let (_, result) = run(&config, &format!("{}FindValue 0x2A\nMakeJumpUnconditional bne\n", HEADER));
        let (line, error) = execution_error(result);
        assert_eq!(line, 4);
        assert!(matches!(error, ExecutionError::NotConditionalJump { address: 0x1000_1002, .. }));
    }

    fn reference_checksum(data: &[u8], field: usize) -> u32 {
        let mut sum: u64 = 0;
        for i in (0..data.len()).step_by(2) {
            if (field..field + 4).contains(&i) {
                continue;
            }
            let low = data[i] as u64;
            let high = data.get(i + 1).copied().unwrap_or(0) as u64;
            sum += low | (high << 8);
        }
        while sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        sum as u32 + data.len() as u32
    }

    #[test]
    fn test_checksum_goes_through_patch_log() {
        let (_dir, config) = workspace();
        let (ctx, result) = run(&config, &format!("{}PatchChecksum\nClosePatchFile\n", HEADER));
        result.unwrap();

        let expected = reference_checksum(&minimal_pe(&CODE), 0x98);
        let patches = patches(&ctx);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].address, 0x98);
        assert_eq!(patches[0].original_bytes, vec![0, 0, 0, 0]);
        assert_eq!(patches[0].patched_bytes, expected.to_le_bytes().to_vec());
    }

    #[test]
    fn test_checksum_after_patching_matches_written_file() {
        let (dir, config) = workspace();
        let config = config.with_output_root(dir.path().join("out"));
        let (ctx, result) = run(
            &config,
            "PatchDefinition \"Unlock\", \"1.0\", RelativeOutputPath=\"patched\"\nPatchFile \"app.exe\"\nFindFirstBytes \"2A 20\"\nPatchBytes \"FF 20\"\nPatchChecksum\nClosePatchFile\n",
        );
        result.unwrap();
        assert_eq!(patches(&ctx).len(), 2);

        let written = fs::read(dir.path().join("out").join("patched").join("app.exe")).unwrap();
        let stored = u32::from_le_bytes([written[0x98], written[0x99], written[0x9A], written[0x9B]]);
        assert_eq!(written[0x202], 0xFF);
        assert_eq!(stored, reference_checksum(&written, 0x98));
        assert_ne!(stored, reference_checksum(&minimal_pe(&CODE), 0x98));
    }

    #[test]
    fn test_labels_are_scoped_to_the_open_file() {
        let (_dir, config) = workspace();
        let (_, result) = run(&config, &format!("{}CreateLabel start\nCreateLabel start\n", HEADER));
        let (line, error) = execution_error(result);
        assert_eq!(line, 4);
        assert!(matches!(error, ExecutionError::DuplicateLabel(name) if name == "start"));

        let (ctx, result) = run(
            &config,
            &format!("{}CreateLabel start\nPatchFile \"app.exe\"\nCreateLabel start\n", HEADER),
        );
        result.unwrap();
        assert_eq!(ctx.file.as_ref().unwrap().labels.get("start"), Some(&0x1000_0000));
    }

    #[test]
    fn test_function_call_with_register_constraint() {
        let (_dir, config) = workspace();
        let (ctx, result) = run(
            &config,
            &format!(
                "{}FindNextFunctionCall 0x10001010, PreRegister=r0, PrePattern=\"movs r0, ?\"\nIfNotFoundThrowError \"no call\"\n",
                HEADER
            ),
        );
        result.unwrap();
        assert_eq!(ctx.cursor, 0x1000_1004);
        assert!(ctx.found);

        let (_, result) = run(
            &config,
            &format!(
                "{}FindNextFunctionCall 0x10001010, PreRegister=r0, PrePattern=\"movs r0, 0x1\"\nIfNotFoundThrowError \"no call\"\n",
                HEADER
            ),
        );
        let (_, error) = execution_error(result);
        assert!(matches!(error, ExecutionError::Raised(message) if message == "no call"));
    }

    #[test]
    fn test_pattern_index_target_and_history() {
        let (_dir, config) = workspace();
        let (ctx, result) = run(
            &config,
            &format!("{}FindFirstInstructionPattern \"movs r0, ?; bl ?\", Index=1\nJumpToTarget\n", HEADER),
        );
        result.unwrap();
        assert_eq!(ctx.cursor, 0x1000_1010);
        assert_eq!(ctx.history, vec![0x1000_1004]);

        let (ctx, result) = run(
            &config,
            &format!("{}FindFirstInstructionPattern \"movs r0, ?; bl ?\", Index=1\nJumpToTarget\nJumpBack\n", HEADER),
        );
        result.unwrap();
        assert_eq!(ctx.cursor, 0x1000_1004);

        let (_, result) = run(&config, &format!("{}JumpBack\n", HEADER));
        assert!(matches!(execution_error(result).1, ExecutionError::EmptyHistory));
    }

    #[test]
    fn test_jump_to_reference_and_symbols() {
        let (_dir, config) = workspace();
        let (ctx, result) = run(&config, &format!("{}JumpToReference 0x2A\n", HEADER));
        result.unwrap();
        assert!(ctx.found);
        assert_eq!(ctx.cursor, 0x1000_1002);

        let (ctx, result) = run(&config, &format!("{}JumpToExport DoesNotExist\n", HEADER));
        result.unwrap();
        assert!(!ctx.found);
        assert_eq!(ctx.cursor, 0x1000_0000);

        let (_, result) = run(&config, &format!("{}JumpToAddress 0x20000000\n", HEADER));
        assert!(matches!(execution_error(result).1, ExecutionError::BadAddress(0x2000_0000)));
    }

    #[test]
    fn test_control_flow() {
        let (_dir, config) = workspace();
        let source = format!(
            "{}FindFirstBytes \"DE AD BE EF\"\nIfNotFoundGo missing\nLog \"unreachable\"\nGo end\nmissing:\nLog \"skipped ahead\"\nend:\n",
            HEADER
        );
        let (ctx, result) = run(&config, &source);
        result.unwrap();
        let lines = ctx.log.lines();
        assert!(lines.iter().any(|l| l == "skipped ahead"));
        assert!(!lines.iter().any(|l| l == "unreachable"));

        let (_, result) = run(&config, &format!("{}FindFirstBytes \"70 47\"\nIfFoundThrowError \"already patched\"\n", HEADER));
        assert!(matches!(execution_error(result).1, ExecutionError::Raised(m) if m == "already patched"));
    }

    #[test]
    fn test_step_limit() {
        let config = Config::new();
        let script = Script::parse("top:\nGo top\n").unwrap();
        let mut ctx = InterpreterContext::new(PatchStore::new());
        let result = Interpreter::new(&config, &NoAssembler)
            .with_step_limit(10)
            .execute(&script, &mut ctx);
        assert!(matches!(execution_error(result).1, ExecutionError::StepLimit(10)));
    }

    #[test]
    fn test_commands_need_an_open_file() {
        let config = Config::new();
        let (_, result) = run(&config, "FindFirstBytes \"00\"\n");
        assert!(matches!(execution_error(result).1, ExecutionError::NoOpenFile));

        let (_, result) = run(&config, "PatchFile \"app.exe\"\n");
        assert!(matches!(execution_error(result).1, ExecutionError::NoDefinition));
    }

    #[test]
    fn test_patched_copy_is_written_to_output() {
        let (dir, config) = workspace();
        let config = config.with_output_root(dir.path().join("out"));
        let (_, result) = run(
            &config,
            "PatchDefinition \"Unlock\", \"1.0\", RelativeOutputPath=\"build\\%VERSION%\"\nPatchFile \"app.exe\"\nFindFirstBytes \"06 D1\"\nPatchBytes \"00 BF\"\nClosePatchFile\n",
        );
        result.unwrap();

        let written = fs::read(dir.path().join("out").join("build").join("1.0").join("app.exe")).unwrap();
        assert_eq!(&written[0x200..0x202], &[0x00, 0xBF]);
        assert_eq!(written.len(), 0x400);
    }

    #[test]
    fn test_listing_cache_is_created_and_reused() {
        let (dir, config) = workspace();
        let listings = dir.path().join("listings");
        let config = config.with_listing_dir(listings.clone());

        let (first, result) = run(&config, HEADER);
        result.unwrap();
        assert!(Path::new(&listings.join("app.exe.asm")).is_file());

        let (second, result) = run(&config, HEADER);
        result.unwrap();
        assert_eq!(
            first.file.as_ref().unwrap().code.len(),
            second.file.as_ref().unwrap().code.len()
        );
    }

    #[test]
    fn test_patch_code_sees_labels_and_snaps_cursor() {
        let (_dir, config) = workspace();
        let seen = RefCell::new((0u32, String::new()));
        let assembler = |origin: u32, _: CodeType, source: &str| {
            *seen.borrow_mut() = (origin, source.to_string());
            Ok::<_, AssemblerError>(vec![0xAA, 0xBB, 0xCC])
        };

        let (ctx, result) = run_with(
            &config,
            &assembler,
            &format!("{}FindFirstBytes \"00 BF 00 BF\"\nCreateLabel hook\nPatchCode\n    b hook\nEndCode\n", HEADER),
        );
        result.unwrap();

        let (origin, source) = seen.borrow().clone();
        assert_eq!(origin, 0x1000_1008);
        assert!(source.starts_with("hook EQU 0x10001008\n"));
        assert!(source.contains("b hook"));
        assert_eq!(ctx.cursor, 0x1000_100C);
        assert_eq!(&ctx.file.as_ref().unwrap().data[0x208..0x20B], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_find_previous_pattern_and_value() {
        let (_dir, config) = workspace();
        let (ctx, result) = run(
            &config,
            &format!("{}FindFirstBytes \"70 47\"\nFindPreviousInstructionPattern \"nop\"\n", HEADER),
        );
        result.unwrap();
        assert!(ctx.found);
        assert_eq!(ctx.cursor, 0x1000_100E);

        let (ctx, result) = run(
            &config,
            &format!(
                "{}FindFirstBytes \"70 47\"\nFindPreviousInstructionPattern \"movs r0, ?; bl ?\", Index=1\n",
                HEADER
            ),
        );
        result.unwrap();
        assert_eq!(ctx.cursor, 0x1000_1004);

        let (ctx, result) = run(&config, &format!("{}FindFirstBytes \"70 47\"\nFindPreviousValue 0x2A\n", HEADER));
        result.unwrap();
        assert!(ctx.found);
        assert_eq!(ctx.cursor, 0x1000_1002);

        let (ctx, result) = run(
            &config,
            &format!("{}FindFirstBytes \"70 47\"\nFindPreviousValue 0x2A\nFindPreviousValue 0x2A\n", HEADER),
        );
        result.unwrap();
        assert!(!ctx.found);
        assert_eq!(ctx.cursor, 0x1000_1002);
    }

    #[test]
    fn test_find_ascii_and_unicode_strings() {
        let (_dir, config) = workspace_with(image_with_strings());
        let (ctx, result) = run(&config, &format!("{}FindFirstAscii \"Hello\"\nFindNextAscii \"Hello\"\n", HEADER));
        result.unwrap();
        assert!(ctx.found);
        assert_eq!(ctx.cursor, 0x1000_1050);

        let (ctx, result) = run(
            &config,
            &format!("{}FindFirstAscii \"Hello\"\nFindNextAscii \"Hello\"\nFindNextAscii \"Hello\"\n", HEADER),
        );
        result.unwrap();
        assert!(!ctx.found);
        assert_eq!(ctx.cursor, 0x1000_1050);

        let (ctx, result) = run(&config, &format!("{}FindFirstUnicode \"Hi\"\n", HEADER));
        result.unwrap();
        assert!(ctx.found);
        assert_eq!(ctx.cursor, 0x1000_1060);

        let (ctx, result) = run(&config, &format!("{}FindFirstUnicode \"Hi\"\nFindNextUnicode \"Hi\"\n", HEADER));
        result.unwrap();
        assert!(!ctx.found);

        let (ctx, result) = run(&config, &format!("{}FindFirstAscii \"Hi\"\n", HEADER));
        result.unwrap();
        assert!(!ctx.found);
    }

    #[test]
    fn test_find_next_from_unmapped_cursor_starts_at_file_start() {
        let (_dir, config) = workspace_with(image_with_strings());
        let (ctx, result) = run(&config, &format!("{}FindNextAscii \"Hello\"\n", HEADER));
        result.unwrap();
        assert!(ctx.found);
        assert_eq!(ctx.cursor, 0x1000_1040);
    }

    #[test]
    fn test_patch_ascii_and_unicode_are_terminated() {
        let (_dir, config) = workspace_with(image_with_strings());
        let (ctx, result) = run(
            &config,
            &format!("{}FindFirstAscii \"Hello\"\nPatchAscii \"Bye\"\nPatchUnicode \"Ok\"\n", HEADER),
        );
        result.unwrap();
        assert_eq!(ctx.cursor, 0x1000_104A);
        let data = &ctx.file.as_ref().unwrap().data;
        assert_eq!(&data[0x240..0x244], b"Bye\0");
        assert_eq!(&data[0x244..0x24A], &[0x4F, 0x00, 0x6B, 0x00, 0x00, 0x00]);

        let (ctx, result) = run(
            &config,
            &format!(
                "{}FindFirstAscii \"Hello\"\nPatchAscii \"Bye\"\nPatchUnicode \"Ok\"\nClosePatchFile\n",
                HEADER
            ),
        );
        result.unwrap();
        let patches = patches(&ctx);
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].address, 0x240);
        assert_eq!(patches[0].original_bytes, b"Hell".to_vec());
        assert_eq!(patches[1].address, 0x244);
        assert_eq!(patches[1].original_bytes, vec![b'o', 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_jump_to_import() {
        let config = Config::new();
        let interpreter = Interpreter::new(&config, &NoAssembler);
        let mut ctx = InterpreterContext::new(PatchStore::new());
        interpreter
            .execute(&Script::parse("PatchDefinition \"Unlock\", \"1.0\"\n").unwrap(), &mut ctx)
            .unwrap();

        let mut data = CODE.to_vec();
        data.resize(0x40, 0);
        let image = FlatImage::new(data, 0x2000_0000)
            .with_code_section(".text", 0, 0x20)
            .with_data_section(".idata", 0x20, 0x20)
            .with_import("CreateFileW", 0x2000_0030);
        interpreter.open_image(&mut ctx, "app.exe", Box::new(image)).unwrap();

        let script = Script::parse("JumpToImport createfilew\nIfNotFoundThrowError \"missing\"\n").unwrap();
        interpreter.execute(&script, &mut ctx).unwrap();
        assert!(ctx.found);
        assert_eq!(ctx.cursor, 0x2000_0030);
        assert_eq!(ctx.history, vec![0x2000_0000]);

        let script = Script::parse("JumpToImport ReadFile\n").unwrap();
        interpreter.execute(&script, &mut ctx).unwrap();
        assert!(!ctx.found);
        assert_eq!(ctx.cursor, 0x2000_0030);
    }

    #[test]
    fn test_wide_conditional_jump_becomes_wide_branch() {
        // bne.w +0xc; nop x6; bx lr
        let wide: [u8; 18] = [
            0x40, 0xF0, 0x06, 0x80, 0x00, 0xBF, 0x00, 0xBF, 0x00, 0xBF, 0x00, 0xBF, 0x00, 0xBF, 0x00, 0xBF, 0x70, 0x47,
        ];
        let (_dir, config) = workspace_with(minimal_pe(&wide));
        let (ctx, result) = run(
            &config,
            &format!("{}FindNextConditionalJump\nMakeJumpUnconditional bne.w\nClosePatchFile\n", HEADER),
        );
        result.unwrap();

        let patches = patches(&ctx);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].address, 0x200);
        assert_eq!(patches[0].original_bytes, vec![0x40, 0xF0, 0x06, 0x80]);
        assert_eq!(patches[0].patched_bytes, vec![0x00, 0xF0, 0x06, 0xB8]);

        let branch = crate::analysis::ThumbDecoder::new()
            .decode(&patches[0].patched_bytes, 0x1000_1000)
            .unwrap();
        assert_eq!(branch.mnemonic, "b.w");
        assert_eq!(branch.branch_target(), Some(0x1000_1010));
    }
}
