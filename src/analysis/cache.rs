// Thu Jan 15 2026 - Alex

use crate::analysis::{AnalysisError, CodeMap, Instruction};
use crate::utils::hash::{from_hex, to_hex};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const HASH_PREFIX: &str = "; sha1 ";

/// Plain-text disassembly listing used to skip re-analysis of a known binary.
///
/// The first line records the SHA-1 of the analysed file; every other line is
/// `ADDRESS<TAB>BYTES<TAB>MNEMONIC<TAB>OPERANDS`.
pub struct ListingCache;

impl ListingCache {
    pub fn save(map: &CodeMap, file_hash: &str, path: &Path) -> Result<(), AnalysisError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{}{}", HASH_PREFIX, file_hash)?;
        for instr in map.iter() {
            writeln!(
                out,
                "{:08X}\t{}\t{}\t{}",
                instr.address,
                to_hex(&instr.bytes),
                instr.mnemonic,
                instr.operands
            )?;
        }
        out.flush()?;
        log::debug!("Wrote listing with {} instructions to {}", map.len(), path.display());
        Ok(())
    }

    /// Loads a listing if it exists and was produced from a file with `file_hash`.
    pub fn load(path: &Path, file_hash: &str) -> Result<Option<CodeMap>, AnalysisError> {
        if !path.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => return Ok(None),
        };
        match header.strip_prefix(HASH_PREFIX) {
            Some(hash) if hash.trim().eq_ignore_ascii_case(file_hash) => {}
            _ => {
                log::info!("Listing {} is stale, re-analysing", path.display());
                return Ok(None);
            }
        }

        let mut instructions = Vec::new();
        for (index, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            instructions.push(parse_line(&line, index + 2)?);
        }

        log::debug!("Loaded {} instructions from {}", instructions.len(), path.display());
        Ok(Some(CodeMap::from_instructions(instructions)))
    }
}

fn parse_line(line: &str, line_number: usize) -> Result<Instruction, AnalysisError> {
    let invalid = |reason: &str| AnalysisError::InvalidListing {
        line: line_number,
        reason: reason.to_string(),
    };

    let mut fields = line.splitn(4, '\t');
    let address = fields.next().ok_or_else(|| invalid("missing address"))?;
    let bytes = fields.next().ok_or_else(|| invalid("missing bytes"))?;
    let mnemonic = fields.next().ok_or_else(|| invalid("missing mnemonic"))?;
    let operands = fields.next().unwrap_or("");

    let address = u32::from_str_radix(address.trim(), 16).map_err(|_| invalid("bad address"))?;
    let bytes = from_hex(bytes.trim()).ok_or_else(|| invalid("bad bytes"))?;

    Ok(Instruction::new(address, bytes, mnemonic, operands))
}
