// Tue Jan 13 2026 - Alex

use crate::analysis::{CodeMap, Instruction, ThumbDecoder};
use crate::image::{BinaryImage, Section};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashSet, VecDeque};

static PC_RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[pc, #(-?(?:0x[0-9a-fA-F]+|[0-9]+))\]").unwrap());

/// Counters collected during one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisTrace {
    /// Every address pushed onto the worklist, in push order.
    pub enqueued: Vec<u32>,
    pub runs: usize,
    pub dropped: usize,
    pub coalesced: usize,
    pub literals_resolved: usize,
}

/// Recursive-descent disassembler that builds a `CodeMap` from an image's
/// entry point, exports, imports and exception table.
pub struct CodeFlowAnalyzer<'a, I: BinaryImage + ?Sized> {
    image: &'a I,
    decoder: ThumbDecoder,
    map: IndexMap<u32, Instruction>,
    worklist: VecDeque<u32>,
    queued: HashSet<u32>,
    /// Second halves of coalesced `movw`/`movt` pairs.
    covered: HashSet<u32>,
    trace: AnalysisTrace,
}

impl<'a, I: BinaryImage + ?Sized> CodeFlowAnalyzer<'a, I> {
    pub fn new(image: &'a I) -> Self {
        Self {
            image,
            decoder: ThumbDecoder::new(),
            map: IndexMap::new(),
            worklist: VecDeque::new(),
            queued: HashSet::new(),
            covered: HashSet::new(),
            trace: AnalysisTrace::default(),
        }
    }

    pub fn analyze(self) -> CodeMap {
        self.analyze_traced().0
    }

    pub fn analyze_traced(mut self) -> (CodeMap, AnalysisTrace) {
        self.seed();

        while let Some(address) = self.worklist.pop_front() {
            if self.is_known(address) {
                continue;
            }
            let section = match self.image.section_for_va(address) {
                Some(section) if section.is_code() => section.clone(),
                _ => {
                    self.trace.dropped += 1;
                    continue;
                }
            };
            self.analyze_run(&section, address);
        }

        log::debug!(
            "Code flow analysis: {} instructions, {} runs, {} dropped seeds, {} coalesced, {} literals",
            self.map.len(),
            self.trace.runs,
            self.trace.dropped,
            self.trace.coalesced,
            self.trace.literals_resolved
        );

        (CodeMap::from_index_map(self.map), self.trace)
    }

    fn seed(&mut self) {
        let mut seeds = vec![self.image.entry_point()];
        seeds.extend(self.image.exports().iter().map(|s| s.address));
        seeds.extend(self.image.imports().iter().map(|s| s.address));
        seeds.extend(self.image.runtime_functions().iter().map(|s| s.address));

        for address in seeds {
            self.enqueue(address & !1);
        }
    }

    fn is_known(&self, address: u32) -> bool {
        self.map.contains_key(&address) || self.covered.contains(&address)
    }

    fn enqueue(&mut self, address: u32) -> bool {
        if self.is_known(address) || !self.queued.insert(address) {
            return false;
        }
        self.worklist.push_back(address);
        self.trace.enqueued.push(address);
        true
    }

    fn analyze_run(&mut self, section: &Section, start: u32) {
        self.trace.runs += 1;

        let image = self.image;
        let thumb = self.decoder;
        let code = image.section_bytes(section);
        let mut run = Vec::new();
        let mut decoder = thumb.decode_all(code, section.virtual_address, start);
        loop {
            let next = decoder.address();
            if next != start && self.is_known(next) {
                break;
            }
            match decoder.next() {
                Some(instr) => run.push(instr),
                None => break,
            }
        }
        let run_end = decoder.address();

        let mut previous: Option<u32> = None;
        for mut instr in run {
            instr.normalize_register_aliases();

            if let Some(prev_address) = previous {
                if self.try_coalesce(prev_address, &instr) {
                    self.trace.coalesced += 1;
                    previous = None;
                    continue;
                }
            }

            self.resolve_literal(section, &mut instr);

            let target = instr.branch_target();
            let address = instr.address;
            self.map.insert(address, instr);
            previous = Some(address);

            if let Some(target) = target {
                let target = target & !1;
                if target < start || target >= run_end {
                    self.enqueue(target);
                }
            }
        }
    }

    /// Folds a `movw`/`movt` pair on the same register into one `mov`.
    fn try_coalesce(&mut self, prev_address: u32, instr: &Instruction) -> bool {
        let prev = match self.map.get_mut(&prev_address) {
            Some(prev) => prev,
            None => return false,
        };
        if prev.end() != instr.address {
            return false;
        }

        let (low, high) = match (prev.mnemonic.as_str(), instr.mnemonic.as_str()) {
            ("movw", "movt") => (&*prev, instr),
            ("movt", "movw") => (instr, &*prev),
            _ => return false,
        };

        let (low_reg, low_value) = match split_register_immediate(&low.operands) {
            Some(parts) => parts,
            None => return false,
        };
        let (high_reg, high_value) = match split_register_immediate(&high.operands) {
            Some(parts) => parts,
            None => return false,
        };
        if low_reg != high_reg {
            return false;
        }

        let value = (high_value << 16).wrapping_add(low_value);
        let operands = format!("{}, #0x{:x}", low_reg, value);

        prev.mnemonic = "mov".to_string();
        prev.operands = operands;
        prev.bytes.extend_from_slice(&instr.bytes);
        self.covered.insert(instr.address);
        true
    }

    /// Replaces `[pc, #imm]` with the word it loads when that word is inside the section.
    fn resolve_literal(&mut self, section: &Section, instr: &mut Instruction) {
        let caps = match PC_RELATIVE.captures(&instr.operands) {
            Some(caps) => caps,
            None => return,
        };
        let offset = match caps.get(1).and_then(|m| crate::analysis::parse_number(m.as_str())) {
            Some(offset) => offset,
            None => return,
        };

        let base = instr.address.wrapping_add(4) & !3;
        let literal = (base as i64 + offset) as u32;
        if !section.contains_va(literal) || !section.contains_va(literal.wrapping_add(3)) {
            return;
        }
        let value = match self.image.read_u32(literal) {
            Some(value) => value,
            None => return,
        };

        let whole = caps.get(0).map(|m| m.range());
        if let Some(range) = whole {
            let mut operands = instr.operands.clone();
            operands.replace_range(range, &format!("#0x{:x}", value));
            instr.operands = operands;
            self.trace.literals_resolved += 1;
        }
    }
}

fn split_register_immediate(operands: &str) -> Option<(String, u32)> {
    let (register, value) = operands.split_once(',')?;
    let value = value.trim().strip_prefix('#')?;
    let value = crate::analysis::parse_number(value)?;
    Some((register.trim().to_string(), value as u32))
}
