// Tue Jan 13 2026 - Alex

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static REGISTER_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(sb|sl|fp|ip)\b").unwrap());
static LITERAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(-?(?:0[xX][0-9a-fA-F]+|[0-9]+))\s*$").unwrap());

const CONDITIONS: [&str; 16] = [
    "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le",
];

/// One decoded Thumb instruction as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: u32,
    pub bytes: Vec<u8>,
    pub mnemonic: String,
    pub operands: String,
}

impl Instruction {
    pub fn new(address: u32, bytes: Vec<u8>, mnemonic: &str, operands: &str) -> Self {
        Self {
            address,
            bytes,
            mnemonic: mnemonic.to_string(),
            operands: operands.to_string(),
        }
    }

    pub fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Address of the byte following this instruction.
    pub fn end(&self) -> u32 {
        self.address.wrapping_add(self.size())
    }

    /// Mnemonic and operands as one line, the form patterns are matched against.
    pub fn text(&self) -> String {
        if self.operands.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, self.operands)
        }
    }

    /// Mnemonic without a trailing `.w` / `.n` width qualifier.
    pub fn base_mnemonic(&self) -> &str {
        self.mnemonic
            .strip_suffix(".w")
            .or_else(|| self.mnemonic.strip_suffix(".n"))
            .unwrap_or(&self.mnemonic)
    }

    pub fn is_jump(&self) -> bool {
        is_jump_mnemonic(&self.mnemonic)
    }

    pub fn is_conditional_jump(&self) -> bool {
        is_conditional_jump_mnemonic(&self.mnemonic)
    }

    pub fn is_call(&self) -> bool {
        matches!(self.base_mnemonic(), "bl" | "blx")
    }

    /// Absolute target of a direct branch.
    pub fn branch_target(&self) -> Option<u32> {
        if !self.is_jump() {
            return None;
        }
        self.literal_value()
    }

    /// The literal carried as a trailing `#0xNN` / `#NN` operand.
    pub fn literal_value(&self) -> Option<u32> {
        let caps = LITERAL_SUFFIX.captures(&self.operands)?;
        parse_number(caps.get(1)?.as_str()).map(|v| v as u32)
    }

    /// Operand fields split on top-level commas (brackets and braces kept intact).
    pub fn operand_fields(&self) -> Vec<String> {
        split_operands(&self.operands)
    }

    /// Destination register for instructions whose first operand is written.
    pub fn written_register(&self) -> Option<String> {
        let base = self.base_mnemonic();
        if base.starts_with("st")
            || base.starts_with("cmp")
            || base.starts_with("cmn")
            || base.starts_with("tst")
            || base.starts_with("teq")
            || base.starts_with("push")
            || base.starts_with("it")
            || self.is_jump()
            || base == "bx"
        {
            return None;
        }
        let first = self.operand_fields().into_iter().next()?;
        let reg = first.trim_end_matches('!').to_string();
        if is_register(&reg) {
            Some(reg)
        } else {
            None
        }
    }

    /// Whether `register` is used as a source operand.
    pub fn reads_register(&self, register: &str) -> bool {
        let fields = self.operand_fields();
        let skip = if self.written_register().is_some() { 1 } else { 0 };
        fields
            .iter()
            .skip(skip)
            .any(|field| contains_register(field, register))
    }

    /// Rewrites `sb`, `sl`, `fp` and `ip` to their numbered register names.
    pub fn normalize_register_aliases(&mut self) {
        if REGISTER_ALIAS.is_match(&self.operands) {
            self.operands = normalize_register_aliases(&self.operands);
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}: {}", self.address, self.text())
    }
}

pub fn normalize_register_aliases(operands: &str) -> String {
    REGISTER_ALIAS
        .replace_all(operands, |caps: &regex::Captures| {
            match &caps[1] {
                "sb" => "r9",
                "sl" => "r10",
                "fp" => "r11",
                _ => "r12",
            }
            .to_string()
        })
        .into_owned()
}

pub fn is_jump_mnemonic(mnemonic: &str) -> bool {
    let base = mnemonic.strip_suffix(".w").unwrap_or(mnemonic);
    matches!(base, "b" | "bl" | "blx") || is_conditional_jump_mnemonic(mnemonic)
}

pub fn is_conditional_jump_mnemonic(mnemonic: &str) -> bool {
    let base = mnemonic.strip_suffix(".w").unwrap_or(mnemonic);
    if base == "cbz" || base == "cbnz" {
        return true;
    }
    match base.strip_prefix('b') {
        Some(cond) => CONDITIONS.contains(&cond),
        None => false,
    }
}

pub fn is_register(text: &str) -> bool {
    match text {
        "sp" | "lr" | "pc" | "sb" | "sl" | "fp" | "ip" => true,
        _ => text
            .strip_prefix('r')
            .and_then(|n| n.parse::<u8>().ok())
            .map(|n| n <= 15)
            .unwrap_or(false),
    }
}

/// Parses decimal or `0x` hex, with an optional leading minus.
pub fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

fn split_operands(operands: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in operands.chars() {
        match c {
            '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        fields.push(current.trim().to_string());
    }
    fields
}

fn contains_register(field: &str, register: &str) -> bool {
    field
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == register)
}
