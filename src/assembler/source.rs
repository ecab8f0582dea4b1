// Wed Jan 14 2026 - Alex

use super::CodeType;
use crate::analysis::parse_number;
use once_cell::sync::Lazy;
use regex::Regex;

pub const ORIGIN_LABEL: &str = "patch_origin";

static BRANCH_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\s*(?:b|bl|blx|b(?:eq|ne|cs|hs|cc|lo|mi|pl|vs|vc|hi|ls|ge|lt|gt|le|al)|cbz|cbnz)(?:\.w|\.n)?\s+(?:r\d+\s*,\s*)?)#?(0x[0-9a-f]+)\s*$").unwrap()
});
static EQU_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\s*[A-Za-z_]\w*\s+EQU\s+)(0x[0-9a-f]+)\s*$").unwrap());

/// Assembler input for a fragment anchored at `origin`, plus the number of
/// padding bytes placed ahead of it.
///
/// Absolute branch targets and label addresses are rewritten relative to the
/// origin label. When any of them lies below `origin`, a `SPACE` block is
/// emitted first so the expression stays inside the area; it keeps the
/// origin's word alignment.
pub fn build_source(origin: u32, code_type: CodeType, body: &str) -> (String, u32) {
    let mut lowest = origin;
    let mut lines = Vec::new();

    for line in body.lines() {
        let rewritten = [&*BRANCH_TARGET, &*EQU_ADDRESS].iter().find_map(|re| {
            let caps = re.captures(line)?;
            let target = parse_number(&caps[2])? as u32;
            lowest = lowest.min(target);
            Some(format!("{}{}", &caps[1], relative(origin, target)))
        });
        lines.push(rewritten.unwrap_or_else(|| line.to_string()));
    }

    let padding = padding_for(origin, lowest);

    let mut source = String::new();
    source.push_str("    AREA |.text|, CODE, READONLY\n");
    source.push_str(&format!("    {}\n", code_type.directive()));
    if padding > 0 {
        source.push_str(&format!("    SPACE {}\n", padding));
    }
    source.push_str(ORIGIN_LABEL);
    source.push('\n');
    for line in lines {
        source.push_str(&line);
        source.push('\n');
    }
    source.push_str("    END\n");

    (source, padding)
}

fn relative(origin: u32, target: u32) -> String {
    if target >= origin {
        format!("{} + 0x{:X}", ORIGIN_LABEL, target - origin)
    } else {
        format!("{} - 0x{:X}", ORIGIN_LABEL, origin - target)
    }
}

fn padding_for(origin: u32, lowest: u32) -> u32 {
    if lowest >= origin {
        return 0;
    }
    let base = origin - lowest;
    base + ((origin % 4) + 4 - base % 4) % 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_targets_need_no_padding() {
        let (source, padding) = build_source(0x10001000, CodeType::Thumb2, "    bl 0x10002000\n    movs r0, #0");
        assert_eq!(padding, 0);
        assert!(source.contains("bl patch_origin + 0x1000"));
        assert!(source.contains("movs r0, #0"));
        assert!(source.contains("    THUMB\n"));
        assert!(!source.contains("SPACE"));
    }

    #[test]
    fn test_data_processing_immediates_untouched() {
        let (source, padding) = build_source(0x10001000, CodeType::Thumb2, "    bic r0, #0x10");
        assert_eq!(padding, 0);
        assert!(source.contains("    bic r0, #0x10\n"));
    }

    #[test]
    fn test_backward_targets_are_padded() {
        let body = "Helper EQU 0x10000F00\n    b.w #0x10000F80\n    bl Helper";
        let (source, padding) = build_source(0x10001002, CodeType::Thumb2, body);
        assert_eq!(padding, 0x102);
        assert_eq!(padding % 4, 0x10001002 % 4);
        assert!(source.contains("SPACE 258"));
        assert!(source.contains("Helper EQU patch_origin - 0x102"));
        assert!(source.contains("b.w patch_origin - 0x82"));
    }

    #[test]
    fn test_arm_directive() {
        let (source, _) = build_source(0x1000, CodeType::Arm, "nop");
        assert!(source.contains("    ARM\n"));
    }
}
