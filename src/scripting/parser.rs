// Thu Jan 15 2026 - Alex

use super::command::{bind, command_name, Command};
use super::error::ParseError;
use std::collections::HashMap;

/// One executable line of a script.
#[derive(Debug, Clone)]
pub struct ScriptLine {
    pub line_number: usize,
    pub label: Option<String>,
    pub text: String,
    pub command: Command,
}

/// A parsed script: a flat sequence of commands plus label positions.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub lines: Vec<ScriptLine>,
    labels: HashMap<String, usize>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut script = Script::default();
        let mut pending: Option<(String, usize)> = None;
        let mut lines = source.lines().enumerate().map(|(i, l)| (i + 1, l));

        while let Some((line_number, raw)) = lines.next() {
            let text = strip_comment(raw).trim();
            if text.is_empty() {
                continue;
            }

            if let Some(label) = text.strip_suffix(':') {
                let label = label.trim();
                if label.is_empty() || label.contains(char::is_whitespace) {
                    return Err(ParseError::InvalidLabel {
                        line: line_number,
                        label: label.to_string(),
                    });
                }
                if pending.is_some() {
                    return Err(ParseError::LabelAlreadyAssigned {
                        line: line_number,
                        label: label.to_string(),
                    });
                }
                if script.labels.contains_key(label) {
                    return Err(ParseError::DuplicateLabel {
                        line: line_number,
                        label: label.to_string(),
                    });
                }
                pending = Some((label.to_string(), line_number));
                continue;
            }

            let name = command_name(text).unwrap_or_default();
            if is_block_end(&name) {
                return Err(ParseError::UnexpectedEndCode { line: line_number });
            }

            let body = if name.eq_ignore_ascii_case("PatchCode") {
                let mut body = Vec::new();
                loop {
                    match lines.next() {
                        Some((_, code)) if is_block_end(code.trim()) => break,
                        Some((_, code)) => body.push(code),
                        None => return Err(ParseError::UnterminatedCode { line: line_number }),
                    }
                }
                Some(body.join("\n"))
            } else {
                None
            };

            let command = bind(text, body).map_err(|source| ParseError::Command {
                line: line_number,
                source,
            })?;

            let label = pending.take().map(|(label, _)| label);
            if let Some(label) = &label {
                script.labels.insert(label.clone(), script.lines.len());
            }
            script.lines.push(ScriptLine {
                line_number,
                label,
                text: text.to_string(),
                command,
            });
        }

        // A trailing label marks the end of the script.
        if let Some((label, _)) = pending {
            script.labels.insert(label, script.lines.len());
        }

        Ok(script)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn label_position(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }
}

fn is_block_end(text: &str) -> bool {
    text.eq_ignore_ascii_case("EndCode") || text.eq_ignore_ascii_case("EndPatch")
}

/// Drops a `//` comment unless it sits inside a quoted string.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    let bytes = line.as_bytes();
    for i in 0..bytes.len() {
        match bytes[i] {
            b'\\' if in_string => {
                escaped = !escaped;
                continue;
            }
            b'"' if !escaped => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
        escaped = false;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_respect_strings() {
        assert_eq!(strip_comment("Log \"http://x\" // note"), "Log \"http://x\" ");
        assert_eq!(strip_comment("// all comment"), "");
        assert_eq!(strip_comment("Log \"a\\\"//b\""), "Log \"a\\\"//b\"");
    }

    #[test]
    fn test_labels_bind_to_next_command() {
        let script = Script::parse(
            "// header\n\nStart:\n  Log \"one\"\nLog \"two\"\nAgain:\n\n  // gap\nLog \"three\"\nEnd:\n",
        )
        .unwrap();
        assert_eq!(script.len(), 3);
        assert_eq!(script.label_position("Start"), Some(0));
        assert_eq!(script.label_position("Again"), Some(2));
        assert_eq!(script.label_position("End"), Some(3));
        assert_eq!(script.lines[2].line_number, 9);
        assert_eq!(script.lines[0].label.as_deref(), Some("Start"));
    }

    #[test]
    fn test_label_errors() {
        assert!(matches!(
            Script::parse("A:\nB:\nLog x"),
            Err(ParseError::LabelAlreadyAssigned { line: 2, .. })
        ));
        assert!(matches!(
            Script::parse("A:\nLog x\nA:\nLog y"),
            Err(ParseError::DuplicateLabel { line: 3, .. })
        ));
        assert!(matches!(
            Script::parse("My Label:\nLog x"),
            Err(ParseError::InvalidLabel { line: 1, .. })
        ));
    }

    #[test]
    fn test_patch_code_block_is_verbatim() {
        let script = Script::parse("PatchCode Thumb2\n    movs r0, #1 // keep\n    bx lr\nEndCode\nLog done").unwrap();
        assert_eq!(script.len(), 2);
        match &script.lines[0].command {
            Command::PatchCode { body, .. } => assert_eq!(body, "    movs r0, #1 // keep\n    bx lr"),
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            Script::parse("PatchCode\n  nop\n"),
            Err(ParseError::UnterminatedCode { line: 1 })
        ));
        assert!(matches!(Script::parse("EndPatch"), Err(ParseError::UnexpectedEndCode { line: 1 })));
    }

    #[test]
    fn test_unknown_command_reports_line() {
        match Script::parse("Log ok\nExplode now") {
            Err(ParseError::Command { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
