// Thu Jan 15 2026 - Alex

use super::error::BindError;
use crate::analysis::{normalize_register_aliases, parse_number};
use crate::assembler::CodeType;
use crate::pattern::{tokenize, BytePattern, InstructionPattern, Token, TokenKind};
use crate::utils::hash::from_hex;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Where a search starts relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    First,
    Next,
    Previous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Address(u32),
    Symbol(String),
}

impl Target {
    fn parse(text: &str) -> Self {
        match parse_number(text) {
            Some(value) => Target::Address(value as u32),
            None => Target::Symbol(text.to_string()),
        }
    }
}

/// Requires the instruction that last wrote (or next reads) `register` to
/// match `pattern`.
#[derive(Debug, Clone)]
pub struct RegisterConstraint {
    pub register: String,
    pub pattern: Option<InstructionPattern>,
}

#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub pre: Option<RegisterConstraint>,
    pub post: Option<RegisterConstraint>,
}

#[derive(Debug, Clone)]
pub enum Command {
    PatchDefinition {
        name: String,
        version: String,
        relative_path: String,
        relative_output_path: String,
    },
    PatchFile { path: String },
    ClosePatchFile,
    WriteDefinitions,
    FindData { scope: Scope, pattern: BytePattern, description: String },
    FindInstructionPattern { scope: Scope, pattern: InstructionPattern, index: i64 },
    FindValue { scope: Scope, value: u32 },
    FindConditionalJump { scope: Scope },
    FindFunctionCall { scope: Scope, target: Target, constraints: Constraints },
    JumpToReference { target: Target, constraints: Constraints },
    JumpToImport { name: String },
    JumpToExport { name: String },
    JumpToTarget,
    JumpToAddress { address: u32 },
    JumpToLabel { name: String },
    JumpBack,
    CreateLabel { name: String },
    Go { label: String },
    IfFoundGo { label: String },
    IfNotFoundGo { label: String },
    IfFoundThrowError { message: String },
    IfNotFoundThrowError { message: String },
    MakeJumpUnconditional { mnemonic: String },
    PatchCode { code_type: CodeType, body: String },
    PatchBytes { bytes: Vec<u8> },
    PatchAscii { text: String },
    PatchUnicode { text: String },
    PatchChecksum,
    Log { message: String },
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub default: Option<&'static str>,
}

impl Param {
    fn accepts(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

fn req(name: &'static str) -> Param {
    Param { name, aliases: &[], default: None }
}

fn opt(name: &'static str, default: &'static str) -> Param {
    Param { name, aliases: &[], default: Some(default) }
}

type Builder = fn(&Arguments) -> Result<Command, BindError>;

pub struct CommandSpec {
    pub name: &'static str,
    pub params: Vec<Param>,
    build: Builder,
}

impl CommandSpec {
    fn new(name: &'static str, params: Vec<Param>, build: Builder) -> Self {
        Self { name, params, build }
    }
}

/// Parameter values after binding, defaults filled in.
pub struct Arguments<'a> {
    spec: &'a CommandSpec,
    values: Vec<Option<String>>,
    body: Option<String>,
}

impl<'a> Arguments<'a> {
    fn slot(&self, name: &'static str) -> Result<&str, BindError> {
        self.spec
            .params
            .iter()
            .position(|p| p.name == name)
            .and_then(|i| self.values[i].as_deref())
            .ok_or(BindError::MissingParameter { command: self.spec.name, name })
    }

    pub fn text(&self, name: &'static str) -> Result<String, BindError> {
        self.slot(name).map(str::to_string)
    }

    pub fn number(&self, name: &'static str) -> Result<i64, BindError> {
        let text = self.slot(name)?;
        parse_number(text).ok_or_else(|| BindError::InvalidValue {
            name,
            value: text.to_string(),
            reason: "expected a decimal or 0x number".to_string(),
        })
    }

    pub fn address(&self, name: &'static str) -> Result<u32, BindError> {
        let value = self.number(name)?;
        u32::try_from(value).map_err(|_| BindError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "out of range for a 32-bit address".to_string(),
        })
    }

    pub fn body(&self) -> String {
        self.body.clone().unwrap_or_default()
    }

    fn invalid(&self, name: &'static str, reason: impl ToString) -> BindError {
        BindError::InvalidValue {
            name,
            value: self.slot(name).unwrap_or_default().to_string(),
            reason: reason.to_string(),
        }
    }

    fn byte_pattern(&self, name: &'static str) -> Result<BytePattern, BindError> {
        BytePattern::from_ida_pattern(self.slot(name)?).map_err(|e| self.invalid(name, e))
    }

    fn literal_bytes(&self, name: &'static str) -> Result<Vec<u8>, BindError> {
        let compact: String = self.slot(name)?.chars().filter(|c| !c.is_whitespace()).collect();
        match from_hex(&compact) {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(self.invalid(name, "expected hex bytes")),
        }
    }

    fn instruction_pattern(&self, name: &'static str) -> Result<InstructionPattern, BindError> {
        InstructionPattern::parse(self.slot(name)?).map_err(|e| self.invalid(name, e))
    }

    fn constraint(&self, register: &'static str, pattern: &'static str) -> Result<Option<RegisterConstraint>, BindError> {
        let reg = self.slot(register)?.trim().to_lowercase();
        if reg.is_empty() {
            return Ok(None);
        }
        let pattern = match self.slot(pattern)?.trim() {
            "" => None,
            _ => Some(self.instruction_pattern(pattern)?),
        };
        Ok(Some(RegisterConstraint {
            register: normalize_register_aliases(&reg),
            pattern,
        }))
    }

    fn constraints(&self) -> Result<Constraints, BindError> {
        Ok(Constraints {
            pre: self.constraint("PreRegister", "PrePattern")?,
            post: self.constraint("PostRegister", "PostPattern")?,
        })
    }
}

fn call_params() -> Vec<Param> {
    vec![
        req("Target"),
        opt("PreRegister", ""),
        opt("PrePattern", ""),
        opt("PostRegister", ""),
        opt("PostPattern", ""),
    ]
}

fn all_commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new(
            "PatchDefinition",
            vec![
                req("Name"),
                Param { name: "Version", aliases: &["VersionFrom"], default: None },
                opt("RelativePath", ""),
                opt("RelativeOutputPath", ""),
            ],
            |a| {
                Ok(Command::PatchDefinition {
                    name: a.text("Name")?,
                    version: a.text("Version")?,
                    relative_path: a.text("RelativePath")?,
                    relative_output_path: a.text("RelativeOutputPath")?,
                })
            },
        ),
        CommandSpec::new("PatchFile", vec![req("Path")], |a| Ok(Command::PatchFile { path: a.text("Path")? })),
        CommandSpec::new("ClosePatchFile", vec![], |_| Ok(Command::ClosePatchFile)),
        CommandSpec::new("WriteDefinitions", vec![], |_| Ok(Command::WriteDefinitions)),
        CommandSpec::new("FindFirstAscii", vec![req("Text")], |a| find_text(a, Scope::First, false)),
        CommandSpec::new("FindNextAscii", vec![req("Text")], |a| find_text(a, Scope::Next, false)),
        CommandSpec::new("FindFirstUnicode", vec![req("Text")], |a| find_text(a, Scope::First, true)),
        CommandSpec::new("FindNextUnicode", vec![req("Text")], |a| find_text(a, Scope::Next, true)),
        CommandSpec::new("FindFirstBytes", vec![req("Bytes")], |a| find_bytes(a, Scope::First)),
        CommandSpec::new("FindNextBytes", vec![req("Bytes")], |a| find_bytes(a, Scope::Next)),
        CommandSpec::new("FindFirstInstructionPattern", vec![req("Pattern"), opt("Index", "0")], |a| {
            find_pattern(a, Scope::First)
        }),
        CommandSpec::new("FindNextInstructionPattern", vec![req("Pattern"), opt("Index", "0")], |a| {
            find_pattern(a, Scope::Next)
        }),
        CommandSpec::new("FindPreviousInstructionPattern", vec![req("Pattern"), opt("Index", "0")], |a| {
            find_pattern(a, Scope::Previous)
        }),
        CommandSpec::new("FindValue", vec![req("Value")], |a| find_value(a, Scope::First)),
        CommandSpec::new("FindNextValue", vec![req("Value")], |a| find_value(a, Scope::Next)),
        CommandSpec::new("FindPreviousValue", vec![req("Value")], |a| find_value(a, Scope::Previous)),
        CommandSpec::new("FindNextConditionalJump", vec![], |_| {
            Ok(Command::FindConditionalJump { scope: Scope::Next })
        }),
        CommandSpec::new("FindPreviousConditionalJump", vec![], |_| {
            Ok(Command::FindConditionalJump { scope: Scope::Previous })
        }),
        CommandSpec::new("FindNextFunctionCall", call_params(), |a| find_call(a, Scope::Next)),
        CommandSpec::new("FindPreviousFunctionCall", call_params(), |a| find_call(a, Scope::Previous)),
        CommandSpec::new("JumpToReference", call_params(), |a| {
            Ok(Command::JumpToReference {
                target: Target::parse(&a.text("Target")?),
                constraints: a.constraints()?,
            })
        }),
        CommandSpec::new("JumpToImport", vec![req("Name")], |a| Ok(Command::JumpToImport { name: a.text("Name")? })),
        CommandSpec::new("JumpToExport", vec![req("Name")], |a| Ok(Command::JumpToExport { name: a.text("Name")? })),
        CommandSpec::new("JumpToTarget", vec![], |_| Ok(Command::JumpToTarget)),
        CommandSpec::new("JumpToAddress", vec![req("Address")], |a| {
            Ok(Command::JumpToAddress { address: a.address("Address")? })
        }),
        CommandSpec::new("JumpToLabel", vec![req("Name")], |a| Ok(Command::JumpToLabel { name: a.text("Name")? })),
        CommandSpec::new("JumpBack", vec![], |_| Ok(Command::JumpBack)),
        CommandSpec::new("CreateLabel", vec![req("Name")], |a| Ok(Command::CreateLabel { name: a.text("Name")? })),
        CommandSpec::new("Go", vec![req("Label")], |a| Ok(Command::Go { label: a.text("Label")? })),
        CommandSpec::new("IfFoundGo", vec![req("Label")], |a| Ok(Command::IfFoundGo { label: a.text("Label")? })),
        CommandSpec::new("IfNotFoundGo", vec![req("Label")], |a| Ok(Command::IfNotFoundGo { label: a.text("Label")? })),
        CommandSpec::new("IfFoundThrowError", vec![req("Message")], |a| {
            Ok(Command::IfFoundThrowError { message: a.text("Message")? })
        }),
        CommandSpec::new("IfNotFoundThrowError", vec![req("Message")], |a| {
            Ok(Command::IfNotFoundThrowError { message: a.text("Message")? })
        }),
        CommandSpec::new("MakeJumpUnconditional", vec![req("Mnemonic")], |a| {
            Ok(Command::MakeJumpUnconditional { mnemonic: a.text("Mnemonic")?.to_lowercase() })
        }),
        CommandSpec::new("PatchCode", vec![opt("CodeType", "Thumb2")], |a| {
            let code_type = a.text("CodeType")?.parse().map_err(|e| a.invalid("CodeType", e))?;
            Ok(Command::PatchCode { code_type, body: a.body() })
        }),
        CommandSpec::new("PatchBytes", vec![req("Bytes")], |a| Ok(Command::PatchBytes { bytes: a.literal_bytes("Bytes")? })),
        CommandSpec::new("PatchAscii", vec![req("Text")], |a| Ok(Command::PatchAscii { text: a.text("Text")? })),
        CommandSpec::new("PatchUnicode", vec![req("Text")], |a| Ok(Command::PatchUnicode { text: a.text("Text")? })),
        CommandSpec::new("PatchChecksum", vec![], |_| Ok(Command::PatchChecksum)),
        CommandSpec::new("Log", vec![req("Message")], |a| Ok(Command::Log { message: a.text("Message")? })),
    ]
}

fn find_text(a: &Arguments, scope: Scope, unicode: bool) -> Result<Command, BindError> {
    let text = a.text("Text")?;
    let pattern = if unicode {
        BytePattern::from_unicode(&text)
    } else {
        BytePattern::from_ascii(&text)
    };
    if pattern.is_empty() {
        return Err(a.invalid("Text", "empty search text"));
    }
    Ok(Command::FindData {
        scope,
        pattern,
        description: format!("\"{}\"", text),
    })
}

fn find_bytes(a: &Arguments, scope: Scope) -> Result<Command, BindError> {
    let pattern = a.byte_pattern("Bytes")?;
    Ok(Command::FindData {
        scope,
        description: pattern.to_string(),
        pattern,
    })
}

fn find_pattern(a: &Arguments, scope: Scope) -> Result<Command, BindError> {
    Ok(Command::FindInstructionPattern {
        scope,
        pattern: a.instruction_pattern("Pattern")?,
        index: a.number("Index")?,
    })
}

fn find_value(a: &Arguments, scope: Scope) -> Result<Command, BindError> {
    Ok(Command::FindValue {
        scope,
        value: a.number("Value")? as u32,
    })
}

fn find_call(a: &Arguments, scope: Scope) -> Result<Command, BindError> {
    Ok(Command::FindFunctionCall {
        scope,
        target: Target::parse(&a.text("Target")?),
        constraints: a.constraints()?,
    })
}

static REGISTRY: Lazy<HashMap<String, CommandSpec>> = Lazy::new(|| {
    all_commands()
        .into_iter()
        .map(|spec| (spec.name.to_lowercase(), spec))
        .collect()
});

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    REGISTRY.get(&name.to_lowercase())
}

pub fn command_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.values().map(|spec| spec.name).collect();
    names.sort_unstable();
    names
}

fn is_value(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Text | TokenKind::Number)
}

/// Name of the command on a line, if the line starts with one.
pub fn command_name(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let name: String = first
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Tokenizes a command line and binds its parameters to the registered command.
///
/// Parameters are single tokens separated by commas or whitespace; a quoted
/// string is one token. `Name=value` binds by name, case-insensitively.
pub fn bind(text: &str, body: Option<String>) -> Result<Command, BindError> {
    let tokens = tokenize(text)?;
    let (head, rest) = match tokens.split_first() {
        Some((head, rest)) if head.kind == TokenKind::Text && !head.quoted => (head, rest),
        Some((head, _)) => return Err(BindError::MissingCommand(head.to_string())),
        None => return Err(BindError::MissingCommand(String::new())),
    };
    let spec = lookup(&head.text).ok_or_else(|| BindError::UnknownCommand(head.text.clone()))?;

    let mut values: Vec<Option<String>> = vec![None; spec.params.len()];
    let mut positional = 0;
    let mut named = false;
    let mut i = 0;

    while i < rest.len() {
        let token = &rest[i];
        if token.kind == TokenKind::Separator {
            i += 1;
            continue;
        }

        let is_named = token.kind == TokenKind::Text
            && !token.quoted
            && rest.get(i + 1).map_or(false, |t| t.is(TokenKind::Operator, "="));
        if is_named {
            let value = rest
                .get(i + 2)
                .filter(|t| is_value(t))
                .ok_or_else(|| BindError::UnexpectedToken(format!("{}=", token.text)))?;
            let index = spec
                .params
                .iter()
                .position(|p| p.accepts(&token.text))
                .ok_or_else(|| BindError::UnknownParameter {
                    command: spec.name,
                    name: token.text.clone(),
                })?;
            if values[index].is_some() {
                return Err(BindError::DuplicateParameter {
                    command: spec.name,
                    name: spec.params[index].name,
                });
            }
            values[index] = Some(value.text.clone());
            named = true;
            i += 3;
            continue;
        }

        if !is_value(token) {
            return Err(BindError::UnexpectedToken(token.to_string()));
        }
        if named {
            return Err(BindError::PositionalAfterNamed(spec.name));
        }
        if positional >= spec.params.len() {
            return Err(BindError::TooManyParameters {
                command: spec.name,
                max: spec.params.len(),
            });
        }
        values[positional] = Some(token.text.clone());
        positional += 1;
        i += 1;
    }

    for (value, param) in values.iter_mut().zip(&spec.params) {
        if value.is_none() {
            match param.default {
                Some(default) => *value = Some(default.to_string()),
                None => {
                    return Err(BindError::MissingParameter {
                        command: spec.name,
                        name: param.name,
                    })
                }
            }
        }
    }

    (spec.build)(&Arguments { spec, values, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        assert!(matches!(bind("closepatchfile", None).unwrap(), Command::ClosePatchFile));
        assert!(matches!(bind("Frobnicate 1", None), Err(BindError::UnknownCommand(name)) if name == "Frobnicate"));
        assert!(command_names().contains(&"MakeJumpUnconditional"));
    }

    #[test]
    fn test_positional_named_and_defaults() {
        match bind(r#"PatchDefinition "Unlock", versionfrom="8.10", RelativeOutputPath="out\%VERSION%""#, None).unwrap() {
            Command::PatchDefinition { name, version, relative_path, relative_output_path } => {
                assert_eq!(name, "Unlock");
                assert_eq!(version, "8.10");
                assert_eq!(relative_path, "");
                assert_eq!(relative_output_path, "out\\%VERSION%");
            }
            other => panic!("unexpected {:?}", other),
        }

        match bind("FindNextInstructionPattern \"cmp r?, 0; bne ?\"", None).unwrap() {
            Command::FindInstructionPattern { scope, pattern, index } => {
                assert_eq!(scope, Scope::Next);
                assert_eq!(pattern.len(), 2);
                assert_eq!(index, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_binding_errors() {
        assert!(matches!(
            bind("PatchFile Path=\"a\", Bogus=1", None),
            Err(BindError::UnknownParameter { .. })
        ));
        assert!(matches!(
            bind("PatchFile \"a\" \"b\"", None),
            Err(BindError::TooManyParameters { max: 1, .. })
        ));
        assert!(matches!(
            bind("FindValue", None),
            Err(BindError::MissingParameter { name: "Value", .. })
        ));
        assert!(matches!(
            bind("FindFirstInstructionPattern Index=1 \"bl\"", None),
            Err(BindError::PositionalAfterNamed(_))
        ));
        assert!(matches!(
            bind("JumpToAddress Address=0x10 address=0x20", None),
            Err(BindError::DuplicateParameter { .. })
        ));
        assert!(matches!(bind("JumpToAddress zz", None), Err(BindError::InvalidValue { .. })));
        assert!(matches!(bind("PatchBytes \"12 ??\"", None), Err(BindError::InvalidValue { .. })));
    }

    #[test]
    fn test_typed_values() {
        match bind("JumpToAddress 0x10001000", None).unwrap() {
            Command::JumpToAddress { address } => assert_eq!(address, 0x10001000),
            other => panic!("unexpected {:?}", other),
        }
        match bind("PatchBytes \"00 BF 70 47\"", None).unwrap() {
            Command::PatchBytes { bytes } => assert_eq!(bytes, vec![0x00, 0xBF, 0x70, 0x47]),
            other => panic!("unexpected {:?}", other),
        }
        match bind("FindNextFunctionCall CreateFileW, PreRegister=R0, PrePattern=\"mov r?, ?\"", None).unwrap() {
            Command::FindFunctionCall { target, constraints, .. } => {
                assert_eq!(target, Target::Symbol("CreateFileW".to_string()));
                assert_eq!(constraints.pre.unwrap().register, "r0");
                assert!(constraints.post.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        match bind("PatchCode ARM", Some("nop".to_string())).unwrap() {
            Command::PatchCode { code_type, body } => {
                assert_eq!(code_type, CodeType::Arm);
                assert_eq!(body, "nop");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
