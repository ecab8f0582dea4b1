// Thu Jan 15 2026 - Alex

//! The patch script language: a flat list of commands with labels, run by an
//! [`Interpreter`] over an explicit [`InterpreterContext`].

pub mod command;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod runner;

pub use command::{bind, command_names, Command, Scope, Target};
pub use context::{ActiveDefinition, InterpreterContext, OpenFile};
pub use error::{BindError, ExecutionError, ParseError, ScriptError};
pub use interpreter::Interpreter;
pub use parser::{Script, ScriptLine};
pub use runner::{ScriptReport, ScriptRunner};
