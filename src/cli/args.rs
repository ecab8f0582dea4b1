// Fri Jan 16 2026 - Alex

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "thumb-patcher")]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Scripted binary patching for Thumb-2 PE images", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file; command line options override it.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a patch script and record its patches.
    Run(RunArgs),
    /// Apply a recorded patch definition to a directory of files.
    Apply(ApplyArgs),
    /// Disassemble an image and write its listing.
    Analyze(AnalyzeArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    pub script: PathBuf,

    #[arg(short, long)]
    pub input: Option<PathBuf>,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(short, long)]
    pub definitions: Option<PathBuf>,

    #[arg(long)]
    pub listing_dir: Option<PathBuf>,

    #[arg(long)]
    pub assembler: Option<PathBuf>,

    #[arg(long)]
    pub assembler_timeout: Option<u64>,
}

impl RunArgs {
    pub fn validate(&self) -> Result<(), String> {
        if !self.script.is_file() {
            return Err(format!("Script file does not exist: {:?}", self.script));
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// Name of the patch definition.
    pub name: String,

    #[arg(short, long)]
    pub definitions: Option<PathBuf>,

    /// Directory holding the files to patch.
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,
}

impl ApplyArgs {
    pub fn validate(&self) -> Result<(), String> {
        if !self.root.is_dir() {
            return Err(format!("Root directory does not exist: {:?}", self.root));
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    pub binary: PathBuf,

    /// Listing file to write; defaults to `<binary>.asm`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also print the listing.
    #[arg(long)]
    pub print: bool,
}
