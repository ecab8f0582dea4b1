// Fri Jan 16 2026 - Alex

use super::args::{AnalyzeArgs, ApplyArgs, Args, Command, RunArgs};
use crate::analysis::{CodeFlowAnalyzer, ListingCache};
use crate::config::Config;
use crate::image::{BinaryImage, PeImage};
use crate::patch::{apply_definition, ApplyOutcome, PatchStore};
use crate::scripting::ScriptRunner;
use crate::utils::hash::sha1_hex;
use crate::utils::{format_duration, LoggingUtils};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;

pub struct CommandHandler;

impl CommandHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, args: Args) -> anyhow::Result<()> {
        let level = LoggingUtils::level_from_str(&args.log_level);
        if args.no_color {
            colored::control::set_override(false);
            if !args.quiet {
                LoggingUtils::init_env_logger(level);
            }
        } else if !args.quiet {
            LoggingUtils::init_logger(level);
        }

        let config = match &args.config {
            Some(path) => Config::load(path).map_err(|e| anyhow::anyhow!(e))?,
            None => Config::default(),
        };

        match args.command {
            Command::Run(run_args) => self.handle_run(config, run_args),
            Command::Apply(apply_args) => self.handle_apply(config, apply_args),
            Command::Analyze(analyze_args) => self.handle_analyze(analyze_args),
        }
    }

    fn handle_run(&self, mut config: Config, args: RunArgs) -> anyhow::Result<()> {
        args.validate().map_err(|e| anyhow::anyhow!(e))?;

        if let Some(input) = args.input {
            config = config.with_input_root(input);
        }
        if let Some(output) = args.output {
            config = config.with_output_root(output);
        }
        if let Some(definitions) = args.definitions {
            config = config.with_definitions_path(definitions);
        }
        if let Some(dir) = args.listing_dir {
            config = config.with_listing_dir(dir);
        }
        if let Some(assembler) = args.assembler {
            config = config.with_assembler(assembler);
        }
        if let Some(timeout) = args.assembler_timeout {
            config = config.with_assembler_timeout(timeout);
        }
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        println!("{} Running {}", "[*]".blue(), args.script.display());
        let report = ScriptRunner::new(config).run_file(&args.script);

        if report.success {
            println!("{} Script completed", "[+]".green());
            Ok(())
        } else {
            let error = report.error.unwrap_or_else(|| "unknown error".to_string());
            Err(anyhow::anyhow!("Script failed: {}", error))
        }
    }

    fn handle_apply(&self, config: Config, args: ApplyArgs) -> anyhow::Result<()> {
        args.validate().map_err(|e| anyhow::anyhow!(e))?;

        let path = args
            .definitions
            .or(config.definitions_path)
            .ok_or_else(|| anyhow::anyhow!("No definitions file given"))?;
        let store = PatchStore::load(&path)?;
        let report = apply_definition(&store, &args.name, &args.root)?;

        for (file, outcome) in &report.files {
            let marker = match outcome {
                ApplyOutcome::Patched => "[+]".green(),
                ApplyOutcome::AlreadyPatched => "[=]".cyan(),
                ApplyOutcome::UnsupportedVersion => "[!]".red(),
            };
            println!("{} {}: {}", marker, file, outcome);
        }
        for file in &report.removed {
            println!("{} removed {}", "[-]".yellow(), file);
        }

        match &report.version {
            Some(version) => {
                println!("{} {} applied for version {}", "[+]".green(), report.definition, version);
                Ok(())
            }
            None => Err(anyhow::anyhow!("No version of {} matches these files", report.definition)),
        }
    }

    fn handle_analyze(&self, args: AnalyzeArgs) -> anyhow::Result<()> {
        let started = Instant::now();
        let image = PeImage::load(&args.binary)?;
        println!(
            "{} Loaded {} ({} sections, entry 0x{:08X})",
            "[*]".blue(),
            args.binary.display(),
            image.sections().len(),
            image.entry_point()
        );

        let code = CodeFlowAnalyzer::new(&image).analyze();
        if args.print {
            for instr in code.iter() {
                println!("{}", instr);
            }
        }

        let output = args.output.unwrap_or_else(|| {
            let mut path = args.binary.clone().into_os_string();
            path.push(".asm");
            PathBuf::from(path)
        });
        ListingCache::save(&code, &sha1_hex(image.data()), &output)?;

        println!(
            "{} {} instructions written to {} in {}",
            "[+]".green(),
            code.len(),
            output.display(),
            format_duration(started.elapsed())
        );
        Ok(())
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}
