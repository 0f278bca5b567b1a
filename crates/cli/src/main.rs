use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use exif_rename_core::{
    app_paths, execute_plan, generate_plan, load_config, persist_undo, renamer_for, undo_last,
    ConfigSettings, ErrorAction, ErrorPrompt, ExecutionReport, ExecutionResult, ExecutionStatus,
    PlanOptions, PlanStep, RenameOperation, RenamePlan,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "exif-rename-cli", version)]
#[command(about = "Batch rename image files after the date they were taken")]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "FILE", required_unless_present = "undo")]
    files: Vec<PathBuf>,

    /// Comma separated sources tried in order: exif, file-name, file-created, file-modified
    #[arg(long, help_heading = "Date options")]
    date_source: Option<String>,
    /// strftime pattern for the new file names
    #[arg(long, help_heading = "Date options")]
    date_format: Option<String>,
    /// strftime pattern used to read dates from existing file names
    #[arg(long, help_heading = "Date options")]
    source_name_format: Option<String>,

    /// External command used instead of a plain rename ({source}/{target} or appended)
    #[arg(long, help_heading = "Program execution")]
    mv_cmd: Option<String>,
    /// Ask how to proceed when a rename fails
    #[arg(long, default_value_t = false, help_heading = "Program execution")]
    pause_on_error: bool,
    /// Print the planned renames without changing any file
    #[arg(
        long,
        visible_alias = "dry-run",
        default_value_t = false,
        help_heading = "Program execution"
    )]
    simulate: bool,
    /// Descend into subdirectories of directory arguments
    #[arg(long, default_value_t = false, help_heading = "Program execution")]
    recursive: bool,
    /// Include hidden files found in directory arguments
    #[arg(long, default_value_t = false, help_heading = "Program execution")]
    include_hidden: bool,
    /// Config file (defaults to $EXIF_RENAME_CONF or the user config directory)
    #[arg(long, value_name = "PATH", help_heading = "Program execution")]
    config: Option<PathBuf>,
    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Table,
        help_heading = "Program execution"
    )]
    output: OutputFormat,
    /// Restore the names changed by the last run
    #[arg(
        long,
        default_value_t = false,
        conflicts_with = "simulate",
        help_heading = "Program execution"
    )]
    undo: bool,
    /// Verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    if cli.undo {
        return cmd_undo(&cli);
    }
    cmd_rename(&cli)
}

fn overrides(cli: &Cli) -> ConfigSettings {
    ConfigSettings {
        date_format: cli.date_format.clone(),
        date_source: cli.date_source.clone(),
        source_name_format: cli.source_name_format.clone(),
        pause_on_error: cli.pause_on_error.then_some(true),
        mv_cmd: cli.mv_cmd.clone(),
    }
}

fn cmd_rename(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref(), overrides(cli))?;
    log::debug!("effective configuration: {:?}", config);

    let options = PlanOptions {
        inputs: cli.files.clone(),
        recursive: cli.recursive,
        include_hidden: cli.include_hidden,
        ..PlanOptions::default()
    };
    let plan = generate_plan(&config, &options);

    if cli.simulate {
        match cli.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            OutputFormat::Table => print_plan(&plan),
        }
        eprintln!("simulation: no files were changed");
        return Ok(ExitCode::SUCCESS);
    }

    let mut renamer = renamer_for(config.mv_cmd.as_deref())?;
    let mut console = ConsolePrompt;
    let prompt = config
        .pause_on_error
        .then_some(&mut console as &mut dyn ErrorPrompt);
    let report = execute_plan(&plan, renamer.as_mut(), prompt);

    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }

    let mut failed = report.has_failures();
    let completed = report.completed_operations();
    if !completed.is_empty() {
        if let Err(err) = save_undo_journal(&completed) {
            log::error!("{err:#}");
            failed = true;
        }
    }

    if failed {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn save_undo_journal(completed: &[RenameOperation]) -> Result<()> {
    persist_undo(&app_paths()?.undo_path, completed)
        .context("renames are done but the undo journal was not saved")
}

fn cmd_undo(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref(), overrides(cli))?;
    let mut renamer = renamer_for(config.mv_cmd.as_deref())?;
    let result = undo_last(&app_paths()?.undo_path, renamer.as_mut())?;
    println!("restored: {}", result.restored);
    Ok(ExitCode::SUCCESS)
}

fn print_plan(plan: &RenamePlan) {
    for step in &plan.steps {
        match step {
            PlanStep::Rename(c) if c.changed => println!(
                "{} -({})-> {}",
                c.original_path.display(),
                c.date_source,
                c.target_path.display()
            ),
            PlanStep::Rename(c) => println!("{} (unchanged)", c.original_path.display()),
            PlanStep::Skip(s) => println!("{} (skipped: {})", s.path.display(), s.reason),
        }
    }

    println!(
        "\nsummary: inputs={} files={} planned={} unchanged={} skipped={}",
        plan.stats.inputs,
        plan.stats.files,
        plan.stats.planned,
        plan.stats.unchanged,
        plan.stats.skipped
    );
}

fn print_report(report: &ExecutionReport) {
    for result in &report.results {
        if result.status == ExecutionStatus::Failed {
            println!(
                "{} (failed: {})",
                result.source_path.display(),
                result.error_detail.as_deref().unwrap_or("unknown error")
            );
        }
    }
    for op in &report.rolled_back {
        println!("{} -> {} (rolled back)", op.to.display(), op.from.display());
    }

    println!(
        "\nsummary: renamed={} unchanged={} skipped={} failed={} rolled_back={}",
        report.count(ExecutionStatus::Renamed),
        report.count(ExecutionStatus::Unchanged),
        report.count(ExecutionStatus::Skipped),
        report.count(ExecutionStatus::Failed),
        report.rolled_back.len()
    );
}

struct ConsolePrompt;

impl ErrorPrompt for ConsolePrompt {
    fn on_error(&mut self, failed: &ExecutionResult) -> ErrorAction {
        let stdin = io::stdin();
        loop {
            eprint!(
                "Renaming {} failed: {}\n[c]ontinue, [a]bort, [r]oll back? ",
                failed.source_path.display(),
                failed.error_detail.as_deref().unwrap_or("unknown error")
            );
            let _ = io::stderr().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return ErrorAction::Abort,
                Ok(_) => {}
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "" | "c" | "continue" => return ErrorAction::Continue,
                "a" | "abort" => return ErrorAction::Abort,
                "r" | "rollback" => return ErrorAction::Rollback,
                _ => continue,
            }
        }
    }
}
