//! Argument parsing, settings resolution, and command dispatch.

use std::ffi::OsString;
use std::path::PathBuf;

use batchline_config::{ConflictPolicy, Settings, SettingsLoader};
use batchline_core::describe_error;
use batchline_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig, init_logging};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::commands::config::{handle_config_init, handle_config_show};
use crate::commands::run::handle_run;
use crate::errors::CliResult;

/// Parses process arguments, executes the requested command, and returns the
/// process exit code.
pub async fn run() -> i32 {
    run_from(std::env::args_os()).await
}

/// Same as [`run`] with explicit arguments (the first one is the binary name).
pub async fn run_from<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };
    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    let settings = load_settings(&cli)?;
    install_logging(&cli, &settings);
    let _context = GlobalContextGuard::new(command_label(&cli.command));

    match cli.command {
        Command::Run(args) => handle_run(&settings, args, cli.output).await,
        Command::Config(ConfigCommand::Show) => handle_config_show(&settings, cli.output),
        Command::Config(ConfigCommand::Init(args)) => {
            handle_config_init(cli.config.as_deref(), args)
        }
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let loader = match (&cli.command, &cli.config) {
        (Command::Config(ConfigCommand::Init(_)), _) | (_, None) => SettingsLoader::new(),
        (_, Some(path)) => SettingsLoader::with_file(path),
    };
    Ok(loader.load()?)
}

fn install_logging(cli: &Cli, settings: &Settings) {
    let defaults = LoggingConfig::default();
    let config = LoggingConfig {
        level: cli
            .log_level
            .as_deref()
            .unwrap_or(settings.logging.level.as_str()),
        format: LogFormat::from_name(
            cli.log_format
                .as_deref()
                .or(settings.logging.format.as_deref()),
        ),
        build_sha: defaults.build_sha,
    };
    if let Err(err) = init_logging(&config) {
        eprintln!("warning: {}", describe_error(&err));
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Run(_) => "run",
        Command::Config(ConfigCommand::Show) => "config_show",
        Command::Config(ConfigCommand::Init(_)) => "config_init",
    }
}

fn parse_policy(raw: &str) -> Result<ConflictPolicy, String> {
    raw.parse()
        .map_err(|_| format!("expected one of ask, skip, overwrite, rename, cancel (got {raw:?})"))
}

#[derive(Parser, Debug)]
#[command(
    name = "batchline",
    version,
    about = "Process batches of files with bounded concurrency"
)]
pub(crate) struct Cli {
    #[arg(long, global = true, env = "BATCHLINE_CONFIG", help = "Settings document (JSON)")]
    pub(crate) config: Option<PathBuf>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[arg(long, global = true, help = "Override the configured log level")]
    pub(crate) log_level: Option<String>,
    #[arg(
        long,
        global = true,
        value_parser = ["json", "pretty"],
        help = "Override the configured log format"
    )]
    pub(crate) log_format: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Process files into an output directory.
    Run(RunArgs),
    /// Inspect or create the settings document.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigCommand {
    /// Print the effective settings (document, environment, defaults).
    Show,
    /// Write a settings document with default values.
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub(crate) struct RunArgs {
    #[arg(required = true, help = "Input files, dispatched in the given order")]
    pub(crate) files: Vec<PathBuf>,
    #[arg(long, short = 'd', help = "Directory that receives the outputs")]
    pub(crate) output_dir: PathBuf,
    #[arg(long, help = "Replace the extension of every output")]
    pub(crate) extension: Option<String>,
    #[arg(long, short = 'j', help = "Number of items processed at once (1-64)")]
    pub(crate) max_concurrency: Option<usize>,
    #[arg(
        long,
        value_parser = parse_policy,
        help = "Conflict handling: ask, skip, overwrite, rename, cancel"
    )]
    pub(crate) on_conflict: Option<ConflictPolicy>,
    #[arg(
        long,
        help = "External command template, e.g. \"ffmpeg -y -i {input} {output}\"; files are copied when omitted"
    )]
    pub(crate) command: Option<String>,
    #[arg(long, help = "Print item progress to stderr")]
    pub(crate) progress: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ConfigInitArgs {
    #[arg(help = "Where to write the document (defaults to --config)")]
    pub(crate) path: Option<PathBuf>,
    #[arg(long, help = "Replace an existing document")]
    pub(crate) force: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}
