//! `config show` and `config init`.

use std::path::Path;

use batchline_config::{Settings, write_settings};

use crate::cli::{ConfigInitArgs, OutputFormat};
use crate::errors::{CliError, CliResult};
use crate::output::render_settings;

pub(crate) fn handle_config_show(settings: &Settings, format: OutputFormat) -> CliResult<()> {
    render_settings(settings, format)
}

pub(crate) fn handle_config_init(
    config_path: Option<&Path>,
    args: ConfigInitArgs,
) -> CliResult<()> {
    let path = args
        .path
        .or_else(|| config_path.map(Path::to_path_buf))
        .ok_or_else(|| CliError::validation("settings path is required (pass PATH or --config)"))?;
    if path.exists() && !args.force {
        return Err(CliError::validation(format!(
            "{} already exists; pass --force to replace it",
            path.display()
        )));
    }
    write_settings(&path, &Settings::default())?;
    println!("wrote default settings to {}", path.display());
    Ok(())
}
