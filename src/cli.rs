//! CLI parsing.

use std::path::PathBuf;

use clap::Parser;

/// sbx - run commands under filesystem and network restrictions
#[derive(Parser, Debug)]
#[command(name = "sbx")]
#[command(about = "Run a command under declarative filesystem and network restrictions")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Path to settings file (default: ~/.sbx-settings.json)
    #[arg(short = 's', long = "settings")]
    pub settings: Option<PathBuf>,

    /// Run command string directly (shell -c mode)
    #[arg(short = 'c')]
    pub command: Option<String>,

    /// Shell to run the command under (default: bash)
    #[arg(long = "shell")]
    pub shell: Option<String>,

    /// Read policy updates from a file descriptor (JSON lines)
    #[arg(long = "control-fd")]
    pub control_fd: Option<i32>,

    /// Command and arguments to run
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// The command to execute, joined and quoted from positional args when
    /// `-c` was not used.
    pub fn get_command(&self) -> Option<String> {
        if let Some(ref cmd) = self.command {
            Some(cmd.clone())
        } else if !self.args.is_empty() {
            Some(crate::utils::join_args(&self.args))
        } else {
            None
        }
    }

    /// The settings file path, explicit or default.
    pub fn get_settings_path(&self) -> Option<PathBuf> {
        self.settings
            .clone()
            .or_else(crate::config::default_settings_path)
    }
}
