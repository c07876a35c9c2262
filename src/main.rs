//! CLI entry point for the sandbox host (sbx).

use std::os::unix::io::FromRawFd;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use sandbox_host::cli::Cli;
use sandbox_host::config::{load_config, load_config_from_string, load_default_config};
use sandbox_host::manager::SandboxManager;
use sandbox_host::utils::init_debug_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_debug_logging(cli.debug);

    let config = match cli.get_settings_path() {
        Some(path) if path.exists() => match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config from {:?}: {}", path, e);
                return ExitCode::from(1);
            }
        },
        _ => match load_default_config() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading default config: {}", e);
                return ExitCode::from(1);
            }
        },
    };

    let command = match cli.get_command() {
        Some(cmd) => cmd,
        None => {
            eprintln!("No command specified. Use -c <command> or provide command as arguments.");
            return ExitCode::from(1);
        }
    };

    let manager = Arc::new(SandboxManager::new());

    let deps = manager.check_dependencies(Some(&config));
    for warning in &deps.warnings {
        tracing::warn!("{}", warning);
    }
    if !deps.is_ok() {
        eprintln!("Missing sandbox dependencies: {}", deps.errors.join(", "));
        return ExitCode::from(1);
    }

    if let Err(e) = manager.initialize(config).await {
        eprintln!("Failed to initialize sandbox: {}", e);
        return ExitCode::from(1);
    }

    // Policy updates arrive over the control fd as JSON lines and are
    // applied live: the proxy picks them up without restarting the
    // sandboxed command.
    let control_fd_shutdown: Option<oneshot::Sender<()>> = if let Some(fd) = cli.control_fd {
        if fd < 0 {
            eprintln!("Invalid control fd: {} (must be non-negative)", fd);
            return ExitCode::from(1);
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let manager_clone = Arc::clone(&manager);
        tokio::spawn(async move {
            // Safety: the control fd is handed to us by the parent process,
            // which owns it and guarantees it is open and readable. Taking
            // ownership here is the standard parent-child fd handoff.
            let file = unsafe { std::fs::File::from_raw_fd(fd) };
            let async_file = tokio::fs::File::from_std(file);
            let reader = BufReader::new(async_file);
            let mut lines = reader.lines();

            tracing::debug!("Listening for policy updates on fd {}", fd);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Control fd reader shutting down");
                        break;
                    }
                    result = lines.next_line() => {
                        match result {
                            Ok(Some(line)) => {
                                if let Some(new_config) = load_config_from_string(&line) {
                                    tracing::debug!("Applying policy update from control fd");
                                    if let Err(e) = manager_clone.update_config(new_config).await {
                                        tracing::warn!("Failed to apply policy update: {}", e);
                                    }
                                } else if !line.trim().is_empty() {
                                    tracing::debug!("Invalid policy update ignored: {}", line);
                                }
                            }
                            Ok(None) => {
                                tracing::debug!("Control fd closed (EOF)");
                                break;
                            }
                            Err(e) => {
                                tracing::debug!("Error reading control fd: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        });
        Some(shutdown_tx)
    } else {
        None
    };

    let wrapped_command = match manager
        .wrap_with_sandbox(&command, cli.shell.as_deref())
        .await
    {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Failed to wrap command: {}", e);
            manager.reset().await;
            return ExitCode::from(1);
        }
    };

    tracing::debug!("Wrapped command: {}", wrapped_command);

    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&wrapped_command)
        .status()
        .await;

    if let Some(shutdown_tx) = control_fd_shutdown {
        let _ = shutdown_tx.send(());
    }
    manager.reset().await;

    match status {
        Ok(status) => {
            if let Some(code) = status.code() {
                ExitCode::from(code as u8)
            } else {
                // Terminated by signal.
                ExitCode::from(128)
            }
        }
        Err(e) => {
            eprintln!("Failed to execute command: {}", e);
            ExitCode::from(1)
        }
    }
}
