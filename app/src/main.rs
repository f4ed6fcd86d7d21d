//! `modeldock` -- command-line front end for the model download manager.
//!
//! - `modeldock list` -- Show every catalog model and its local status.
//! - `modeldock download <file>...` -- Queue downloads and follow them (Ctrl-C cancels).
//! - `modeldock delete <file>...` -- Remove downloaded and partial files.
//! - `modeldock path <file>` -- Print the local path of a downloaded model.
//! - `modeldock clean` -- Sweep abandoned temp files.
//! - `modeldock init-config` -- Write a config file with the defaults.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use modeldock_lib::config::{self, AppConfig, ConfigKey, ConfigStore, JsonFileStore};
use modeldock_lib::models::{
    DownloadStatus, ManagerError, ModelDescriptor, ModelManager, ModelState,
};
use modeldock_lib::{format, setup_manager, Error};

#[derive(Parser)]
#[command(name = "modeldock", about = "Download and manage local LLM model files", version)]
struct Cli {
    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Models directory (overrides the config file)
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog models and their local status
    List {
        /// Print the full per-model state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download one or more models, one at a time, in the order given
    Download {
        #[arg(required = true)]
        filenames: Vec<String>,
    },

    /// Delete local files (final and partial) for models
    Delete {
        #[arg(required = true)]
        filenames: Vec<String>,
    },

    /// Print the path of a downloaded model
    Path { filename: String },

    /// Remove abandoned partial downloads
    Clean,

    /// Write the default configuration to the config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.quiet {
        modeldock_lib::log::init_quiet();
    } else {
        modeldock_lib::log::init();
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("modeldock: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Error> {
    let store = match cli.config.or_else(config::default_config_path) {
        Some(path) => JsonFileStore::new(path),
        None => return Err(config::ConfigError::NoDataDir.into()),
    };

    if let Commands::InitConfig { force } = cli.command {
        return init_config(&store, force);
    }

    let mut app_config = config::load_app_config(&store);
    if let Some(dir) = cli.models_dir {
        app_config.models_dir = Some(dir);
    }

    let manager = setup_manager(&app_config).await?;

    let code = match cli.command {
        Commands::List { json } => list(&manager, json)?,
        Commands::Download { filenames } => {
            let models = resolve(&manager, &filenames)?;
            download(&manager, &models).await?
        }
        Commands::Delete { filenames } => {
            let models = resolve(&manager, &filenames)?;
            let mut code = ExitCode::SUCCESS;
            for model in &models {
                match manager.delete_and_wait(model).await {
                    Ok(()) => println!("deleted {}", model.filename),
                    Err(e @ ManagerError::Delete { .. }) => {
                        error!("{}", e);
                        eprintln!("modeldock: {}", e);
                        code = ExitCode::FAILURE;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            code
        }
        Commands::Path { filename } => {
            let models = resolve(&manager, &[filename])?;
            match manager.local_path_for(&models[0]) {
                Some(path) => {
                    println!("{}", path.display());
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("{} is not downloaded", models[0].filename);
                    ExitCode::FAILURE
                }
            }
        }
        // Startup already reconciled; refresh again to report the result
        Commands::Clean => {
            manager.refresh().await?;
            println!("{}", manager.models_dir().display());
            ExitCode::SUCCESS
        }
        Commands::InitConfig { .. } => ExitCode::SUCCESS,
    };

    manager.shutdown().await?;
    Ok(code)
}

fn init_config(store: &JsonFileStore, force: bool) -> Result<ExitCode, Error> {
    if store.path().exists() && !force {
        eprintln!(
            "{} already exists (use --force to overwrite)",
            store.path().display()
        );
        return Ok(ExitCode::FAILURE);
    }
    store.set(&ConfigKey::APP, AppConfig::default())?;
    println!("wrote {}", store.path().display());
    Ok(ExitCode::SUCCESS)
}

fn resolve(manager: &ModelManager, filenames: &[String]) -> Result<Vec<ModelDescriptor>, Error> {
    filenames
        .iter()
        .map(|filename| {
            manager
                .catalog()
                .get(filename)
                .cloned()
                .ok_or_else(|| Error::from(ManagerError::UnknownModel(filename.clone())))
        })
        .collect()
}

fn list(manager: &ModelManager, json: bool) -> Result<ExitCode, Error> {
    let states = manager.snapshot();
    if json {
        let out = serde_json::to_string_pretty(&states).map_err(std::io::Error::other)?;
        println!("{}", out);
        return Ok(ExitCode::SUCCESS);
    }

    for state in &states {
        println!(
            "{:<40} {:>9}  {:<8} {}",
            state.model.filename,
            state.model.size_readable(),
            state.model.category,
            format::status_line(state)
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Queue every model, then follow the snapshots until each one settles.
async fn download(manager: &ModelManager, models: &[ModelDescriptor]) -> Result<ExitCode, Error> {
    let mut rx = manager.observe_models();
    for model in models {
        manager.start_download(model)?;
    }

    let wanted: HashSet<&str> = models.iter().map(|m| m.filename.as_str()).collect();
    let mut seen_running: HashSet<String> = HashSet::new();
    let mut last_lines: Vec<(String, String)> = Vec::new();
    let mut cancelling = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let states: Vec<ModelState> = rx
            .borrow_and_update()
            .iter()
            .filter(|s| wanted.contains(s.filename()))
            .cloned()
            .collect();

        for state in &states {
            if matches!(
                state.status,
                DownloadStatus::Queued | DownloadStatus::Downloading
            ) {
                seen_running.insert(state.filename().to_string());
            }
            let line = format::status_line(state);
            let changed = last_lines
                .iter()
                .find(|(f, _)| f == state.filename())
                .map_or(true, |(_, l)| *l != line);
            if changed {
                println!("{}: {}", state.filename(), line);
                last_lines.retain(|(f, _)| f != state.filename());
                last_lines.push((state.filename().to_string(), line));
            }
        }

        // Idle before the Start was processed is not a result yet
        let settled = states.iter().all(|s| match s.status {
            DownloadStatus::Idle => cancelling || seen_running.contains(s.filename()),
            status => status.is_terminal(),
        });
        if settled {
            let failed = states.iter().any(|s| s.status != DownloadStatus::Downloaded);
            return Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(ExitCode::FAILURE);
                }
            }
            _ = &mut ctrl_c, if !cancelling => {
                eprintln!("cancelling...");
                cancelling = true;
                for model in models {
                    manager.cancel_download(model)?;
                }
            }
        }
    }
}
