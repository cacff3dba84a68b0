//! anchor-notes: anchor tags and their notes from the command line.
//!
//! Runs the same engine as an editor integration, over files on disk. The
//! `watch` command keeps it running against the workspace so tags typed in
//! any editor are completed and kept intact on save.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use anchor_core::notify::NoticeLevel;
use anchor_core::{Notifier, RecordingNotifier, TracingNotifier};
use anchor_daemon::{Config, FileWatcher, Session};

#[derive(Parser, Debug)]
#[command(name = "anchor-notes")]
#[command(about = "Inline anchor tags linked to per-project notes")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Workspace root (repeatable; overrides ANCHOR_NOTES_WORKSPACE)
    #[arg(short, long, global = true)]
    workspace: Vec<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the overlay for the tag at a position (zero-based)
    Hover {
        file: PathBuf,
        line: usize,
        column: usize,
    },
    /// Show a note as the editor would
    Show {
        id: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Set a note's Markdown text (read from stdin without --content)
    Set {
        id: String,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        content: Option<String>,
    },
    /// Delete a note and strip its tags from the file
    Delete {
        id: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Bring every tag in the given files to canonical form
    Fix {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the tags in a file with their notes
    List { file: PathBuf },
    /// Watch the workspace and keep tags canonical as files are saved
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,anchor_core=debug,anchor_daemon=debug"
    } else {
        "info,anchor_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?.with_workspace(&args.workspace);
    debug!("Configuration: {:?}", config);

    if let Command::Watch = args.command {
        return watch(config).await;
    }

    let notifier = Arc::new(RecordingNotifier::new());
    let mut session = Session::new(&config, notifier.clone());
    let result = run(&mut session, args.command, args.json).await;

    let mut failure = None;
    for notice in notifier.drain() {
        match notice.level {
            NoticeLevel::Info => info!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Error => {
                error!("{}", notice.message);
                failure.get_or_insert(notice.message);
            }
        }
    }
    result?;
    match failure {
        Some(message) => anyhow::bail!(message),
        None => Ok(()),
    }
}

async fn run(session: &mut Session, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Hover { file, line, column } => {
            match session.hover(&file, line, column).await? {
                Some(overlay) if json => println!("{}", serde_json::to_string_pretty(&overlay)?),
                Some(overlay) => println!("{}", overlay.to_markdown()),
                None => info!("No tag at {}:{}:{}", file.display(), line, column),
            }
        }
        Command::Show { id, file } => {
            println!("{}", session.show(&id, &file).await?);
        }
        Command::Set { id, file, content } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut buffer = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buffer)
                        .await
                        .context("Failed to read note from stdin")?;
                    buffer
                }
            };
            session.set(&id, &file, content.trim_end_matches('\n')).await?;
        }
        Command::Delete { id, file } => {
            session.delete(&id, &file).await?;
        }
        Command::Fix { files } => {
            for file in files {
                let transitions = session.fix(&file).await?;
                if json {
                    println!("{}", serde_json::to_string(&transitions)?);
                    continue;
                }
                for transition in transitions {
                    println!("{}:{} {:?}", file.display(), transition.line() + 1, transition);
                }
            }
        }
        Command::List { file } => {
            let tags = session.list(&file).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
                return Ok(());
            }
            for tag in tags {
                let note = tag.note.as_deref().and_then(|n| n.lines().next()).unwrap_or("");
                println!("{}:{}:{} {} {}", file.display(), tag.line + 1, tag.column + 1, tag.id, note);
            }
        }
        Command::Watch => anyhow::bail!("watch does not run in a one-shot session"),
    }
    Ok(())
}

async fn watch(config: Config) -> Result<()> {
    info!("Starting anchor-notes watch");
    info!("Workspace roots: {:?}", config.workspace_roots);

    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let session = Session::new(&config, notifier);
    let mut watcher = FileWatcher::new(&config.workspace_roots, vec![config.store_file.clone()])?;
    info!("File watcher started. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            Some(event) = watcher.event_rx().recv() => {
                if let Err(e) = session.handle_file_event(&event).await {
                    debug!("Skipped {}: {:#}", event.path.display(), e);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down");
    Ok(())
}
