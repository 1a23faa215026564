use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{Engine, FilterCriterion, HttpRemoteStore};
use shared::domain::{Item, ItemId};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings, DEFAULT_SETTINGS_FILE};

#[derive(Parser, Debug)]
#[command(name = "todo", about = "Manage a remote task list")]
struct Cli {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    store_url: Option<String>,
    #[arg(long)]
    collection: Option<String>,
    /// Which items to print after the command runs.
    #[arg(long, global = true, default_value_t = FilterCriterion::All)]
    filter: FilterCriterion,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List,
    Add {
        task: String,
    },
    Remove {
        id: i64,
    },
    Edit {
        id: i64,
        task: String,
    },
    Complete {
        id: i64,
        #[arg(long)]
        undo: bool,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = load_settings(&self.config);
        if let Some(v) = &self.store_url {
            settings.store_url = v.clone();
        }
        if let Some(v) = &self.collection {
            settings.collection = v.clone();
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();
    let store = HttpRemoteStore::new(&settings.store_url, &settings.collection)
        .with_context(|| format!("cannot use store at '{}'", settings.store_url))?;
    let engine = Engine::new(Arc::new(store));

    engine
        .refresh()
        .await
        .with_context(|| format!("failed to load items from {}", settings.store_url))?;

    let outcome = run(&engine, cli.command).await;
    if outcome.is_err() {
        if let Some(message) = engine.last_error().await {
            eprintln!("store rejected the change, local list rolled back: {message}");
        }
    }

    for item in engine.view(cli.filter).await {
        println!("{}", render_item(&item));
    }

    outcome
}

async fn run(engine: &Engine, command: Command) -> Result<()> {
    match command {
        Command::List => {}
        Command::Add { task } => {
            let item = engine.add(&task).await?;
            println!("added #{}", item.id);
        }
        Command::Remove { id } => {
            engine.remove(ItemId(id)).await?;
            println!("removed #{id}");
        }
        Command::Edit { id, task } => {
            engine.update(ItemId(id), &task).await?;
            println!("edited #{id}");
        }
        Command::Complete { id, undo } => {
            let item = engine.set_completion(ItemId(id), !undo).await?;
            let state = if item.completed { "completed" } else { "active" };
            println!("marked #{id} {state}");
        }
    }
    Ok(())
}

fn render_item(item: &Item) -> String {
    let mark = if item.completed { 'x' } else { ' ' };
    format!("[{mark}] #{} {}", item.id, item.task)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
