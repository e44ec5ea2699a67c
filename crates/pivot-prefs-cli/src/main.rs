//! pivot-prefs — command-line access to filesystem preferences.

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use pivot_prefs::{FileSystemBackend, PreferencesStore, PrefsConfig};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

type Store = PreferencesStore<FileSystemBackend>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    let mut config = match &cli.config {
        Some(path) => PrefsConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PrefsConfig::default(),
    };
    if let Some(home) = cli.home {
        config = config.with_home_dir(home);
    }

    let mut store = PreferencesStore::new(&cli.app, FileSystemBackend::with_config(&config));
    if let Some(reason) = store.init_status().diagnostic() {
        tracing::warn!(reason, "preferences directory unavailable");
    }

    match cli.command {
        Commands::Path { context } => {
            if let Some(name) = context.as_deref() {
                store.set_context_name(name);
            }
            println!("{}", store.preferences_path());
            println!("{}", store.context_resource_name());
        }
        Commands::List => match store.list_contexts()? {
            Some(contexts) => {
                for name in contexts {
                    println!("{name}");
                }
            }
            None => println!("no preferences stored for {}", store.application_name()),
        },
        Commands::Dump { context } => {
            let dump = store
                .dump(context.as_deref())
                .with_context(|| format!("dumping {}", store.context_resource_name()))?;
            println!("{dump}");
        }
        Commands::Get { key, context } => {
            load_existing(&mut store, context.as_deref())?;
            match store.get(&key)? {
                Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
                None => bail!("no value for \"{key}\" in {}", store.context_name()),
            }
        }
        Commands::Set {
            key,
            value,
            context,
        } => {
            load_existing(&mut store, context.as_deref())?;
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            store.put(&key, value)?;
            store
                .save(None)
                .with_context(|| format!("saving {}", store.context_resource_name()))?;
        }
        Commands::Remove { key, context } => {
            load_existing(&mut store, context.as_deref())?;
            if store.remove(&key)?.is_none() {
                bail!("no value for \"{key}\" in {}", store.context_name());
            }
            store
                .save(None)
                .with_context(|| format!("saving {}", store.context_resource_name()))?;
        }
        Commands::Delete { context } => {
            if !store.delete(context.as_deref())? {
                bail!("nothing to delete at {}", store.context_resource_name());
            }
        }
        Commands::Purge => {
            if !store.delete_preferences_path() {
                bail!("could not remove {}", store.preferences_path());
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Activate `context` and load it if it has been saved before.
fn load_existing(store: &mut Store, context: Option<&str>) -> Result<()> {
    if store.exists(context)? {
        store
            .load(None)
            .with_context(|| format!("loading {}", store.context_resource_name()))?;
    }
    Ok(())
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
