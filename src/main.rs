//! # livecol - versioned key-value collections
//!
//! Command-line entry point. Opens a data directory, runs one operation against a collection
//! and prints the result as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

use livecol::storage::BackendConfig;
use livecol::version::{decode_version, encode_version};
use livecol::{
    ChangeEvent, Collection, CollectionItem, CompareOp, GetResult, ItemsResult, KeyRange,
    Revision, Store, StoreConfig, Version, VersionRange, DEFAULT_MAXLEN,
};

/// Versioned key-value collections with a chained, tailable change log.
#[derive(Parser, Debug)]
#[command(name = "livecol", version, about)]
struct Args {
    /// Path to the data directory.
    #[arg(long, default_value = "default.livecol")]
    data_dir: PathBuf,

    /// Collection to operate on.
    #[arg(long, short = 'c', default_value = "default")]
    collection: String,

    /// Change-log length bound applied by mutations.
    #[arg(long, default_value_t = DEFAULT_MAXLEN)]
    maxlen: usize,

    /// Backend page cache size in megabytes.
    #[arg(long, default_value_t = 256)]
    cache_size_mb: u64,

    /// Flush to disk after every commit.
    #[arg(long, default_value_t = false)]
    sync_writes: bool,

    /// Log level - 'trace', 'debug', 'info', 'warn', or 'error'.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List collections that have committed changes.
    Collections,

    /// Read one key.
    Get { key: String },

    /// Read every item, in key order.
    GetAll,

    /// Read items in a key range. Boundaries: '-', '+', '[key' or '(key'.
    KeyRange {
        #[arg(allow_hyphen_values = true)]
        min: String,
        #[arg(allow_hyphen_values = true)]
        max: String,
    },

    /// Read items in a version range. Boundaries: a version, or '(' + version for exclusive.
    VersionRange {
        #[arg(allow_hyphen_values = true)]
        min: String,
        #[arg(allow_hyphen_values = true)]
        max: String,
    },

    /// Read items whose key starts with a prefix.
    Prefix { prefix: String },

    /// Write a key unconditionally.
    Set {
        key: String,
        value: String,
        #[arg(long, value_parser = parse_version, allow_hyphen_values = true, default_value = "inf")]
        version: Version,
    },

    /// Write a key if its current version compares true against an operand.
    Cas {
        key: String,
        op: CompareOp,
        #[arg(value_parser = parse_version, allow_hyphen_values = true)]
        operand: Version,
        value: String,
        #[arg(long, value_parser = parse_version, allow_hyphen_values = true, default_value = "inf")]
        version: Version,
    },

    /// Remove a key.
    Remove { key: String },

    /// Remove a key if its current version compares true against an operand.
    Car {
        key: String,
        op: CompareOp,
        #[arg(value_parser = parse_version, allow_hyphen_values = true)]
        operand: Version,
    },

    /// Remove every key in a key range.
    RemoveKeyRange {
        #[arg(allow_hyphen_values = true)]
        min: String,
        #[arg(allow_hyphen_values = true)]
        max: String,
    },

    /// Remove every key in a version range.
    RemoveVersionRange {
        #[arg(allow_hyphen_values = true)]
        min: String,
        #[arg(allow_hyphen_values = true)]
        max: String,
    },

    /// Remove every key starting with a prefix.
    RemovePrefix { prefix: String },

    /// Print the retained change log.
    Log {
        /// Only entries after this revision.
        #[arg(long)]
        after: Option<Revision>,
    },

    /// Follow the change log, printing one JSON line per batch until interrupted.
    Watch {
        /// Revision to resume after; defaults to the current head.
        #[arg(long)]
        from: Option<Revision>,

        /// Poll block time in milliseconds.
        #[arg(long, default_value_t = 2500)]
        block_ms: u64,
    },
}

fn parse_version(token: &str) -> Result<Version, livecol::VersionError> {
    decode_version(token)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    initialize_tracing(&args.log_level)?;

    let config = build_store_config(&args);
    let store = Store::open(config)
        .with_context(|| format!("failed to open data directory {:?}", args.data_dir))?;

    let result = run(&store, &args).await;
    store.flush()?;

    if let Err(e) = &result {
        error!("Command failed: {:?}", e);
    }
    result
}

/// Initialize the tracing/logging system with the specified log level.
fn initialize_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter = match log_level {
        "trace" | "debug" | "info" | "warn" | "error" => EnvFilter::new(log_level),
        _ => {
            eprintln!("Invalid log level: {}. Using 'warn'", log_level);
            EnvFilter::new("warn")
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    Ok(())
}

fn build_store_config(args: &Args) -> StoreConfig {
    StoreConfig {
        backend: BackendConfig {
            data_dir: args.data_dir.clone(),
            cache_size_mb: args.cache_size_mb,
            ..Default::default()
        },
        default_maxlen: args.maxlen,
        sync_writes: args.sync_writes,
        ..Default::default()
    }
}

async fn run(store: &Store, args: &Args) -> anyhow::Result<()> {
    let output = match &args.command {
        Command::Collections => json!(store.collection_names()?),
        Command::Watch { from, block_ms } => {
            let from = match from {
                Some(revision) => *revision,
                None => store.collection(&args.collection)?.revision(),
            };
            let block = Duration::from_millis(*block_ms);
            return watch(store, &args.collection, from, block).await;
        }
        command => {
            let collection = store.collection(&args.collection)?;
            collection_command(&collection, command, args.maxlen)?
        }
    };

    print_json(&output)
}

fn collection_command(
    collection: &Collection,
    command: &Command,
    maxlen: usize,
) -> anyhow::Result<Value> {
    Ok(match command {
        Command::Get { key } => get_json(&collection.get(key.as_bytes())),
        Command::GetAll => items_json(&collection.get_all()),
        Command::KeyRange { min, max } => {
            let range = KeyRange::parse(min.as_bytes(), max.as_bytes())?;
            items_json(&collection.get_key_range(&range))
        }
        Command::VersionRange { min, max } => {
            let range = VersionRange::parse(min, max)?;
            items_json(&collection.get_version_range(&range))
        }
        Command::Prefix { prefix } => items_json(&collection.get_prefix(prefix.as_bytes())?),
        Command::Set {
            key,
            value,
            version,
        } => json!(collection.set(key.as_bytes(), value.as_bytes(), *version, maxlen)?),
        Command::Cas {
            key,
            op,
            operand,
            value,
            version,
        } => json!(collection.compare_and_set(
            key.as_bytes(),
            *op,
            *operand,
            value.as_bytes(),
            *version,
            maxlen
        )?),
        Command::Remove { key } => json!(collection.remove(key.as_bytes(), maxlen)?),
        Command::Car { key, op, operand } => {
            json!(collection.compare_and_remove(key.as_bytes(), *op, *operand, maxlen)?)
        }
        Command::RemoveKeyRange { min, max } => {
            let range = KeyRange::parse(min.as_bytes(), max.as_bytes())?;
            json!(collection.remove_key_range(&range, maxlen)?)
        }
        Command::RemoveVersionRange { min, max } => {
            let range = VersionRange::parse(min, max)?;
            json!(collection.remove_version_range(&range, maxlen)?)
        }
        Command::RemovePrefix { prefix } => {
            json!(collection.remove_prefix(prefix.as_bytes(), maxlen)?)
        }
        Command::Log { after } => {
            let events = match after {
                Some(revision) => collection.changes_after(*revision),
                None => collection.changes(),
            };
            json!({
                "revision": collection.revision(),
                "events": events.iter().map(event_json).collect::<Vec<_>>(),
            })
        }
        Command::Collections | Command::Watch { .. } => {
            anyhow::bail!("not a single-collection command: {:?}", command)
        }
    })
}

async fn watch(store: &Store, name: &str, from: Revision, block: Duration) -> anyhow::Result<()> {
    let mut watcher = store.watch(name, from, Some(block))?;
    let cancel = watcher.cancel_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping watch");
            cancel.cancel();
        }
    });

    info!("Watching {} after revision {}", name, from);
    while let Some(batch) = watcher.next_batch().await? {
        let events: Vec<Value> = batch.iter().map(event_json).collect();
        println!("{}", Value::Array(events));
    }

    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn get_json(result: &GetResult) -> Value {
    json!({
        "revision": result.revision,
        "value": result.value.as_deref().map(text),
        "version": encode_version(result.version),
    })
}

fn item_json(item: &CollectionItem) -> Value {
    json!({
        "key": text(&item.key),
        "value": text(&item.value),
        "version": encode_version(item.version),
    })
}

fn items_json(result: &ItemsResult) -> Value {
    json!({
        "revision": result.revision,
        "items": result.items.iter().map(item_json).collect::<Vec<_>>(),
    })
}

fn event_json(event: &ChangeEvent) -> Value {
    match event {
        ChangeEvent::Set {
            revision,
            prev_revision,
            key,
            value,
            version,
        } => json!({
            "type": "set",
            "revision": revision,
            "prevRevision": prev_revision,
            "key": text(key),
            "value": text(value),
            "version": encode_version(*version),
        }),
        ChangeEvent::Remove {
            revision,
            prev_revision,
            key,
        } => json!({
            "type": "remove",
            "revision": revision,
            "prevRevision": prev_revision,
            "key": text(key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecol::DEFAULT_VERSION;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "livecol", "--collection", "users", "cas", "alice", "<=", "-inf", "admin",
        ])
        .unwrap();
        assert_eq!(args.collection, "users");
        match args.command {
            Command::Cas {
                op,
                operand,
                version,
                ..
            } => {
                assert_eq!(op, CompareOp::LessOrEqual);
                assert_eq!(operand, f64::NEG_INFINITY);
                assert_eq!(version, DEFAULT_VERSION);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_key_range_accepts_unbounded_tokens() {
        let args = Args::try_parse_from(["livecol", "key-range", "-", "+"]).unwrap();
        match args.command {
            Command::KeyRange { min, max } => {
                assert_eq!(min, "-");
                assert_eq!(max, "+");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = ChangeEvent::Remove {
            revision: Revision::new(5, 1),
            prev_revision: Revision::new(5, 0),
            key: b"k".to_vec(),
        };
        let value = event_json(&event);
        assert_eq!(value["type"], "remove");
        assert_eq!(value["prevRevision"], "5-0");
        assert!(value.get("value").is_none());
    }
}
