//! protolens CLI
//!
//! Manages a snapshot directory of schema sources and URL mappings, and
//! decodes captured payloads against them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use protolens::{
    Decoder, Direction, Error, MatchSource, ProtolensConfig, SchemaRegistry, SchemaSource,
    SnapshotStore, TypeMapping,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "protolens")]
#[command(about = "Runtime protobuf schema registry and payload decoder")]
struct Cli {
    /// Snapshot directory (overrides [store] dir)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Explicit config file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List schema sources
    Sources,

    /// Add a .proto file, or every .proto file under a directory
    AddSource {
        path: PathBuf,
        /// Source name (defaults to the file name; ignored for directories)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove a schema source by id
    RemoveSource { id: String },

    /// List URL type mappings
    Mappings,

    /// Map a URL glob to a message type
    AddMapping {
        #[arg(short, long)]
        pattern: String,
        #[arg(short = 't', long = "type")]
        message_type: String,
        #[arg(short, long, default_value = "both")]
        direction: Direction,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Remove a mapping by id
    RemoveMapping { id: String },

    /// List compiled message types
    Types,

    /// Decode a payload file
    Decode {
        payload: PathBuf,
        /// Decode as this message type
        #[arg(short = 't', long = "type")]
        message_type: Option<String>,
        /// URL the payload was captured from
        #[arg(short, long)]
        url: Option<String>,
        #[arg(short, long, default_value = "response")]
        direction: Direction,
        /// Payload file holds hex text instead of raw bytes
        #[arg(long)]
        hex: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ProtolensConfig::load_from(cli.config.as_deref()).context("loading config")?;
    let store = SnapshotStore::new(cli.store.clone().unwrap_or_else(|| config.store_dir()));

    let snapshot = store
        .load()
        .with_context(|| format!("loading snapshot from {}", store.dir().display()))?;
    let (registry, report) = SchemaRegistry::from_snapshot(snapshot);
    if let Some(err) = &report.compile_error {
        warn!(error = %err, "stored sources do not compile; continuing without them");
    }
    let registry = Arc::new(registry);

    match cli.command {
        Commands::Sources => {
            let sources = registry.list_sources();
            if sources.is_empty() {
                println!("No sources registered");
            }
            for source in sources {
                println!("{}  {}  ({} bytes, loaded {})", source.id, source.name, source.content.len(), source.loaded_at.to_rfc3339());
            }
            Ok(())
        }

        Commands::AddSource { path, name } => {
            let files = proto_files(&path)?;
            if files.is_empty() {
                bail!("no .proto files under {}", path.display());
            }
            for file in &files {
                let content = std::fs::read_to_string(file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let source_name = match (&name, files.len()) {
                    (Some(name), 1) => name.clone(),
                    _ => file_name(file),
                };
                let source = SchemaSource::new(source_name, content);
                let id = source.id.clone();
                report_compile(registry.add_source(source))?;
                println!("✅ Added {} as {}", file.display(), id);
            }
            store.save(&registry.snapshot())?;
            Ok(())
        }

        Commands::RemoveSource { id } => {
            report_compile(registry.remove_source(&id))?;
            store.save(&registry.snapshot())?;
            println!("✅ Removed source {}", id);
            Ok(())
        }

        Commands::Mappings => {
            let mappings = registry.list_mappings();
            if mappings.is_empty() {
                println!("No mappings registered");
            }
            for m in mappings {
                println!("{}  [{}]  {} -> {}  {}", m.id, m.direction, m.url_pattern, m.message_type, m.description);
            }
            Ok(())
        }

        Commands::AddMapping { pattern, message_type, direction, description } => {
            if registry.get_message_descriptor(&message_type).is_err() {
                println!("⚠️  {} is not a compiled message type (yet)", message_type);
            }
            let mapping = TypeMapping::new(pattern, message_type, direction).with_description(description);
            let id = mapping.id.clone();
            registry.add_mapping(mapping)?;
            store.save(&registry.snapshot())?;
            println!("✅ Added mapping {}", id);
            Ok(())
        }

        Commands::RemoveMapping { id } => {
            registry.remove_mapping(&id)?;
            store.save(&registry.snapshot())?;
            println!("✅ Removed mapping {}", id);
            Ok(())
        }

        Commands::Types => {
            let set = registry.descriptors();
            println!("generation {} · fingerprint {}", set.generation(), set.fingerprint().short());
            for message in set.messages() {
                let marker = if message.map_entry { " (map entry)" } else { "" };
                println!("  {}  [{} fields]{}", message.full_name, message.fields.len(), marker);
            }
            Ok(())
        }

        Commands::Decode { payload, message_type, url, direction, hex } => {
            let bytes = read_payload(&payload, hex)?;
            let decoder = Decoder::with_config(Arc::clone(&registry), config.decoder.clone());

            if let Some(type_name) = message_type {
                let decoded = decoder.decode_named(&type_name, &bytes)?;
                println!("{}", decoded.to_text());
                return Ok(());
            }

            if let Some(url) = url {
                match decoder.decode_for_url(&bytes, &url, direction)? {
                    Some((decoded, source)) => {
                        let how = match source {
                            MatchSource::Mapping => "mapping",
                            MatchSource::Cache => "cache",
                            MatchSource::Scan => "auto-match",
                        };
                        println!("# {} (via {})", decoded.type_name, how);
                        println!("{}", decoded.to_text());
                    }
                    None => println!("❌ No type matched {}", url),
                }
                return Ok(());
            }

            match decoder.auto_match_decode(&bytes) {
                Some(found) => {
                    println!("# {} (score {})", found.type_name, found.score);
                    println!("{}", found.decoded.to_text());
                }
                None => println!("❌ No confident match among {} types", registry.message_names().len()),
            }
            Ok(())
        }
    }
}

/// A compile failure still leaves the mutation applied; report it and go on
fn report_compile(result: protolens::Result<()>) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(Error::Compile(err)) => {
            println!("⚠️  Sources no longer compile: {}", err);
            println!("   The previous descriptor set stays active.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn proto_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().map_or(false, |ext| ext == "proto") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_payload(path: &Path, is_hex: bool) -> anyhow::Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if !is_hex {
        return Ok(raw);
    }
    let text: String = String::from_utf8(raw)
        .context("hex payload is not text")?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    hex::decode(&text).context("invalid hex payload")
}
