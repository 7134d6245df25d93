use std::path::PathBuf;
use std::sync::Arc;
use clap::{Args, Parser, Subcommand};
use anyhow::{Context, Result};

use crate::config::{BackendSetting, VaultConfig, DEFAULT_CONFIG_FILE};
use crate::spots::Spot;
use crate::startup::Verifier;
use crate::storage::{BackendKind, ChunkedStore};
use crate::vault::Vault;

#[derive(Parser)]
#[command(name = "spotvault")]
#[command(about = "Food spot journal with chunked photo storage")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Config file path")]
    config: Option<String>,

    #[arg(long, global = true, help = "Data directory path (overrides config)")]
    data: Option<String>,

    #[arg(long, global = true, value_enum, help = "Storage backend (overrides config)")]
    backend: Option<BackendSetting>,

    #[arg(long, global = true, help = "Output as JSON")]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show vault status
    Status,
    /// Manage journal entries
    Spot {
        #[command(subcommand)]
        cmd: SpotCommands,
    },
    /// Access stored photos by key
    Photo {
        #[command(subcommand)]
        cmd: PhotoCommands,
    },
    /// Check that every spot's photo is readable
    Verify,
    /// Write a default config file
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file path")]
        output: String,
    },
}

#[derive(Args)]
struct SpotFields {
    #[arg(long)]
    description: Option<String>,
    #[arg(long, help = "Visit date, e.g. 2024-05-01")]
    date: Option<String>,
    #[arg(long, help = "Rating from 0 to 5")]
    rating: Option<u8>,
    #[arg(long, help = "Favorite menu item")]
    menu: Option<String>,
    #[arg(long, help = "Image file to attach")]
    photo: Option<PathBuf>,
}

#[derive(Subcommand)]
enum SpotCommands {
    /// Add a new spot
    Add {
        #[arg(long)]
        name: String,
        #[command(flatten)]
        fields: SpotFields,
    },
    /// Update an existing spot
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: SpotFields,
    },
    /// List all spots
    List,
    /// Show one spot
    Show { id: String },
    /// Delete a spot and its photo
    Delete { id: String },
}

#[derive(Subcommand)]
enum PhotoCommands {
    /// Encode and store an image under a key
    Put { key: String, file: PathBuf },
    /// Print the renderable URI, or write the bytes with --output
    Get {
        key: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show the stored chunk layout
    Stat { key: String },
    /// Delete a stored photo
    Delete { key: String },
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::GenerateConfig { output } = &cli.command {
        let config = VaultConfig::default();
        config.save(output)?;
        if cli.json {
            println!("{}", serde_json::json!({"config_file": output}));
        } else {
            println!("✅ Config written to {}", output);
        }
        return Ok(());
    }

    let mut config = VaultConfig::load_or_create(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_directory = data.into();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let vault = Vault::open(config)?;
    let json = cli.json;

    match cli.command {
        Commands::Status => show_status(&vault, json).await,
        Commands::Spot { cmd } => run_spot(&vault, cmd, json).await,
        Commands::Photo { cmd } => run_photo(&vault, cmd, json).await,
        Commands::Verify => verify(&vault, json).await,
        Commands::GenerateConfig { .. } => Ok(()),
    }
}

async fn read_photo(path: Option<&PathBuf>) -> Result<Option<Vec<u8>>> {
    match path {
        Some(path) => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("cannot read photo {:?}", path))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}

fn apply_fields(spot: &mut Spot, fields: &SpotFields) {
    if let Some(description) = &fields.description {
        spot.description = description.clone();
    }
    if let Some(date) = &fields.date {
        spot.date = Some(date.clone());
    }
    if let Some(rating) = fields.rating {
        spot.rating = rating;
    }
    if let Some(menu) = &fields.menu {
        spot.favorite_menu_item = menu.clone();
    }
}

fn print_spot(spot: &Spot) {
    println!("🍜 {} [{}]", spot.spot_name, spot.id);
    if !spot.description.is_empty() {
        println!("   Description: {}", spot.description);
    }
    if let Some(date) = &spot.date {
        println!("   Date: {}", date);
    }
    println!("   Rating: {}/5", spot.rating);
    if !spot.favorite_menu_item.is_empty() {
        println!("   Favorite: {}", spot.favorite_menu_item);
    }
    match &spot.photo_key {
        Some(key) => println!("   Photo: {}", key),
        None => println!("   Photo: none"),
    }
}

async fn show_status(vault: &Vault, json: bool) -> Result<()> {
    let spots = vault.spots.list().await?;
    let limit = vault.kv.max_entry_size();

    if json {
        let status = serde_json::json!({
            "data_directory": vault.config.data_directory,
            "backend": vault.backend,
            "max_entry_size": limit,
            "spots": spots.len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("📊 Spotvault Status");
        println!("===================");
        println!("   Data directory: {}", vault.config.data_directory.display());
        println!("   Backend: {}", vault.backend);
        match limit {
            Some(limit) => println!("   Entry limit: {} bytes", limit),
            None => println!("   Entry limit: none"),
        }
        println!("   Spots: {}", spots.len());
    }
    Ok(())
}

async fn run_spot(vault: &Vault, cmd: SpotCommands, json: bool) -> Result<()> {
    let store = &vault.spots;

    match cmd {
        SpotCommands::Add { name, fields } => {
            let mut spot = Spot {
                spot_name: name,
                ..Default::default()
            };
            apply_fields(&mut spot, &fields);
            let photo = read_photo(fields.photo.as_ref()).await?;

            let saved = store.save(spot, photo.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&saved)?);
            } else {
                println!("✅ Spot added");
                print_spot(&saved);
            }
        }
        SpotCommands::Edit { id, name, fields } => {
            let mut spot = store
                .get(&id)
                .await?
                .with_context(|| format!("spot '{}' not found", id))?;
            if let Some(name) = name {
                spot.spot_name = name;
            }
            apply_fields(&mut spot, &fields);
            let photo = read_photo(fields.photo.as_ref()).await?;

            let saved = store.save(spot, photo.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&saved)?);
            } else {
                println!("✅ Spot updated");
                print_spot(&saved);
            }
        }
        SpotCommands::List => {
            let spots = store.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&spots)?);
            } else {
                println!("📋 Spots ({})", spots.len());
                println!("==========");
                for spot in &spots {
                    print_spot(spot);
                }
            }
        }
        SpotCommands::Show { id } => {
            let Some(spot) = store.get(&id).await? else {
                if json {
                    println!("{}", serde_json::json!({"error": "Spot not found"}));
                } else {
                    println!("❌ Spot not found: {}", id);
                }
                return Ok(());
            };

            let uri = store.photo_uri(&spot).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "spot": spot,
                        "photo_uri": uri,
                    }))?
                );
            } else {
                print_spot(&spot);
                match uri {
                    Some(uri) => println!("   Photo URI: {} chars", uri.len()),
                    None if spot.photo_key.is_some() => println!("   ⚠️  Photo missing"),
                    None => {}
                }
            }
        }
        SpotCommands::Delete { id } => {
            let deleted = store.delete(&id).await?;
            if json {
                println!("{}", serde_json::json!({"id": id, "deleted": deleted}));
            } else if deleted {
                println!("🗑️  Spot {} deleted", id);
            } else {
                println!("❌ Spot not found: {}", id);
            }
        }
    }
    Ok(())
}

async fn run_photo(vault: &Vault, cmd: PhotoCommands, json: bool) -> Result<()> {
    let photos = vault.photos();

    match cmd {
        PhotoCommands::Put { key, file } => {
            let source = tokio::fs::read(&file)
                .await
                .with_context(|| format!("cannot read photo {:?}", file))?;
            photos.save(&key, &source).await?;
            if json {
                println!("{}", serde_json::json!({"key": key, "source_bytes": source.len()}));
            } else {
                println!("✅ Photo stored under '{}' ({} source bytes)", key, source.len());
            }
        }
        PhotoCommands::Get { key, output } => {
            match output {
                Some(path) => {
                    let data = photos
                        .fetch(&key)
                        .await?
                        .with_context(|| format!("photo '{}' not found", key))?;
                    tokio::fs::write(&path, &data).await?;
                    if json {
                        println!("{}", serde_json::json!({"key": key, "bytes": data.len(), "output": path}));
                    } else {
                        println!("✅ Wrote {} bytes to {}", data.len(), path.display());
                    }
                }
                None => {
                    let uri = photos
                        .uri(&key)
                        .await?
                        .with_context(|| format!("photo '{}' not found", key))?;
                    if json {
                        println!("{}", serde_json::json!({"key": key, "uri": uri}));
                    } else {
                        println!("{}", uri);
                    }
                }
            }
        }
        PhotoCommands::Stat { key } => {
            match vault.backend {
                BackendKind::Chunked => {
                    let layout = ChunkedStore::new(Arc::clone(&vault.kv))?
                        .inspect(&key)
                        .await?
                        .with_context(|| format!("photo '{}' not found", key))?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&layout)?);
                    } else {
                        println!("🧩 Photo Layout: {}", key);
                        println!("==================");
                        println!("   Chunks: {}", layout.chunk_count);
                        println!("   Total: {} bytes", layout.total_len);
                        for (i, len) in layout.chunk_lengths.iter().enumerate() {
                            println!("     {}_{}: {} bytes", key, i, len);
                        }
                    }
                }
                BackendKind::Direct => {
                    let data = photos
                        .objects()
                        .fetch(&key)
                        .await?
                        .with_context(|| format!("photo '{}' not found", key))?;
                    if json {
                        println!("{}", serde_json::json!({"key": key, "chunk_count": null, "total_len": data.len()}));
                    } else {
                        println!("🧩 Photo Layout: {}", key);
                        println!("==================");
                        println!("   Stored directly: {} bytes", data.len());
                    }
                }
            }
        }
        PhotoCommands::Delete { key } => {
            photos.remove(&key).await?;
            if json {
                println!("{}", serde_json::json!({"key": key, "deleted": true}));
            } else {
                println!("🗑️  Photo '{}' deleted", key);
            }
        }
    }
    Ok(())
}

async fn verify(vault: &Vault, json: bool) -> Result<()> {
    let report = Verifier::new(&vault.spots).run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("🔍 Verifying Photos");
        println!("===================");
        println!("   Spots: {}", report.spots);
        println!("   Photos checked: {}", report.photos_checked);
        for key in &report.missing {
            println!("   ❌ missing: {}", key);
        }
        for key in &report.corrupt {
            println!("   ❌ corrupt: {}", key);
        }
        if report.passed() {
            println!("✅ Verification PASSED");
        }
    }

    if !report.passed() {
        anyhow::bail!(
            "verification failed: {} missing, {} corrupt",
            report.missing.len(),
            report.corrupt.len()
        );
    }
    Ok(())
}
