use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use filestored::client::{Client, DeleteOutcome, GetOutcome, PutOutcome};
use filestored::config::ServerConfig;
use filestored::protocol::Address;
use filestored::server;
use filestored::startup::StartupValidator;
use filestored::storage::{IdentifierStore, LocalStorage};

#[derive(Parser)]
#[command(name = "filestored")]
#[command(about = "Remote file storage server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, help = "Config file path")]
    config: Option<String>,

    #[arg(long, help = "Data directory path (overrides config)")]
    data: Option<String>,

    #[arg(long, help = "Listen address (overrides config)")]
    listen: Option<String>,

    #[arg(long, help = "Output as JSON")]
    json: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,
    /// Print the persisted identifier map
    Ids,
    /// Compare stored files with the identifier map
    Verify,
    GenerateConfig {
        #[arg(long, default_value = "filestored.toml", help = "Config file path")]
        output: String,
    },
    /// Talk to a running server
    Client {
        #[arg(long, help = "Server address (defaults to the configured listen address)")]
        addr: Option<String>,
        #[command(subcommand)]
        action: ClientCommands,
    },
}

#[derive(clap::Subcommand)]
enum ClientCommands {
    Put {
        file: PathBuf,
        #[arg(long, help = "Name on the server; omitted means server-assigned")]
        name: Option<String>,
    },
    Get {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, help = "Write the payload here instead of stdout")]
        output: Option<PathBuf>,
    },
    Delete {
        #[command(flatten)]
        target: TargetArgs,
    },
    Exit,
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    name: Option<String>,
}

impl TargetArgs {
    fn address(self) -> Result<Address> {
        match (self.id, self.name) {
            (Some(id), _) => Ok(Address::ById(id)),
            (None, Some(name)) => Ok(Address::ByName(name)),
            (None, None) => anyhow::bail!("one of --id or --name is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("filestored=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::GenerateConfig { output }) = &cli.command {
        ServerConfig::default().save(output)?;
        if cli.json {
            println!("{}", serde_json::json!({"success": true, "path": output}));
        } else {
            println!("✅ Wrote default config to {}", output);
        }
        return Ok(());
    }

    let mut config = ServerConfig::load_or_create(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_directory = data.into();
    }
    if let Some(listen) = cli.listen {
        config.listen_address = listen;
    }

    match cli.command {
        Some(Commands::Ids) => {
            let ids = IdentifierStore::load(&config.id_map_path);
            let mut entries: Vec<(&str, &str)> = ids.iter().collect();
            entries.sort();
            if cli.json {
                let list: Vec<_> = entries
                    .iter()
                    .map(|(id, name)| serde_json::json!({"id": id, "file": name}))
                    .collect();
                println!("{}", serde_json::json!({"count": list.len(), "identifiers": list}));
            } else {
                println!("📋 Identifier Map");
                println!("=================");
                if entries.is_empty() {
                    println!("   No identifiers recorded");
                }
                for (id, name) in entries {
                    println!("   {} -> {}", id, name);
                }
            }
            Ok(())
        }
        Some(Commands::Verify) => {
            let storage = LocalStorage::new(config.data_directory.clone());
            let ids = IdentifierStore::load(&config.id_map_path);
            let report = StartupValidator::new(&storage, &ids).validate().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("🔍 Verifying Storage");
                println!("====================");
                println!("   Stored files: {}", report.stored_files);
                println!("   Identifiers: {}", report.identifiers);
                for (id, name) in &report.dangling {
                    println!("   ⚠️  {} -> {} (file missing)", id, name);
                }
                for name in &report.untracked {
                    println!("   {} (no identifier)", name);
                }
                if report.is_consistent() {
                    println!("✅ Verification PASSED");
                } else {
                    println!("❌ Verification found {} dangling identifiers", report.dangling.len());
                }
            }
            Ok(())
        }
        Some(Commands::Client { addr, action }) => {
            let addr = addr.unwrap_or_else(|| config.listen_address.clone());
            run_client(&addr, action, cli.json).await
        }
        Some(Commands::GenerateConfig { .. }) => Ok(()),
        Some(Commands::Serve) | None => serve(config).await,
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    config.ensure_directories()?;
    info!("Starting file server on {}", config.listen_address);
    info!("Data directory: {:?}", config.data_directory);
    server::run_on(&config).await
}

async fn run_client(addr: &str, action: ClientCommands, json: bool) -> Result<()> {
    let mut client = Client::connect(addr).await?;

    match action {
        ClientCommands::Put { file, name } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {:?}", file))?;
            let outcome = client.put(name.as_deref(), &data).await?;
            match (outcome, json) {
                (PutOutcome::Stored(id), true) => println!("{}", serde_json::json!({"stored": true, "id": id})),
                (PutOutcome::Stored(id), false) => println!("Response says that file is saved! ID = {}", id),
                (PutOutcome::Exists, true) => println!("{}", serde_json::json!({"stored": false})),
                (PutOutcome::Exists, false) => println!("The response says that creating the file was forbidden!"),
            }
        }
        ClientCommands::Get { target, output } => match client.get(target.address()?).await? {
            GetOutcome::Found(data) => {
                match &output {
                    Some(path) => tokio::fs::write(path, &data)
                        .await
                        .with_context(|| format!("writing {:?}", path))?,
                    None if !json => {
                        use tokio::io::AsyncWriteExt;
                        let mut stdout = tokio::io::stdout();
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                    None => {}
                }
                if json {
                    println!("{}", serde_json::json!({"found": true, "bytes": data.len()}));
                } else if let Some(path) = output {
                    eprintln!("The file was downloaded to {:?}", path);
                }
            }
            GetOutcome::NotFound => {
                if json {
                    println!("{}", serde_json::json!({"found": false}));
                } else {
                    println!("The response says that this file is not found!");
                }
            }
        },
        ClientCommands::Delete { target } => {
            let deleted = client.delete(target.address()?).await? == DeleteOutcome::Deleted;
            if json {
                println!("{}", serde_json::json!({"deleted": deleted}));
            } else if deleted {
                println!("The response says that this file was deleted successfully!");
            } else {
                println!("The response says that this file is not found!");
            }
        }
        ClientCommands::Exit => {
            client.exit().await?;
            if json {
                println!("{}", serde_json::json!({"sent": "exit"}));
            } else {
                println!("The request was sent.");
            }
        }
    }
    Ok(())
}
