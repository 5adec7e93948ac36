use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use filevault::{
    AccessMode, Collaborators, Config, Database, DownloadRequest, FileVault, ShareRequest,
    SqliteQuota, UploadRequest, VaultError,
};

/// Administer a filevault store from the command line.
#[derive(Debug, Parser)]
#[command(name = "filevault", version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a user's root directory and optionally set their quota.
    Provision {
        #[arg(long)]
        user: i64,
        /// Quota in bytes.
        #[arg(long)]
        quota: Option<i64>,
    },
    /// Show a user's quota and usage.
    Usage {
        #[arg(long)]
        user: i64,
    },
    /// List a directory, or the user's root.
    Ls {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        dir: Option<i64>,
    },
    /// Create a directory.
    Mkdir {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        parent: Option<i64>,
        name: String,
    },
    /// Upload a local file.
    Put {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        dir: Option<i64>,
        /// Encrypt the content under this passphrase.
        #[arg(long)]
        passphrase: Option<String>,
        path: PathBuf,
    },
    /// Download a file to a local path.
    Get {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        file: i64,
        /// Decrypt with this passphrase.
        #[arg(long)]
        passphrase: Option<String>,
        /// Stream instead of buffering (unencrypted files only).
        #[arg(long)]
        stream: bool,
        out: PathBuf,
    },
    /// Delete a file.
    Rm {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        file: i64,
    },
    /// Change how a file is shared.
    Share {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        file: i64,
        /// private, public, password or email.
        #[arg(long)]
        mode: AccessMode,
        #[arg(long)]
        password: Option<String>,
        /// Recipient email; repeat for several.
        #[arg(long = "email")]
        emails: Vec<String>,
    },
    /// Issue a temporary download link.
    Link {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        file: i64,
        /// Lifetime in seconds.
        #[arg(long)]
        ttl: Option<u64>,
    },
}

fn to_json<T: Serialize>(value: &T) -> filevault::Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| VaultError::Upstream(format!("serialize output: {e}")))
}

async fn run(vault: &FileVault, command: Command) -> filevault::Result<String> {
    match command {
        Command::Provision { user, quota } => {
            let root = vault.provision_user(user).await?;
            if let Some(limit) = quota {
                SqliteQuota::new(
                    vault.database().pool().clone(),
                    vault.config().storage.default_quota_bytes,
                )
                .set_limit(user, limit)
                .await?;
            }
            to_json(&root)
        }
        Command::Usage { user } => to_json(&vault.usage_of(user).await?),
        Command::Ls { user, dir } => {
            let listing = match dir {
                Some(id) => vault.read_directory(user, id).await?,
                None => vault.read_root(user).await?,
            };
            to_json(&listing)
        }
        Command::Mkdir { user, parent, name } => {
            let created = vault.create_directory(user, parent, &name).await?;
            to_json(&created.directory)
        }
        Command::Put {
            user,
            dir,
            passphrase,
            path,
        } => {
            let bytes = tokio::fs::read(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut request = UploadRequest::new(name, bytes);
            if let Some(dir) = dir {
                request = request.in_directory(dir);
            }
            if let Some(passphrase) = passphrase {
                request = request.with_passphrase(passphrase);
            }
            to_json(&vault.upload(user, request).await?)
        }
        Command::Get {
            user,
            file,
            passphrase,
            stream,
            out,
        } => {
            let mut request = DownloadRequest::new();
            request.passphrase = passphrase;
            request.stream = stream;

            let download = vault.download_owned(user, file, &request).await?;
            let content_type = download.content_type.clone();
            let mut output = tokio::fs::File::create(&out).await?;
            let written = download
                .write_to(&mut output, vault.config().files.stream_buffer_size)
                .await?;
            Ok(format!(
                "wrote {written} bytes ({content_type}) to {}",
                out.display()
            ))
        }
        Command::Rm { user, file } => to_json(&vault.delete_file(user, file).await?),
        Command::Share {
            user,
            file,
            mode,
            password,
            emails,
        } => {
            let request = ShareRequest {
                mode,
                password,
                emails,
            };
            to_json(&vault.share(user, file, &request).await?)
        }
        Command::Link { user, file, ttl } => {
            let link = vault
                .generate_link(user, file, ttl.map(Duration::from_secs))
                .await?;
            to_json(&link)
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Load configuration
    let config = match Config::load_with_env(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config.display());
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = filevault::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        if let Err(e) = filevault::logging::init_console_only(&config.logging.level) {
            eprintln!("Failed to initialize console logging: {e}");
        }
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: invalid configuration: {e}");
        std::process::exit(1);
    }

    let db = match Database::open(&config.database.path, config.database.max_connections).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error: failed to open database: {e}");
            std::process::exit(1);
        }
    };

    let services = match Collaborators::local(&db, &config) {
        Ok(services) => services,
        Err(e) => {
            eprintln!("Error: failed to set up storage: {e}");
            std::process::exit(1);
        }
    };

    let vault = FileVault::new(db, config, services);
    info!(config = %args.config.display(), "Vault opened");

    match run(&vault, args.command).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            error!("Command failed: {e}");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
