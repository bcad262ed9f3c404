//! s3chunk -- command-line object store client.
//!
//! Command output goes to stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use s3chunk::config::{Config, LoggingConfig, TransferConfig};
use s3chunk::errors::TransferError;
use s3chunk::filter::{ArchiveIndicator, ArchiveLedger};
use s3chunk::transfer::{self, DownloadRequest, UploadRequest, UploadStatus};

const DEFAULT_CONFIG_PATH: &str = "s3chunk.yaml";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "s3chunk",
    version,
    about = "Object store client with chunked transfer of large files"
)]
struct Cli {
    /// Path to the YAML configuration file (default: ./s3chunk.yaml if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of configuration.
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload local files matching a file-name pattern
    Put {
        /// <bucket>[/<keyprefix>]
        target: String,
        /// Local file pattern, e.g. `backups/*.tar`
        files: String,
        /// Split files into chunks of this many MB (configured default if no value)
        #[arg(long, value_name = "MB", num_args = 0..=1, require_equals = true)]
        big: Option<Option<f64>>,
        /// Only upload files changed since their last backup
        #[arg(long, default_value_t = false)]
        backup: bool,
        /// Skip keys that already exist in the bucket
        #[arg(long = "new", default_value_t = false)]
        new_only: bool,
        /// Canned ACL for the uploaded objects, e.g. public-read
        #[arg(long)]
        acl: Option<String>,
    },
    /// Download an object, a wildcard set of objects, or a chunked object
    Get {
        /// <bucket>/<key>, where key may end in `*`
        resource: String,
        /// Output file (default: last path segment of the key)
        filename: Option<PathBuf>,
        /// Reassemble key.000, key.001, ... into one file
        #[arg(long, default_value_t = false)]
        big: bool,
    },
    /// List buckets, or the objects under <bucket>[/<keyprefix>]
    List { target: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            return ExitCode::from(3);
        }
    };
    init_tracing(&config.logging, cli.debug);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            debug!("command failed with {}", e.code());
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_status())
        }
    }
}

fn resolve_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => s3chunk::config::load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            s3chunk::config::load_config(DEFAULT_CONFIG_PATH)
        }
        None => Ok(Config::default()),
    }
}

fn init_tracing(logging: &LoggingConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Commands, config: &Config) -> Result<ExitCode, TransferError> {
    match command {
        Commands::Put {
            target,
            files,
            big,
            backup,
            new_only,
            acl,
        } => {
            let (bucket, base_key) = transfer::parse_put_target(&target)?;
            let files = transfer::resolve_local_files(&files)?;
            let chunk_size = match big {
                None => None,
                Some(None) => Some(config.transfer.default_chunk_size()?),
                Some(Some(mb)) => Some(TransferConfig::chunk_size_bytes(mb)?),
            };

            let mut ledger = if backup {
                let path = &config.backup.ledger_path;
                let ledger = ArchiveLedger::load(path)
                    .map_err(|e| TransferError::Io(std::io::Error::other(e)))?;
                debug!("Loaded backup ledger {} ({} files)", path, ledger.len());
                Some(ledger)
            } else {
                None
            };

            let client = s3chunk::storage::connect(&config.storage).await?;
            let request = UploadRequest {
                bucket,
                base_key,
                files,
                chunk_size,
                backup_only: backup,
                new_only,
                acl,
            };
            let indicator = ledger.as_mut().map(|l| l as &mut dyn ArchiveIndicator);
            let outcomes =
                transfer::upload(client.as_ref(), &config.transfer, &request, indicator).await?;

            let mut exit = ExitCode::SUCCESS;
            let (mut uploaded, mut skipped, mut failed) = (0usize, 0usize, 0usize);
            for outcome in &outcomes {
                match &outcome.status {
                    UploadStatus::Uploaded { .. } => uploaded += 1,
                    UploadStatus::Skipped { .. } => skipped += 1,
                    UploadStatus::Failed { error } => {
                        eprintln!("Error: {}: {}", outcome.path.display(), error);
                        if failed == 0 {
                            exit = ExitCode::from(error.exit_status());
                        }
                        failed += 1;
                    }
                }
            }
            info!(
                "{} uploaded, {} skipped, {} failed",
                uploaded, skipped, failed
            );
            Ok(exit)
        }

        Commands::Get {
            resource,
            filename,
            big,
        } => {
            let (bucket, key) = transfer::parse_get_resource(&resource)?;
            let client = s3chunk::storage::connect(&config.storage).await?;
            let request = DownloadRequest {
                bucket,
                key,
                destination: filename,
                output_dir: PathBuf::from("."),
                chunked: big,
            };
            let files = transfer::download(client.as_ref(), &config.transfer, &request).await?;
            for file in &files {
                debug!(
                    "Wrote {} bytes from {} object(s) to {}",
                    file.bytes,
                    file.keys.len(),
                    file.path.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::List { target: None } => {
            let client = s3chunk::storage::connect(&config.storage).await?;
            let buckets = transfer::list_buckets(client.as_ref()).await?;
            for bucket in &buckets {
                println!("{}", bucket.name);
            }
            println!("{} files listed", buckets.len());
            Ok(ExitCode::SUCCESS)
        }

        Commands::List {
            target: Some(target),
        } => {
            let (bucket, prefix) = transfer::parse_put_target(&target)?;
            let client = s3chunk::storage::connect(&config.storage).await?;
            let mut catalog = transfer::list(
                client.as_ref(),
                &bucket,
                &prefix,
                config.transfer.page_size,
            );

            let mut count = 0usize;
            while let Some(entry) = catalog.next().await? {
                println!("{}", transfer::format_entry(&entry));
                count += 1;
            }
            println!("{} files listed", count);
            Ok(ExitCode::SUCCESS)
        }
    }
}
