//! omnistore CLI - Command line interface for storage operations.
//!
//! Initializes the default store from a JSON configuration file and runs a
//! single operation against it.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use omnistore_storage::{global, ByteStream, Context, Error, UploadOptions};

#[derive(Parser)]
#[command(name = "omnistore")]
#[command(about = "omnistore - Unified object storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Store configuration file.
    #[arg(short, long, default_value = "omnistore.json")]
    config: PathBuf,

    /// Override the adapter type from the configuration file.
    #[arg(short, long)]
    adapter: Option<String>,

    /// Abort the operation after this many seconds.
    #[arg(short, long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload, check and delete a probe object.
    Ping,

    /// Upload a local file.
    Upload {
        /// Source file.
        #[arg(short, long)]
        source: PathBuf,

        /// Destination object key.
        #[arg(short, long)]
        dest: String,

        /// MIME type of the object.
        #[arg(long)]
        content_type: Option<String>,

        /// Extra header as KEY=VALUE. Repeatable.
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Download an object to a local file.
    Download {
        /// Object key.
        #[arg(short, long)]
        object: String,

        /// Destination file.
        #[arg(short, long)]
        dest: PathBuf,
    },

    /// Delete objects.
    Delete {
        /// Object keys.
        objects: Vec<String>,
    },

    /// List objects under a prefix.
    List {
        /// Key prefix (default: everything).
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Show object information.
    Info {
        /// Object key.
        object: String,
    },

    /// Check whether an object exists.
    Exists {
        /// Object key.
        object: String,
    },

    /// Print a URL for an object.
    Sign {
        /// Object key.
        object: String,

        /// Lifetime in seconds; 0 for a public URL.
        #[arg(short, long)]
        expire: Option<i64>,
    },
}

/// Contents of the configuration file.
#[derive(Deserialize)]
struct StoreFile {
    adapter: String,
    #[serde(default)]
    config: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let file = load_config(&cli.config).await?;
    let adapter = cli.adapter.unwrap_or(file.adapter);
    global::init(&adapter, file.config)
        .with_context(|| format!("Failed to initialize '{}' adapter", adapter))?;

    let ctx = match cli.timeout {
        Some(secs) => Context::with_timeout(Duration::from_secs(secs)),
        None => Context::new(),
    };

    match cli.command {
        Commands::Ping => cmd_ping(&ctx).await,

        Commands::Upload {
            source,
            dest,
            content_type,
            headers,
        } => cmd_upload(&ctx, &source, &dest, content_type, &headers).await,

        Commands::Download { object, dest } => cmd_download(&ctx, &object, &dest).await,

        Commands::Delete { objects } => cmd_delete(&ctx, &objects).await,

        Commands::List { prefix } => cmd_list(&ctx, &prefix).await,

        Commands::Info { object } => cmd_info(&ctx, &object).await,

        Commands::Exists { object } => cmd_exists(&ctx, &object).await,

        Commands::Sign { object, expire } => cmd_sign(&ctx, &object, expire).await,
    }
}

async fn load_config(path: &Path) -> Result<StoreFile> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw).context("Invalid config file")
}

/// Parse repeated `KEY=VALUE` arguments into upload options.
fn parse_headers(content_type: Option<String>, headers: &[String]) -> Result<UploadOptions> {
    let mut pairs = Vec::with_capacity(headers.len());
    for header in headers {
        let (key, value) = header
            .split_once('=')
            .with_context(|| format!("Header must be KEY=VALUE: {}", header))?;
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    let opts = UploadOptions::from_headers(pairs);
    Ok(match content_type {
        Some(ct) => opts.with_content_type(ct),
        None => opts,
    })
}

async fn cmd_ping(ctx: &Context) -> Result<()> {
    global::ping_test(ctx).await.context("Ping test failed")?;
    println!("Storage is reachable.");
    Ok(())
}

async fn cmd_upload(
    ctx: &Context,
    source: &Path,
    dest: &str,
    content_type: Option<String>,
    headers: &[String],
) -> Result<()> {
    info!("Uploading {} as {}", source.display(), dest);

    let opts = parse_headers(content_type, headers)?;
    let file = tokio::fs::File::open(source)
        .await
        .context("Failed to open source file")?;
    let size = file.metadata().await?.len();
    let body: ByteStream = Box::pin(ReaderStream::new(file).map(|c| c.map_err(Error::from)));

    global::upload(ctx, dest, body, Some(size), &opts)
        .await
        .context("Failed to upload file")?;

    println!("Uploaded: {} ({} bytes)", dest, size);
    Ok(())
}

async fn cmd_download(ctx: &Context, object: &str, dest: &Path) -> Result<()> {
    info!("Downloading {} to {}", object, dest.display());

    let mut body = global::download(ctx, object)
        .await
        .context("Failed to download object")?;
    let mut out = tokio::fs::File::create(dest)
        .await
        .context("Failed to create output file")?;

    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Failed to read object body")?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;

    println!("Downloaded: {} ({} bytes)", dest.display(), written);
    Ok(())
}

async fn cmd_delete(ctx: &Context, objects: &[String]) -> Result<()> {
    global::deletes(ctx, objects)
        .await
        .context("Failed to delete objects")?;
    println!("Deleted {} object(s).", objects.len());
    Ok(())
}

async fn cmd_list(ctx: &Context, prefix: &str) -> Result<()> {
    let files = global::lists(ctx, prefix)
        .await
        .context("Failed to list objects")?;

    if files.is_empty() {
        println!("No objects.");
    }
    for file in files {
        let kind = if file.is_dir { "[DIR] " } else { "[FILE]" };
        println!(
            "  {} {} ({} bytes, {})",
            kind,
            file.name,
            file.size,
            file.mod_time.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn cmd_info(ctx: &Context, object: &str) -> Result<()> {
    let file = global::get_info(ctx, object)
        .await
        .context("Failed to get object info")?;

    println!("Object Information:");
    println!("  Name: {}", file.name);
    println!("  Size: {} bytes", file.size);
    println!("  Modified: {}", file.mod_time);
    println!("  Directory: {}", file.is_dir);
    let mut header: Vec<_> = file.header.into_iter().collect();
    header.sort();
    for (key, value) in header {
        println!("  {}: {}", key, value);
    }
    Ok(())
}

async fn cmd_exists(ctx: &Context, object: &str) -> Result<()> {
    match global::is_exist(ctx, object).await {
        Ok(()) => println!("{} exists.", object),
        Err(e) if e.is_not_found() => println!("{} does not exist.", object),
        Err(e) => return Err(e).context("Failed to check object"),
    }
    Ok(())
}

async fn cmd_sign(ctx: &Context, object: &str, expire: Option<i64>) -> Result<()> {
    let link = global::sign_url(ctx, object, expire)
        .await
        .context("Failed to sign URL")?;
    println!("{}", link);
    Ok(())
}
