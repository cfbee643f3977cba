//! s3ee: client-side envelope encryption for S3-compatible object stores
//!
//! Commands:
//!   put <bucket> <key> <file>     - encrypt a local file and upload it
//!   get <bucket> <key> [-o FILE]  - download and decrypt an object
//!   delete <bucket> <key>         - delete an object and its instruction object
//!   keygen [--age] [-o FILE]      - generate a master key file
//!   config show                   - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::RngCore;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use zeroize::Zeroize;

use s3ee_client::{EncryptionClient, GetObjectInput, PutObjectInput};
use s3ee_core::{EnvelopeLocation, S3eeConfig};
use s3ee_crypto::{load_key_file, AgeKeyPair, KeyFile, MasterKey, RotatingKeyProvider, KEY_SIZE};
use s3ee_storage::{OpendalStore, StorageConfig};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "s3ee",
    version,
    about = "Client-side envelope encryption for S3-compatible object stores",
    long_about = "s3ee: encrypt objects before upload and decrypt them after download; \
                  the store only ever sees ciphertext and wrapped keys"
)]
struct Cli {
    /// Path to s3ee.toml configuration file
    #[arg(long, short = 'c', env = "S3EE_CONFIG", default_value = "/etc/s3ee/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a local file and upload it
    ///
    /// Credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
    Put {
        bucket: String,
        key: String,
        /// Local file to encrypt
        file: PathBuf,
        /// Content type recorded on the stored object
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Download and decrypt an object
    Get {
        bucket: String,
        key: String,
        /// Write plaintext here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Envelope location override: metadata | instruction_file
        #[arg(long)]
        location: Option<EnvelopeLocation>,
        /// Instruction object suffix override (implies instruction_file)
        #[arg(long)]
        suffix: Option<String>,
    },

    /// Delete an object and its instruction object
    Delete { bucket: String, key: String },

    /// Generate a new master key file
    Keygen {
        /// Generate an age X25519 identity instead of a symmetric key
        #[arg(long)]
        age: bool,
        /// Write the key here (created with owner-only permissions) instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.log.level, &config.log.format);

    match cli.command {
        Commands::Put { bucket, key, file, content_type } => {
            cmd_put(&config, &bucket, &key, &file, content_type).await
        }
        Commands::Get { bucket, key, output, location, suffix } => {
            cmd_get(&config, &bucket, &key, output.as_deref(), location, suffix).await
        }
        Commands::Delete { bucket, key } => cmd_delete(&config, &bucket, &key).await,
        Commands::Keygen { age, output } => cmd_keygen(age, output.as_deref()),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<S3eeConfig> {
    S3eeConfig::load(path).with_context(|| format!("loading config: {}", path.display()))
}

/// Logs go to stderr so `get` can stream plaintext to stdout.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Client from config ────────────────────────────────────────────────────────

/// Load every `[keys.files]` entry into a rotating provider.
///
/// The current key is `[keys] current`, or the only key when exactly one is
/// configured.
fn build_key_provider(config: &S3eeConfig) -> Result<RotatingKeyProvider> {
    if config.keys.files.is_empty() {
        anyhow::bail!(
            "no master keys configured\n\
             Add key files under [keys.files] in the config, e.g.\n\
             \t[keys]\n\
             \tcurrent = \"k1\"\n\
             \t[keys.files]\n\
             \tk1 = \"/etc/s3ee/keys/k1.key\"\n\
             Generate one with: s3ee keygen -o /etc/s3ee/keys/k1.key"
        );
    }

    let provider = RotatingKeyProvider::new();
    for (name, path) in &config.keys.files {
        let key = load_key_file(path)
            .with_context(|| format!("loading master key {name:?} from {}", path.display()))?;
        provider.add_key(name.clone(), key);
    }

    let current = match &config.keys.current {
        Some(name) => name.clone(),
        None if config.keys.files.len() == 1 => {
            config.keys.files.keys().next().cloned().unwrap_or_default()
        }
        None => anyhow::bail!(
            "several master keys configured; set [keys] current to choose one for writes"
        ),
    };
    provider
        .rotate_to(&current)
        .with_context(|| format!("selecting current master key {current:?}"))?;

    Ok(provider)
}

fn build_client(config: &S3eeConfig) -> Result<EncryptionClient> {
    let storage = StorageConfig::from_env(&config.storage).context("storage configuration")?;
    let provider = build_key_provider(config)?;

    EncryptionClient::builder()
        .client(Arc::new(OpendalStore::new(storage)))
        .key_provider(Arc::new(provider))
        .from_config(&config.encryption)
        .build()
        .context("building encryption client")
}

// ── `s3ee put` ────────────────────────────────────────────────────────────────

async fn cmd_put(
    config: &S3eeConfig,
    bucket: &str,
    key: &str,
    file: &Path,
    content_type: Option<String>,
) -> Result<()> {
    let client = build_client(config)?;
    let body = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let plaintext_len = body.len();

    let mut input = PutObjectInput::new(bucket, key, body);
    if let Some(ct) = content_type {
        input = input.content_type(ct);
    }

    let out = client
        .put_object(input)
        .await
        .with_context(|| format!("uploading {bucket}/{key}"))?;

    println!(
        "Encrypted {} → {} ({} bytes → {} bytes)",
        file.display(),
        out.location,
        plaintext_len,
        out.ciphertext_len,
    );
    println!("  algorithm:   {}", out.algorithm);
    println!("  master key:  {}", out.description);
    match &out.instruction {
        Some(instruction) => println!("  envelope:    instruction object {instruction}"),
        None => println!("  envelope:    object metadata"),
    }
    Ok(())
}

// ── `s3ee get` ────────────────────────────────────────────────────────────────

async fn cmd_get(
    config: &S3eeConfig,
    bucket: &str,
    key: &str,
    output: Option<&Path>,
    location: Option<EnvelopeLocation>,
    suffix: Option<String>,
) -> Result<()> {
    let client = build_client(config)?;

    let mut input = GetObjectInput::new(bucket, key);
    if let Some(location) = location {
        input = input.envelope_location(location);
    }
    if let Some(suffix) = suffix {
        input = input.instruction_file_suffix(suffix);
    }

    let out = client
        .get_object(input)
        .await
        .with_context(|| format!("downloading {bucket}/{key}"))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &out.body)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Decrypted {bucket}/{key} → {} ({} bytes)", path.display(), out.body.len());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&out.body).await.context("writing to stdout")?;
            stdout.flush().await.context("flushing stdout")?;
        }
    }
    Ok(())
}

// ── `s3ee delete` ─────────────────────────────────────────────────────────────

async fn cmd_delete(config: &S3eeConfig, bucket: &str, key: &str) -> Result<()> {
    let client = build_client(config)?;
    client
        .delete_object(bucket, key)
        .await
        .with_context(|| format!("deleting {bucket}/{key}"))?;
    println!("Deleted {bucket}/{key}");
    Ok(())
}

// ── `s3ee keygen` ─────────────────────────────────────────────────────────────

fn generate_master_key(age: bool) -> Result<MasterKey> {
    if age {
        return Ok(MasterKey::Age(AgeKeyPair::generate()));
    }
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .context("reading system randomness")?;
    let key = MasterKey::symmetric(bytes);
    bytes.zeroize();
    Ok(key)
}

fn cmd_keygen(age: bool, output: Option<&Path>) -> Result<()> {
    let key = generate_master_key(age)?;

    match output {
        Some(path) => {
            KeyFile::write(path, &key)?;
            eprintln!(
                "Wrote {} master key to {} (fingerprint {})",
                key.kind(),
                path.display(),
                key.fingerprint()
            );
        }
        None => print!("{}", KeyFile::render(&key).expose_secret()),
    }

    if let MasterKey::Age(pair) = &key {
        eprintln!("Public recipient: {}", pair.recipient());
    }
    Ok(())
}

// ── `s3ee config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &S3eeConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
