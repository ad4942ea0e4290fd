use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use escrow_recovery::audit::{AuditSink, JsonLinesAuditSink, TracingAuditSink};
use escrow_recovery::config::RecoveryConfig;
use escrow_recovery::error::{RecoveryError, Result};
use escrow_recovery::recovery::{CallerContext, KeyPairVerifier, RecoveryOrchestrator};
use escrow_recovery::service::RecoveryService;
use escrow_recovery::state::{JsonFileKeyRepository, RecoveryRequest};
use escrow_recovery::units::{SoftwareStorageUnit, SoftwareTransportUnit, TokenSession};

#[derive(Parser)]
#[command(name = "escrow-recovery")]
#[command(about = "Recover escrowed private keys and re-wrap them for token delivery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one recovery request (JSON) and print the updated request
    Recover {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON file holding the archived key records
        #[arg(long)]
        records: PathBuf,
        /// PKCS#8 PEM storage private key
        #[arg(long)]
        storage_key: PathBuf,
        /// PKCS#8 PEM transport private key
        #[arg(long)]
        transport_key: PathBuf,
        /// Request JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        request: String,
        /// Append audit events to this JSON-lines file instead of the log
        #[arg(long)]
        audit_log: Option<PathBuf>,
        /// Agent identity recorded in the audit trail
        #[arg(long, default_value = "cli")]
        agent: String,
    },
    /// Check that a private key (PKCS#8) matches a public key (SPKI)
    Verify {
        #[arg(long)]
        public_key: PathBuf,
        #[arg(long)]
        private_key: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Recover {
            config,
            records,
            storage_key,
            transport_key,
            request,
            audit_log,
            agent,
        } => {
            recover(RecoverArgs {
                config,
                records,
                storage_key,
                transport_key,
                request,
                audit_log,
                agent,
            })
            .await
        }
        Commands::Verify {
            public_key,
            private_key,
        } => verify(&public_key, &private_key),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "escrow-recovery failed");
            ExitCode::from(2)
        }
    }
}

struct RecoverArgs {
    config: Option<PathBuf>,
    records: PathBuf,
    storage_key: PathBuf,
    transport_key: PathBuf,
    request: String,
    audit_log: Option<PathBuf>,
    agent: String,
}

async fn recover(args: RecoverArgs) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => RecoveryConfig::load(path)?,
        None => RecoveryConfig::default(),
    };

    let storage = SoftwareStorageUnit::from_pkcs8_pem(
        &std::fs::read_to_string(&args.storage_key)?,
        config.legacy_wrapping_params.clone(),
    )
    .map_err(|e| RecoveryError::KeyLoad(format!("{}: {e}", args.storage_key.display())))?;
    let transport = SoftwareTransportUnit::from_pkcs8_pem(&std::fs::read_to_string(&args.transport_key)?)
        .map_err(|e| RecoveryError::KeyLoad(format!("{}: {e}", args.transport_key.display())))?;

    let audit: Arc<dyn AuditSink> = match &args.audit_log {
        Some(path) => Arc::new(
            JsonLinesAuditSink::open(path)
                .map_err(|e| RecoveryError::Config(format!("audit log {}: {e}", path.display())))?,
        ),
        None => Arc::new(TracingAuditSink),
    };

    let request = read_request(&args.request)?;
    info!(request_id = %request.request_id, token = %config.token_name, "Processing recovery request");

    let orchestrator = RecoveryOrchestrator::new(
        config.clone(),
        TokenSession::shared(config.token_name.clone()),
        Arc::new(transport),
        Arc::new(storage),
        Arc::new(JsonFileKeyRepository::new(&args.records)),
        audit,
    );
    let service = RecoveryService::new(Arc::new(orchestrator));
    let (request, outcome) = service.recover(CallerContext::new(args.agent), request).await;

    let json = serde_json::to_string_pretty(&request)
        .map_err(|e| RecoveryError::Serialization(e.to_string()))?;
    println!("{json}");

    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn read_request(source: &str) -> Result<RecoveryRequest> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(source)?
    };
    serde_json::from_str(&text).map_err(|e| RecoveryError::Serialization(e.to_string()))
}

/// Read DER, or PEM when the file carries armour.
fn read_der(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    if bytes.starts_with(b"-----BEGIN") {
        let text = String::from_utf8(bytes)
            .map_err(|e| RecoveryError::KeyLoad(format!("{}: {e}", path.display())))?;
        let (_label, document) = der::Document::from_pem(&text)
            .map_err(|e| RecoveryError::KeyLoad(format!("{}: {e}", path.display())))?;
        return Ok(document.as_bytes().to_vec());
    }
    Ok(bytes)
}

fn verify(public_key: &Path, private_key: &Path) -> Result<ExitCode> {
    let public = read_der(public_key)?;
    let private = zeroize::Zeroizing::new(read_der(private_key)?);

    if KeyPairVerifier::verify(&public, &private) {
        println!("match");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("mismatch");
        Ok(ExitCode::from(1))
    }
}
