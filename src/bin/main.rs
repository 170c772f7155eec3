//! PKI CA engine CLI
//!
//! Bootstraps a CA hierarchy from configuration, issues certificates from a
//! persisted CA and answers RFC 3161 time-stamp queries.

use chrono::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use pki_ca_engine::{
    infra::config::{validity_days, ConfigManager, EngineConfiguration, ExportFormat},
    pipelines::CaHierarchy,
    services::{
        load_ca, parse_timestamp_request, serialize_timestamp_response, CertificateIssuer,
        CertificateRequest, IssuingCaConfig, SoftwareProvider, TimestampAuthority,
    },
    PublicKey, SubjectRequest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pki-ca")]
#[command(about = "Certificate authority engine with CRL, OCSP and RFC 3161 services")]
#[command(long_about = "
PKI CA Engine - root/intermediate CA hierarchy and time-stamp authority

EXAMPLES:
    # Write a default configuration file
    pki-ca config init

    # Build the hierarchy into ./pki
    pki-ca bootstrap --output ./pki

    # Issue a TLS certificate from the persisted intermediate
    pki-ca issue --ca-dir ./pki --ca-name issuing-ca --public-key web.pub \\
        --cn www.example.com --dns www.example.com

    # Answer a time-stamp query
    pki-ca timestamp --ca-dir ./pki --tsa-name tsa --request query.tsq --output reply.tsr

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Create root, intermediate and TSA material
    Bootstrap {
        /// Directory receiving certificates and keys (overrides config)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Issue an end-entity certificate from a persisted CA
    Issue {
        #[arg(long, value_name = "DIR")]
        ca_dir: PathBuf,

        #[arg(long, default_value = "issuing-ca")]
        ca_name: String,

        /// Subscriber public key (PEM)
        #[arg(long, value_name = "PEM")]
        public_key: PathBuf,

        /// Subject common name
        #[arg(long)]
        cn: String,

        #[arg(long)]
        dns: Vec<String>,

        #[arg(long)]
        ip: Vec<String>,

        #[arg(long)]
        email: Vec<String>,

        #[arg(long)]
        uri: Vec<String>,

        /// Validity in days (defaults to the issuance section)
        #[arg(long)]
        days: Option<i64>,

        /// Write the certificate here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Answer a DER time-stamp query
    Timestamp {
        #[arg(long, value_name = "DIR")]
        ca_dir: PathBuf,

        #[arg(long, default_value = "tsa")]
        tsa_name: String,

        /// DER `TimeStampReq`
        #[arg(long, value_name = "TSQ")]
        request: PathBuf,

        /// DER `TimeStampResp`
        #[arg(short, long, value_name = "TSR")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Create default configuration file
    Init,

    /// Export configuration
    Export {
        /// Export format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ExportFormatArg,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone)]
enum ExportFormatArg {
    Toml,
    Json,
    Yaml,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Toml => ExportFormat::Toml,
            ExportFormatArg::Json => ExportFormat::Json,
            ExportFormatArg::Yaml => ExportFormat::Yaml,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new().into_diagnostic()?,
    };

    match cli.command {
        Commands::Config(config_cmd) => handle_config_command(&config_manager, config_cmd)?,

        Commands::Bootstrap { output } => {
            let mut config = load_config(&config_manager)?;
            if output.is_some() {
                config.output_dir = output;
            }
            handle_bootstrap_command(&config)?;
        }

        Commands::Issue {
            ca_dir,
            ca_name,
            public_key,
            cn,
            dns,
            ip,
            email,
            uri,
            days,
            output,
        } => {
            let config = load_config(&config_manager)?;
            let subject = SubjectRequest {
                common_name: cn,
                dns_names: dns,
                ip_addresses: ip,
                email_addresses: email,
                uris: uri,
                ..SubjectRequest::default()
            };
            let validity = match days {
                Some(days) => validity_days("issue", "--days", days),
                None => config.issuance.default_validity(),
            }
            .into_diagnostic()?;
            handle_issue_command(&config, &ca_dir, &ca_name, &public_key, subject, validity, output)?;
        }

        Commands::Timestamp {
            ca_dir,
            tsa_name,
            request,
            output,
        } => {
            let config = load_config(&config_manager)?;
            handle_timestamp_command(&config, &ca_dir, &tsa_name, &request, &output)?;
        }
    }

    Ok(())
}

/// Configured values, or defaults when no file exists yet.
fn load_config(config_manager: &ConfigManager) -> Result<EngineConfiguration> {
    if config_manager.config_path().exists() {
        config_manager.load().into_diagnostic()
    } else {
        log::debug!(
            "No configuration at {}, using defaults",
            config_manager.config_path().display()
        );
        Ok(EngineConfiguration::default())
    }
}

fn handle_config_command(config_manager: &ConfigManager, config_cmd: ConfigCommands) -> Result<()> {
    match config_cmd {
        ConfigCommands::Show => match config_manager.load() {
            Ok(config) => {
                println!("📋 Current Configuration:");
                println!("  Root CA: {} ({})", config.root.name, config.root.key.algorithm);
                println!(
                    "  Intermediate CA: {} ({})",
                    config.intermediate.name, config.intermediate.key.algorithm
                );
                println!("  TSA: {} (policy {})", config.tsa.name, config.tsa.policy);
                println!("  CRL validity: {} hours", config.crl.validity_hours);
                println!("  OCSP validity: {} hours", config.ocsp.validity_hours);
                match &config.output_dir {
                    Some(dir) => println!("  Output directory: {}", dir.display()),
                    None => println!("  Output directory: (not persisted)"),
                }
                println!(
                    "  Configuration file: {}",
                    config_manager.config_path().display()
                );
            }
            Err(_) => {
                println!("📋 No configuration file found. Use 'config init' to create one.");
            }
        },

        ConfigCommands::Init => {
            let _config = config_manager.load_or_create_default().into_diagnostic()?;
            println!(
                "✅ Configuration initialized: {}",
                config_manager.config_path().display()
            );
        }

        ConfigCommands::Export { format, output } => {
            let content = config_manager
                .export_config(format.into())
                .into_diagnostic()?;

            if let Some(output_path) = output {
                std::fs::write(&output_path, content).into_diagnostic()?;
                println!("✅ Configuration exported to: {}", output_path.display());
            } else {
                println!("{content}");
            }
        }
    }

    Ok(())
}

fn handle_bootstrap_command(config: &EngineConfiguration) -> Result<()> {
    if config.output_dir.is_none() {
        log::warn!("No output directory configured; generated keys will not be kept");
    }

    let hierarchy = CaHierarchy::build(config, Arc::new(SoftwareProvider::new()))
        .into_diagnostic()
        .wrap_err("Hierarchy bootstrap failed")?;

    let audit = serde_json::to_string_pretty(hierarchy.audit()).into_diagnostic()?;
    println!("{audit}");
    Ok(())
}

fn handle_issue_command(
    config: &EngineConfiguration,
    ca_dir: &Path,
    ca_name: &str,
    public_key: &Path,
    subject: SubjectRequest,
    validity: Duration,
    output: Option<PathBuf>,
) -> Result<()> {
    let ca = load_ca(ca_dir, ca_name).into_diagnostic()?;
    let pem = std::fs::read(public_key)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read {}", public_key.display()))?;
    let public_key = PublicKey::from_pem(&pem).into_diagnostic()?;

    let issuer = CertificateIssuer::new(IssuingCaConfig {
        name: ca_name.to_string(),
        certificate: ca.certificate,
        private_key: ca.private_key,
        provider: Arc::new(SoftwareProvider::new()),
        subject_profile: config.issuance.load_subject_profile().into_diagnostic()?,
        certificate_profile: config.issuance.load_certificate_profile().into_diagnostic()?,
    })
    .into_diagnostic()?;

    let (issued, audit) = issuer
        .issue(&CertificateRequest::new(subject, public_key, validity))
        .into_diagnostic()
        .wrap_err("Certificate issuance failed")?;

    log::info!(
        "Audit: {}",
        serde_json::to_string(&audit).into_diagnostic()?
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &issued.chain_pem).into_diagnostic()?;
            println!("✅ Certificate {} written to: {}", issued.serial_hex, path.display());
        }
        None => print!("{}", issued.chain_pem),
    }
    Ok(())
}

fn handle_timestamp_command(
    config: &EngineConfiguration,
    ca_dir: &Path,
    tsa_name: &str,
    request: &Path,
    output: &Path,
) -> Result<()> {
    let tsa_material = load_ca(ca_dir, tsa_name).into_diagnostic()?;
    let tsa = TimestampAuthority::new(
        config
            .tsa
            .to_runtime(
                tsa_material.certificate,
                tsa_material.private_key,
                Arc::new(SoftwareProvider::new()),
            )
            .into_diagnostic()?,
    )
    .into_diagnostic()?;

    let query = std::fs::read(request).into_diagnostic()?;
    let parsed = match parse_timestamp_request(&query) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!("Unparseable time-stamp query {}: {e}", request.display());
            None
        }
    };

    let response = tsa.create_timestamp(parsed.as_ref());
    let der = serialize_timestamp_response(Some(&response)).into_diagnostic()?;
    std::fs::write(output, der).into_diagnostic()?;

    if response.is_granted() {
        println!("✅ Time-stamp granted: {}", output.display());
    } else {
        println!("❌ Time-stamp rejected: {}", output.display());
    }
    Ok(())
}
