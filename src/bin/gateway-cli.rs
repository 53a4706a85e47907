use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::RngCore;
use serde_json::Value;

use edge_gateway::config;
use edge_gateway::observability::sanitize;
use edge_gateway::security::csrf::{CsrfVerifier, SignedTokenVerifier};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the edge gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random CSRF signing secret
    GenSecret {
        /// Secret length in bytes
        #[arg(short, long, default_value_t = 32)]
        bytes: usize,
    },
    /// Mint a CSRF token with the given secret
    IssueToken {
        #[arg(short, long, env = "GATEWAY_CSRF_SECRET")]
        secret: String,
    },
    /// Verify a CSRF token against the given secret
    VerifyToken {
        #[arg(short, long, env = "GATEWAY_CSRF_SECRET")]
        secret: String,
        token: String,
    },
    /// Redact PII from JSON read on stdin
    Sanitize,
    /// Load and validate a configuration file
    CheckConfig { path: Option<PathBuf> },
    /// Query a running gateway's health endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenSecret { bytes } => {
            let mut secret = vec![0u8; bytes.max(config::validation::MIN_CSRF_SECRET_LEN)];
            rand::rngs::OsRng.fill_bytes(&mut secret);
            println!("{}", hex::encode(secret));
        }
        Commands::IssueToken { secret } => {
            let signer = SignedTokenVerifier::new(secret.as_bytes())?;
            println!("{}", signer.issue());
        }
        Commands::VerifyToken { secret, token } => {
            let signer = SignedTokenVerifier::new(secret.as_bytes())?;
            if signer.verify(Some(&token), Some(&token)) {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
        Commands::Sanitize => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let output = match serde_json::from_str::<Value>(&input) {
                Ok(value) => serde_json::to_string_pretty(&sanitize::sanitize_value(&value))?,
                Err(_) => sanitize::sanitize_str(&input),
            };
            println!("{}", output);
        }
        Commands::CheckConfig { path } => match config::load(path.as_deref()) {
            Ok(config) => {
                println!("Configuration OK ({:?})", config.environment);
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        Commands::Health { url } => {
            let res = reqwest::get(format!("{}/health", url.trim_end_matches('/'))).await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
