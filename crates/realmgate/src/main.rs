use std::path::PathBuf;

use clap::{Parser, Subcommand};
use realmgate::bootstrap::{create_policy_engine, create_policy_store, create_token_store};
use realmgate::config::{self, ConfigBuilder};
use realmgate::observability::init_observability;
use realmgate::policy::{ContextPolicyBin, Resolution};
use realmgate::store::TokenEntry;

#[derive(Parser, Debug)]
#[command(name = "realmgate")]
#[command(about = "Inspect context policy and stored federation tokens", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding encrypted token files
    #[arg(long, global = true)]
    token_store_dir: Option<PathBuf>,

    /// Persisted policy file
    #[arg(long, global = true)]
    policy_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Context policy operations
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Stored token operations
    Tokens {
        #[command(subcommand)]
        action: TokensAction,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyAction {
    /// Show which policy covers a request path
    Resolve { path: String },
    /// Print every bin and the whitelist
    Show,
    /// Validate the policy and write it back
    Check,
}

#[derive(Subcommand, Debug)]
enum TokensAction {
    /// List a user's stored sources
    Show {
        user: String,
        #[arg(long)]
        source: Option<String>,
    },
    /// Delete a user's tokens, or only one source's
    Revoke {
        user: String,
        #[arg(long)]
        source: Option<String>,
    },
}

fn print_bin(bin: &ContextPolicyBin) {
    println!("realm: {}", bin.realm);
    println!("  authentication types: {}", bin.authentication_types.join("|"));
    if !bin.required_attributes.is_empty() {
        let attributes: Vec<String> = bin
            .required_attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("  required attributes: {}", attributes.join(";"));
    }
    for path in &bin.context_paths {
        println!("  path: {path}");
    }
}

fn print_entry(source_id: &str, entry: &TokenEntry) {
    println!("source: {source_id}");
    println!("  discovery url: {}", entry.discovery_url);
    println!("  refresh token: {}", entry.refresh_token.is_some());
    match entry.expires_at {
        Some(at) => println!("  expires at: {at}"),
        None => println!("  expires at: unknown"),
    }
}

fn run_policy(config: &realmgate::Config, action: PolicyAction) -> anyhow::Result<()> {
    let store = create_policy_store(&config.policy);
    let engine = create_policy_engine(&store)?;

    match action {
        PolicyAction::Resolve { path } => match engine.resolve(&path) {
            Resolution::Bin(bin) => print_bin(&bin),
            Resolution::Whitelisted => println!("{path}: whitelisted"),
            Resolution::Unprotected => println!("{path}: unprotected"),
        },
        PolicyAction::Show => {
            let snapshot = engine.snapshot();
            for bin in &snapshot.bins {
                print_bin(bin);
            }
            for path in &snapshot.whitelist {
                println!("whitelisted: {path}");
            }
        }
        PolicyAction::Check => {
            let snapshot = engine.snapshot();
            let bins = snapshot.bins.iter().map(|bin| (**bin).clone()).collect();
            engine.persist(bins, snapshot.whitelist.clone(), &store)?;
            println!(
                "policy ok: {} bins written to {}",
                snapshot.bins.len(),
                store.path().display()
            );
        }
    }
    Ok(())
}

fn run_tokens(config: &realmgate::Config, action: TokensAction) -> anyhow::Result<()> {
    let store = create_token_store(&config.token_store)?;

    match action {
        TokensAction::Show { user, source } => {
            if let Some(source_id) = source {
                let entry = store.read_source(&user, &source_id)?;
                print_entry(&source_id, &entry);
            } else {
                let info = store.read(&user)?;
                if info.is_empty() {
                    println!("no tokens stored for {user}");
                }
                for (source_id, entry) in &info.token_entries {
                    print_entry(source_id, entry);
                }
            }
        }
        TokensAction::Revoke { user, source } => {
            if let Some(source_id) = source {
                if store.delete_source(&user, &source_id)? {
                    println!("revoked {source_id} for {user}");
                } else {
                    println!("no {source_id} tokens stored for {user}");
                }
            } else {
                store.delete(&user)?;
                println!("revoked all tokens for {user}");
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // CLI values are the lowest layer; file and env override them
    let mut builder = ConfigBuilder::new().json_logs(args.json_logs);
    if let Some(dir) = args.token_store_dir {
        builder = builder.token_store_dir(dir);
    }
    if let Some(file) = args.policy_file {
        builder = builder.policy_file(file);
    }
    if args.verbose {
        builder = builder.log_level("debug");
    }

    let builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path, builder)?
    } else {
        config::load_config(builder)?
    };
    let config = builder.build()?;

    init_observability(&config.telemetry)?;

    tracing::debug!(config = ?config, "Configuration loaded");

    let result = match args.command {
        Command::Policy { action } => run_policy(&config, action),
        Command::Tokens { action } => run_tokens(&config, action),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
