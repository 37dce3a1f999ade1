//! `heimdall` - inspect environment profiles and policy files.
//!
//! Build: `cargo build --bin heimdall --features cli`

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use heimdall::version::BuildInfo;
use heimdall::{Config, Environment, EnvironmentProfile, HeimdallError, load_profile};

#[derive(Parser)]
#[command(name = "heimdall", about = "inspect heimdall admission-control profiles")]
#[command(disable_version_flag = true)]
struct Args {
    /// print version and exit
    #[arg(short = 'V', long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// print the canonical profile for an environment as JSON
    Profile {
        /// development, ci, production-verification or load
        environment: String,
    },
    /// validate a policy file and print the effective profile
    Check {
        /// policy file (default: $HEIMDALL_CONFIG or ~/.heimdall/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// environment for files that do not declare one
        #[arg(short, long, env = "HEIMDALL_ENV")]
        env: Option<String>,
    },
    /// show which policy governs an endpoint
    Resolve {
        /// concrete endpoint, e.g. "/api/users/42"
        endpoint: String,
        #[arg(short, long, env = "HEIMDALL_ENV")]
        env: Option<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// print build metadata as JSON
    Build,
}

#[derive(Serialize)]
struct Resolution<'a> {
    environment: Environment,
    endpoint: &'a str,
    policy: heimdall::EndpointPolicy,
    requires_mock: bool,
}

fn main() {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    if args.version {
        println!("heimdall {}", heimdall::version_string());
        return;
    }

    let Some(command) = args.command else {
        eprintln!("error: a subcommand is required (see --help)");
        process::exit(2);
    };

    if let Err(e) = run(command) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Profile { environment } => {
            print_json(&load_profile(&environment)?)?;
        }
        Command::Check { config, env } => {
            let profile = effective_profile(config, env.as_deref())?;
            eprintln!(
                "ok: {} endpoint policies for {}",
                profile.endpoints.len(),
                profile.environment
            );
            print_json(&profile)?;
        }
        Command::Resolve {
            endpoint,
            env,
            config,
        } => {
            let profile = effective_profile(config, env.as_deref())?;
            let policy = profile.registry()?.resolve_policy(&endpoint);
            print_json(&Resolution {
                environment: profile.environment,
                endpoint: &endpoint,
                requires_mock: profile.requires_mock(&policy),
                policy,
            })?;
        }
        Command::Build => {
            print_json(&BuildInfo::current())?;
        }
    }
    Ok(())
}

/// Policy file (if any) overlaid on the environment's canonical profile.
fn effective_profile(
    config: Option<PathBuf>,
    env: Option<&str>,
) -> Result<EnvironmentProfile, HeimdallError> {
    Config::load(config.as_deref())?
        .unwrap_or_default()
        .into_profile(env)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
