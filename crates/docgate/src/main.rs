//! Docgate - Entry point

use std::path::PathBuf;

use anyhow::Context;
use docgate::{ConfigLoader, Docgate};
use docgate_telemetry::init_logging;

/// Configuration file used when `--config` is not given and it exists.
const DEFAULT_CONFIG: &str = "docgate.toml";

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("docgate {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Docgate - plugin-driven REST gateway for document databases

USAGE:
    docgate [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

Without --config, ./docgate.toml is read when present.

ENVIRONMENT VARIABLES:
    DOCGATE__SERVER__HTTP_ADDR               Listen address (default: 0.0.0.0:8080)
    DOCGATE__SERVER__REQUEST_TIMEOUT_MS      Per-request timeout (default: 30000)
    DOCGATE__SERVER__MAX_BODY_BYTES          Request body limit (default: 16777216)
    DOCGATE__LOGGING__LEVEL                  Log filter (default: info)
    DOCGATE__LOGGING__FORMAT                 json | pretty
    DOCGATE__DATA__DEFAULT_PAGESIZE          Listing page size (default: 100)
    DOCGATE__PLUGINS__<NAME>__ENABLED        Enable or disable a plugin
    DOCGATE__PLUGINS__<NAME>__URI            Mount point of a service
    DOCGATE__PLUGINS__<NAME>__ARGS__<ARG>    Plugin argument (JSON or string)

A .env file in the working directory is loaded first.
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new().with_defaults().with_dotenv()?;
    let loader = match &args.config {
        Some(path) => loader
            .with_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => loader.with_optional_file(DEFAULT_CONFIG)?,
    };
    let config = loader.with_env_prefix("DOCGATE").load()?;

    init_logging(&config.logging.to_log_config())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.http_addr,
        "starting docgate"
    );

    let gate = Docgate::builder(config)
        .build()
        .context("failed to bootstrap plugins")?;
    gate.run().await?;

    tracing::info!("docgate stopped");
    Ok(())
}
