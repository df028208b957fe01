//! dicomview - command-line client for the DICOM viewer backend.
//!
//! Logs in against the backend's auth API, keeps the session on disk, issues
//! authenticated requests, and browses study manifests slice by slice.

mod commands;
mod view;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dicomview_core::{AuthSession, Config};

const USAGE: &str = "\
Usage: dicomview <command> [args]

Commands:
  login [username]                     Log in and store the session
  signup <username> <display-name> [email]
                                       Create an account and log in
  logout [--forget]                    End the session (--forget drops the saved password)
  whoami                               Show the logged-in user
  get <endpoint>                       Authenticated GET, prints the JSON response
  view <manifest.json>                 Browse a study manifest file
  view --api <endpoint>                Browse a study manifest fetched from the API

Environment:
  DICOM_API_URL                        API base URL (default http://localhost:8080)
  RUST_LOG                             Log filter (default warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let rest = &args[1..];

    let mut config = Config::load()?;
    let api = AuthSession::from_config(&config)?;
    info!(base_url = api.base_url(), command = %command, "dicomview starting");

    match command.as_str() {
        "login" => commands::login(&api, &mut config, rest.first().map(String::as_str)).await,
        "signup" => commands::signup(&api, &mut config, rest).await,
        "logout" => commands::logout(&api, &config, rest.iter().any(|a| a == "--forget")).await,
        "whoami" => {
            commands::whoami(&api);
            Ok(())
        }
        "get" => match rest.first() {
            Some(endpoint) => commands::get(&api, endpoint).await,
            None => Err(anyhow::anyhow!("get requires an endpoint, e.g. /api/studies")),
        },
        "view" => {
            let source = view::ManifestSource::from_args(rest)?;
            view::run(&api, &source).await
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}
