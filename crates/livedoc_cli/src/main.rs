/* 📖 # Why is the CLI minimal?

The CLI takes at most one argument, the path of the configuration file, and
defaults to `livedoc.toml` in the current directory. Everything else (port,
timings, projects) lives in that file, so there is no argument parser to keep
in sync with it.

Startup order:
1. Load the configuration
2. Start the live-sync thread
3. Start the HTTP server with the API service
4. Block until the live-sync thread exits

Exit codes:
- 0: The server shut down cleanly
- 1: Startup failed (config missing or invalid, port in use)
*/

use std::env;
use std::path::PathBuf;
use std::process;

use tracing::{error, info};

use livedoc_base::pal::http::HttpServerConfig;
use livedoc_base::tracing::init_tracing;
use livedoc_base::{LivedocResult, PalHandle, RealPal};
use livedoc_engine::{ApiService, LiveSync, load_config};

const DEFAULT_CONFIG: &str = "livedoc.toml";

fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("Error: Failed to initialise logging: {}", e);
        process::exit(1);
    }

    let config_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    if let Err(e) = run(config_path) {
        error!(error = %e, "livedoc stopped");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(config_path: PathBuf) -> LivedocResult<()> {
    let pal = PalHandle::new(RealPal::new());
    let config = load_config(&*pal, &config_path)?;
    for project in &config.projects {
        info!(id = %project.id, root = %project.root.display(), "Project configured");
    }

    let catalog = config.catalog();
    let live_sync = LiveSync::start(pal.clone(), catalog.clone(), &config.live_sync)?;
    let service = ApiService::new(pal.clone(), catalog, live_sync.handle(), config.search.limit);

    let server_config =
        HttpServerConfig::new(config.server.host.clone()).with_port(config.server.port);
    let server = pal.start_http_server(Box::new(service), server_config)?;
    println!(
        "livedoc listening on http://{}:{}",
        config.server.host,
        server.port()
    );

    live_sync.join()
}
