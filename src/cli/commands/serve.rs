//! Serve command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::server::{self, ENDPOINTS, USER_ID_HEADER};

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::warning(&e.to_string());
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);

    let orchestrator = Orchestrator::new(settings)?;

    Output::header("Quarry API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    for (name, route) in ENDPOINTS {
        Output::kv(name, route);
    }
    println!();
    Output::info(&format!(
        "Requests other than /health must carry the {} header.",
        USER_ID_HEADER
    ));
    Output::info("Press Ctrl+C to stop the server.");

    server::serve(orchestrator, &addr).await?;

    Ok(())
}
