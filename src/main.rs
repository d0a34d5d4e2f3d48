mod bootstrap;
mod config;
mod convert;
mod db;
mod engine;
mod gateway;
mod ipc;
mod model;
mod ordering;
mod parser;
mod plan;
mod remote;
mod tags;
mod telemetry;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let settings = config::Settings::load()?;
    telemetry::init_tracing(&settings)?;

    let state = Arc::new(ipc::AppState::new(settings));
    if let Some(workspace) = state.settings.workspace().cloned() {
        if let Err(e) = state.open_workspace(&workspace) {
            warn!(workspace = %workspace.display(), error = %e, "initial workspace could not be opened");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "lessond ready");

    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(resp) = rx.recv().await {
            let mut line =
                serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(v)) => v,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed; shutting down");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer with.
                let _ = tx.send(serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                }));
                continue;
            }
        };

        // Each request runs as its own task so a slow remote never stalls the loop.
        let state = state.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let resp = ipc::handle_request(&state, req).await;
            let _ = tx.send(resp);
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}
