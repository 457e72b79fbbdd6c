use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use waypoint_core::config::{load_base_waypoints, NodeConfig};
use waypoint_core::node::bridge::{dispatch, parse_line, OutboundMessage};
use waypoint_core::node::PlannerNode;
use waypoint_core::perception::classifier::load_classifier;

const DEFAULT_CONFIG: &str = "config/traffic_light_config.yaml";

/// Forward one topic into the shared stdout queue
fn forward<T>(mut rx: broadcast::Receiver<T>, out: mpsc::UnboundedSender<OutboundMessage>)
where
    T: Clone + Send + 'static,
    OutboundMessage: From<T>,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if out.send(OutboundMessage::from(msg)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Output fell behind, {} messages dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("waypoint_core=info,waypoint_node=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    info!("Initializing waypoint node from {}", config_path.display());

    let config = NodeConfig::load(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let classifier = load_classifier(config.classifier).context("failed to load classifier")?;
    let node = PlannerNode::new(&config, classifier).context("failed to start planner node")?;

    if let Some(path) = &config.base_waypoints {
        let path = config_path
            .parent()
            .map(|dir| dir.join(path))
            .filter(|joined| joined.exists())
            .unwrap_or_else(|| path.clone());
        let waypoints = load_base_waypoints(&path)
            .with_context(|| format!("failed to load base waypoints {}", path.display()))?;
        info!("Loaded {} base waypoints", waypoints.len());
        node.waypoints_callback(waypoints);
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();
    forward(node.subscribe_final_waypoints(), out_tx.clone());
    forward(node.subscribe_traffic_waypoint(), out_tx);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(msg) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&msg) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode message: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!("Failed to write output: {}", e);
                break;
            }
            if let Err(e) = stdout.flush().await {
                error!("Failed to flush output: {}", e);
                break;
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let planner = Arc::clone(&node);
    let planning_loop = tokio::spawn(async move { planner.run(shutdown_rx).await });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(msg) = parse_line(&line) {
                        dispatch(&node, msg);
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    planning_loop.await.context("planning loop panicked")?;
    node.shutdown().context("failed to shut down planner node")?;
    writer.abort();
    info!("Waypoint node stopped");
    Ok(())
}
