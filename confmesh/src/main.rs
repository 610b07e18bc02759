use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use confmesh::config::CallConfig;
use confmesh::peer::IceConnectionState;
use confmesh::{CallEnvironment, CallSessionController, SessionStatus};
use confmesh_hub::Hub;
use confmesh_signaling::Member;
use tracing_subscriber::prelude::*;

const NAMES: [&str; 6] = ["Alice", "Bob", "Carol", "Dave", "Erin", "Frank"];

/// Runs a simulated mesh meeting through an in-process presence hub.
///
/// Usage: `confmesh [participants] [meeting-id] [seconds] [config.json]`
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confmesh=info,confmesh_hub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let count: usize = match args.first() {
        Some(v) => v.parse().map_err(|e| anyhow!("Invalid participant count {v}: {e}"))?,
        None => 3,
    };
    if count == 0 || count > NAMES.len() {
        return Err(anyhow!("Participant count must be between 1 and {}", NAMES.len()));
    }
    let meeting_id = args.get(1).cloned().unwrap_or_else(|| "demo".to_string());
    let seconds: u64 = match args.get(2) {
        Some(v) => v.parse().map_err(|e| anyhow!("Invalid duration {v}: {e}"))?,
        None => 3,
    };
    let config = match args.get(3) {
        Some(path) => CallConfig::load(path).await?,
        None => CallConfig::default(),
    };
    let output_dir = std::env::temp_dir().join("confmesh");

    let hub = Hub::new();
    let mut controllers = Vec::new();
    for (index, name) in NAMES.iter().take(count).enumerate() {
        let controller = CallSessionController::new(
            config.clone(),
            CallEnvironment::simulated(&output_dir),
        );
        let member = Member::new((index + 1).to_string(), *name);
        controller
            .start(&meeting_id, member, Arc::new(hub.connect()))
            .await?;
        controllers.push(controller);
    }

    let connected = wait_for_mesh(&controllers, count - 1, Duration::from_secs(5)).await;
    if connected {
        tracing::info!(count, "Mesh established");
    } else {
        tracing::warn!(count, "Mesh not fully connected");
    }
    for controller in &controllers {
        let session = controller.session();
        let name = session.map(|s| s.local_participant.name).unwrap_or_default();
        for view in controller.participants() {
            tracing::info!(
                %name,
                peer = %view.display_name,
                ice = view.ice_state.as_str(),
                tracks = view.remote_track_count(),
                "Peer"
            );
        }
    }

    if let Some(first) = controllers.first() {
        first.toggle_audio();
    }
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    for controller in controllers.iter().rev() {
        controller.stop().await;
        if let Some(recording) = controller.view().recording {
            tracing::info!(
                file = %recording.file_name,
                size = recording.size,
                "Recording saved"
            );
        }
    }
    Ok(())
}

async fn wait_for_mesh(
    controllers: &[Arc<CallSessionController>],
    peers: usize,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        let done = controllers.iter().all(|c| {
            let participants = c.participants();
            c.status() == SessionStatus::Active
                && participants.len() == peers
                && participants
                    .iter()
                    .all(|p| p.ice_state == IceConnectionState::Connected)
        });
        if done {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
