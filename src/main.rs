//! Headless client: connects to gateway sessions and relays stdin as chat.

use agentdesk_lib::gateway::PermissionBehavior;
use agentdesk_lib::{ConnectionManager, GatewayConfig, StoreChange};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "agentdesk")]
#[command(about = "Connect to agent sessions on a gateway")]
struct Cli {
    /// Session ids to connect to; stdin is sent to the first one
    #[arg(required = true)]
    sessions: Vec<String>,

    /// Gateway base URL (overrides config file and environment)
    #[arg(long)]
    gateway: Option<String>,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = GatewayConfig::load()?;
    if let Some(url) = cli.gateway {
        config.gateway_url = url;
    }
    if let Some(delay) = cli.reconnect_delay_ms {
        config.reconnect_delay_ms = delay;
    }
    log::info!("Using gateway {}", config.gateway_url);

    let manager = ConnectionManager::websocket(config);
    let mut changes = manager.store().lock().subscribe();

    for id in &cli.sessions {
        manager.connect(id);
    }
    let primary = cli.sessions[0].clone();
    manager.store().lock().set_current_session(Some(primary.as_str()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => run_command(&manager, &primary, line.trim()),
                None => break,
            },
            change = changes.recv() => match change {
                Ok(change) => report(&manager, change),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Missed {} store notifications", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.disconnect_all();
    Ok(())
}

fn run_command(manager: &ConnectionManager, session_id: &str, line: &str) {
    if line.is_empty() {
        return;
    }

    let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
    let sent = match command {
        "/interrupt" => manager.interrupt(session_id),
        "/model" => manager.set_model(session_id, arg),
        "/mode" => manager.set_permission_mode(session_id, arg),
        "/allow" => {
            manager.respond_permission(session_id, arg, PermissionBehavior::Allow, None)
        }
        "/deny" => manager.respond_permission(
            session_id,
            arg,
            PermissionBehavior::Deny,
            Some("Denied by user".to_string()),
        ),
        _ => manager.send_user_message(session_id, line),
    };

    if !sent {
        log::warn!("Session {} is not connected; message dropped", session_id);
    }
}

fn report(manager: &ConnectionManager, change: StoreChange) {
    let store = manager.store();
    let store = store.lock();

    match change {
        StoreChange::Connection(id, status) => log::info!("[{}] {}", id, status),
        StoreChange::Messages(id) => {
            if let Some(message) = store.messages(&id).last() {
                println!("[{}] {:?}: {}", id, message.role, message.content);
            }
        }
        StoreChange::Permissions(id) => {
            for request in store.pending_permissions(&id) {
                println!(
                    "[{}] permission {} requested for {} (/allow or /deny)",
                    id, request.request_id, request.tool_name
                );
            }
        }
        StoreChange::RunStatus(id) => {
            log::debug!("[{}] run status {:?}", id, store.run_status(&id));
        }
        StoreChange::Session(id) => {
            if let Some(session) = store.session(&id) {
                log::debug!("[{}] session updated: {:?}", id, session.model);
            }
        }
        other => log::trace!("{:?}", other),
    }
}
