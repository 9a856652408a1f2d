use anyhow::Context;
use blink_chat::{
    ChatClient, ChatConfig, ChatError, ConversationSession, HttpChatApi, Identity,
    OptimisticStore, StoredCredentialSource,
};
use blink_common::{Settings, StoredCredentials};
use blink_realtime::{
    ConnectionConfig, ConnectionManager, CredentialSource, RealtimeError, StaticToken,
};
use chrono::Local;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod view;

const DEFAULT_API: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(name = "blink-tail")]
#[command(about = "Follow and post to one Blink conversation")]
struct Cli {
    /// REST base URL
    #[arg(long, env = "BLINK_API_URL")]
    api: Option<String>,

    /// Broker endpoint; defaults to `<api>/ws`
    #[arg(long, env = "BLINK_WS_URL")]
    ws: Option<String>,

    #[arg(short, long)]
    conversation: String,

    /// Access token; defaults to the stored credentials
    #[arg(long, env = "BLINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long, default_value = "20")]
    page_size: u32,

    /// Remember the endpoints and token for later runs
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    blink_common::init_structure()?;
    let settings = blink_common::load_settings();
    let api_url = cli
        .api
        .or(settings.api_url)
        .unwrap_or_else(|| DEFAULT_API.to_string());
    let ws_url = cli
        .ws
        .or(settings.ws_url)
        .unwrap_or_else(|| format!("{}/ws", api_url.trim_end_matches('/')));

    if cli.save {
        remember(
            &blink_common::settings_path(),
            &blink_common::credentials_path(),
            &api_url,
            &ws_url,
            cli.token.as_deref(),
        )?;
        info!("Saved settings under {:?}", blink_common::blink_root());
    }

    let (credentials, identity): (Arc<dyn CredentialSource>, Identity) = match cli.token {
        Some(token) => (
            Arc::new(StaticToken::new(token.clone())),
            Identity::from_token(&token),
        ),
        None => {
            let stored = blink_common::load_credentials();
            let identity = stored
                .access_token()
                .map(Identity::from_token)
                .unwrap_or_default();
            (Arc::new(StoredCredentialSource::default_location()), identity)
        }
    };

    info!("=== Blink Tail ===");
    info!("API: {} | Broker: {}", api_url, ws_url);

    let manager = ConnectionManager::websocket(ConnectionConfig::new(ws_url), credentials.clone());
    let api = HttpChatApi::new(&api_url, credentials).context("building REST client")?;
    let client = ChatClient::init(
        ChatConfig::default().with_page_size(cli.page_size),
        identity,
        manager,
        Arc::new(api),
        Some(OptimisticStore::path_in(&blink_common::state_dir())),
    )
    .await?;
    let session = Arc::new(client.open_conversation(cli.conversation));

    match client.connect().await {
        Ok(()) => {}
        Err(ChatError::Realtime(RealtimeError::Unauthenticated)) => {
            anyhow::bail!("not signed in: pass --token or store credentials first")
        }
        Err(e) => warn!("Initial connect failed, retrying in background: {}", e),
    }
    if let Err(e) = session.load_older().await {
        warn!("Could not load history: {}", e);
    }

    let status_task = tokio::spawn({
        let mut status = client.status();
        async move {
            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                eprintln!("* {}", current);
            }
        }
    });
    let render_task = tokio::spawn(render_loop(
        session.clone(),
        client.identity().clone(),
        client.store().clone(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut typing = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                client.manager().notify_foreground_recovered();
                match line.trim() {
                    "" => {}
                    "/older" => match session.load_older().await {
                        Ok(true) => {}
                        Ok(false) => eprintln!("* no older messages"),
                        Err(e) => eprintln!("* {}", e),
                    },
                    "/typing" => {
                        typing = !typing;
                        session.set_typing(typing);
                    }
                    body => {
                        if let Err(e) = session.send(body).await {
                            eprintln!("* send failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    render_task.abort();
    status_task.abort();
    if let Ok(session) = Arc::try_unwrap(session) {
        session.close();
    }
    client.shutdown();
    Ok(())
}

/// Persist the endpoints, and the token when one was given. A stored
/// refresh token is kept.
fn remember(
    settings_path: &Path,
    credentials_path: &Path,
    api_url: &str,
    ws_url: &str,
    token: Option<&str>,
) -> anyhow::Result<()> {
    Settings {
        api_url: Some(api_url.to_string()),
        ws_url: Some(ws_url.to_string()),
    }
    .save_to(settings_path)
    .context("saving settings")?;

    if let Some(token) = token {
        let mut stored = StoredCredentials::load_from(credentials_path);
        stored.access_token = Some(token.to_string());
        stored.save_to(credentials_path).context("saving credentials")?;
    }
    Ok(())
}

async fn render_loop(
    session: Arc<ConversationSession>,
    identity: Identity,
    store: Arc<OptimisticStore>,
) {
    let mut session_changes = session.changes();
    let mut store_changes = store.changes();
    loop {
        match session.render_with_separators(&Local, Local::now().date_naive()).await {
            Ok(items) => {
                println!();
                for line in view::lines(&items, &identity, &Local) {
                    println!("{}", line);
                }
                let typing = session.typing_users();
                if !typing.is_empty() {
                    println!("  {} typing...", typing.join(", "));
                }
            }
            Err(e) => warn!("Render failed: {}", e),
        }
        tokio::select! {
            changed = session_changes.changed() => if changed.is_err() { break },
            changed = store_changes.changed() => if changed.is_err() { break },
        }
    }
}
