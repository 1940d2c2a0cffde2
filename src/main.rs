use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use ticket_chat::client::models::capabilities::{resolve_capabilities, Capability};
use ticket_chat::client::models::chat_message::ChatMessage;
use ticket_chat::client::models::message_store::Applied;
use ticket_chat::client::models::session::{Session, SessionState, User};
use ticket_chat::client::services::api_client::{ApiClient, ChatApi};
use ticket_chat::client::services::chat_view::{ChatView, ViewSignal};
use ticket_chat::client::services::history_loader::HistoryLoader;
use ticket_chat::client::services::transport::MessageTransport;
use ticket_chat::client::services::websocket_client::WebSocketClient;
use ticket_chat::client::utils::session_store::SessionStore;
use ticket_chat::common::config::ClientConfig;

#[derive(Parser)]
#[command(name = "ticket-chat", about = "Terminal client for service ticket chats")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a session obtained from the backend
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: String,
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the stored identity and what it may do
    Whoami,
    /// Ask the backend whether a ticket chat is open
    OpenTicket,
    /// Chat on a ticket; type lines to send, /quit to leave
    Chat { ticket: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ClientConfig::from_env();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cfg.log_level.as_str())).init();

    let cli = Cli::parse();
    let store = SessionStore::from_config(&cfg);
    let state = SessionState::new();
    if let Some(session) = store.load_session() {
        state.login(session);
    }

    match cli.command {
        Command::Login { token, user_id, username, permissions } => {
            let session = Session {
                token,
                user: User {
                    id: user_id,
                    username,
                    permissions: permissions.into_iter().collect(),
                },
            };
            store.save_session(&session).context("failed to store session")?;
            println!("Logged in as {}", session.user.username);
            state.login(session);
        }
        Command::Logout => {
            state.logout();
            store.clear_session().context("failed to clear session")?;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = state.user();
            match &user {
                Some(u) => println!("{} ({})", u.username, u.id),
                None => println!("Not logged in"),
            }
            for capability in resolve_capabilities(user.as_ref()).iter() {
                println!("  {:?}", capability);
            }
        }
        Command::OpenTicket => {
            let session = state.current().context("login first")?;
            let api = ApiClient::from_config(&cfg)?;
            match api.open_ticket(&session.token).await?.entry_point() {
                Some(ticket) => println!("Open ticket: {}", ticket),
                None => println!("No open ticket"),
            }
        }
        Command::Chat { ticket } => {
            let session = state.current().context("login first")?;
            if !resolve_capabilities(Some(&session.user)).allows(Capability::OpenTicketChat) {
                bail!("{} may not open ticket chats", session.user.username);
            }
            run_chat(&cfg, session, &ticket).await?;
        }
    }

    Ok(())
}

async fn run_chat(cfg: &ClientConfig, session: Session, ticket: &str) -> anyhow::Result<()> {
    let transport = MessageTransport::new(cfg.outbox_capacity);
    let mut ws_client = WebSocketClient::from_config(cfg, transport.clone());
    ws_client.set_session_token(session.token.clone());
    let connection = ws_client.spawn();

    let api: Arc<dyn ChatApi> = Arc::new(ApiClient::from_config(cfg)?);
    let loader = HistoryLoader::new(api);
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

    let (mut view, handle) = ChatView::mount(ticket, session, &loader, transport.clone(), signal_tx).await;
    for message in view.messages() {
        print_message(message);
    }

    let mut lines = BufReader::new(stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "/quit" => break,
                Ok(Some(line)) => {
                    view.set_pending(line);
                    if view.send_pending() {
                        if let Some(message) = view.store().last() {
                            print_message(message);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("[CLI] stdin failed: {}", e);
                    break;
                }
            },
            applied = view.next_inbound() => match applied {
                Some(Applied::Appended) => {
                    if let Some(message) = view.store().last() {
                        print_message(message);
                    }
                }
                Some(Applied::Confirmed(index)) => log::debug!("[CLI] Message {} confirmed", index),
                Some(Applied::Dropped) => {}
                None => break,
            },
            Some(signal) = signal_rx.recv() => {
                if let ViewSignal::Alert(text) = signal {
                    eprintln!("! {}", text);
                }
            }
        }
    }

    handle.unmount();
    drop(view);
    if transport.pending() > 0 {
        log::warn!("[CLI] {} messages were never delivered", transport.pending());
    }
    connection.shutdown().await;
    Ok(())
}

fn print_message(message: &ChatMessage) {
    let marker = if message.is_optimistic() { " (sending)" } else { "" };
    println!("[{}] {}: {}{}", message.formatted_time(), message.author_name, message.text, marker);
}
