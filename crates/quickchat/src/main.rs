//! CLI for QuickChat
//!
//! Subcommands:
//! - `server`: run the realtime WebSocket server. It only serves
//!   subscriptions: nothing in this process publishes until a request router
//!   is attached and calls `MessageFeed::create_message`. The data and media
//!   directories are still prepared so that router finds them.
//! - `client`: join a chat session's topic and print what arrives (smoke tests)
//! - `session`, `message`, `upload`: work on the local stores directly. sled
//!   locks its database, so these need the server to be stopped.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quickchat_config::{Settings, load_config};
use quickchat_hub::Hub;
use quickchat_hub::changes::messages_topic;
use quickchat_persistence::{BlobStore, FsBlobStore, NewMessage, RecordStore, SledStore};
use quickchat_transport::start_websocket_server;
use tracing::{error, info};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "quickchat")]
enum Command {
    /// Start the realtime WebSocket server
    Server,
    /// Join a chat session's message topic and print incoming frames
    Client {
        /// WebSocket endpoint to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8000/realtime/v1/websocket?vsn=1.0.0")]
        url: String,
        /// Chat session id to listen on
        #[arg(long)]
        session: String,
    },
    /// Manage chat sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Post or list messages
    #[command(subcommand)]
    Message(MessageCommand),
    /// Store a media file in the chat-media bucket
    Upload {
        file: PathBuf,
        /// Object name inside the bucket (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Also post the upload as a file message to this session
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Create a new chat session and print it
    Create,
}

#[derive(Subcommand)]
enum MessageCommand {
    /// Store a text message
    Post {
        #[arg(long)]
        session: String,
        content: String,
        #[arg(long)]
        sender: Option<String>,
    },
    /// Print the messages of a session, oldest first
    List {
        #[arg(long)]
        session: String,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            quickchat_utils::logging::init("info");
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    quickchat_utils::logging::init(&settings.log.level);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Client { url, session } => run_client(&url, &session).await,
        Command::Session(SessionCommand::Create) => create_session(&settings),
        Command::Message(MessageCommand::Post {
            session,
            content,
            sender,
        }) => post_message(&settings, session, content, sender),
        Command::Message(MessageCommand::List { session }) => list_messages(&settings, &session),
        Command::Upload {
            file,
            name,
            session,
        } => upload(&settings, file, name, session),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_server(settings: Settings) -> CliResult {
    std::fs::create_dir_all(&settings.storage.data_dir)?;
    std::fs::create_dir_all(&settings.storage.media_dir)?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let hub = Hub::new();

    tokio::select! {
        result = start_websocket_server(addr, hub, settings) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(url: &str, session: &str) -> CliResult {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;

    let join = json!({
        "topic": messages_topic(session),
        "event": "phx_join",
        "payload": {},
        "ref": "1"
    });
    ws_stream
        .send(WsMessage::Text(join.to_string().into()))
        .await?;

    let heartbeat = json!({ "topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "2" });
    ws_stream
        .send(WsMessage::Text(heartbeat.to_string().into()))
        .await?;

    loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => println!("{text}"),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => {
                ws_stream.close(None).await?;
                break;
            }
        }
    }

    Ok(())
}

fn open_store(settings: &Settings) -> Result<SledStore, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&settings.storage.data_dir)?;
    Ok(SledStore::open(&settings.storage.data_dir)?)
}

fn create_session(settings: &Settings) -> CliResult {
    let session = open_store(settings)?.create_session()?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

fn post_message(
    settings: &Settings,
    session: String,
    content: String,
    sender: Option<String>,
) -> CliResult {
    let store = open_store(settings)?;
    if store.get_session(&session)?.is_none() {
        return Err(format!("unknown chat session {session}").into());
    }

    let mut new = NewMessage::text(session, content);
    new.sender_name = sender;
    let message = store.create_message(new)?;
    println!("{}", serde_json::to_string_pretty(&message)?);
    Ok(())
}

fn list_messages(settings: &Settings, session: &str) -> CliResult {
    let messages = open_store(settings)?.list_messages(session)?;
    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(())
}

fn upload(
    settings: &Settings,
    file: PathBuf,
    name: Option<String>,
    session: Option<String>,
) -> CliResult {
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or("cannot derive an object name from the file path")?,
    };

    let bytes = std::fs::read(&file)?;
    let key = FsBlobStore::new(&settings.storage.media_dir)?.put(&name, &bytes)?;
    info!(key = %key, size = bytes.len(), "uploaded media");

    match session {
        Some(session) => {
            let store = open_store(settings)?;
            let message = store.create_message(NewMessage {
                session_id: session,
                message_type: "file".to_string(),
                file_url: Some(key),
                ..Default::default()
            })?;
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        None => println!("{key}"),
    }
    Ok(())
}
