use crate::command::{Command, Response};
use crate::grid::{cell_midpoint, GridRenderer};
use crate::llm::{ElementLocator, GoalExtractor};
use crate::pipeline::{Pipeline, Request};
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use nanoid::nanoid;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Message shape the mobile client sends: a screenshot, an instruction, or
/// both. `prompt` is the historical field name; `instruction` is accepted as
/// an alias.
#[derive(Debug, Deserialize)]
struct WireRequest {
    imageb64: Option<String>,
    prompt: Option<String>,
    instruction: Option<String>,
}

/// Accept loop. Each connection runs on its own task; requests within a
/// connection are handled strictly in order, which gives the per-client
/// serialization the session model requires.
pub async fn serve<E, L>(
    addr: &str,
    pipeline: Arc<Pipeline<E, L>>,
    renderer: Arc<GridRenderer>,
) -> Result<()>
where
    E: GoalExtractor + 'static,
    L: ElementLocator + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("listening on ws://{addr}");
    loop {
        let (stream, peer) = listener.accept().await?;
        let pipeline = pipeline.clone();
        let renderer = renderer.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, pipeline, renderer).await;
        });
    }
}

async fn handle_connection<E, L>(
    stream: TcpStream,
    peer: SocketAddr,
    pipeline: Arc<Pipeline<E, L>>,
    renderer: Arc<GridRenderer>,
) where
    E: GoalExtractor,
    L: ElementLocator,
{
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%peer, error = %err, "websocket handshake failed");
            return;
        }
    };
    let client_id = nanoid!();
    info!(%peer, client = %client_id, "client connected");
    let (mut tx, mut rx) = ws.split();

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = handle_message(&text, &client_id, &pipeline, &renderer).await;
                if let Err(err) = tx.send(Message::Text(reply.to_string())).await {
                    warn!(client = %client_id, error = %err, "failed to send reply");
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(payload)) => {
                let _ = tx.send(Message::Pong(payload)).await;
            }
            Ok(other) => debug!(client = %client_id, "ignoring non-text frame: {other:?}"),
            Err(err) => {
                warn!(client = %client_id, error = %err, "websocket read error");
                break;
            }
        }
    }
    info!(client = %client_id, "client disconnected");
}

async fn handle_message<E, L>(
    text: &str,
    client_id: &str,
    pipeline: &Pipeline<E, L>,
    renderer: &GridRenderer,
) -> Value
where
    E: GoalExtractor,
    L: ElementLocator,
{
    let wire: WireRequest = match serde_json::from_str(text) {
        Ok(w) => w,
        Err(err) => {
            warn!(client = %client_id, error = %err, "received non-JSON message");
            return json!({ "error": "message is not valid JSON" });
        }
    };

    let image = match wire.imageb64 {
        Some(b64) => {
            let raw = match B64.decode(b64.as_bytes()) {
                Ok(raw) => raw,
                Err(err) => return json!({ "error": format!("invalid base64 image: {err}") }),
            };
            match renderer.annotate(&raw) {
                Ok(annotated) => Some(annotated),
                Err(err) => return json!({ "error": format!("image decode failed: {err}") }),
            }
        }
        None => None,
    };

    let response = pipeline
        .process(Request {
            client_id: client_id.to_string(),
            instruction: wire.prompt.or(wire.instruction),
            image,
        })
        .await;
    render_reply(response)
}

/// Serializes the response, adding physical tap coordinates so the
/// accessibility service can dispatch the gesture without grid knowledge.
fn render_reply(response: Response) -> Value {
    let coords = match &response {
        Response::Command {
            command: Command::Tap { box_id },
            ..
        } => Some(cell_midpoint(box_id)),
        _ => None,
    };
    let mut v = serde_json::to_value(&response)
        .unwrap_or_else(|_| json!({ "error": "response serialization failed" }));
    if let (Some((x, y)), Some(cmd)) = (coords, v.get_mut("command")) {
        cmd["x_cord"] = json!(x);
        cmd["y_cord"] = json!(y);
    }
    v
}
