use crate::error::{Error, Result};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use hub::{BroadcastHub, ChannelHandle, ConnectionHandle, ConnectionId};
use log::*;
use service::AppState;
use std::sync::Arc;

/// Relay socket endpoint. Anything that is not a valid WebSocket upgrade gets a 426.
pub(crate) async fn socket_handler(
    State(app_state): State<AppState>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response> {
    let upgrade = upgrade.map_err(Error::upgrade_required)?;
    let hub = Arc::clone(&app_state.hub);

    Ok(upgrade.on_upgrade(move |socket| handle_socket(socket, hub)))
}

/// Drives one upgraded connection: a writer task drains the hub's outbound queue onto the
/// socket while this task reads frames and hands them to the hub.
async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (handle, mut outbound) = ChannelHandle::channel();
    let connection_id = hub.on_connect(handle.clone());

    let (mut ws_sender, ws_receiver) = socket.split();

    let writer_handle = Arc::clone(&handle);
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if let Err(e) = ws_sender.send(Message::Text(payload.into())).await {
                debug!("Socket write failed for connection {connection_id}: {e}");
                break;
            }
        }
        // Later fan-outs skip this peer; the entry goes away when the read side ends.
        writer_handle.close();
    });

    match read_frames(&hub, &connection_id, ws_receiver).await {
        Ok(()) => hub.on_close(&connection_id),
        Err(e) => hub.on_error(&connection_id, &e),
    }

    writer.abort();
    debug!("Socket tasks finished for connection {connection_id}");
}

/// Forward inbound frames until the peer closes or the transport fails.
async fn read_frames(
    hub: &BroadcastHub,
    connection_id: &ConnectionId,
    mut ws_receiver: SplitStream<WebSocket>,
) -> std::result::Result<(), axum::Error> {
    while let Some(frame) = ws_receiver.next().await {
        match frame? {
            Message::Text(text) => hub.on_message(connection_id, text.as_str()),
            Message::Binary(bytes) => {
                hub.on_message(connection_id, &String::from_utf8_lossy(&bytes));
            }
            Message::Close(_) => {
                debug!("Close frame received from connection {connection_id}");
                return Ok(());
            }
            // Pongs are answered by the protocol layer.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    Ok(())
}
