//! Read and write pumps for one connection.
//!
//! `serve_connection` owns a registered connection for its whole life: it runs
//! the read pump and the write pump side by side, and when either one stops it
//! closes the connection and unregisters it from the hub.
//!
//! Deadlines are enforced here with tokio timers rather than by the
//! transport: every read waits at most until the read deadline (pushed out by
//! `pong_wait` on each pong and each parsed envelope), and every write is
//! bounded by `write_wait`.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    domain::{InboundFrame, RoomId, TransportError, TransportReader, TransportWriter},
    infrastructure::dto::websocket::{AckAction, ClientEnvelope, ServerMessage, client_type},
    realtime::{
        connection::{Connection, EnqueueError, OutboundReceiver},
        hub::Hub,
    },
};

/// Register `connection`, pump frames until either side stops, then unregister.
///
/// Returns immediately (after closing the connection) when the hub refuses the
/// registration.
pub async fn serve_connection<R, W>(
    hub: Hub,
    connection: Arc<Connection>,
    outbound: OutboundReceiver,
    reader: R,
    writer: W,
) where
    R: TransportReader + 'static,
    W: TransportWriter + 'static,
{
    if !hub.register(connection.clone()).await {
        return;
    }

    let config = hub.config();
    let (ping_interval, write_wait) = (config.ping_interval, config.write_wait);

    let mut write_task = tokio::spawn({
        let connection = connection.clone();
        async move {
            if let Err(e) = write_pump(outbound, writer, ping_interval, write_wait).await {
                tracing::debug!(connection_id = %connection.id(), "Write pump stopped: {}", e);
            }
        }
    });
    let mut read_task = tokio::spawn({
        let hub = hub.clone();
        let connection = connection.clone();
        async move { read_pump(hub, connection, reader).await }
    });

    // whichever pump stops first takes the connection down with it
    let read_finished = tokio::select! {
        _ = &mut read_task => true,
        _ = &mut write_task => false,
    };

    connection.close();
    hub.unregister(&connection).await;

    let remaining = if read_finished { write_task } else { read_task };
    if let Err(e) = remaining.await {
        tracing::error!(connection_id = %connection.id(), "Pump task failed: {}", e);
    }
    tracing::info!(
        connection_id = %connection.id(),
        user_id = %connection.user_id(),
        "Connection finished"
    );
}

async fn read_pump<R: TransportReader>(hub: Hub, connection: Arc<Connection>, mut reader: R) {
    let pong_wait = hub.config().pong_wait;
    let max_message_size = hub.config().max_message_size;
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let frame = tokio::select! {
            biased;
            () = connection.closed() => break,
            result = tokio::time::timeout_at(deadline, reader.read_frame()) => result,
        };

        let frame = match frame {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::debug!(connection_id = %connection.id(), "Transport ended");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %connection.id(), "Read failed: {}", e);
                break;
            }
            Err(_) => {
                tracing::info!(
                    connection_id = %connection.id(),
                    user_id = %connection.user_id(),
                    "Read deadline exceeded"
                );
                break;
            }
        };

        match frame {
            InboundFrame::Text(text) => {
                if text.len() > max_message_size {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        "Inbound message of {} bytes exceeds the {} byte limit",
                        text.len(),
                        max_message_size
                    );
                    break;
                }
                tracing::debug!(connection_id = %connection.id(), "Received text: {}", text);

                match serde_json::from_str::<ClientEnvelope>(&text) {
                    Ok(envelope) => {
                        deadline = Instant::now() + pong_wait;
                        if let Some(reply) = dispatch(&hub, &connection, envelope).await {
                            reply_to(&connection, &reply);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %connection.id(), "Malformed message: {}", e);
                        reply_to(&connection, &ServerMessage::error(format!("malformed message: {}", e)));
                    }
                }
            }
            InboundFrame::Binary(_) => {
                reply_to(&connection, &ServerMessage::error("binary frames are not supported"));
            }
            InboundFrame::Pong => {
                deadline = Instant::now() + pong_wait;
            }
            InboundFrame::Ping => {
                tracing::trace!(connection_id = %connection.id(), "Received ping");
            }
            InboundFrame::Close => {
                tracing::info!(connection_id = %connection.id(), "Peer requested close");
                break;
            }
        }
    }
}

/// Apply one client envelope; returns the reply to enqueue, if any
async fn dispatch(
    hub: &Hub,
    connection: &Arc<Connection>,
    envelope: ClientEnvelope,
) -> Option<ServerMessage> {
    let kind = envelope.r#type.as_str();
    match kind {
        client_type::PING => Some(ServerMessage::Pong),
        client_type::SUBSCRIBE | client_type::UNSUBSCRIBE | client_type::TYPING => {
            let room_id = match parse_room(kind, envelope.chat_id.as_deref()) {
                Ok(room_id) => room_id,
                Err(reason) => return Some(ServerMessage::error(reason)),
            };
            match kind {
                client_type::SUBSCRIBE => {
                    if !hub.join_room(connection, room_id).await {
                        return Some(ServerMessage::error(format!(
                            "cannot subscribe to {}: connection is not active",
                            room_id
                        )));
                    }
                    Some(ServerMessage::Ack {
                        action: AckAction::Subscribed,
                        chat_id: room_id,
                    })
                }
                client_type::UNSUBSCRIBE => {
                    hub.leave_room(connection, room_id).await;
                    Some(ServerMessage::Ack {
                        action: AckAction::Unsubscribed,
                        chat_id: room_id,
                    })
                }
                _ => {
                    hub.broadcast_typing(room_id, connection.user_id());
                    None
                }
            }
        }
        other => {
            tracing::debug!(connection_id = %connection.id(), "Unknown message type '{}'", other);
            Some(ServerMessage::error(format!("unknown message type: {}", other)))
        }
    }
}

fn parse_room(kind: &str, chat_id: Option<&str>) -> Result<RoomId, String> {
    match chat_id.map(str::trim) {
        None | Some("") => Err(format!("chat_id is required for {}", kind)),
        Some(raw) => raw.parse().map_err(|e| format!("{}", e)),
    }
}

fn reply_to(connection: &Connection, message: &ServerMessage) {
    let frame = match message.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("Failed to serialize reply: {}", e);
            return;
        }
    };
    if let Err(EnqueueError::Full) = connection.try_enqueue(frame) {
        tracing::warn!(
            connection_id = %connection.id(),
            user_id = %connection.user_id(),
            "Outbound queue full, dropping reply"
        );
    }
}

async fn write_pump<W: TransportWriter>(
    mut outbound: OutboundReceiver,
    mut writer: W,
    ping_interval: Duration,
    write_wait: Duration,
) -> Result<(), TransportError> {
    let mut ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => with_deadline(write_wait, writer.write_text(&frame)).await?,
                None => {
                    // queue closed and drained
                    return with_deadline(write_wait, writer.close()).await;
                }
            },
            _ = ticker.tick() => with_deadline(write_wait, writer.write_ping()).await?,
        }
    }
}

async fn with_deadline(
    wait: Duration,
    write: impl Future<Output = Result<(), TransportError>>,
) -> Result<(), TransportError> {
    tokio::time::timeout(wait, write)
        .await
        .map_err(|_| TransportError::Deadline("write"))?
}
