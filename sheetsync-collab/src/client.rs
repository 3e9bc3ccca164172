//! WebSocket client for the relay.
//!
//! A client is `Connected` from a successful [`RelayClient::connect`] until the
//! socket closes, then `Disconnected` for good. Events sent while a client is
//! gone are simply missed; there is no catch-up on a new connection.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{CellEdit, ChannelMessage, EventKind, ProtocolError};

const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Events emitted by the relay client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Another connection edited a cell
    CellContentUpdated { sender: Uuid, payload: Vec<u8> },
    /// Reply to [`RelayClient::ping`]
    Pong,
    /// Socket closed; no further events follow
    Disconnected,
}

impl RelayEvent {
    /// Decode the payload of a cell edit sent with [`RelayClient::send_cell_edit`].
    pub fn cell_edit(&self) -> Option<CellEdit> {
        match self {
            RelayEvent::CellContentUpdated { payload, .. } => CellEdit::decode(payload).ok(),
            _ => None,
        }
    }
}

pub struct RelayClient {
    connection_id: Uuid,
    state: Arc<RwLock<ConnectionState>>,
    /// Frames for the writer task
    outgoing_tx: mpsc::Sender<Message>,
    event_rx: Option<mpsc::Receiver<RelayEvent>>,
}

impl RelayClient {
    /// Connect and wait for the server to assign a connection id.
    pub async fn connect(url: &str) -> Result<Self, ProtocolError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ProtocolError::Handshake(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let connection_id = timeout(WELCOME_TIMEOUT, async {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        let welcome = ChannelMessage::decode(&bytes)?;
                        if welcome.event == EventKind::Welcome {
                            return Ok(welcome.sender);
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            Err(ProtocolError::ConnectionClosed)
        })
        .await
        .map_err(|_| ProtocolError::Timeout)??;

        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        let (event_tx, event_rx) = mpsc::channel::<RelayEvent>(EVENT_QUEUE_CAPACITY);

        // Writer task: forward outgoing channel to the socket.
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if ws_writer.send(msg).await.is_err() || closing {
                    break;
                }
            }
        });

        // Reader task: turn relayed frames into events. Events are handed off
        // without waiting so an undrained queue never stalls the socket.
        let reader_state = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        let event = match ChannelMessage::decode(&bytes) {
                            Ok(m) if m.event == EventKind::CellContentUpdated => {
                                Some(RelayEvent::CellContentUpdated {
                                    sender: m.sender,
                                    payload: m.payload,
                                })
                            }
                            Ok(m) if m.event == EventKind::Pong => Some(RelayEvent::Pong),
                            Ok(m) => {
                                log::debug!("Ignoring {:?} from relay", m.event);
                                None
                            }
                            Err(e) => {
                                log::warn!("Undecodable frame from relay: {e}");
                                None
                            }
                        };
                        if let Some(evt) = event {
                            deliver(&event_tx, evt);
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *reader_state.write().await = ConnectionState::Disconnected;
            deliver(&event_tx, RelayEvent::Disconnected);
        });

        log::info!("Connected to relay as {connection_id}");
        Ok(Self {
            connection_id,
            state,
            outgoing_tx: out_tx,
            event_rx: Some(event_rx),
        })
    }

    /// Id the relay stamps on this client's events.
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<RelayEvent>> {
        self.event_rx.take()
    }

    pub async fn send_cell_edit(&self, edit: &CellEdit) -> Result<(), ProtocolError> {
        self.send_raw(edit.encode()?).await
    }

    /// Emit a cell edit with an arbitrary payload.
    pub async fn send_raw(&self, payload: Vec<u8>) -> Result<(), ProtocolError> {
        let msg = ChannelMessage::cell_content_updated(self.connection_id, payload);
        self.send(msg).await
    }

    pub async fn ping(&self) -> Result<(), ProtocolError> {
        self.send(ChannelMessage::ping(self.connection_id)).await
    }

    /// Close the socket. The client stays disconnected afterwards.
    pub async fn close(&self) {
        *self.state.write().await = ConnectionState::Disconnected;
        let _ = self.outgoing_tx.send(Message::Close(None)).await;
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn send(&self, msg: ChannelMessage) -> Result<(), ProtocolError> {
        if self.state().await != ConnectionState::Connected {
            return Err(ProtocolError::ConnectionClosed);
        }
        let encoded = msg.encode()?;
        self.outgoing_tx
            .send(Message::Binary(encoded.into()))
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

/// Queue an event for the application, dropping it when the queue is full.
fn deliver(event_tx: &mpsc::Sender<RelayEvent>, event: RelayEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            log::warn!("Client event queue full; {event:?} dropped");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RelayClient::connect(&format!("ws://127.0.0.1:{port}")).await;
        assert!(matches!(result, Err(ProtocolError::Handshake(_))));
    }

    #[test]
    fn test_relay_event_cell_edit() {
        let edit = CellEdit {
            sheet_id: Uuid::new_v4(),
            grid_id: Uuid::new_v4(),
            row_id: Uuid::new_v4(),
            column_id: Uuid::new_v4(),
            content: "hello".into(),
        };
        let event = RelayEvent::CellContentUpdated {
            sender: Uuid::new_v4(),
            payload: edit.encode().unwrap(),
        };
        assert_eq!(event.cell_edit(), Some(edit));
        assert_eq!(RelayEvent::Pong.cell_edit(), None);
    }

    #[test]
    fn test_deliver_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        deliver(&tx, RelayEvent::Pong);
        deliver(&tx, RelayEvent::Disconnected);

        assert_eq!(rx.try_recv().unwrap(), RelayEvent::Pong);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_connection_state_values() {
        assert_ne!(ConnectionState::Connected, ConnectionState::Disconnected);
    }
}
