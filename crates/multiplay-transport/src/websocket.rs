//! Direct links over WebSocket using `tokio-tungstenite`.
//!
//! Each link runs a reader task and a writer task on the current Tokio
//! runtime. The reader turns incoming frames into [`LinkEvent`]s on an
//! unbounded channel; the writer drains an unbounded command channel. The
//! session layer only ever polls, so it never awaits socket I/O.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Acceptor, ClientConnection, ConnectionId, HostConnection, LinkEvent,
    TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

enum WriterCommand {
    Send(Vec<u8>),
    Close,
}

/// Spawns the reader and writer tasks for an established stream.
fn spawn_link<S>(
    ws: WebSocketStream<S>,
    events: UnboundedSender<LinkEvent>,
) -> UnboundedSender<WriterCommand>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WriterCommand>();

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                WriterCommand::Send(data) => {
                    if let Err(e) = sink.send(Message::Binary(data.into())).await {
                        tracing::debug!(error = %e, "websocket write failed");
                        break;
                    }
                }
                WriterCommand::Close => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        loop {
            let event = match stream.next().await {
                Some(Ok(Message::Binary(data))) => LinkEvent::Data(data.into()),
                Some(Ok(Message::Text(text))) => {
                    LinkEvent::Data(text.as_bytes().to_vec())
                }
                Some(Ok(Message::Close(_))) | None => LinkEvent::Closed,
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => LinkEvent::ConnectionLost(e.to_string()),
            };
            let terminal = event.is_terminal();
            if events.send(event).is_err() || terminal {
                break;
            }
        }
    });

    cmd_tx
}

/// Polls an event receiver, converting a vanished reader into a lost link.
fn poll_events(
    rx: &mut UnboundedReceiver<LinkEvent>,
    finished: &mut bool,
) -> Option<LinkEvent> {
    if *finished {
        return None;
    }
    match rx.try_recv() {
        Ok(event) => {
            *finished = event.is_terminal();
            Some(event)
        }
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => {
            *finished = true;
            Some(LinkEvent::ConnectionLost("reader task ended".into()))
        }
    }
}

fn queue_send(
    writer: &Option<UnboundedSender<WriterCommand>>,
    data: &[u8],
) -> Result<(), TransportError> {
    let writer = writer.as_ref().ok_or_else(|| {
        TransportError::ConnectionClosed("not connected".into())
    })?;
    writer.send(WriterCommand::Send(data.to_vec())).map_err(|_| {
        TransportError::SendFailed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "writer task ended",
        ))
    })
}

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

/// Listens for WebSocket clients.
pub struct WebSocketListener {
    local_addr: SocketAddr,
    incoming: UnboundedReceiver<WebSocketClientConnection>,
    accept_task: Option<JoinHandle<()>>,
}

impl WebSocketListener {
    /// Binds a listener to the given address and starts accepting.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr =
            listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(%local_addr, "websocket listener bound");

        let (tx, rx) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "tcp accept failed");
                        continue;
                    }
                };
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(e) => {
                        tracing::debug!(%peer, error = %e, "websocket handshake failed");
                        continue;
                    }
                };
                let id = ConnectionId::new(
                    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
                );
                let (event_tx, event_rx) = mpsc::unbounded_channel();
                let writer = spawn_link(ws, event_tx);
                tracing::debug!(%id, %peer, "accepted websocket link");

                let conn = WebSocketClientConnection {
                    id,
                    writer: Some(writer),
                    events: event_rx,
                    finished: false,
                };
                if tx.send(conn).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            local_addr,
            incoming: rx,
            accept_task: Some(accept_task),
        })
    }

    /// Returns the bound address (useful when binding to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Acceptor for WebSocketListener {
    fn poll_accept(&mut self) -> Option<Box<dyn ClientConnection>> {
        let conn = self.incoming.try_recv().ok()?;
        Some(Box::new(conn))
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            tracing::info!(local_addr = %self.local_addr, "websocket listener closed");
        }
        self.incoming.close();
    }
}

impl Drop for WebSocketListener {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

/// Host-side end of a WebSocket link.
pub struct WebSocketClientConnection {
    id: ConnectionId,
    writer: Option<UnboundedSender<WriterCommand>>,
    events: UnboundedReceiver<LinkEvent>,
    finished: bool,
}

impl ClientConnection for WebSocketClientConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        queue_send(&self.writer, data)
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        poll_events(&mut self.events, &mut self.finished)
    }

    fn shutdown(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.send(WriterCommand::Close);
        }
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Client-side WebSocket link to a host (or to a relay / matchmaking server).
pub struct WebSocketHostConnection {
    url: String,
    writer: Option<UnboundedSender<WriterCommand>>,
    writer_rx: Option<UnboundedReceiver<UnboundedSender<WriterCommand>>>,
    events: Option<UnboundedReceiver<LinkEvent>>,
    finished: bool,
}

impl WebSocketHostConnection {
    /// Creates an unconnected link aimed at `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_url(format!("ws://{host}:{port}"))
    }

    /// Creates an unconnected link aimed at a full `ws://` URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            writer: None,
            writer_rx: None,
            events: None,
            finished: false,
        }
    }
}

impl HostConnection for WebSocketHostConnection {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.events.is_some() && !self.finished {
            return Err(TransportError::AlreadyStarted);
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::NoRuntime)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let url = self.url.clone();

        handle.spawn(async move {
            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _response)) => {
                    tracing::debug!(%url, "websocket connected");
                    let writer = spawn_link(ws, event_tx.clone());
                    let _ = writer_tx.send(writer);
                    let _ = event_tx.send(LinkEvent::Connected);
                }
                Err(e) => {
                    tracing::debug!(%url, error = %e, "websocket connect failed");
                    let _ = event_tx.send(LinkEvent::ConnectFailed(e.to_string()));
                }
            }
        });

        self.events = Some(event_rx);
        self.writer_rx = Some(writer_rx);
        self.writer = None;
        self.finished = false;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        queue_send(&self.writer, data)
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        // The writer handle is published by the connect task before the
        // Connected event, so picking it up here keeps the two in order.
        if self.writer.is_none() {
            if let Some(rx) = &mut self.writer_rx {
                if let Ok(writer) = rx.try_recv() {
                    self.writer = Some(writer);
                    self.writer_rx = None;
                }
            }
        }
        let events = self.events.as_mut()?;
        poll_events(events, &mut self.finished)
    }

    fn shutdown(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.send(WriterCommand::Close);
        }
        self.writer_rx = None;
        self.finished = true;
    }
}
