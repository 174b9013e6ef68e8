//! KISS-over-TCP transport to an external TNC (Direwolf and friends).
//!
//! [`KissTnc`] owns the socket exclusively: a reader task deframes inbound
//! bytes and hands raw AX.25 payloads to the session loop through a bounded
//! channel, and a writer task drains a bounded outbound queue so `send`
//! never blocks the protocol engine. Only command-0 (data) frames are
//! surfaced; TNC control frames are logged and dropped.

pub mod accumulator;
pub mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use paxterm_core::kiss::{command_of, kiss_data_frame, port_of, CMD_DATA};

pub use accumulator::{KissAccumulator, KissFrame};
pub use error::TncError;

const TCP_RECV_BUFFER: usize = 4096;
const INBOUND_QUEUE: usize = 256;
const OUTBOUND_QUEUE: usize = 64;

/// A live KISS TCP connection.
pub struct KissTnc {
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl KissTnc {
    /// Connect to the TNC at `addr` (`host:port`) and start the I/O tasks.
    pub async fn connect(addr: &str) -> Result<Self, TncError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TncError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        info!("connected to TNC at {addr}");

        let (reader, writer) = stream.into_split();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE);
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let connected = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = watch::channel(false);

        let read_task = tokio::spawn(Self::read_loop(
            reader,
            in_tx,
            Arc::clone(&connected),
            stop_rx.clone(),
        ));
        let write_task = tokio::spawn(Self::write_loop(
            writer,
            out_rx,
            Arc::clone(&connected),
            stop_rx,
        ));

        Ok(Self {
            outbound: out_tx,
            inbound: in_rx,
            connected,
            stop_tx,
            tasks: vec![read_task, write_task],
        })
    }

    /// Whether the TCP peer is still with us.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a raw AX.25 frame for transmission on port 0.
    ///
    /// Never blocks: a full outbound queue surfaces [`TncError::Busy`] and
    /// a closed connection surfaces [`TncError::Down`].
    pub fn send(&self, raw: &[u8]) -> Result<(), TncError> {
        if !self.is_connected() {
            return Err(TncError::Down);
        }
        match self.outbound.try_send(raw.to_vec()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(TncError::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TncError::Down),
        }
    }

    /// Next inbound raw AX.25 payload, in wire order.
    ///
    /// Returns `None` once the TCP peer has closed; that is the transport's
    /// fatal signal.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Stop the I/O tasks and close the socket.
    pub async fn shutdown(mut self) {
        let _ = self.stop_tx.send(true);
        self.connected.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        in_tx: mpsc::Sender<Vec<u8>>,
        connected: Arc<AtomicBool>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut acc = KissAccumulator::new();
        let mut buf = vec![0u8; TCP_RECV_BUFFER];

        loop {
            let n = tokio::select! {
                result = reader.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            debug!("TNC socket closed (EOF)");
                            break;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            debug!("TNC read error: {e}");
                            break;
                        }
                    }
                }
                _ = stop_rx.changed() => break,
            };

            for frame in acc.feed(&buf[..n]) {
                if command_of(frame.type_octet) != CMD_DATA {
                    debug!(
                        command = command_of(frame.type_octet),
                        port = port_of(frame.type_octet),
                        "ignoring KISS control frame"
                    );
                    continue;
                }
                if frame.payload.is_empty() {
                    continue;
                }
                trace!(len = frame.payload.len(), "RX frame");
                if in_tx.send(frame.payload).await.is_err() {
                    // Session loop is gone; nothing left to deliver to.
                    return;
                }
            }
        }

        connected.store(false, Ordering::SeqCst);
        // Dropping in_tx closes the inbound channel, which the session loop
        // observes as transport-down.
    }

    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut out_rx: mpsc::Receiver<Vec<u8>>,
        connected: Arc<AtomicBool>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        loop {
            let raw = tokio::select! {
                msg = out_rx.recv() => match msg {
                    Some(raw) => raw,
                    None => break,
                },
                _ = stop_rx.changed() => break,
            };

            let framed = kiss_data_frame(0, &raw);
            trace!(len = raw.len(), "TX frame");
            if let Err(e) = writer.write_all(&framed).await {
                debug!("TNC write error: {e}");
                connected.store(false, Ordering::SeqCst);
                break;
            }
        }

        let _ = writer.shutdown().await;
    }
}
