//! WebSocket side of the transport: one tokio task owns the socket and bridges it to the
//! channels of a [`ChannelTransport`].
//!
//! The task outlives individual sockets. When a connection fails or drops it reports
//! `Disconnected`, waits with exponential backoff and dials again over the same channels,
//! so the frame loop sees `Connected` again after every successful handshake.

use crate::error::TransportError;
use crate::transport::{ChannelTransport, TransportEnds, TransportEvent};
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{InboundFrame, OutboundFrame};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Delay between reconnect attempts, doubled after every failure up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, delay: Duration) -> Duration {
        (delay * 2).min(self.max_delay)
    }
}

/// Starts connecting to `url` on `runtime` and returns the frame-loop half immediately.
///
/// The returned transport reports `Connected` once the server's `connect` frame arrives and
/// `Disconnected` when the socket closes or fails to open, then keeps reconnecting until the
/// transport is closed or dropped.
pub fn connect(url: &str, runtime: &Handle) -> ChannelTransport {
    connect_with(url, runtime, ReconnectPolicy::default())
}

pub fn connect_with(url: &str, runtime: &Handle, policy: ReconnectPolicy) -> ChannelTransport {
    let (transport, ends) = ChannelTransport::channel();
    runtime.spawn(run_socket(url.to_string(), ends, policy));
    transport
}

enum SocketExit {
    /// The frame loop closed or dropped its half; stop for good.
    ClientGone(String),
    /// The server side went away; worth another attempt.
    Lost(String),
}

async fn run_socket(url: String, mut ends: TransportEnds, policy: ReconnectPolicy) {
    let mut delay = policy.initial_delay;

    loop {
        // Anything still queued was addressed to the previous connection.
        if !discard_stale_frames(&mut ends) {
            info!("Transport closed, not reconnecting");
            return;
        }

        info!("Connecting to {}", url);
        let reason = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                delay = policy.initial_delay;
                match run_connection(stream, &mut ends).await {
                    SocketExit::ClientGone(reason) => {
                        info!("Socket closed: {}", reason);
                        let _ = ends.inbound.send(TransportEvent::Disconnected { reason });
                        return;
                    }
                    SocketExit::Lost(reason) => reason,
                }
            }
            Err(e) => {
                let e = TransportError::from(e);
                warn!("Failed to connect: {}", e);
                e.to_string()
            }
        };

        info!("Socket closed: {}, retrying in {:?}", reason, delay);
        if ends
            .inbound
            .send(TransportEvent::Disconnected { reason })
            .is_err()
        {
            return;
        }

        if !wait_before_retry(&mut ends, delay).await {
            info!("Transport closed, not reconnecting");
            return;
        }
        delay = policy.next_delay(delay);
    }
}

async fn run_connection(stream: Socket, ends: &mut TransportEnds) -> SocketExit {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = ends.outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = send_frame(&mut sink, &frame).await {
                        return SocketExit::Lost(e.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return SocketExit::ClientGone("client closed".to_string());
                }
            },

            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => match InboundFrame::decode(text.as_str()) {
                    Ok(frame) => {
                        if ends.inbound.send(frame.into()).is_err() {
                            return SocketExit::ClientGone("client dropped".to_string());
                        }
                    }
                    Err(e) => warn!("Dropping undecodable frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return SocketExit::Lost("server closed".to_string())
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving frame: {}", e);
                    return SocketExit::Lost(e.to_string());
                }
            },
        }
    }
}

/// Returns `false` once the frame loop has closed its half.
fn discard_stale_frames(ends: &mut TransportEnds) -> bool {
    loop {
        match ends.outbound.try_recv() {
            Ok(frame) => debug!("Discarding stale {}", frame.event.name()),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Sleeps for `delay`, dropping anything sent meanwhile. Returns `false` if the frame loop
/// closed its half while waiting.
async fn wait_before_retry(ends: &mut TransportEnds, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            frame = ends.outbound.recv() => match frame {
                Some(frame) => debug!("Dropping {} sent while disconnected", frame.event.name()),
                None => return false,
            },
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &OutboundFrame) -> Result<(), TransportError>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = frame.encode()?;
    debug!("-> {}", frame.event.name());
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use std::time::Duration;

    #[test]
    fn test_unreachable_server_reports_disconnect() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        // Port 9 on localhost is not expected to accept WebSocket upgrades.
        let mut transport = connect("ws://127.0.0.1:9/ws", runtime.handle());

        let event = tokio_test::block_on(async {
            for _ in 0..200 {
                if let Some(event) = transport.poll_event() {
                    return Some(event);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            None
        });

        assert!(matches!(event, Some(TransportEvent::Disconnected { .. })));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_failed_connect_is_retried() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(40),
        };
        let mut transport = connect_with("ws://127.0.0.1:9/ws", runtime.handle(), policy);

        let attempts = tokio_test::block_on(async {
            let mut disconnects = 0;
            for _ in 0..300 {
                while let Some(event) = transport.poll_event() {
                    if matches!(event, TransportEvent::Disconnected { .. }) {
                        disconnects += 1;
                    }
                }
                if disconnects >= 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            disconnects
        });

        assert!(attempts >= 3);
    }

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(delay);
            delay = policy.next_delay(delay);
        }

        assert_eq!(
            seen,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(5000),
            ]
        );
    }
}
