//! Abstract bidirectional event channel between the session and a room server.
//!
//! The session only sees [`Transport`]: fire-and-forget [`Transport::emit`], acknowledged
//! [`Transport::call`] whose reply later arrives as [`TransportEvent::Ack`], and lifecycle
//! events. Everything is drained with [`Transport::poll_event`] on the frame loop, so replies
//! and pushes are applied between frames, never concurrently with a tick.

use crate::error::TransportError;
use serde_json::Value;
use shared::{AckId, ClientEvent, InboundFrame, OutboundFrame, ServerEvent};
use tokio::sync::mpsc::{self, error::TryRecvError};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected { session_id: String },
    Disconnected { reason: String },
    Server(ServerEvent),
    Ack { id: AckId, payload: Value },
}

impl From<InboundFrame> for TransportEvent {
    fn from(frame: InboundFrame) -> Self {
        match frame {
            InboundFrame::Connect { session_id } => TransportEvent::Connected { session_id },
            InboundFrame::Event(event) => TransportEvent::Server(event),
            InboundFrame::Ack { id, payload } => TransportEvent::Ack { id, payload },
        }
    }
}

pub trait Transport {
    /// Sends without expecting a reply.
    fn emit(&mut self, event: ClientEvent) -> Result<(), TransportError>;

    /// Sends and returns the id the reply will carry.
    fn call(&mut self, event: ClientEvent) -> Result<AckId, TransportError>;

    /// Next pending inbound event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn is_connected(&self) -> bool;

    fn close(&mut self);
}

/// Channel ends held by whatever sits on the far side (socket task or test peer).
pub struct TransportEnds {
    pub outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
}

/// [`Transport`] backed by a pair of unbounded channels.
pub struct ChannelTransport {
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    next_ack: AckId,
    connected: bool,
}

impl ChannelTransport {
    pub fn channel() -> (Self, TransportEnds) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        let transport = Self {
            outbound: Some(out_tx),
            inbound: in_rx,
            next_ack: 1,
            connected: false,
        };
        let ends = TransportEnds {
            outbound: out_rx,
            inbound: in_tx,
        };
        (transport, ends)
    }

    /// In-process transport whose far side is driven by a [`LoopbackPeer`].
    pub fn loopback() -> (Self, LoopbackPeer) {
        let (transport, ends) = Self::channel();
        (transport, LoopbackPeer { ends })
    }

    fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let sender = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        sender.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl Transport for ChannelTransport {
    fn emit(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        self.send(OutboundFrame { event, ack: None })
    }

    fn call(&mut self, event: ClientEvent) -> Result<AckId, TransportError> {
        let id = self.next_ack;
        self.send(OutboundFrame {
            event,
            ack: Some(id),
        })?;
        self.next_ack += 1;
        Ok(id)
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        match self.inbound.try_recv() {
            Ok(event) => {
                match &event {
                    TransportEvent::Connected { .. } => self.connected = true,
                    TransportEvent::Disconnected { .. } => self.connected = false,
                    _ => {}
                }
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if self.connected {
                    self.connected = false;
                    Some(TransportEvent::Disconnected {
                        reason: "transport closed".to_string(),
                    })
                } else {
                    None
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && self.outbound.is_some()
    }

    fn close(&mut self) {
        self.connected = false;
        self.outbound = None;
    }
}

/// Server side of a loopback transport, for driving a session without a network.
pub struct LoopbackPeer {
    ends: TransportEnds,
}

impl LoopbackPeer {
    pub fn connect(&self, session_id: &str) {
        self.deliver(TransportEvent::Connected {
            session_id: session_id.to_string(),
        });
    }

    pub fn disconnect(&self, reason: &str) {
        self.deliver(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    pub fn push(&self, event: ServerEvent) {
        self.deliver(TransportEvent::Server(event));
    }

    pub fn reply(&self, id: AckId, payload: Value) {
        self.deliver(TransportEvent::Ack { id, payload });
    }

    /// Decodes raw wire text the way the socket task does.
    pub fn push_text(&self, text: &str) -> Result<(), shared::ProtocolError> {
        let frame = InboundFrame::decode(text)?;
        self.deliver(frame.into());
        Ok(())
    }

    /// Everything the client has sent since the last drain.
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.ends.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn deliver(&self, event: TransportEvent) {
        // The client half may already be gone; nothing to deliver to then.
        let _ = self.ends.inbound.send(event);
    }
}
