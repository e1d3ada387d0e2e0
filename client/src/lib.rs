//! # Arena Client Library
//!
//! Client side of a room-based top-down arena. The client connects to a room server over a
//! WebSocket, moves the local avatar immediately from keyboard input, and renders every
//! other player from the server's position snapshots.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! The local player is simulated on the client and never corrected by the server. Each
//! frame the held keys become a bounded, wall-aware displacement, and the resulting
//! position is relayed to the server without waiting for any reply.
//!
//! ### Remote Smoothing
//! Snapshots arrive sparsely and with variable latency. Each remote player keeps a render
//! position and a target position keyed by the server-assigned slot; every frame the render
//! position walks toward the target at one constant speed, so all remote players move
//! uniformly regardless of update frequency.
//!
//! ### Single Timeline
//! The socket lives on a tokio task, but everything it receives is queued and applied by
//! the frame loop between frames. No handler ever runs concurrently with a motion step.
//!
//! ## Module Organization
//!
//! - [`transport`]: the abstract event channel (acknowledged calls, fire-and-forget emits,
//!   lifecycle events) plus an in-process loopback used by tests
//! - [`network`]: the WebSocket task behind the transport
//! - [`latency`]: ping burst on connect, then periodic smoothed clock-offset estimation
//! - [`motion`]: local movement and wall collision
//! - [`reconciler`]: per-slot remote buffers and constant-velocity smoothing
//! - [`scene`]: camera, world to screen transform, minimap projection
//! - [`session`]: the connection and room state machine that owns all of the above
//! - [`input`], [`rendering`], [`network_graph`]: macroquad front end
//! - [`config`]: command line and session configuration
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::config::SessionConfig;
//! use client::motion::HeldKeys;
//! use client::session::Session;
//! use client::transport::ChannelTransport;
//! use std::time::Instant;
//!
//! let (transport, peer) = ChannelTransport::loopback();
//! let mut session = Session::new(transport, SessionConfig::default());
//!
//! peer.connect("session-1");
//! session.start(Instant::now());
//! session.create_room("arena")?;
//!
//! loop {
//!     let now = Instant::now();
//!     session.pump(now);
//!     session.tick(HeldKeys::default(), now, 1.0 / 60.0);
//! }
//! # Ok::<(), client::error::SessionError>(())
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod latency;
pub mod motion;
pub mod network;
pub mod network_graph;
pub mod reconciler;
pub mod rendering;
pub mod scene;
pub mod session;
pub mod transport;
