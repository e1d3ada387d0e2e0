use crate::latency::LatencyConfig;
use crate::motion::MotionConfig;
use crate::reconciler::{SmoothingConfig, REMOTE_SPEED_PER_FRAME};
use crate::scene::Viewport;
use clap::Parser;
use shared::MapBounds;
use std::time::Duration;

/// How remote snapshots reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDelivery {
    /// Server pushes `game_state`.
    Push,
    /// Server pushes, and the client also requests `get_game_state` on an interval.
    PushAndPoll { interval: Duration },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub username: Option<String>,
    /// Whether rooms pass through a waiting room before the host starts the game.
    pub waiting_room: bool,
    pub delivery: SnapshotDelivery,
    /// Minimum spacing between `update_position` emits. `None` sends on every moved tick.
    pub position_send_interval: Option<Duration>,
    /// Acknowledged requests still unanswered after this long are forgotten.
    pub request_timeout: Duration,
    pub map: MapBounds,
    pub viewport: Viewport,
    pub motion: MotionConfig,
    pub smoothing: SmoothingConfig,
    pub latency: LatencyConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            username: None,
            waiting_room: true,
            delivery: SnapshotDelivery::Push,
            position_send_interval: None,
            request_timeout: Duration::from_secs(10),
            map: MapBounds::default(),
            viewport: Viewport::default(),
            motion: MotionConfig::default(),
            smoothing: SmoothingConfig::default(),
            latency: LatencyConfig::default(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// WebSocket endpoint of the room server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:5000/ws")]
    pub server: String,

    /// Name shown to other players
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Room to create (C) or join (J) from the lobby
    #[arg(short = 'r', long, default_value = "arena")]
    pub room: String,

    /// Enter the game directly after joining, without a waiting room
    #[arg(long)]
    pub no_waiting_room: bool,

    /// Also poll the server for snapshots every N milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Cap position updates to one per N milliseconds
    #[arg(long)]
    pub send_rate_ms: Option<u64>,

    /// Remote avatar smoothing speed, in units per 60 fps frame
    #[arg(long, default_value_t = REMOTE_SPEED_PER_FRAME)]
    pub remote_speed: f32,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    pub width: u32,

    /// Window height
    #[arg(long, default_value = "600")]
    pub height: u32,
}

impl Args {
    pub fn session_config(&self) -> SessionConfig {
        let delivery = match self.poll_ms {
            Some(ms) if ms > 0 => SnapshotDelivery::PushAndPoll {
                interval: Duration::from_millis(ms),
            },
            _ => SnapshotDelivery::Push,
        };

        SessionConfig {
            username: self.username.clone(),
            waiting_room: !self.no_waiting_room,
            delivery,
            position_send_interval: self
                .send_rate_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            viewport: Viewport::new(self.width as f32, self.height as f32),
            smoothing: SmoothingConfig {
                speed_per_frame: self.remote_speed,
                ..SmoothingConfig::default()
            },
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["client"]).unwrap();
        let config = args.session_config();

        assert_eq!(args.server, "ws://127.0.0.1:5000/ws");
        assert_eq!(args.room, "arena");
        assert!(config.waiting_room);
        assert_eq!(config.delivery, SnapshotDelivery::Push);
        assert_eq!(config.position_send_interval, None);
        assert_eq!(config.viewport, Viewport::new(800.0, 600.0));
        assert_eq!(config.smoothing.speed_per_frame, REMOTE_SPEED_PER_FRAME);
    }

    #[test]
    fn test_poll_and_send_rate() {
        let args = Args::try_parse_from([
            "client",
            "--poll-ms",
            "150",
            "--send-rate-ms",
            "33",
            "--no-waiting-room",
            "-u",
            "alice",
        ])
        .unwrap();
        let config = args.session_config();

        assert_eq!(
            config.delivery,
            SnapshotDelivery::PushAndPoll {
                interval: Duration::from_millis(150)
            }
        );
        assert_eq!(
            config.position_send_interval,
            Some(Duration::from_millis(33))
        );
        assert!(!config.waiting_room);
        assert_eq!(config.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_zero_intervals_mean_disabled() {
        let args =
            Args::try_parse_from(["client", "--poll-ms", "0", "--send-rate-ms", "0"]).unwrap();
        let config = args.session_config();

        assert_eq!(config.delivery, SnapshotDelivery::Push);
        assert_eq!(config.position_send_interval, None);
    }
}
