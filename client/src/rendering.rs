use crate::network_graph::NetworkGraph;
use crate::scene::SceneComposer;
use crate::session::{Session, SessionState};
use crate::transport::Transport;
use macroquad::prelude::*;
use shared::{Rgb, Vec2, Wall};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const BROWN: Color = Color::new(0.545, 0.271, 0.075, 1.0);
const DARK_BROWN: Color = Color::new(0.396, 0.263, 0.129, 1.0);
const NOTICE_TTL: Duration = Duration::from_secs(4);
const MAX_VISIBLE_NOTICES: usize = 4;

/// Per-frame values the renderer cannot get from the session
#[derive(Debug, Clone)]
pub struct UiConfig {
    pub room_name: String,
    pub server: String,
    pub fps: i32,
    pub debug_enabled: bool,
}

pub struct Renderer {
    notices: VecDeque<(String, Instant)>,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            notices: VecDeque::new(),
        }
    }

    /// Queues a message shown over the scene for a few seconds
    pub fn push_notice(&mut self, message: String, now: Instant) {
        self.notices.push_back((message, now + NOTICE_TTL));
        while self.notices.len() > MAX_VISIBLE_NOTICES {
            self.notices.pop_front();
        }
    }

    pub fn render<T: Transport>(
        &mut self,
        session: &Session<T>,
        graph: &NetworkGraph,
        config: &UiConfig,
        now: Instant,
    ) {
        clear_background(WHITE);

        match session.state() {
            SessionState::Disconnected => self.draw_disconnected(config),
            SessionState::InLobby => self.draw_lobby(config),
            SessionState::InWaitingRoom => self.draw_waiting_room(session),
            SessionState::InGame => self.draw_game(session),
        }

        if config.debug_enabled {
            self.draw_network_debug(session);
            graph.render(session.scene().minimap_frame().height + 10.0);
        }

        self.draw_status(session, config);
        self.draw_notices(now);
    }

    fn draw_disconnected(&self, config: &UiConfig) {
        draw_centered("Connecting...", screen_height() / 2.0, 32.0, DARKGRAY);
        draw_centered(&config.server, screen_height() / 2.0 + 30.0, 18.0, GRAY);
    }

    fn draw_lobby(&self, config: &UiConfig) {
        let y = screen_height() / 2.0 - 40.0;
        draw_centered("Lobby", y, 36.0, BLACK);
        draw_centered(
            &format!("C: create room \"{}\"", config.room_name),
            y + 40.0,
            20.0,
            DARKGRAY,
        );
        draw_centered(
            &format!("J: join room \"{}\"", config.room_name),
            y + 65.0,
            20.0,
            DARKGRAY,
        );
    }

    fn draw_waiting_room<T: Transport>(&self, session: &Session<T>) {
        let Some(room) = session.room() else {
            return;
        };

        let mut y = 80.0;
        draw_centered(&format!("Room: {}", room.room_name), y, 32.0, BLACK);
        y += 40.0;

        for player in &room.players {
            let name = player.username.as_deref().unwrap_or(&player.id);
            let me = session.session_id() == Some(player.id.as_str());
            let line = format!(
                "{}{}{}",
                name,
                if player.is_host { " (host)" } else { "" },
                if me { " - you" } else { "" }
            );
            draw_centered(&line, y, 20.0, DARKGRAY);
            y += 24.0;
        }

        let prompt = if room.is_host {
            "Enter: start game    L: leave"
        } else {
            "Waiting for the host to start    L: leave"
        };
        draw_centered(prompt, screen_height() - 60.0, 20.0, BLACK);
    }

    fn draw_game<T: Transport>(&self, session: &Session<T>) {
        let scene = session.scene();
        let size = session.config().motion.player_size;

        for wall in session.walls() {
            if scene.wall_visible(wall) {
                self.draw_wall(scene, wall);
            }
        }

        for (_, remote) in session.reconciler().iter() {
            if scene.is_visible(remote.render_position, size, size) {
                self.draw_player(
                    scene.world_to_screen(remote.render_position),
                    size,
                    to_color(remote.color),
                    false,
                );
                if let Some(name) = &remote.display_name {
                    self.draw_name(scene.world_to_screen(remote.render_position), size, name);
                }
            }
        }

        // Local player last, on top
        let local = session.local_player();
        if let Some(color) = local.color {
            self.draw_player(
                scene.world_to_screen(local.position),
                size,
                to_color(color),
                true,
            );
        }

        self.draw_minimap(session);
    }

    fn draw_wall(&self, scene: &SceneComposer, wall: &Wall) {
        let screen = scene.world_to_screen(Vec2::new(wall.x, wall.y));
        draw_rectangle(screen.x, screen.y, wall.width, wall.height, BROWN);

        let edge = 3.0;
        if wall.width > wall.height {
            draw_rectangle(screen.x, screen.y, wall.width, edge, DARK_BROWN);
            draw_rectangle(
                screen.x,
                screen.y + wall.height - edge,
                wall.width,
                edge,
                DARK_BROWN,
            );
        } else {
            draw_rectangle(screen.x, screen.y, edge, wall.height, DARK_BROWN);
            draw_rectangle(
                screen.x + wall.width - edge,
                screen.y,
                edge,
                wall.height,
                DARK_BROWN,
            );
        }
    }

    fn draw_player(&self, screen: Vec2, size: f32, color: Color, is_local: bool) {
        draw_rectangle(screen.x, screen.y, size, size, color);
        draw_rectangle_lines(
            screen.x,
            screen.y,
            size,
            size,
            if is_local { 3.0 } else { 2.0 },
            BLACK,
        );

        let eye_size = size / 5.0;
        let eye_y = screen.y + size / 3.0;
        for eye_x in [screen.x + size / 3.0, screen.x + 2.0 * size / 3.0] {
            draw_circle(eye_x, eye_y, eye_size, WHITE);
            draw_circle(eye_x, eye_y, eye_size / 2.0, BLACK);
        }
    }

    fn draw_name(&self, screen: Vec2, size: f32, name: &str) {
        let dims = measure_text(name, None, 14, 1.0);
        draw_text(
            name,
            screen.x + (size - dims.width) / 2.0,
            screen.y - 4.0,
            14.0,
            DARKGRAY,
        );
    }

    fn draw_minimap<T: Transport>(&self, session: &Session<T>) {
        let scene = session.scene();
        let frame = scene.minimap_frame();
        let map = scene.map();
        let scale_x = frame.width / map.width;
        let scale_y = frame.height / map.height;

        draw_rectangle(frame.x, frame.y, frame.width, frame.height, WHITE);
        draw_rectangle_lines(frame.x, frame.y, frame.width, frame.height, 2.0, BLACK);

        for wall in session.walls() {
            let corner = scene.to_minimap(Vec2::new(wall.x, wall.y));
            draw_rectangle(
                corner.x,
                corner.y,
                (wall.width * scale_x).max(1.0),
                (wall.height * scale_y).max(1.0),
                BROWN,
            );
        }

        for (_, remote) in session.reconciler().iter() {
            let dot = scene.to_minimap(remote.render_position);
            draw_circle(dot.x, dot.y, 2.0, to_color(remote.color));
        }

        let view = scene.minimap_view();
        draw_rectangle_lines(
            view.x,
            view.y,
            view.width,
            view.height,
            1.0,
            Color::from_rgba(200, 200, 255, 204),
        );

        let me = scene.to_minimap(session.local_player().position);
        draw_circle(me.x, me.y, 4.0, RED);
    }

    fn draw_network_debug<T: Transport>(&self, session: &Session<T>) {
        let latency = session.latency();
        let x = 10.0;
        let y = screen_height() - 70.0;
        let line_height = 15.0;

        draw_rectangle(x, y, 300.0, 60.0, Color::from_rgba(0, 0, 0, 178));

        let ping = latency
            .ping_ms()
            .map_or_else(|| "-".to_string(), |ms| format!("{}ms", ms));
        let lines = [
            format!(
                "Ping: {} | Clock offset: {:.0}ms",
                ping,
                latency.clock_offset_ms()
            ),
            format!("Remote players: {}", session.reconciler().len()),
            format!("Pending requests: {}", session.pending_requests()),
        ];
        for (i, line) in lines.iter().enumerate() {
            draw_text(
                line,
                x + 10.0,
                y + line_height * (i as f32 + 1.0),
                14.0,
                WHITE,
            );
        }
    }

    fn draw_status<T: Transport>(&self, session: &Session<T>, config: &UiConfig) {
        let connection_color = if session.transport().is_connected() {
            GREEN
        } else {
            RED
        };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);

        let room = session
            .room()
            .map(|room| room.room_name.as_str())
            .unwrap_or("-");
        let ping = session
            .latency()
            .ping_ms()
            .map_or_else(|| "-".to_string(), |ms| ms.to_string());
        let status = format!(
            "{:?} | room {} | ping {}ms | {} fps",
            session.state(),
            room,
            ping,
            config.fps
        );
        draw_text(&status, 24.0, 18.0, 14.0, DARKGRAY);
    }

    fn draw_notices(&mut self, now: Instant) {
        self.notices.retain(|(_, expires)| *expires > now);

        let mut y = screen_height() / 2.0 + 100.0;
        for (message, _) in &self.notices {
            let dims = measure_text(message, None, 18, 1.0);
            let x = (screen_width() - dims.width) / 2.0;
            draw_rectangle(
                x - 8.0,
                y - dims.height - 6.0,
                dims.width + 16.0,
                dims.height + 12.0,
                Color::from_rgba(0, 0, 0, 190),
            );
            draw_text(message, x, y, 18.0, YELLOW);
            y += 30.0;
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn draw_centered(text: &str, y: f32, font_size: f32, color: Color) {
    let dims = measure_text(text, None, font_size as u16, 1.0);
    draw_text(text, (screen_width() - dims.width) / 2.0, y, font_size, color);
}

fn to_color(rgb: Rgb) -> Color {
    Color::from_rgba(rgb.r(), rgb.g(), rgb.b(), 255)
}
