use clap::Parser;
use client::config::Args;
use client::input::InputManager;
use client::network;
use client::network_graph::NetworkGraph;
use client::rendering::{Renderer, UiConfig};
use client::session::Session;
use log::{error, info, warn};
use macroquad::prelude::*;
use std::time::Instant;

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Arena".to_owned(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        window_resizable: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run(Args::parse()).await {
        error!("Client error: {}", e);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.session_config();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if let Some(interval) = config.position_send_interval {
        info!("Position updates capped to one per {:?}", interval);
    }
    info!("Controls: arrows/WASD to move, C/J to create/join, Enter to start, Esc/L to leave");
    info!("Press F2 to toggle the network overlay");

    let runtime = tokio::runtime::Runtime::new()?;
    let transport = network::connect(&args.server, runtime.handle());

    let mut session = Session::new(transport, config);
    let mut input_manager = InputManager::new();
    let mut renderer = Renderer::new();
    let mut graph = NetworkGraph::new();
    let mut debug_enabled = false;

    prevent_quit();
    session.start(Instant::now());

    loop {
        let now = Instant::now();
        session.pump(now);

        let frame = input_manager.update();
        let controls = frame.controls;

        if controls.toggle_debug {
            debug_enabled = !debug_enabled;
            graph.toggle_visibility();
        }

        let result = if controls.create_room {
            session.create_room(&args.room)
        } else if controls.join_room {
            session.join_room(&args.room)
        } else if controls.start_game {
            session.start_game()
        } else if controls.leave_room {
            session.leave_room()
        } else if controls.escape {
            session.escape()
        } else {
            Ok(())
        };
        if let Err(e) = result {
            warn!("{}", e);
            renderer.push_notice(e.to_string(), now);
        }

        session.tick(frame.held, now, get_frame_time());

        for notice in session.take_notices() {
            renderer.push_notice(notice, now);
        }

        let latency = session.latency();
        if let Some(ping) = latency.ping_ms() {
            graph.record(ping as f32, latency.clock_offset_ms() as f32, now);
        }

        let ui = UiConfig {
            room_name: args.room.clone(),
            server: args.server.clone(),
            fps: get_fps(),
            debug_enabled,
        };
        renderer.render(&session, &graph, &ui, now);

        if is_quit_requested() {
            break;
        }

        next_frame().await;
    }

    session.dispose();
    runtime.shutdown_background();

    Ok(())
}
