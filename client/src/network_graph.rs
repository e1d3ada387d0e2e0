//! Ping and clock-offset history graph for the F2 network debug overlay

use macroquad::prelude::*;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One latency estimate captured for the graph
#[derive(Debug, Clone)]
pub struct LatencySample {
    pub ping_ms: f32,
    pub clock_offset_ms: f32,
    pub timestamp: Instant,
}

/// Rolling latency history drawn as a line graph
pub struct NetworkGraph {
    history: VecDeque<LatencySample>,
    max_samples: usize,
    sample_interval: Duration,
    last_sample_time: Option<Instant>,

    graph_width: f32,
    graph_height: f32,
    visible: bool,
    internal_padding: f32,

    scale_max: f32,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self {
            history: VecDeque::new(),
            max_samples: 100,
            sample_interval: Duration::from_millis(250),
            last_sample_time: None,

            graph_width: 300.0,
            graph_height: 120.0,
            visible: false,
            internal_padding: 12.0,

            scale_max: 100.0,
        }
    }

    pub fn toggle_visibility(&mut self) {
        self.visible = !self.visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Records the current estimate, at most once per sample interval
    pub fn record(&mut self, ping_ms: f32, clock_offset_ms: f32, now: Instant) {
        if let Some(last) = self.last_sample_time {
            if now.saturating_duration_since(last) < self.sample_interval {
                return;
            }
        }
        self.last_sample_time = Some(now);

        self.history.push_back(LatencySample {
            ping_ms,
            clock_offset_ms,
            timestamp: now,
        });
        while self.history.len() > self.max_samples {
            self.history.pop_front();
        }

        self.update_auto_scale();
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_sample_time = None;
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn scale_max(&self) -> f32 {
        self.scale_max
    }

    pub fn latest(&self) -> Option<&LatencySample> {
        self.history.back()
    }

    fn update_auto_scale(&mut self) {
        let max_value = self
            .history
            .iter()
            .map(|s| s.ping_ms.max(s.clock_offset_ms))
            .fold(0.0f32, f32::max);

        let desired_scale = (max_value * 1.2).max(50.0);

        // Smoothed so the axis does not jump on a single spike
        self.scale_max = self.scale_max * 0.9 + desired_scale * 0.1;
    }

    fn time_span_ms(&self) -> f32 {
        match (self.history.front(), self.history.back()) {
            (Some(oldest), Some(newest)) => newest
                .timestamp
                .saturating_duration_since(oldest.timestamp)
                .as_millis() as f32,
            _ => 0.0,
        }
    }

    /// Draws the graph below the minimap, right-aligned
    pub fn render(&self, top: f32) {
        if !self.visible || self.history.is_empty() {
            return;
        }

        let right_margin = 60.0;
        let bg_x = screen_width() - self.graph_width - right_margin;
        let bg_y = top + 40.0;

        let graph_x = bg_x + self.internal_padding;
        let graph_y = bg_y + self.internal_padding;

        self.draw_background(bg_x, bg_y);
        self.draw_legend(bg_x, bg_y);
        self.draw_grid(graph_x, graph_y);
        self.draw_series(graph_x, graph_y, |s| s.ping_ms, GREEN);
        self.draw_series(
            graph_x,
            graph_y,
            |s| s.clock_offset_ms,
            Color::from_rgba(0, 170, 255, 255),
        );
        self.draw_labels(graph_x, graph_y);
    }

    fn draw_background(&self, x: f32, y: f32) {
        let background_padding = 8.0;
        let label_space = 40.0;
        let legend_space = 40.0;
        let bottom_space = 30.0;

        draw_rectangle(
            x - background_padding,
            y - legend_space,
            self.graph_width + background_padding * 2.0 + label_space,
            self.graph_height + legend_space + bottom_space,
            Color::from_rgba(0, 0, 0, 200),
        );

        draw_rectangle_lines(
            x - background_padding,
            y - legend_space,
            self.graph_width + background_padding * 2.0 + label_space,
            self.graph_height + legend_space + bottom_space,
            1.0,
            Color::from_rgba(120, 120, 120, 255),
        );
    }

    fn draw_grid(&self, x: f32, y: f32) {
        let grid_color = Color::from_rgba(50, 50, 50, 255);
        let usable_width = self.graph_width - (self.internal_padding * 2.0);
        let usable_height = self.graph_height - (self.internal_padding * 2.0);

        for &level in &[25.0, 50.0, 100.0, 150.0, 200.0] {
            if level <= self.scale_max {
                let grid_y = y + usable_height - (level / self.scale_max * usable_height);
                draw_line(x, grid_y, x + usable_width, grid_y, 1.0, grid_color);
            }
        }

        let time_divisions = 5;
        let time_span_ms = self.time_span_ms();
        if time_span_ms <= 0.0 {
            return;
        }

        for i in 1..time_divisions {
            let fraction = i as f32 / time_divisions as f32;
            let grid_x = x + fraction * usable_width;
            draw_line(grid_x, y, grid_x, y + usable_height, 1.0, grid_color);

            let time_ago_ms = time_span_ms - fraction * time_span_ms;
            let time_label = if time_ago_ms > 1000.0 {
                format!("-{:.1}s", time_ago_ms / 1000.0)
            } else {
                format!("-{:.0}ms", time_ago_ms)
            };
            draw_text(
                &time_label,
                grid_x - 15.0,
                y + usable_height + 12.0,
                9.0,
                Color::from_rgba(180, 180, 180, 255),
            );
        }

        draw_text(
            "now",
            x + usable_width - 12.0,
            y + usable_height + 12.0,
            9.0,
            Color::from_rgba(180, 180, 180, 255),
        );
    }

    fn draw_series(&self, x: f32, y: f32, value: impl Fn(&LatencySample) -> f32, color: Color) {
        let Some(oldest) = self.history.front() else {
            return;
        };
        let time_span_ms = self.time_span_ms();
        if self.history.len() < 2 || time_span_ms <= 0.0 {
            return;
        }

        let usable_width = self.graph_width - (self.internal_padding * 2.0);
        let usable_height = self.graph_height - (self.internal_padding * 2.0);

        let point = |sample: &LatencySample| {
            let offset = sample
                .timestamp
                .saturating_duration_since(oldest.timestamp)
                .as_millis() as f32;
            (
                x + (offset / time_span_ms) * usable_width,
                y + usable_height - (value(sample) / self.scale_max * usable_height),
            )
        };

        for (prev, curr) in self.history.iter().zip(self.history.iter().skip(1)) {
            let (x1, y1) = point(prev);
            let (x2, y2) = point(curr);
            draw_line(x1, y1, x2, y2, 2.0, color);
        }
    }

    fn draw_labels(&self, x: f32, y: f32) {
        let font_size = 11.0;
        let usable_width = self.graph_width - (self.internal_padding * 2.0);
        let usable_height = self.graph_height - (self.internal_padding * 2.0);

        for fraction in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let level = self.scale_max * fraction;
            let label_y = y + usable_height - fraction * usable_height;
            draw_text(
                &format!("{:.0}ms", level),
                x + usable_width + 8.0,
                label_y + 4.0,
                font_size,
                WHITE,
            );
        }

        if let Some(latest) = self.history.back() {
            let current_info = format!(
                "Ping: {:.0}ms  Offset: {:.1}ms",
                latest.ping_ms, latest.clock_offset_ms
            );
            draw_text(
                &current_info,
                x - self.internal_padding,
                y + usable_height + 28.0,
                font_size,
                WHITE,
            );
        }
    }

    fn draw_legend(&self, x: f32, y: f32) {
        let legend_y = y - 30.0;
        let font_size = 11.0;

        draw_text("Network (F2 to toggle)", x, legend_y, font_size, WHITE);
        draw_text("ping", x, legend_y + 12.0, 10.0, GREEN);
        draw_text(
            "clock offset",
            x + 35.0,
            legend_y + 12.0,
            10.0,
            Color::from_rgba(0, 170, 255, 255),
        );
    }
}

impl Default for NetworkGraph {
    fn default() -> Self {
        Self::new()
    }
}
