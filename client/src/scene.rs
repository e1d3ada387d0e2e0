//! Camera placement and world to viewport transforms, consumed by rendering.

use shared::{MapBounds, Vec2, Wall, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Side of the square minimap, in screen pixels.
pub const MINIMAP_SIZE: f32 = 150.0;
/// Gap between the minimap and the viewport corner.
pub const MINIMAP_MARGIN: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(SCREEN_WIDTH, SCREEN_HEIGHT)
    }
}

/// Screen-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Player-centred camera, clamped so the view never leaves the map.
#[derive(Debug, Clone)]
pub struct SceneComposer {
    viewport: Viewport,
    map: MapBounds,
    camera: Vec2,
}

impl SceneComposer {
    pub fn new(viewport: Viewport, map: MapBounds) -> Self {
        Self {
            viewport,
            map,
            camera: Vec2::ZERO,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn map(&self) -> MapBounds {
        self.map
    }

    /// Top-left corner of the view, in world units.
    pub fn camera(&self) -> Vec2 {
        self.camera
    }

    /// Centres the view on a `size`-sided avatar at `position`.
    pub fn follow(&mut self, position: Vec2, size: f32) {
        let center = position + Vec2::new(size / 2.0, size / 2.0);
        let max_x = (self.map.width - self.viewport.width).max(0.0);
        let max_y = (self.map.height - self.viewport.height).max(0.0);

        self.camera = Vec2::new(
            (center.x - self.viewport.width / 2.0).clamp(0.0, max_x),
            (center.y - self.viewport.height / 2.0).clamp(0.0, max_y),
        );
    }

    pub fn reset(&mut self) {
        self.camera = Vec2::ZERO;
    }

    pub fn world_to_screen(&self, position: Vec2) -> Vec2 {
        position - self.camera
    }

    pub fn screen_to_world(&self, position: Vec2) -> Vec2 {
        position + self.camera
    }

    /// Whether a world rectangle intersects the current view at all.
    pub fn is_visible(&self, position: Vec2, width: f32, height: f32) -> bool {
        let screen = self.world_to_screen(position);
        screen.x + width >= 0.0
            && screen.y + height >= 0.0
            && screen.x <= self.viewport.width
            && screen.y <= self.viewport.height
    }

    pub fn wall_visible(&self, wall: &Wall) -> bool {
        self.is_visible(Vec2::new(wall.x, wall.y), wall.width, wall.height)
    }

    /// Screen rectangle of the minimap, anchored to the top-right corner.
    pub fn minimap_frame(&self) -> ScreenRect {
        ScreenRect {
            x: self.viewport.width - MINIMAP_SIZE - MINIMAP_MARGIN,
            y: MINIMAP_MARGIN,
            width: MINIMAP_SIZE,
            height: MINIMAP_SIZE,
        }
    }

    /// Projects a world point into the minimap frame.
    pub fn to_minimap(&self, position: Vec2) -> Vec2 {
        let frame = self.minimap_frame();
        Vec2::new(
            frame.x + position.x / self.map.width * frame.width,
            frame.y + position.y / self.map.height * frame.height,
        )
    }

    /// The current view outlined on the minimap.
    pub fn minimap_view(&self) -> ScreenRect {
        let frame = self.minimap_frame();
        let origin = self.to_minimap(self.camera);
        ScreenRect {
            x: origin.x,
            y: origin.y,
            width: self.viewport.width / self.map.width * frame.width,
            height: self.viewport.height / self.map.height * frame.height,
        }
    }
}

impl Default for SceneComposer {
    fn default() -> Self {
        Self::new(Viewport::default(), MapBounds::default())
    }
}
