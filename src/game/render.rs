//! Rendering
//!
//! The engine draws through the [`Canvas`] trait onto a fixed 800×600
//! logical surface. [`CommandCanvas`] records draw calls so a host can
//! replay them onto a real 2D context, and so tests can inspect frames.

use serde::{Serialize, Deserialize};

use crate::game::state::{EnemyKind, EntityKind, SimulationState};

/// RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u8, pub u8, pub u8, pub u8);

impl Color {
    /// Background
    pub const BACKGROUND: Color = Color(8, 10, 24, 255);
    /// Player ship
    pub const PLAYER: Color = Color(80, 220, 255, 255);
    /// Player ship while invulnerable
    pub const PLAYER_BLINK: Color = Color(80, 220, 255, 96);
    /// Bullets
    pub const BULLET: Color = Color(255, 240, 120, 255);
    /// HUD text
    pub const TEXT: Color = Color(235, 235, 235, 255);
    /// Pause overlay
    pub const OVERLAY: Color = Color(0, 0, 0, 160);

    /// Fill color for an enemy archetype.
    pub fn enemy(kind: EnemyKind) -> Color {
        match kind {
            EnemyKind::Scout => Color(255, 170, 60, 255),
            EnemyKind::Grunt => Color(240, 70, 90, 255),
            EnemyKind::Tank => Color(170, 90, 255, 255),
        }
    }
}

/// Drawing surface the engine renders into.
pub trait Canvas {
    /// Fill the whole surface.
    fn clear(&mut self, color: Color);
    /// Filled circle.
    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color);
    /// Filled axis-aligned rectangle.
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color);
    /// Text anchored at its top-left corner.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color);
}

/// A recorded draw call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    /// See [`Canvas::clear`]
    Clear(Color),
    /// See [`Canvas::fill_circle`]
    Circle {
        /// Center x
        x: f32,
        /// Center y
        y: f32,
        /// Radius
        radius: f32,
        /// Fill
        color: Color,
    },
    /// See [`Canvas::fill_rect`]
    Rect {
        /// Left
        x: f32,
        /// Top
        y: f32,
        /// Width
        width: f32,
        /// Height
        height: f32,
        /// Fill
        color: Color,
    },
    /// See [`Canvas::fill_text`]
    Text {
        /// Content
        text: String,
        /// Left
        x: f32,
        /// Top
        y: f32,
        /// Fill
        color: Color,
    },
}

/// Canvas that records the last frame's draw commands.
#[derive(Debug, Default, Clone)]
pub struct CommandCanvas {
    commands: Vec<DrawCommand>,
    frames: u64,
}

impl CommandCanvas {
    /// Create an empty canvas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands since the last clear.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of frames drawn (clears seen).
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Take the recorded commands, leaving the buffer empty.
    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Canvas for CommandCanvas {
    fn clear(&mut self, color: Color) {
        self.commands.clear();
        self.frames += 1;
        self.commands.push(DrawCommand::Clear(color));
    }

    fn fill_circle(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        self.commands.push(DrawCommand::Circle { x, y, radius, color });
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        self.commands.push(DrawCommand::Rect { x, y, width, height, color });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}

/// Draws simulation state. Holds no state of its own besides options.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    /// Draw the HUD (score, lives, time)
    pub show_hud: bool,
}

impl Renderer {
    /// Renderer with HUD enabled.
    pub fn new() -> Self {
        Self { show_hud: true }
    }

    /// Draw one frame.
    pub fn draw(&self, canvas: &mut dyn Canvas, state: &SimulationState, tick_rate: u32, paused: bool) {
        canvas.clear(Color::BACKGROUND);

        for entity in state.entities.iter().filter(|e| e.alive) {
            let p = entity.position;
            match &entity.kind {
                EntityKind::Player(data) => {
                    // Blink every 6 ticks while invulnerable
                    let color = if data.invulnerable_ticks > 0 && (data.invulnerable_ticks / 6) % 2 == 0 {
                        Color::PLAYER_BLINK
                    } else {
                        Color::PLAYER
                    };
                    canvas.fill_circle(p.x, p.y, entity.radius, color);
                }
                EntityKind::Bullet(_) => {
                    canvas.fill_circle(p.x, p.y, entity.radius, Color::BULLET);
                }
                EntityKind::Enemy(data) => {
                    canvas.fill_circle(p.x, p.y, entity.radius, Color::enemy(data.kind));
                }
            }
        }

        if self.show_hud {
            canvas.fill_text(&format!("SCORE {}", state.score), 12.0, 12.0, Color::TEXT);
            canvas.fill_text(&format!("LIVES {}", state.lives()), 12.0, 32.0, Color::TEXT);
            canvas.fill_text(
                &format!("TIME {}s", state.elapsed_seconds(tick_rate)),
                state.bounds.x - 110.0,
                12.0,
                Color::TEXT,
            );
        }

        if paused {
            canvas.fill_rect(0.0, 0.0, state.bounds.x, state.bounds.y, Color::OVERLAY);
            canvas.fill_text("PAUSED", state.bounds.x / 2.0 - 36.0, state.bounds.y / 2.0, Color::TEXT);
        } else if state.game_over {
            canvas.fill_text("GAME OVER", state.bounds.x / 2.0 - 54.0, state.bounds.y / 2.0, Color::TEXT);
        }
    }
}
