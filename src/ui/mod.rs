//! Pointer and keyboard handling
//!
//! Window events are turned into [`InputEvent`]s and queued on an
//! [`InputAdapter`]. The queue is drained once per frame, before the
//! simulation step, so paints never interleave with a step in progress.

use std::collections::VecDeque;

use winit::{
    event::{ElementState, MouseButton, WindowEvent},
    keyboard::Key,
};

use crate::{
    sim::{Dimensions, SimulationContext, backend::GpuBackend},
    util::Color,
};


/// Input in surface coordinates (origin top-left)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    PointerDown { x: i64, y: i64 },
    PointerMove { x: i64, y: i64 },
    PointerUp,
    Key(char),
}

/// What a key press does to the brush or board
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Color(Color),
    Erase,
    Clear,
}

impl KeyAction {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'r' => Some(Self::Color(Color::RED)),
            'g' => Some(Self::Color(Color::GREEN)),
            'b' => Some(Self::Color(Color::BLUE)),
            'e' => Some(Self::Erase),
            'c' => Some(Self::Clear),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseState {
    Down,
    Up,
}

pub struct InputAdapter {
    queue: VecDeque<InputEvent>,
    mouse_state: MouseState,
    surface_height: u32,
}

impl InputAdapter {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            queue: VecDeque::new(),
            mouse_state: MouseState::Up,
            surface_height: dims.height,
        }
    }

    pub fn push(&mut self, event: InputEvent) {
        self.queue.push_back(event);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn mouse_state(&self) -> MouseState {
        self.mouse_state
    }

    /// Apply every queued event to `context`, oldest first.
    pub fn apply<B: GpuBackend>(&mut self, context: &mut SimulationContext<B>) {
        while let Some(event) = self.queue.pop_front() {
            self.handle(event, context);
        }
    }

    fn handle<B: GpuBackend>(&mut self, event: InputEvent, context: &mut SimulationContext<B>) {
        match event {
            InputEvent::PointerDown { x, y } => {
                self.mouse_state = MouseState::Down;
                let (x, y) = self.to_board(x, y);
                context.paint(x, y);
            }
            InputEvent::PointerMove { x, y } => {
                if self.mouse_state == MouseState::Down {
                    let (x, y) = self.to_board(x, y);
                    context.paint(x, y);
                }
            }
            InputEvent::PointerUp => self.mouse_state = MouseState::Up,
            InputEvent::Key(key) => match KeyAction::from_key(key) {
                Some(KeyAction::Color(color)) => context.select_color(color),
                Some(KeyAction::Erase) => context.set_erase(),
                Some(KeyAction::Clear) => context.clear_board(),
                None => log::trace!("ignoring key {key:?}"),
            },
        }
    }

    /// Surface rows count down from the top, board rows up from the bottom.
    fn to_board(&self, x: i64, y: i64) -> (i64, i64) {
        (x, self.surface_height as i64 - y)
    }
}

/// Turns winit window events into [`InputEvent`]s
///
/// winit reports button presses without a position, so the last cursor
/// position is remembered here. Cursor positions arrive in physical pixels
/// and are divided by `scale` to land in board cells.
pub struct PointerTracker {
    cursor: Option<(i64, i64)>,
    scale: f64,
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::with_scale(1.0)
    }
}

impl PointerTracker {
    /// Track a board whose cells are `scale` physical pixels wide.
    pub fn with_scale(scale: f64) -> Self {
        Self {
            cursor: None,
            scale: if scale > 0.0 { scale } else { 1.0 },
        }
    }

    pub fn set_scale(&mut self, scale: f64) {
        if scale > 0.0 {
            self.scale = scale;
        }
    }

    pub fn translate(&mut self, event: &WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let x = (position.x / self.scale).floor() as i64;
                let y = (position.y / self.scale).floor() as i64;
                self.cursor = Some((x, y));
                Some(InputEvent::PointerMove { x, y })
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    let (x, y) = self.cursor?;
                    Some(InputEvent::PointerDown { x, y })
                }
                ElementState::Released => Some(InputEvent::PointerUp),
            },
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match &event.logical_key {
                    Key::Character(text) => text.chars().next().map(InputEvent::Key),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
