//! GPU-resident cellular automaton state
//!
//! The board lives in two equally sized textures. Each frame the update
//! program reads the *back* texture and renders the next generation into the
//! *front* texture, then the labels swap. Paint operations only ever touch
//! the back texture, which the step reads but never writes, so input can land
//! between frames without racing the simulation.

use crate::util::{CLEAR_TEXEL, Color};

pub mod backend;
pub mod cpu;

#[cfg(test)]
mod tests;

use backend::{DrawCall, GpuBackend, ProgramId, ProgramOutput, TargetId, TextureId, Uniform};

/// Bundled update rule for the wgpu backend, see [`cpu::ConwayRule`]
pub const LIFE_WGSL: &str = include_str!("./life.wgsl");

/// Side length of the square cleared around the cursor in erase mode
pub const ERASE_EXTENT: u32 = 64;

/// Size of the board in cells, fixed at startup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Zero-sized axes are bumped to one cell so clamping always has a target.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Clamp a point into `[0, width) x [0, height)`.
    pub fn clamp_point(&self, x: i64, y: i64) -> (u32, u32) {
        (
            x.clamp(0, self.width as i64 - 1) as u32,
            y.clamp(0, self.height as i64 - 1) as u32,
        )
    }

    /// Clamp a rectangle's origin into bounds, then truncate each axis
    /// independently so the far edge stays on the board.
    ///
    /// Returns `None` when nothing is left to write.
    pub fn clamp_rect(&self, x: i64, y: i64, width: u32, height: u32) -> Option<Region> {
        let (x, y) = self.clamp_point(x, y);
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Region {
            x,
            y,
            width,
            height,
        })
    }

    pub fn as_vec2(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

/// An in-bounds rectangle of cells, origin at the bottom-left
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// The ping-pong pair of cell textures
///
/// Only the labels move on a swap; both allocations stay put.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TexturePair {
    back: TextureId,
    front: TextureId,
}

impl TexturePair {
    pub fn new(back: TextureId, front: TextureId) -> Self {
        debug_assert_ne!(back, front, "ping-pong textures must be distinct");
        Self { back, front }
    }

    /// The authoritative state, read by the next step and written by paints
    pub fn back(&self) -> TextureId {
        self.back
    }

    /// The step's render target, and after a swap the texture on screen
    pub fn front(&self) -> TextureId {
        self.front
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.back, &mut self.front);
    }
}

/// Current brush, changed only by key input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawState {
    pub color: Color,
    pub erase: bool,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            color: Color::RED,
            erase: false,
        }
    }
}

/// Everything the simulation owns: backend, textures, programs and brush
pub struct SimulationContext<B: GpuBackend> {
    pub(crate) backend: B,
    pub(crate) dims: Dimensions,
    pub(crate) textures: TexturePair,
    pub(crate) frame: u64,
    pub(crate) draw_state: DrawState,
    update_program: ProgramId,
    pub(crate) display_program: ProgramId,
    target: TargetId,
}

impl<B: GpuBackend> SimulationContext<B> {
    /// Allocate both textures, the offscreen target and the two programs.
    ///
    /// A program that fails to build aborts setup; nothing is retried.
    pub async fn new(
        mut backend: B,
        dims: Dimensions,
        update: &B::Shader,
        display: &B::Shader,
    ) -> anyhow::Result<Self> {
        let update_program = backend
            .create_program(update, ProgramOutput::CellTexture)
            .await?;
        let display_program = backend
            .create_program(display, ProgramOutput::Surface)
            .await?;

        backend.set_uniform(update_program, "resolution", Uniform::Vec2(dims.as_vec2()));
        backend.set_uniform(display_program, "resolution", Uniform::Vec2(dims.as_vec2()));

        let back = backend.create_texture(dims);
        let front = backend.create_texture(dims);
        let target = backend.create_render_target();

        log::info!(
            "simulation ready: {}x{} cells ({} per texture)",
            dims.width,
            dims.height,
            dims.cell_count()
        );

        Ok(Self {
            backend,
            dims,
            textures: TexturePair::new(back, front),
            frame: 0,
            draw_state: DrawState::default(),
            update_program,
            display_program,
            target,
        })
    }

    pub fn with_draw_state(mut self, draw_state: DrawState) -> Self {
        self.draw_state = draw_state;
        self
    }

    /// Write one opaque cell of `color` into the back texture.
    pub fn poke_point(&mut self, x: i64, y: i64, color: Color) {
        let (x, y) = self.dims.clamp_point(x, y);
        let region = Region {
            x,
            y,
            width: 1,
            height: 1,
        };
        // Looked up on every call: the back label moves each frame.
        let back = self.textures.back();
        self.backend.write_texture(back, region, &color.opaque());
    }

    /// Zero a rectangle of the back texture, clamped onto the board.
    pub fn clear_rect(&mut self, x: i64, y: i64, width: u32, height: u32) {
        let Some(region) = self.dims.clamp_rect(x, y, width, height) else {
            return;
        };
        let pixels = CLEAR_TEXEL.repeat(region.cell_count());
        let back = self.textures.back();
        self.backend.write_texture(back, region, &pixels);
    }

    /// Apply the brush at a board coordinate: a single cell, or an
    /// [`ERASE_EXTENT`] square centered on it when erasing.
    pub fn paint(&mut self, x: i64, y: i64) {
        if self.draw_state.erase {
            let half = (ERASE_EXTENT / 2) as i64;
            self.clear_rect(x - half, y - half, ERASE_EXTENT, ERASE_EXTENT);
        } else {
            self.poke_point(x, y, self.draw_state.color);
        }
    }

    /// Switch the brush color. Always leaves erase mode.
    pub fn select_color(&mut self, color: Color) {
        self.draw_state = DrawState {
            color,
            erase: false,
        };
        log::debug!("draw color set to {color:?}");
    }

    pub fn set_erase(&mut self) {
        self.draw_state.erase = true;
        log::debug!("erase mode on");
    }

    pub fn clear_board(&mut self) {
        self.clear_rect(0, 0, self.dims.width, self.dims.height);
        log::debug!("board cleared");
    }

    /// Advance the automaton one generation and swap the labels.
    ///
    /// After the swap the front texture holds the state the step started
    /// from, so the display always trails the authoritative state by one
    /// generation.
    pub fn step(&mut self) {
        self.frame += 1;
        self.backend
            .set_uniform(self.update_program, "time", Uniform::Float(self.frame as f32));
        self.backend
            .attach_color(self.target, self.textures.front());
        self.backend.draw(
            DrawCall {
                program: self.update_program,
                input: self.textures.back(),
                viewport: self.dims,
            },
            self.target,
        );
        self.textures.swap();
    }

    /// One animation frame: step, swap, then show the front texture.
    pub fn frame(&mut self) -> Result<(), B::Error> {
        self.step();
        self.display()
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn draw_state(&self) -> DrawState {
        self.draw_state
    }

    pub fn textures(&self) -> TexturePair {
        self.textures
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
