use crate::sim::{
    SimulationContext,
    backend::{DrawCall, GpuBackend},
};

/// Full-screen triangle shared by every program
pub const FULLSCREEN_WGSL: &str = include_str!("./fullscreen.wgsl");
/// Pass-through copy of a cell texture onto the surface
pub const DISPLAY_WGSL: &str = include_str!("./display.wgsl");

impl<B: GpuBackend> SimulationContext<B> {
    /// Copy the front texture onto the visible surface, unchanged.
    pub fn display(&mut self) -> Result<(), B::Error> {
        self.backend.present(DrawCall {
            program: self.display_program,
            input: self.textures.front(),
            viewport: self.dims,
        })
    }
}
