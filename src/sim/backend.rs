//! The GPU command interface the simulation is written against
//!
//! Every operation names the resources it touches through explicit handles.
//! Nothing is "currently bound" between calls, so a paint can never land on
//! whatever texture a previous pass happened to leave active.

use std::future::Future;

use crate::sim::{Dimensions, Region};

/// Handle to a cell texture owned by a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) usize);

/// Handle to a shader program owned by a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) usize);

/// Handle to an offscreen render target owned by a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetId(pub(crate) usize);

/// Values a program can receive through a named uniform
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Uniform {
    Float(f32),
    Vec2([f32; 2]),
}

/// Where a program's fragment output goes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramOutput {
    /// Renders into a cell texture attached to a render target
    CellTexture,
    /// Renders onto the visible surface
    Surface,
}

/// A single full-surface draw
///
/// `input` is sampled through texture unit 0. The draw covers every pixel of
/// `viewport` exactly once.
#[derive(Clone, Copy, Debug)]
pub struct DrawCall {
    pub program: ProgramId,
    pub input: TextureId,
    pub viewport: Dimensions,
}

pub trait GpuBackend {
    /// A program's two stages in the form this backend consumes
    type Shader;
    /// Failure presenting to the visible surface
    type Error: std::error::Error;

    /// Allocate a zeroed RGBA8 texture with nearest sampling and clamp-to-edge
    /// addressing.
    fn create_texture(&mut self, dims: Dimensions) -> TextureId;

    /// Upload tightly packed RGBA8 `pixels` into `region` of `texture`.
    fn write_texture(&mut self, texture: TextureId, region: Region, pixels: &[u8]);

    fn create_render_target(&mut self) -> TargetId;

    /// Make `texture` the color output of `target`.
    fn attach_color(&mut self, target: TargetId, texture: TextureId);

    /// Compile and link a program. Failure is fatal for setup and carries the
    /// backend's diagnostic.
    fn create_program(
        &mut self,
        shader: &Self::Shader,
        output: ProgramOutput,
    ) -> impl Future<Output = anyhow::Result<ProgramId>>;

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform);

    /// Run `call` offscreen, writing into the texture attached to `target`.
    fn draw(&mut self, call: DrawCall, target: TargetId);

    /// Run `call` onto the visible surface and present it.
    fn present(&mut self, call: DrawCall) -> Result<(), Self::Error>;
}
