//! In-memory backend that runs the automaton on the CPU
//!
//! Mirrors the wgpu backend closely enough to drive [`SimulationContext`]
//! headless: textures are plain RGBA8 byte vectors, update programs are
//! [`UpdateRule`] objects evaluated per cell with rayon, and the "surface" is
//! a byte buffer that can be inspected after each present.
//!
//! [`SimulationContext`]: crate::sim::SimulationContext

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use rayon::{iter::IndexedParallelIterator, iter::ParallelIterator, slice::ParallelSliceMut};

use crate::sim::{
    Dimensions, Region,
    backend::{DrawCall, GpuBackend, ProgramId, ProgramOutput, TargetId, TextureId, Uniform},
};

/// A cellular-automaton rule: next cell color from its neighborhood and time
pub trait UpdateRule: Send + Sync {
    fn next_cell(&self, neighborhood: &Neighborhood<'_>, time: f32) -> [u8; 4];
}

/// Read-only view of the cells around one position
///
/// Reads outside the board return the nearest edge cell, the same as a
/// clamp-to-edge sampler.
pub struct Neighborhood<'a> {
    cells: &'a [u8],
    dims: Dimensions,
    x: u32,
    y: u32,
}

impl Neighborhood<'_> {
    pub fn cell(&self, dx: i32, dy: i32) -> [u8; 4] {
        let (x, y) = self
            .dims
            .clamp_point(self.x as i64 + dx as i64, self.y as i64 + dy as i64);
        let idx = (y as usize * self.dims.width as usize + x as usize) * 4;
        [
            self.cells[idx],
            self.cells[idx + 1],
            self.cells[idx + 2],
            self.cells[idx + 3],
        ]
    }

    pub fn center(&self) -> [u8; 4] {
        self.cell(0, 0)
    }
}

/// Colored Game of Life, the CPU twin of `life.wgsl`
///
/// A cell is alive when its alpha is non-zero. Survival on 2 or 3 live
/// neighbors keeps the cell's color; a birth on exactly 3 takes their mean.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConwayRule;

impl UpdateRule for ConwayRule {
    fn next_cell(&self, neighborhood: &Neighborhood<'_>, _time: f32) -> [u8; 4] {
        let here = neighborhood.center();
        let mut live = 0;
        let mut sum = [0u32; 3];
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let n = neighborhood.cell(dx, dy);
                if n[3] > 0 {
                    live += 1;
                    for (total, channel) in sum.iter_mut().zip(n) {
                        *total += channel as u32;
                    }
                }
            }
        }
        let alive = here[3] > 0;
        match (alive, live) {
            (true, 2 | 3) => here,
            (false, 3) => {
                let mean = |c: u32| (c as f32 / 3.0).round() as u8;
                [mean(sum[0]), mean(sum[1]), mean(sum[2]), 255]
            }
            _ => [0; 4],
        }
    }
}

/// What a CPU program does when drawn
#[derive(Clone)]
pub enum CpuShader {
    Update(Arc<dyn UpdateRule>),
    /// Copies the input unchanged
    Display,
}

impl CpuShader {
    pub fn update(rule: impl UpdateRule + 'static) -> Self {
        Self::Update(Arc::new(rule))
    }
}

struct CpuTexture {
    dims: Dimensions,
    pixels: Vec<u8>,
}

struct CpuProgram {
    shader: CpuShader,
    output: ProgramOutput,
    uniforms: HashMap<String, Uniform>,
}

/// A texture upload seen by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureWrite {
    pub texture: TextureId,
    pub region: Region,
}

#[derive(Default)]
pub struct CpuBackend {
    textures: Vec<CpuTexture>,
    targets: Vec<Option<TextureId>>,
    programs: Vec<CpuProgram>,
    surface: Vec<u8>,
    surface_dims: Option<Dimensions>,
    writes: Vec<TextureWrite>,
    presents: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw RGBA8 contents of a texture, row 0 first
    pub fn pixels(&self, texture: TextureId) -> &[u8] {
        &self.textures[texture.0].pixels
    }

    pub fn texel(&self, texture: TextureId, x: u32, y: u32) -> [u8; 4] {
        let tex = &self.textures[texture.0];
        let idx = (y as usize * tex.dims.width as usize + x as usize) * 4;
        [
            tex.pixels[idx],
            tex.pixels[idx + 1],
            tex.pixels[idx + 2],
            tex.pixels[idx + 3],
        ]
    }

    /// Presented pixel at a board coordinate (origin bottom-left), if anything
    /// has been presented yet.
    pub fn surface_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let dims = self.surface_dims?;
        let row = dims.height - 1 - y;
        let idx = (row as usize * dims.width as usize + x as usize) * 4;
        self.surface.get(idx..idx + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Presented frame in framebuffer order (origin top-left)
    pub fn surface(&self) -> &[u8] {
        &self.surface
    }

    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<Uniform> {
        self.programs[program.0].uniforms.get(name).copied()
    }

    pub fn writes(&self) -> &[TextureWrite] {
        &self.writes
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    fn run(&self, call: &DrawCall, out_dims: Dimensions) -> Vec<u8> {
        let program = &self.programs[call.program.0];
        let input = &self.textures[call.input.0];
        debug_assert_eq!(input.dims, call.viewport);
        debug_assert_eq!(out_dims, call.viewport);
        match &program.shader {
            CpuShader::Display => input.pixels.clone(),
            CpuShader::Update(rule) => {
                let time = match program.uniforms.get("time") {
                    Some(Uniform::Float(t)) => *t,
                    _ => 0.0,
                };
                let dims = input.dims;
                let mut out = vec![0u8; dims.cell_count() * 4];
                out.par_chunks_mut(dims.width as usize * 4)
                    .enumerate()
                    .for_each(|(y, row)| {
                        for (x, texel) in row.chunks_exact_mut(4).enumerate() {
                            let neighborhood = Neighborhood {
                                cells: &input.pixels,
                                dims,
                                x: x as u32,
                                y: y as u32,
                            };
                            texel.copy_from_slice(&rule.next_cell(&neighborhood, time));
                        }
                    });
                out
            }
        }
    }
}

impl GpuBackend for CpuBackend {
    type Shader = CpuShader;
    type Error = Infallible;

    fn create_texture(&mut self, dims: Dimensions) -> TextureId {
        self.textures.push(CpuTexture {
            dims,
            pixels: vec![0; dims.cell_count() * 4],
        });
        TextureId(self.textures.len() - 1)
    }

    fn write_texture(&mut self, texture: TextureId, region: Region, pixels: &[u8]) {
        let tex = &mut self.textures[texture.0];
        assert!(
            region.x + region.width <= tex.dims.width && region.y + region.height <= tex.dims.height,
            "write {region:?} outside {:?}",
            tex.dims
        );
        assert_eq!(pixels.len(), region.cell_count() * 4);
        let row_bytes = region.width as usize * 4;
        for (row, src) in pixels.chunks_exact(row_bytes).enumerate() {
            let y = region.y as usize + row;
            let start = (y * tex.dims.width as usize + region.x as usize) * 4;
            tex.pixels[start..start + row_bytes].copy_from_slice(src);
        }
        self.writes.push(TextureWrite { texture, region });
    }

    fn create_render_target(&mut self) -> TargetId {
        self.targets.push(None);
        TargetId(self.targets.len() - 1)
    }

    fn attach_color(&mut self, target: TargetId, texture: TextureId) {
        self.targets[target.0] = Some(texture);
    }

    async fn create_program(
        &mut self,
        shader: &CpuShader,
        output: ProgramOutput,
    ) -> anyhow::Result<ProgramId> {
        if matches!(shader, CpuShader::Update(_)) && output == ProgramOutput::Surface {
            anyhow::bail!("update rules can only render into cell textures");
        }
        self.programs.push(CpuProgram {
            shader: shader.clone(),
            output,
            uniforms: HashMap::new(),
        });
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: Uniform) {
        self.programs[program.0]
            .uniforms
            .insert(name.to_string(), value);
    }

    fn draw(&mut self, call: DrawCall, target: TargetId) {
        let Some(output) = self.targets[target.0] else {
            log::warn!("draw into render target {target:?} with nothing attached");
            return;
        };
        assert_ne!(output, call.input, "a pass cannot read the texture it writes");
        if self.programs[call.program.0].output != ProgramOutput::CellTexture {
            log::warn!(
                "program {:?} renders to the surface, not a cell texture",
                call.program
            );
            return;
        }
        let out = self.run(&call, self.textures[output.0].dims);
        self.textures[output.0].pixels = out;
    }

    fn present(&mut self, call: DrawCall) -> Result<(), Infallible> {
        if self.programs[call.program.0].output != ProgramOutput::Surface {
            log::warn!(
                "program {:?} renders to cell textures, not the surface",
                call.program
            );
            return Ok(());
        }
        let pixels = self.run(&call, call.viewport);
        let row_bytes = call.viewport.width as usize * 4;
        // Flip to framebuffer order like display.wgsl does.
        self.surface = pixels
            .chunks_exact(row_bytes)
            .rev()
            .flatten()
            .copied()
            .collect();
        self.surface_dims = Some(call.viewport);
        self.presents += 1;
        Ok(())
    }
}
