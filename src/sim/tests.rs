use test_log::test;

use super::*;
use crate::sim::cpu::{ConwayRule, CpuBackend, CpuShader, Neighborhood, UpdateRule};

/// Keeps every cell as it is, so paints survive steps unchanged
struct Hold;

impl UpdateRule for Hold {
    fn next_cell(&self, neighborhood: &Neighborhood<'_>, _time: f32) -> [u8; 4] {
        neighborhood.center()
    }
}

fn board(width: u32, height: u32, rule: impl UpdateRule + 'static) -> SimulationContext<CpuBackend> {
    pollster::block_on(SimulationContext::new(
        CpuBackend::new(),
        Dimensions::new(width, height),
        &CpuShader::update(rule),
        &CpuShader::Display,
    ))
    .expect("cpu programs always build")
}

fn live_cells(ctx: &SimulationContext<CpuBackend>, texture: TextureId) -> Vec<(u32, u32)> {
    let dims = ctx.dimensions();
    let mut cells = Vec::new();
    for y in 0..dims.height {
        for x in 0..dims.width {
            if ctx.backend().texel(texture, x, y) != [0; 4] {
                cells.push((x, y));
            }
        }
    }
    cells
}

fn last_write(ctx: &SimulationContext<CpuBackend>) -> cpu::TextureWrite {
    *ctx.backend().writes().last().expect("something was written")
}

#[test]
fn zero_sized_dimensions_become_one_cell() {
    assert_eq!(Dimensions::new(0, 0), Dimensions::new(1, 1));
}

#[test]
fn points_clamp_onto_the_board() {
    let dims = Dimensions::new(100, 80);
    assert_eq!(dims.clamp_point(-5, -1), (0, 0));
    assert_eq!(dims.clamp_point(100, 80), (99, 79));
    assert_eq!(dims.clamp_point(i64::MAX, i64::MIN), (99, 0));
    assert_eq!(dims.clamp_point(42, 17), (42, 17));
}

#[test]
fn rect_far_edges_truncate_per_axis() {
    let dims = Dimensions::new(100, 80);
    assert_eq!(
        dims.clamp_rect(90, 70, 64, 64),
        Some(Region {
            x: 90,
            y: 70,
            width: 10,
            height: 10
        })
    );
    // Height overflowing must not touch the width.
    assert_eq!(
        dims.clamp_rect(0, 70, 5, 64),
        Some(Region {
            x: 0,
            y: 70,
            width: 5,
            height: 10
        })
    );
    assert_eq!(
        dims.clamp_rect(150, -5, 20, 20),
        Some(Region {
            x: 99,
            y: 0,
            width: 1,
            height: 20
        })
    );
    assert_eq!(dims.clamp_rect(10, 10, 0, 5), None);
}

#[test]
fn negative_origin_clamps_without_shrinking() {
    let dims = Dimensions::new(100, 80);
    assert_eq!(
        dims.clamp_rect(-27, -27, 64, 64),
        Some(Region {
            x: 0,
            y: 0,
            width: 64,
            height: 64
        })
    );
}

#[test]
fn swapping_twice_restores_the_pair() {
    let mut pair = TexturePair::new(TextureId(3), TextureId(7));
    let original = pair;
    pair.swap();
    assert_eq!(pair.back(), TextureId(7));
    assert_eq!(pair.front(), TextureId(3));
    pair.swap();
    assert_eq!(pair, original);
}

#[test]
fn step_swaps_the_labels() {
    let mut ctx = board(16, 16, Hold);
    let before = ctx.textures();
    ctx.step();
    assert_eq!(ctx.textures().back(), before.front());
    assert_eq!(ctx.textures().front(), before.back());
}

#[test]
fn poke_writes_one_opaque_cell_into_back_only() {
    let mut ctx = board(32, 24, Hold);
    ctx.poke_point(4, 5, Color::GREEN);

    let back = ctx.textures().back();
    let front = ctx.textures().front();
    assert_eq!(ctx.backend().texel(back, 4, 5), [0, 255, 0, 255]);
    assert_eq!(live_cells(&ctx, back), vec![(4, 5)]);
    assert!(live_cells(&ctx, front).is_empty());
    assert!(ctx.backend().writes().iter().all(|w| w.texture == back));
}

#[test]
fn out_of_bounds_pokes_land_on_the_edge() {
    let mut ctx = board(32, 24, Hold);
    ctx.poke_point(-10, 500, Color::BLUE);
    ctx.poke_point(1_000, -3, Color::RED);

    let back = ctx.textures().back();
    assert_eq!(ctx.backend().texel(back, 0, 23), [0, 0, 255, 255]);
    assert_eq!(ctx.backend().texel(back, 31, 0), [255, 0, 0, 255]);
    for write in ctx.backend().writes() {
        assert!(write.region.x + write.region.width <= 32);
        assert!(write.region.y + write.region.height <= 24);
    }
}

#[test]
fn clear_rect_zeroes_exactly_the_truncated_region() {
    let mut ctx = board(40, 30, Hold);
    for y in 0..30 {
        for x in 0..40 {
            ctx.poke_point(x, y, Color::RED);
        }
    }
    ctx.clear_rect(30, 25, 64, 64);

    let write = last_write(&ctx);
    assert_eq!(
        write.region,
        Region {
            x: 30,
            y: 25,
            width: 10,
            height: 5
        }
    );
    let back = ctx.textures().back();
    for y in 0..30 {
        for x in 0..40 {
            let expected = if write.region.contains(x, y) {
                [0; 4]
            } else {
                [255, 0, 0, 255]
            };
            assert_eq!(ctx.backend().texel(back, x, y), expected, "cell ({x}, {y})");
        }
    }
}

#[test]
fn paints_follow_the_back_label_across_frames() {
    let mut ctx = board(16, 16, Hold);
    let first_back = ctx.textures().back();
    ctx.frame().unwrap();
    ctx.poke_point(1, 1, Color::RED);

    let write = last_write(&ctx);
    assert_ne!(write.texture, first_back);
    assert_eq!(write.texture, ctx.textures().back());
}

#[test]
fn frame_counter_feeds_the_time_uniform() {
    let mut ctx = board(8, 8, Hold);
    assert_eq!(ctx.frame_count(), 0);
    for _ in 0..3 {
        ctx.step();
    }
    assert_eq!(ctx.frame_count(), 3);
    assert_eq!(
        ctx.backend().uniform(ctx.update_program, "time"),
        Some(Uniform::Float(3.0))
    );
    assert_eq!(
        ctx.backend().uniform(ctx.display_program, "resolution"),
        Some(Uniform::Vec2([8.0, 8.0]))
    );
}

#[test]
fn single_poke_is_the_only_live_cell_before_the_step() {
    let mut ctx = board(64, 48, ConwayRule);
    ctx.poke_point(10, 10, Color::RED);

    let back = ctx.textures().back();
    assert_eq!(live_cells(&ctx, back), vec![(10, 10)]);
    assert_eq!(ctx.backend().texel(back, 10, 10), [255, 0, 0, 255]);

    ctx.step();
    // A lone cell has no neighbors and dies.
    assert!(live_cells(&ctx, ctx.textures().back()).is_empty());
}

#[test]
fn display_trails_the_state_by_one_generation() {
    let mut ctx = board(20, 20, ConwayRule);
    ctx.frame().unwrap();
    ctx.poke_point(5, 5, Color::RED);

    // Nothing is presented between frames.
    assert_eq!(ctx.backend().surface_pixel(5, 5), Some([0; 4]));

    ctx.frame().unwrap();
    // The display shows the poked generation even though the step killed it.
    assert_eq!(ctx.backend().surface_pixel(5, 5), Some([255, 0, 0, 255]));
    assert!(live_cells(&ctx, ctx.textures().back()).is_empty());

    ctx.frame().unwrap();
    assert_eq!(ctx.backend().surface_pixel(5, 5), Some([0; 4]));
}

#[test]
fn board_clear_shows_an_empty_frame_next() {
    let mut ctx = board(24, 24, Hold);
    for i in 0..24 {
        ctx.poke_point(i, i, Color::BLUE);
    }
    ctx.frame().unwrap();
    assert!(ctx.backend().surface().iter().any(|&b| b != 0));

    ctx.clear_board();
    assert_eq!(
        last_write(&ctx).region,
        Region {
            x: 0,
            y: 0,
            width: 24,
            height: 24
        }
    );
    ctx.frame().unwrap();
    assert!(ctx.backend().surface().iter().all(|&b| b == 0));
    assert_eq!(ctx.backend().presents(), 2);
}

#[test]
fn erase_clears_a_centered_square_whatever_the_color() {
    let mut ctx = board(200, 150, Hold);
    ctx.select_color(Color::GREEN);
    ctx.set_erase();
    assert!(ctx.draw_state().erase);
    assert_eq!(ctx.draw_state().color, Color::GREEN);

    ctx.paint(100, 80);
    assert_eq!(
        last_write(&ctx).region,
        Region {
            x: 68,
            y: 48,
            width: ERASE_EXTENT,
            height: ERASE_EXTENT
        }
    );

    ctx.paint(5, 140);
    assert_eq!(
        last_write(&ctx).region,
        Region {
            x: 0,
            y: 108,
            width: ERASE_EXTENT,
            height: 42
        }
    );
}

#[test]
fn choosing_a_color_leaves_erase_mode() {
    let mut ctx = board(16, 16, Hold);
    ctx.set_erase();
    ctx.select_color(Color::BLUE);
    assert_eq!(
        ctx.draw_state(),
        DrawState {
            color: Color::BLUE,
            erase: false
        }
    );

    ctx.paint(3, 3);
    let back = ctx.textures().back();
    assert_eq!(ctx.backend().texel(back, 3, 3), [0, 0, 255, 255]);
}

#[test]
fn blinker_oscillates() {
    let mut ctx = board(12, 12, ConwayRule);
    for x in 5..=7 {
        ctx.poke_point(x, 6, Color::RED);
    }

    ctx.step();
    let back = ctx.textures().back();
    assert_eq!(live_cells(&ctx, back), vec![(6, 5), (6, 6), (6, 7)]);
    assert_eq!(ctx.backend().texel(back, 6, 5), [255, 0, 0, 255]);

    ctx.step();
    assert_eq!(
        live_cells(&ctx, ctx.textures().back()),
        vec![(5, 6), (6, 6), (7, 6)]
    );
}

#[test]
fn births_take_the_mean_parent_color() {
    let mut ctx = board(10, 10, ConwayRule);
    ctx.poke_point(4, 4, Color::RED);
    ctx.poke_point(5, 4, Color::GREEN);
    ctx.poke_point(6, 4, Color::BLUE);

    ctx.step();
    let back = ctx.textures().back();
    assert_eq!(ctx.backend().texel(back, 5, 3), [85, 85, 85, 255]);
    assert_eq!(ctx.backend().texel(back, 5, 5), [85, 85, 85, 255]);
    // The middle survives with its own color.
    assert_eq!(ctx.backend().texel(back, 5, 4), [0, 255, 0, 255]);
}

#[test]
fn passes_skip_programs_built_for_the_other_output() {
    let mut ctx = board(8, 8, Hold);
    ctx.poke_point(2, 2, Color::RED);
    let textures = ctx.textures();
    let call = DrawCall {
        program: ctx.display_program,
        input: textures.back(),
        viewport: ctx.dimensions(),
    };
    ctx.backend.attach_color(ctx.target, textures.front());
    ctx.backend.draw(call, ctx.target);
    assert!(live_cells(&ctx, textures.front()).is_empty());

    let call = DrawCall {
        program: ctx.update_program,
        ..call
    };
    ctx.backend.present(call).unwrap();
    assert_eq!(ctx.backend().presents(), 0);
    assert!(ctx.backend().surface().is_empty());
}

#[test]
fn update_rules_cannot_target_the_surface() {
    let mut backend = CpuBackend::new();
    let result = pollster::block_on(
        backend.create_program(&CpuShader::update(Hold), ProgramOutput::Surface),
    );
    assert!(result.is_err());
}
