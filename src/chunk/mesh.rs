//! Greedy meshing (C2): the algorithm that turns a chunk's dense block array
//! into a minimal set of axis-aligned rectangular quads.
//!
//! Grounded in the reference engine's axis-sweep greedy mesher
//! (`chunk::mesh::greedy_mesh_axis`/`process_slice`/`add_quad`): build a 2D
//! mask per slice, greedily grow maximal rectangles, emit one quad per
//! merged region. Generalized here to arbitrary `(Cx, Cy, Cz)` chunk sizes
//! and to all three axes crossing into neighboring chunks (the reference
//! engine's world is unbounded only in X/Z; this one tiles in Y too), via
//! the `BlockSource` read-through accessor instead of a precomputed
//! neighbor-chunk snapshot. The reference engine's second "coalesce across
//! collected quads" pass is dropped: it re-merges a mask the per-slice
//! greedy pass already merged maximally, so it never changed the output
//! (see DESIGN.md). LOD-dependent merge caps and atlas UV lookups are
//! dropped for the same reason: LOD and texturing are out of scope here.

use super::Chunk;
use crate::block::{blocks, BlockId, ColorProvider};
use crate::coords::{chunk_to_world, Coord};
use crate::handles::MeshData;
use rayon::prelude::*;

/// Read-through accessor the mesher uses to query blocks outside the chunk
/// being meshed (§4.3). `World` implements this directly; it is also the
/// seam a test can substitute a fixed neighborhood through.
pub trait BlockSource: Sync {
    fn get_block(&self, world_pos: Coord) -> BlockId;
}

/// The six axis-aligned face directions, in the fixed emission order that
/// keeps output deterministic regardless of how the per-direction sweeps
/// are scheduled: `+Y, -Y, +X, -X, +Z, -Z`.
const DIRECTIONS: [(usize, i32); 6] = [(1, 1), (1, -1), (0, 1), (0, -1), (2, 1), (2, -1)];

struct QuadDesc {
    slice: i32,
    col: i32,
    row: i32,
    width: i32,
    height: i32,
    axis: usize,
    direction: i32,
    block_id: BlockId,
}

/// Build the mesh for `chunk`. `world` supplies cross-chunk neighbor blocks;
/// when absent, every boundary face is treated as exposed (drawn). `colors`
/// supplies the per-vertex color for each block id.
#[must_use]
pub fn build_mesh(
    chunk: &Chunk,
    world: Option<&dyn BlockSource>,
    colors: &dyn ColorProvider,
) -> MeshData {
    let per_direction: Vec<Vec<QuadDesc>> = DIRECTIONS
        .par_iter()
        .map(|&(axis, direction)| sweep_direction(chunk, axis, direction, world))
        .collect();

    let mut out = MeshData::default();
    for quads in per_direction {
        for quad in &quads {
            emit_quad(quad, colors, &mut out);
        }
    }
    out
}

fn axis_size(size: (i32, i32, i32), axis: usize) -> i32 {
    match axis {
        0 => size.0,
        1 => size.1,
        _ => size.2,
    }
}

fn local_at(axis: usize, u_axis: usize, v_axis: usize, slice: i32, col: i32, row: i32) -> [i32; 3] {
    let mut local = [0i32; 3];
    local[axis] = slice;
    local[u_axis] = col;
    local[v_axis] = row;
    local
}

fn sweep_direction(
    chunk: &Chunk,
    axis: usize,
    direction: i32,
    world: Option<&dyn BlockSource>,
) -> Vec<QuadDesc> {
    let size = chunk.size;
    let c_axis = axis_size(size, axis);
    let u_axis = (axis + 1) % 3;
    let v_axis = (axis + 2) % 3;
    let width = axis_size(size, u_axis);
    let height = axis_size(size, v_axis);

    let mut quads = Vec::new();
    for slice in 0..c_axis {
        let mask = build_mask(chunk, axis, u_axis, v_axis, slice, width, height, direction, world);
        merge_mask_into_quads(&mask, width, height, axis, slice, direction, &mut quads);
    }
    quads
}

/// One slice's exposure mask: `mask[col + row*width] = Some(block_id)` if
/// the face at `(slice, col, row)` facing `direction` along `axis` is
/// exposed, `None` if the cell is air or the face is hidden by a solid
/// neighbor (in-chunk or, via `world`, in an adjacent chunk).
fn build_mask(
    chunk: &Chunk,
    axis: usize,
    u_axis: usize,
    v_axis: usize,
    slice: i32,
    width: i32,
    height: i32,
    direction: i32,
    world: Option<&dyn BlockSource>,
) -> Vec<i32> {
    let mut mask = vec![-1i32; (width * height) as usize];
    let chunk_origin = chunk_to_world(chunk.position, chunk.size);
    let c_axis = axis_size(chunk.size, axis);

    for row in 0..height {
        for col in 0..width {
            let local = local_at(axis, u_axis, v_axis, slice, col, row);
            let p = chunk.get((local[0], local[1], local[2]));
            if p == blocks::AIR {
                continue;
            }

            let mut neighbor_local = local;
            neighbor_local[axis] += direction;

            let neighbor_block = if neighbor_local[axis] >= 0 && neighbor_local[axis] < c_axis {
                chunk.get((neighbor_local[0], neighbor_local[1], neighbor_local[2]))
            } else if let Some(world) = world {
                let world_pos = (
                    chunk_origin.0 + neighbor_local[0],
                    chunk_origin.1 + neighbor_local[1],
                    chunk_origin.2 + neighbor_local[2],
                );
                world.get_block(world_pos)
            } else {
                blocks::AIR
            };

            if neighbor_block == blocks::AIR {
                mask[(col + row * width) as usize] = i32::from(p);
            }
        }
    }

    mask
}

fn merge_mask_into_quads(
    mask: &[i32],
    width: i32,
    height: i32,
    axis: usize,
    slice: i32,
    direction: i32,
    out: &mut Vec<QuadDesc>,
) {
    let mut done = vec![false; mask.len()];

    for row in 0..height {
        for col in 0..width {
            let idx = (col + row * width) as usize;
            if done[idx] || mask[idx] < 0 {
                continue;
            }
            let block_id = mask[idx] as BlockId;

            let mut run_width = 1;
            while col + run_width < width {
                let next = (col + run_width + row * width) as usize;
                if done[next] || mask[next] != i32::from(block_id) {
                    break;
                }
                run_width += 1;
            }

            let mut run_height = 1;
            'grow: while row + run_height < height {
                for du in 0..run_width {
                    let check = (col + du + (row + run_height) * width) as usize;
                    if done[check] || mask[check] != i32::from(block_id) {
                        break 'grow;
                    }
                }
                run_height += 1;
            }

            for dv in 0..run_height {
                for du in 0..run_width {
                    done[(col + du + (row + dv) * width) as usize] = true;
                }
            }

            out.push(QuadDesc {
                slice,
                col,
                row,
                width: run_width,
                height: run_height,
                axis,
                direction,
                block_id,
            });
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn emit_quad(quad: &QuadDesc, colors: &dyn ColorProvider, out: &mut MeshData) {
    let u_axis = (quad.axis + 1) % 3;
    let v_axis = (quad.axis + 2) % 3;
    let slice_val = if quad.direction == 1 {
        quad.slice + 1
    } else {
        quad.slice
    };

    let position_uv = [
        [quad.col, quad.row],
        [quad.col + quad.width, quad.row],
        [quad.col + quad.width, quad.row + quad.height],
        [quad.col, quad.row + quad.height],
    ];
    // UVs span the quad's own tangent extents, `(0,0)` through
    // `(width,height)`, not its absolute position in the chunk, so a tiled
    // texture repeats once per block regardless of where the quad sits.
    let relative_uv = [
        [0, 0],
        [quad.width, 0],
        [quad.width, quad.height],
        [0, quad.height],
    ];
    let mut corners = [[0.0f32; 3]; 4];
    for (i, [u, v]) in position_uv.iter().enumerate() {
        corners[i][quad.axis] = slice_val as f32;
        corners[i][u_axis] = *u as f32;
        corners[i][v_axis] = *v as f32;
    }

    // Faces with direction == -1 are pushed with reversed winding so their
    // normal (which always equals +/-1 on `axis`) matches triangle winding.
    let push_order: [usize; 4] = if quad.direction == 1 {
        [0, 1, 2, 3]
    } else {
        [0, 3, 2, 1]
    };

    let start = out.positions.len() as u32;
    let mut normal = [0.0f32; 3];
    normal[quad.axis] = quad.direction as f32;
    let color = colors.color_of(quad.block_id);

    for &corner_idx in &push_order {
        out.positions.push(corners[corner_idx]);
        out.normals.push(normal);
        out.colors.push(color);
        out.uvs.push([
            relative_uv[corner_idx][0] as f32,
            relative_uv[corner_idx][1] as f32,
        ]);
    }

    out.indices
        .extend_from_slice(&[start, start + 1, start + 2, start, start + 2, start + 3]);
}
