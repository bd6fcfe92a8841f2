//! Isosurface extraction over a density grid

use glam::Vec3;

use super::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRIANGLE_TABLE};

/// Densities closer than this are treated as equal during interpolation
const INTERPOLATION_EPSILON: f32 = 1e-5;

/// 8-bit case index: bit `i` is set when corner `i` is below `iso_level`.
pub fn case_index(corners: &[f32; 8], iso_level: f32) -> usize {
    corners
        .iter()
        .enumerate()
        .filter(|(_, density)| **density < iso_level)
        .fold(0, |index, (i, _)| index | (1 << i))
}

/// Point where the surface crosses the edge from `p1` to `p2`.
///
/// Always lies on the segment between the two corners.
pub fn interpolate_edge(iso_level: f32, p1: Vec3, p2: Vec3, d1: f32, d2: f32) -> Vec3 {
    if (iso_level - d1).abs() < INTERPOLATION_EPSILON {
        return p1;
    }
    if (iso_level - d2).abs() < INTERPOLATION_EPSILON {
        return p2;
    }
    if (d1 - d2).abs() < INTERPOLATION_EPSILON {
        return p1;
    }

    let mu = ((iso_level - d1) / (d2 - d1)).clamp(0.0, 1.0);
    p1 + (p2 - p1) * mu
}

/// Corner positions of a cube at `origin` with edge length `step`
pub fn cube_corners(origin: Vec3, step: f32) -> [Vec3; 8] {
    CORNER_OFFSETS.map(|[x, y, z]| origin + Vec3::new(x as f32, y as f32, z as f32) * step)
}

/// Triangulate one cube, appending to `vertices` and `indices`.
///
/// Every triangle appends three new vertices (no sharing between cubes)
/// emitted in reverse table order so faces point from solid toward air.
/// Returns the number of triangles emitted.
pub fn march_cube(
    corners: &[f32; 8],
    origin: Vec3,
    step: f32,
    iso_level: f32,
    vertices: &mut Vec<Vec3>,
    indices: &mut Vec<u32>,
) -> usize {
    let case = case_index(corners, iso_level);
    let edge_mask = EDGE_TABLE[case];
    if edge_mask == 0 {
        return 0;
    }

    let positions = cube_corners(origin, step);
    let mut edge_vertices = [Vec3::ZERO; 12];
    for (edge, [a, b]) in EDGE_CORNERS.iter().enumerate() {
        if edge_mask & (1 << edge) != 0 {
            edge_vertices[edge] =
                interpolate_edge(iso_level, positions[*a], positions[*b], corners[*a], corners[*b]);
        }
    }

    let mut triangles = 0;
    for triangle in TRIANGLE_TABLE[case].chunks_exact(3) {
        if triangle[0] < 0 {
            break;
        }
        for &edge in triangle.iter().rev() {
            indices.push(vertices.len() as u32);
            vertices.push(edge_vertices[edge as usize]);
        }
        triangles += 1;
    }
    triangles
}
