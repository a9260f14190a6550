//! Procedural test meshes
//!
//! Author: Moroya Sakamoto

use crate::mesh::stream::{Corner, MeshStream};
use glam::{Vec2, Vec3};
use std::collections::HashMap;

/// Closed box centered at the origin with each face subdivided into a grid.
///
/// Produces `4 * (nx*ny + ny*nz + nz*nx)` triangles with welded positions,
/// one normal per face and per-face UVs.
pub fn subdivided_box(half_extents: Vec3, segments: [u32; 3]) -> MeshStream {
    let n = segments.map(|s| s.max(1));
    let mut mesh = MeshStream::new();
    let mut lattice: HashMap<[u32; 3], u32> = HashMap::new();

    let mut vertex = |mesh: &mut MeshStream, cell: [u32; 3]| -> u32 {
        *lattice.entry(cell).or_insert_with(|| {
            let t = Vec3::new(
                cell[0] as f32 / n[0] as f32,
                cell[1] as f32 / n[1] as f32,
                cell[2] as f32 / n[2] as f32,
            );
            mesh.positions.push(-half_extents + t * 2.0 * half_extents);
            (mesh.positions.len() - 1) as u32
        })
    };

    for axis in 0..3 {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        for positive in [false, true] {
            let mut normal = Vec3::ZERO;
            normal[axis] = if positive { 1.0 } else { -1.0 };
            let normal_index = mesh.normals.len() as u32;
            mesh.normals.push(normal);

            let uv_base = mesh.uvs.len() as u32;
            let stride = n[u] + 1;
            for j in 0..=n[v] {
                for i in 0..=n[u] {
                    mesh.uvs.push(Vec2::new(i as f32 / n[u] as f32, j as f32 / n[v] as f32));
                }
            }

            for j in 0..n[v] {
                for i in 0..n[u] {
                    let mut quad = [[0u32; 3]; 4];
                    for (q, (di, dj)) in [(0, 0), (1, 0), (1, 1), (0, 1)].into_iter().enumerate() {
                        quad[q][axis] = if positive { n[axis] } else { 0 };
                        quad[q][u] = i + di;
                        quad[q][v] = j + dj;
                    }
                    let corners: Vec<Corner> = quad
                        .iter()
                        .enumerate()
                        .map(|(q, cell)| {
                            let (di, dj) = [(0, 0), (1, 0), (1, 1), (0, 1)][q];
                            Corner {
                                position: vertex(&mut mesh, *cell),
                                normal: normal_index,
                                uv: uv_base + (j + dj) * stride + i + di,
                            }
                        })
                        .collect();
                    let (c0, c1, c2, c3) = (corners[0], corners[1], corners[2], corners[3]);
                    if positive {
                        mesh.push_triangle([c0, c1, c2]);
                        mesh.push_triangle([c0, c2, c3]);
                    } else {
                        mesh.push_triangle([c0, c2, c1]);
                        mesh.push_triangle([c0, c3, c2]);
                    }
                }
            }
        }
    }
    mesh
}

/// UV sphere with `stacks` latitude bands and `slices` longitude segments.
///
/// Caps are triangle fans, so no triangle is degenerate. Produces
/// `2 * slices * (stacks - 1)` triangles.
pub fn uv_sphere(radius: f32, stacks: u32, slices: u32) -> MeshStream {
    let stacks = stacks.max(2);
    let slices = slices.max(3);
    let mut mesh = MeshStream::new();

    let north = 0u32;
    mesh.positions.push(Vec3::Y * radius);
    mesh.normals.push(Vec3::Y);
    mesh.uvs.push(Vec2::new(0.5, 0.0));

    for s in 1..stacks {
        let phi = std::f32::consts::PI * s as f32 / stacks as f32;
        for l in 0..slices {
            let theta = std::f32::consts::TAU * l as f32 / slices as f32;
            let n = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            mesh.positions.push(n * radius);
            mesh.normals.push(n);
            mesh.uvs.push(Vec2::new(l as f32 / slices as f32, s as f32 / stacks as f32));
        }
    }

    let south = mesh.positions.len() as u32;
    mesh.positions.push(-Vec3::Y * radius);
    mesh.normals.push(-Vec3::Y);
    mesh.uvs.push(Vec2::new(0.5, 1.0));

    let ring = |s: u32, l: u32| 1 + (s - 1) * slices + (l % slices);
    let corner = |i: u32| Corner {
        position: i,
        normal: i,
        uv: i,
    };

    for l in 0..slices {
        mesh.push_triangle([corner(north), corner(ring(1, l + 1)), corner(ring(1, l))]);
    }
    for s in 1..stacks - 1 {
        for l in 0..slices {
            let a = ring(s, l);
            let b = ring(s, l + 1);
            let c = ring(s + 1, l + 1);
            let d = ring(s + 1, l);
            mesh.push_triangle([corner(a), corner(b), corner(c)]);
            mesh.push_triangle([corner(a), corner(c), corner(d)]);
        }
    }
    for l in 0..slices {
        mesh.push_triangle([corner(south), corner(ring(stacks - 1, l)), corner(ring(stacks - 1, l + 1))]);
    }
    mesh
}

/// Flat open grid in the XZ plane with `n * n` quads (`2 n^2` triangles)
pub fn grid(size: f32, n: u32) -> MeshStream {
    let n = n.max(1);
    let mut mesh = MeshStream::new();
    mesh.normals.push(Vec3::Y);
    for j in 0..=n {
        for i in 0..=n {
            let t = Vec2::new(i as f32, j as f32) / n as f32;
            mesh.positions.push(Vec3::new((t.x - 0.5) * size, 0.0, (t.y - 0.5) * size));
            mesh.uvs.push(t);
        }
    }
    let idx = |i: u32, j: u32| j * (n + 1) + i;
    let corner = |i: u32| Corner {
        position: i,
        normal: 0,
        uv: i,
    };
    for j in 0..n {
        for i in 0..n {
            let (a, b, c, d) = (idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1));
            mesh.push_triangle([corner(a), corner(c), corner(b)]);
            mesh.push_triangle([corner(a), corner(d), corner(c)]);
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::topology::boundary_vertices;

    #[test]
    fn test_box_triangle_count() {
        let mesh = subdivided_box(Vec3::ONE, [8, 8, 4]);
        assert_eq!(mesh.triangle_count(), 512);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_box_is_closed() {
        let mesh = subdivided_box(Vec3::ONE, [3, 2, 4]);
        let boundary = boundary_vertices(&mesh.position_indices, mesh.positions.len());
        assert!(boundary.iter().all(|&b| !b), "box must be watertight");
        // (n+1)^3 - (n-1)^3 style count of surface lattice points
        let lattice = 4 * 3 * 5 - 2 * 1 * 3;
        assert_eq!(mesh.positions.len(), lattice);
    }

    #[test]
    fn test_box_faces_point_outward() {
        let mesh = subdivided_box(Vec3::ONE, [2, 2, 2]);
        for t in 0..mesh.triangle_count() {
            let [p0, p1, p2] = mesh.triangle_positions(t);
            let center = (p0 + p1 + p2) / 3.0;
            assert!(mesh.face_normal(t).dot(center) > 0.0, "triangle {} faces inward", t);
        }
    }

    #[test]
    fn test_sphere() {
        let mesh = uv_sphere(1.0, 8, 12);
        assert_eq!(mesh.triangle_count(), 2 * 12 * 7);
        assert!(mesh.validate().is_ok());
        let boundary = boundary_vertices(&mesh.position_indices, mesh.positions.len());
        assert!(boundary.iter().all(|&b| !b));
        for t in 0..mesh.triangle_count() {
            let [p0, p1, p2] = mesh.triangle_positions(t);
            assert!(mesh.face_normal(t).dot((p0 + p1 + p2) / 3.0) > 0.0);
        }
    }

    #[test]
    fn test_grid() {
        let mesh = grid(2.0, 4);
        assert_eq!(mesh.triangle_count(), 32);
        assert!(mesh.validate().is_ok());
        assert!(mesh.face_normal(0).dot(Vec3::Y) > 0.99);
    }
}
