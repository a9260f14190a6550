//! Quantized-position spatial hash
//!
//! Replaces linear "find vertex by approximate position" scans. Points are
//! bucketed into cubic cells of edge `cell_size`; a tolerance query checks the
//! 27 cells around the query point, so any `radius <= cell_size` is exact.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use std::collections::HashMap;

type CellKey = (i64, i64, i64);

/// Spatial hash mapping positions to payloads
#[derive(Debug, Clone)]
pub struct SpatialHash<T> {
    cell_size: f32,
    inv_cell: f32,
    cells: HashMap<CellKey, Vec<(Vec3, T)>>,
    len: usize,
}

impl<T> SpatialHash<T> {
    /// Create a hash with the given cell edge length
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size > 0.0 && cell_size.is_finite() {
            cell_size
        } else {
            1e-4
        };
        Self {
            cell_size,
            inv_cell: 1.0 / cell_size,
            cells: HashMap::new(),
            len: 0,
        }
    }

    /// Cell edge length
    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of stored points
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the hash is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // f64 keeps cells exact far from the origin; `as` saturates
    #[inline]
    fn key(&self, p: Vec3) -> CellKey {
        let inv = self.inv_cell as f64;
        let cell = |v: f32| (v as f64 * inv).floor() as i64;
        (cell(p.x), cell(p.y), cell(p.z))
    }

    #[inline]
    fn reach(&self, radius: f32) -> i64 {
        (radius as f64 * self.inv_cell as f64).ceil().max(1.0) as i64
    }

    /// Cells within `reach` of `p`'s cell that can hold points
    fn neighbourhood(&self, p: Vec3, radius: f32) -> impl Iterator<Item = &Vec<(Vec3, T)>> + '_ {
        let reach = self.reach(radius);
        let (cx, cy, cz) = self.key(p);
        let span = move |c: i64| c.saturating_sub(reach)..=c.saturating_add(reach);
        span(cx).flat_map(move |x| {
            span(cy).flat_map(move |y| span(cz).map(move |z| (x, y, z)))
        })
        .filter_map(move |key| self.cells.get(&key))
    }

    /// Insert a point
    pub fn insert(&mut self, p: Vec3, value: T) {
        let key = self.key(p);
        self.cells.entry(key).or_default().push((p, value));
        self.len += 1;
    }

    /// Visit every stored point within `radius` of `p`
    pub fn for_each_within(&self, p: Vec3, radius: f32, mut f: impl FnMut(Vec3, &T)) {
        let r2 = radius * radius;
        for bucket in self.neighbourhood(p, radius) {
            for (q, v) in bucket {
                if q.distance_squared(p) <= r2 {
                    f(*q, v);
                }
            }
        }
    }

    /// Closest stored point within `radius`, if any
    pub fn find_within(&self, p: Vec3, radius: f32) -> Option<(Vec3, &T)> {
        let r2 = radius * radius;
        let mut best: Option<(f32, Vec3, &T)> = None;
        for bucket in self.neighbourhood(p, radius) {
            for (q, v) in bucket {
                let d2 = q.distance_squared(p);
                if d2 <= r2 && best.map_or(true, |(bd, _, _)| d2 < bd) {
                    best = Some((d2, *q, v));
                }
            }
        }
        best.map(|(_, q, v)| (q, v))
    }

    /// Whether any stored point lies within `radius` of `p`
    pub fn contains_within(&self, p: Vec3, radius: f32) -> bool {
        self.find_within(p, radius).is_some()
    }
}

/// Index every point by position
pub fn index_points(points: &[Vec3], cell_size: f32) -> SpatialHash<u32> {
    let mut hash = SpatialHash::new(cell_size);
    for (i, &p) in points.iter().enumerate() {
        hash.insert(p, i as u32);
    }
    hash
}
