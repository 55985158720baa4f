//! Mesh decimation using quadric error metrics.
//!
//! Edges are collapsed cheapest-first into their midpoint until the face
//! budget is met. Collapses that would fold a neighboring face over are
//! skipped, so closed meshes stay closed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use nalgebra::{Matrix4, Vector4};
use qrstamp_math::Point3;
use tracing::debug;

use crate::Solid;

#[derive(PartialEq)]
struct EdgeEntry {
    cost: f64,
    v0: u32,
    v1: u32,
    /// Sum of endpoint versions when the cost was computed.
    stamp: u64,
}

impl Eq for EdgeEntry {}

impl Ord for EdgeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other.cost.partial_cmp(&self.cost).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for EdgeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Decimate `solid`, keeping roughly `target_ratio` of its faces.
///
/// `target_ratio` is clamped to `[0.05, 1.0]`.
pub fn decimate(solid: &Solid, target_ratio: f64) -> Solid {
    let tri_count = solid.triangle_count();
    let target = ((tri_count as f64) * target_ratio.clamp(0.05, 1.0)).ceil() as usize;
    if tri_count == 0 || target >= tri_count {
        return solid.clone();
    }

    let mut positions = solid.vertices.clone();
    let triangles = &solid.triangles;
    let mut quadrics = vertex_quadrics(solid);
    let mut vertex_map: Vec<u32> = (0..positions.len() as u32).collect();
    let mut versions = vec![0u64; positions.len()];
    let mut active = vec![true; tri_count];
    let mut remaining = tri_count;

    // vertex -> incident triangles (grows as vertices absorb others)
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); positions.len()];
    for (i, t) in triangles.iter().enumerate() {
        for &v in t {
            incident[v as usize].push(i);
        }
    }

    let mut heap: BinaryHeap<EdgeEntry> = build_edge_list(triangles)
        .into_iter()
        .map(|(v0, v1)| EdgeEntry {
            cost: collapse_cost(&quadrics, &positions, v0, v1),
            v0,
            v1,
            stamp: 0,
        })
        .collect();

    while remaining > target {
        let Some(entry) = heap.pop() else {
            break;
        };

        let v0 = get_canonical(&vertex_map, entry.v0);
        let v1 = get_canonical(&vertex_map, entry.v1);
        if v0 == v1 {
            continue; // Already collapsed
        }
        let stamp = versions[v0 as usize] + versions[v1 as usize];
        if v0 != entry.v0 || v1 != entry.v1 || stamp != entry.stamp {
            heap.push(EdgeEntry {
                cost: collapse_cost(&quadrics, &positions, v0, v1),
                v0,
                v1,
                stamp,
            });
            continue;
        }

        let mid =
            Point3::from((positions[v0 as usize].coords + positions[v1 as usize].coords) / 2.0);
        let blocked =
            !satisfies_link_condition(triangles, &active, &vertex_map, &incident, (v0, v1))
                || folds_over(triangles, &active, &vertex_map, &positions, &incident, (v0, v1), &mid);
        if blocked {
            continue;
        }

        // Collapse v1 into v0
        vertex_map[v1 as usize] = v0;
        positions[v0 as usize] = mid;
        let q1 = quadrics[v1 as usize];
        quadrics[v0 as usize] += q1;
        versions[v0 as usize] += 1;
        let moved = std::mem::take(&mut incident[v1 as usize]);
        incident[v0 as usize].extend(moved);

        let mut neighbors = HashSet::new();
        for &t in &incident[v0 as usize] {
            if !active[t] {
                continue;
            }
            let c = canonical_triangle(&vertex_map, &triangles[t]);
            if c[0] == c[1] || c[1] == c[2] || c[2] == c[0] {
                active[t] = false;
                remaining -= 1;
                continue;
            }
            neighbors.extend(c.iter().copied().filter(|&v| v != v0));
        }
        incident[v0 as usize].retain(|&t| active[t]);

        for n in neighbors {
            heap.push(EdgeEntry {
                cost: collapse_cost(&quadrics, &positions, v0, n),
                v0: v0.min(n),
                v1: v0.max(n),
                stamp: versions[v0 as usize] + versions[n as usize],
            });
        }
    }

    // Build output mesh
    let mut new_vertex_map: HashMap<u32, u32> = HashMap::new();
    let mut new_positions = Vec::new();
    let mut new_triangles = Vec::with_capacity(remaining);
    for (t, tri) in triangles.iter().enumerate() {
        if !active[t] {
            continue;
        }
        let mut out = [0u32; 3];
        for (k, &v) in tri.iter().enumerate() {
            let old = get_canonical(&vertex_map, v);
            out[k] = *new_vertex_map.entry(old).or_insert_with(|| {
                new_positions.push(positions[old as usize]);
                (new_positions.len() - 1) as u32
            });
        }
        new_triangles.push(out);
    }

    debug!(
        from = tri_count,
        to = new_triangles.len(),
        target,
        "mesh decimated"
    );
    Solid::new(new_positions, new_triangles)
}

fn build_edge_list(triangles: &[[u32; 3]]) -> Vec<(u32, u32)> {
    let mut edge_set = HashSet::new();
    for &[i0, i1, i2] in triangles {
        // Canonical order (smaller index first)
        edge_set.insert((i0.min(i1), i0.max(i1)));
        edge_set.insert((i1.min(i2), i1.max(i2)));
        edge_set.insert((i2.min(i0), i2.max(i0)));
    }
    let mut edges: Vec<_> = edge_set.into_iter().collect();
    edges.sort_unstable();
    edges
}

fn vertex_quadrics(solid: &Solid) -> Vec<Matrix4<f64>> {
    let mut q = vec![Matrix4::zeros(); solid.vertex_count()];
    for i in 0..solid.triangle_count() {
        let n = solid.triangle_normal(i);
        let len = n.norm();
        if len < 1e-15 {
            continue;
        }
        let n = n / len;
        let p0 = solid.triangle(i)[0];
        let plane = Vector4::new(n.x, n.y, n.z, -n.dot(&p0.coords));
        let kp = plane * plane.transpose();
        for &v in &solid.triangles[i] {
            q[v as usize] += kp;
        }
    }
    q
}

fn collapse_cost(quadrics: &[Matrix4<f64>], positions: &[Point3], v0: u32, v1: u32) -> f64 {
    let q = quadrics[v0 as usize] + quadrics[v1 as usize];
    let m = (positions[v0 as usize].coords + positions[v1 as usize].coords) / 2.0;
    let h = Vector4::new(m.x, m.y, m.z, 1.0);
    (h.transpose() * q * h)[(0, 0)].max(0.0)
}

fn get_canonical(vertex_map: &[u32], mut idx: u32) -> u32 {
    while vertex_map[idx as usize] != idx {
        idx = vertex_map[idx as usize];
    }
    idx
}

fn canonical_triangle(vertex_map: &[u32], t: &[u32; 3]) -> [u32; 3] {
    [
        get_canonical(vertex_map, t[0]),
        get_canonical(vertex_map, t[1]),
        get_canonical(vertex_map, t[2]),
    ]
}

fn vertex_ring(
    triangles: &[[u32; 3]],
    active: &[bool],
    vertex_map: &[u32],
    incident: &[Vec<usize>],
    v: u32,
) -> HashSet<u32> {
    let mut ring = HashSet::new();
    for &t in &incident[v as usize] {
        if active[t] {
            let c = canonical_triangle(vertex_map, &triangles[t]);
            ring.extend(c.iter().copied().filter(|&u| u != v));
        }
    }
    ring
}

/// An edge may collapse only if its endpoints share at most the two
/// vertices opposite the edge; otherwise the result is non-manifold.
fn satisfies_link_condition(
    triangles: &[[u32; 3]],
    active: &[bool],
    vertex_map: &[u32],
    incident: &[Vec<usize>],
    (v0, v1): (u32, u32),
) -> bool {
    let r0 = vertex_ring(triangles, active, vertex_map, incident, v0);
    let r1 = vertex_ring(triangles, active, vertex_map, incident, v1);
    r0.intersection(&r1).count() <= 2
}

/// Would moving both endpoints to `mid` flip a surviving face?
fn folds_over(
    triangles: &[[u32; 3]],
    active: &[bool],
    vertex_map: &[u32],
    positions: &[Point3],
    incident: &[Vec<usize>],
    (v0, v1): (u32, u32),
    mid: &Point3,
) -> bool {
    for &v in &[v0, v1] {
        for &t in &incident[v as usize] {
            if !active[t] {
                continue;
            }
            let c = canonical_triangle(vertex_map, &triangles[t]);
            let has0 = c.contains(&v0);
            let has1 = c.contains(&v1);
            if has0 && has1 {
                continue; // removed by this collapse
            }
            let before = [
                positions[c[0] as usize],
                positions[c[1] as usize],
                positions[c[2] as usize],
            ];
            let mut after = before;
            for k in 0..3 {
                if c[k] == v0 || c[k] == v1 {
                    after[k] = *mid;
                }
            }
            let n0 = (before[1] - before[0]).cross(&(before[2] - before[0]));
            let n1 = (after[1] - after[0]).cross(&(after[2] - after[0]));
            if n0.dot(&n1) <= 0.0 {
                return true;
            }
        }
    }
    false
}
