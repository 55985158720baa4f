//! Mesh repair passes.
//!
//! Boolean kernels need closed, consistently wound input. The passes here
//! heal the usual defects of exported meshes and of box-assembly stamps:
//! - weld coincident vertices
//! - drop zero-area faces
//! - drop duplicate faces and cancel opposing coincident pairs
//! - split T-junctions along open edges
//! - make winding consistent, then outward
//! - cap the remaining boundary loops

use std::collections::{HashMap, VecDeque};

use qrstamp_math::{Point3, Tolerance};
use tracing::debug;

use crate::Solid;

/// What a repair run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Vertices removed by welding and compaction.
    pub merged_vertices: usize,
    /// Zero-area faces dropped.
    pub degenerate_faces: usize,
    /// Duplicate or cancelling faces dropped.
    pub duplicate_faces: usize,
    /// Vertices inserted into open edges.
    pub t_junctions: usize,
    /// Faces whose winding was reversed.
    pub flipped_faces: usize,
    /// Boundary loops capped.
    pub holes_filled: usize,
}

impl RepairStats {
    /// True if no pass changed anything.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Run every repair pass in order.
pub fn repair_mesh(solid: Solid, tol: &Tolerance) -> (Solid, RepairStats) {
    let mut stats = RepairStats::default();
    let before = solid.vertex_count();

    let solid = weld_vertices(solid, tol);
    let (solid, n) = remove_degenerate_faces(solid, tol);
    stats.degenerate_faces = n;
    let (solid, n) = remove_duplicate_faces(solid);
    stats.duplicate_faces = n;
    let (solid, n) = split_t_junctions(solid, tol);
    stats.t_junctions = n;
    let (solid, flipped_a) = orient_outward(solid);
    let (solid, n) = fill_holes(solid);
    stats.holes_filled = n;
    let (solid, flipped_b) = orient_outward(solid);
    stats.flipped_faces = flipped_a + flipped_b;
    let solid = remove_unreferenced_vertices(solid);
    stats.merged_vertices = before.saturating_sub(solid.vertex_count());

    debug!(
        merged = stats.merged_vertices,
        degenerate = stats.degenerate_faces,
        duplicates = stats.duplicate_faces,
        t_junctions = stats.t_junctions,
        flipped = stats.flipped_faces,
        holes = stats.holes_filled,
        "mesh repaired"
    );
    (solid, stats)
}

/// Merge vertices that share a weld key. Triangles are remapped, not removed.
pub fn weld_vertices(solid: Solid, tol: &Tolerance) -> Solid {
    let mut ids: HashMap<[i64; 3], u32> = HashMap::with_capacity(solid.vertices.len());
    let mut vertices = Vec::new();
    let remap: Vec<u32> = solid
        .vertices
        .iter()
        .map(|p| {
            *ids.entry(tol.weld_key(p)).or_insert_with(|| {
                vertices.push(*p);
                (vertices.len() - 1) as u32
            })
        })
        .collect();
    let triangles = solid
        .triangles
        .iter()
        .map(|t| {
            [
                remap[t[0] as usize],
                remap[t[1] as usize],
                remap[t[2] as usize],
            ]
        })
        .collect();
    Solid::new(vertices, triangles)
}

/// Drop faces with repeated indices or (near) zero area.
pub fn remove_degenerate_faces(mut solid: Solid, tol: &Tolerance) -> (Solid, usize) {
    let before = solid.triangles.len();
    let min_area2 = tol.linear * tol.linear;
    let keep: Vec<bool> = (0..solid.triangles.len())
        .map(|i| {
            let [a, b, c] = solid.triangles[i];
            a != b && b != c && c != a && solid.triangle_normal(i).norm_squared() > 4.0 * min_area2
        })
        .collect();
    let mut k = keep.iter();
    solid.triangles.retain(|_| *k.next().unwrap_or(&false));
    let removed = before - solid.triangles.len();
    (solid, removed)
}

/// Canonical rotation of a triangle: smallest index first.
fn rotate_min_first(t: [u32; 3]) -> [u32; 3] {
    if t[0] <= t[1] && t[0] <= t[2] {
        t
    } else if t[1] <= t[2] {
        [t[1], t[2], t[0]]
    } else {
        [t[2], t[0], t[1]]
    }
}

/// Drop repeated faces and cancel coincident faces of opposite orientation.
///
/// Adjacent boxes in a box-assembly stamp share faces with opposite
/// normals; cancelling them turns the assembly into one shell.
pub fn remove_duplicate_faces(mut solid: Solid) -> (Solid, usize) {
    let before = solid.triangles.len();
    // key: sorted indices -> (faces with positive cyclic order, faces with negative)
    let mut groups: HashMap<[u32; 3], (Vec<usize>, Vec<usize>)> = HashMap::new();
    for (i, t) in solid.triangles.iter().enumerate() {
        let mut key = *t;
        key.sort_unstable();
        let r = rotate_min_first(*t);
        let entry = groups.entry(key).or_default();
        if r == key {
            entry.0.push(i);
        } else {
            entry.1.push(i);
        }
    }

    let mut keep = vec![false; solid.triangles.len()];
    for (pos, neg) in groups.values() {
        let cancelled = pos.len().min(neg.len());
        if pos.len() > cancelled {
            keep[pos[0]] = true;
        } else if neg.len() > cancelled {
            keep[neg[0]] = true;
        }
    }
    let mut k = keep.iter();
    solid.triangles.retain(|_| *k.next().unwrap_or(&false));
    let removed = before - solid.triangles.len();
    (solid, removed)
}

fn undirected(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

fn edge_counts(triangles: &[[u32; 3]]) -> HashMap<(u32, u32), usize> {
    let mut counts = HashMap::new();
    for t in triangles {
        for k in 0..3 {
            *counts.entry(undirected(t[k], t[(k + 1) % 3])).or_insert(0) += 1;
        }
    }
    counts
}

/// Insert vertices that lie on the interior of open edges into those edges.
pub fn split_t_junctions(mut solid: Solid, tol: &Tolerance) -> (Solid, usize) {
    let reach = tol.weld * 10.0;
    let counts = edge_counts(&solid.triangles);
    let open: Vec<(u32, u32)> = counts
        .iter()
        .filter(|(_, &n)| n == 1)
        .map(|(&e, _)| e)
        .collect();
    if open.is_empty() {
        return (solid, 0);
    }

    // Vertices on open edges are the only possible T-junction stems.
    let mut stems: Vec<u32> = open.iter().flat_map(|&(a, b)| [a, b]).collect();
    stems.sort_unstable();
    stems.dedup();

    let mean_len = open
        .iter()
        .map(|&(a, b)| (solid.vertices[a as usize] - solid.vertices[b as usize]).norm())
        .sum::<f64>()
        / open.len() as f64;
    let cell = mean_len.max(reach * 4.0);
    let cell_of = |p: &Point3| {
        [
            (p.x / cell).floor() as i64,
            (p.y / cell).floor() as i64,
            (p.z / cell).floor() as i64,
        ]
    };
    let mut grid: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
    for &v in &stems {
        grid.entry(cell_of(&solid.vertices[v as usize]))
            .or_default()
            .push(v);
    }

    let mut splits: HashMap<(u32, u32), Vec<(f64, u32)>> = HashMap::new();
    for &(a, b) in &open {
        let pa = solid.vertices[a as usize];
        let pb = solid.vertices[b as usize];
        let ab = pb - pa;
        let len2 = ab.norm_squared();
        if len2 < reach * reach {
            continue;
        }
        let lo = cell_of(&Point3::new(
            pa.x.min(pb.x) - reach,
            pa.y.min(pb.y) - reach,
            pa.z.min(pb.z) - reach,
        ));
        let hi = cell_of(&Point3::new(
            pa.x.max(pb.x) + reach,
            pa.y.max(pb.y) + reach,
            pa.z.max(pb.z) + reach,
        ));
        let mut found = Vec::new();
        for cx in lo[0]..=hi[0] {
            for cy in lo[1]..=hi[1] {
                for cz in lo[2]..=hi[2] {
                    let Some(cands) = grid.get(&[cx, cy, cz]) else {
                        continue;
                    };
                    for &v in cands {
                        if v == a || v == b {
                            continue;
                        }
                        let pv = solid.vertices[v as usize];
                        let t = (pv - pa).dot(&ab) / len2;
                        if t <= 1e-9 || t >= 1.0 - 1e-9 {
                            continue;
                        }
                        if (pv - (pa + ab * t)).norm() < reach {
                            found.push((t, v));
                        }
                    }
                }
            }
        }
        if !found.is_empty() {
            found.sort_by(|x, y| x.0.total_cmp(&y.0));
            found.dedup_by_key(|x| x.1);
            splits.insert((a, b), found);
        }
    }

    let inserted: usize = splits.values().map(Vec::len).sum();
    if inserted == 0 {
        return (solid, 0);
    }

    // A triangle can own up to three split edges; split one per pass.
    for _ in 0..3 {
        let mut changed = false;
        let mut out = Vec::with_capacity(solid.triangles.len());
        for t in &solid.triangles {
            let hit = (0..3).find_map(|k| {
                let (a, b) = (t[k], t[(k + 1) % 3]);
                splits.get(&undirected(a, b)).map(|s| (k, s))
            });
            let Some((k, pts)) = hit else {
                out.push(*t);
                continue;
            };
            changed = true;
            let (a, b, c) = (t[k], t[(k + 1) % 3], t[(k + 2) % 3]);
            let mut chain: Vec<u32> = pts.iter().map(|&(_, v)| v).collect();
            if a > b {
                chain.reverse();
            }
            let mut prev = a;
            for v in chain {
                out.push([prev, v, c]);
                prev = v;
            }
            out.push([prev, b, c]);
        }
        solid.triangles = out;
        if !changed {
            break;
        }
        // Only edges still present as original pairs can split again.
        let present = edge_counts(&solid.triangles);
        splits.retain(|e, _| present.contains_key(e));
    }

    (solid, inserted)
}

/// Make winding consistent across shared edges, then point each connected
/// shell outward (positive signed volume). Returns the number of flipped faces.
pub fn orient_outward(mut solid: Solid) -> (Solid, usize) {
    let n = solid.triangles.len();
    // undirected edge -> (triangle, raw direction is min->max)
    let mut adjacency: HashMap<(u32, u32), Vec<(usize, bool)>> = HashMap::new();
    for (i, t) in solid.triangles.iter().enumerate() {
        for k in 0..3 {
            let (a, b) = (t[k], t[(k + 1) % 3]);
            adjacency.entry(undirected(a, b)).or_default().push((i, a < b));
        }
    }

    let mut flip = vec![false; n];
    let mut visited = vec![false; n];
    let mut flipped = 0;

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        let mut component = vec![seed];
        let mut queue = VecDeque::from([seed]);
        visited[seed] = true;

        while let Some(t) = queue.pop_front() {
            let tri = solid.triangles[t];
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                let Some(users) = adjacency.get(&undirected(a, b)) else {
                    continue;
                };
                // Only manifold edges propagate orientation.
                if users.len() != 2 {
                    continue;
                }
                let forward_t = (a < b) ^ flip[t];
                for &(other, raw_forward) in users {
                    if other == t || visited[other] {
                        continue;
                    }
                    flip[other] = raw_forward == forward_t;
                    visited[other] = true;
                    component.push(other);
                    queue.push_back(other);
                }
            }
        }

        let mut vol = 0.0;
        for &t in &component {
            let [v0, v1, v2] = solid.triangle(t);
            let v = v0.coords.dot(&v1.coords.cross(&v2.coords));
            vol += if flip[t] { -v } else { v };
        }
        if vol < 0.0 {
            for &t in &component {
                flip[t] = !flip[t];
            }
        }
    }

    for (t, f) in solid.triangles.iter_mut().zip(&flip) {
        if *f {
            t.swap(1, 2);
            flipped += 1;
        }
    }
    (solid, flipped)
}

/// Cap every closed boundary loop with a fan around its centroid.
pub fn fill_holes(mut solid: Solid) -> (Solid, usize) {
    let counts = edge_counts(&solid.triangles);
    let mut outgoing: HashMap<u32, Vec<u32>> = HashMap::new();
    for t in &solid.triangles {
        for k in 0..3 {
            let (a, b) = (t[k], t[(k + 1) % 3]);
            if counts.get(&undirected(a, b)) == Some(&1) {
                outgoing.entry(a).or_default().push(b);
            }
        }
    }

    let mut starts: Vec<u32> = outgoing.keys().copied().collect();
    starts.sort_unstable();
    let mut filled = 0;

    for start in starts {
        while let Some(first) = outgoing.get_mut(&start).and_then(Vec::pop) {
            let mut ring = vec![start, first];
            let mut cur = first;
            let mut closed = false;
            while ring.len() <= counts.len() {
                if cur == start {
                    closed = true;
                    ring.pop();
                    break;
                }
                let Some(next) = outgoing.get_mut(&cur).and_then(Vec::pop) else {
                    break;
                };
                ring.push(next);
                cur = next;
            }
            if !closed || ring.len() < 3 {
                continue;
            }

            if ring.len() == 3 {
                solid.triangles.push([ring[0], ring[2], ring[1]]);
            } else {
                let sum = ring
                    .iter()
                    .fold(Point3::origin().coords, |acc, &v| acc + solid.vertices[v as usize].coords);
                solid.vertices.push(Point3::from(sum / ring.len() as f64));
                let m = (solid.vertices.len() - 1) as u32;
                for i in 0..ring.len() {
                    let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
                    solid.triangles.push([b, a, m]);
                }
            }
            filled += 1;
        }
    }

    (solid, filled)
}

/// Drop vertices no triangle references.
pub fn remove_unreferenced_vertices(solid: Solid) -> Solid {
    let mut remap = vec![u32::MAX; solid.vertices.len()];
    let mut vertices = Vec::new();
    let mut triangles = Vec::with_capacity(solid.triangles.len());
    for t in &solid.triangles {
        let mut out = [0u32; 3];
        for k in 0..3 {
            let old = t[k] as usize;
            if remap[old] == u32::MAX {
                remap[old] = vertices.len() as u32;
                vertices.push(solid.vertices[old]);
            }
            out[k] = remap[old];
        }
        triangles.push(out);
    }
    Solid::new(vertices, triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::cuboid;
    use approx::assert_relative_eq;

    fn soup(solid: &Solid) -> Solid {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..solid.triangle_count() {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&solid.triangle(i));
            triangles.push([base, base + 1, base + 2]);
        }
        Solid::new(vertices, triangles)
    }

    #[test]
    fn test_weld_soup() {
        let cube = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let s = soup(&cube);
        assert_eq!(s.vertex_count(), 36);
        let welded = weld_vertices(s, &Tolerance::DEFAULT);
        assert_eq!(welded.vertex_count(), 8);
        assert!(welded.is_watertight());
    }

    #[test]
    fn test_fill_missing_face() {
        let mut cube = cuboid(Point3::origin(), Point3::new(2.0, 2.0, 2.0));
        cube.triangles.truncate(10);
        assert!(!cube.is_watertight());
        let (filled, n) = fill_holes(cube);
        assert_eq!(n, 1);
        assert!(filled.is_watertight());
        assert!(filled.is_winding_consistent());
        assert_relative_eq!(filled.volume(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_orient_fixes_flipped_faces() {
        let mut cube = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        cube.triangles[3].swap(1, 2);
        cube.triangles[7].swap(1, 2);
        let (fixed, flipped) = orient_outward(cube);
        assert_eq!(flipped, 2);
        assert!(fixed.is_winding_consistent());
        assert!(fixed.signed_volume() > 0.0);
    }

    #[test]
    fn test_orient_inside_out_shell() {
        let cube = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).reversed();
        let (fixed, flipped) = orient_outward(cube);
        assert_eq!(flipped, 12);
        assert!(fixed.signed_volume() > 0.0);
    }

    #[test]
    fn test_duplicate_and_opposing_faces() {
        let mut cube = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let dup = cube.triangles[0];
        cube.triangles.push(dup);
        let (deduped, removed) = remove_duplicate_faces(cube.clone());
        assert_eq!(removed, 1);
        assert_eq!(deduped.triangle_count(), 12);

        let [a, b, c] = cube.triangles[4];
        cube.triangles.push([a, c, b]);
        let (cancelled, removed) = remove_duplicate_faces(cube);
        // duplicate pair collapses to one, opposing pair cancels entirely
        assert_eq!(removed, 3);
        assert_eq!(cancelled.triangle_count(), 11);
    }

    #[test]
    fn test_adjacent_boxes_become_one_shell() {
        let a = cuboid(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = cuboid(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        let merged = Solid::concat([a, b]);
        assert!(!merged.is_watertight());
        let (fixed, stats) = repair_mesh(merged, &Tolerance::DEFAULT);
        assert!(stats.duplicate_faces >= 4);
        assert!(fixed.is_watertight());
        assert_relative_eq!(fixed.volume(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_split_t_junction() {
        let cube = cuboid(Point3::origin(), Point3::new(2.0, 2.0, 2.0));
        let mut v = cube.vertices.clone();
        v.push(Point3::new(1.0, 0.0, 0.0));
        let m = 8;
        let mut tris: Vec<[u32; 3]> = cube
            .triangles
            .iter()
            .copied()
            .filter(|t| *t != [0, 1, 5] && *t != [0, 5, 4])
            .collect();
        tris.extend([[0, m, 4], [m, 5, 4], [m, 1, 5]]);
        let broken = Solid::new(v, tris);
        assert!(!broken.is_watertight());

        let (fixed, n) = split_t_junctions(broken, &Tolerance::DEFAULT);
        assert_eq!(n, 1);
        assert!(fixed.is_watertight());
        assert!(fixed.is_winding_consistent());
        assert_relative_eq!(fixed.volume(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clean_mesh_is_untouched() {
        let cube = cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let (fixed, stats) = repair_mesh(cube.clone(), &Tolerance::DEFAULT);
        assert!(stats.is_clean());
        assert_eq!(fixed.triangle_count(), cube.triangle_count());
    }
}
