//! Stamp construction: module grid to 3D solid.
//!
//! The stamp is built in a local frame: centered on the origin in XY, with
//! the marked surface at z = 0 and the outward normal along +Z. Placement
//! moves it onto the base afterwards.
//!
//! Two strategies produce the same silhouette:
//! - [`BoxAssembly`]: one prism per active module, concatenated
//! - [`ContourExtrusion`]: module regions traced into outlines, capped with
//!   a constrained Delaunay triangulation and extruded once

use std::collections::HashMap;

use qrstamp_booleans::BooleanOp;
use qrstamp_math::Point3;
use qrstamp_mesh::primitives::cuboid;
use qrstamp_mesh::Solid;
use serde::{Deserialize, Serialize};
use spade::{ConstrainedDelaunayTriangulation, InsertionError, Point2 as SpadePoint2, Triangulation};
use tracing::debug;

use crate::error::{GeometryDegenerateError, Result};
use crate::grid::ModuleGrid;

/// Engrave (recess) or emboss (raised mark).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StampMode {
    /// Subtract the stamp from the base.
    #[default]
    Engrave,
    /// Union the stamp onto the base.
    Emboss,
}

impl StampMode {
    /// Boolean operation that applies this mode.
    pub fn op(self) -> BooleanOp {
        match self {
            StampMode::Engrave => BooleanOp::Difference,
            StampMode::Emboss => BooleanOp::Union,
        }
    }
}

/// Which face of the base receives the mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    /// The max-Z face, read from above.
    #[default]
    Top,
    /// The min-Z face, read from below.
    Bottom,
}

/// Everything needed to turn a grid into a stamp solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampSpec {
    /// Edge length of one module in mm.
    pub module_size_mm: f64,
    /// Engrave depth or emboss height in mm.
    pub depth_mm: f64,
    /// Penetration past the surface so the boolean sees real overlap.
    pub z_offset_mm: f64,
    /// Rotate 180° about the face normal.
    pub rotation_180: bool,
    /// Engrave or emboss.
    pub mode: StampMode,
    /// Target face.
    pub face: Face,
}

impl StampSpec {
    /// Reject non-positive sizes.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| -> Result<()> {
            Err(GeometryDegenerateError::InvalidSpec(msg).into())
        };
        if !(self.module_size_mm > 0.0) || !self.module_size_mm.is_finite() {
            return bad(format!("module size must be positive, got {}", self.module_size_mm));
        }
        if !(self.depth_mm > 0.0) || !self.depth_mm.is_finite() {
            return bad(format!("depth must be positive, got {}", self.depth_mm));
        }
        if self.z_offset_mm < 0.0 || !self.z_offset_mm.is_finite() {
            return bad(format!("z offset must be non-negative, got {}", self.z_offset_mm));
        }
        Ok(())
    }

    /// Local Z range `(bottom, top)` of the stamp.
    pub fn z_range(&self) -> (f64, f64) {
        match self.mode {
            StampMode::Engrave => (-self.depth_mm, self.z_offset_mm),
            StampMode::Emboss => (-self.z_offset_mm, self.depth_mm),
        }
    }

    /// Side length in mm of a stamp built from `modules` modules.
    pub fn extent(&self, modules: usize) -> f64 {
        modules as f64 * self.module_size_mm
    }
}

/// A way of building stamp geometry.
pub trait StampAlgorithm: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Build the stamp for every active module of `grid`.
    fn build(&self, grid: &ModuleGrid, spec: &StampSpec) -> Result<Solid>;
}

/// Algorithm selector for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    /// [`BoxAssembly`].
    Box,
    /// [`ContourExtrusion`].
    #[default]
    Contour,
}

impl AlgorithmKind {
    /// The strategy object.
    pub fn algorithm(self) -> Box<dyn StampAlgorithm> {
        match self {
            AlgorithmKind::Box => Box::new(BoxAssembly),
            AlgorithmKind::Contour => Box::new(ContourExtrusion),
        }
    }
}

/// Build a stamp, validating `spec` and that at least one module is active.
pub fn build_stamp(
    grid: &ModuleGrid,
    spec: &StampSpec,
    algorithm: &dyn StampAlgorithm,
) -> Result<Solid> {
    spec.validate()?;
    if grid.active_count() == 0 {
        return Err(GeometryDegenerateError::EmptyGrid.into());
    }
    let solid = algorithm.build(grid, spec)?;
    debug!(
        algorithm = algorithm.name(),
        modules = grid.active_count(),
        triangles = solid.triangle_count(),
        "stamp built"
    );
    Ok(solid)
}

/// Maps lattice corners of the grid into the centered local frame.
#[derive(Debug, Clone, Copy)]
struct Lattice {
    half_cols: f64,
    half_rows: f64,
    size: f64,
}

impl Lattice {
    fn new(grid: &ModuleGrid, spec: &StampSpec) -> Self {
        Self {
            half_cols: grid.cols() as f64 / 2.0,
            half_rows: grid.rows() as f64 / 2.0,
            size: spec.module_size_mm,
        }
    }

    fn x(&self, ix: f64) -> f64 {
        (ix - self.half_cols) * self.size
    }

    fn y(&self, iy: f64) -> f64 {
        (iy - self.half_rows) * self.size
    }
}

// =============================================================================
// Box assembly
// =============================================================================

/// One axis-aligned prism per active module, concatenated without union.
///
/// Adjacent prisms share coincident faces; the boolean backends cancel
/// those on input.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxAssembly;

impl StampAlgorithm for BoxAssembly {
    fn name(&self) -> &'static str {
        "box"
    }

    fn build(&self, grid: &ModuleGrid, spec: &StampSpec) -> Result<Solid> {
        let lattice = Lattice::new(grid, spec);
        let (z0, z1) = spec.z_range();
        Ok(Solid::concat(grid.active().map(|(x, y)| {
            let (fx, fy) = (x as f64, y as f64);
            cuboid(
                Point3::new(lattice.x(fx), lattice.y(fy), z0),
                Point3::new(lattice.x(fx + 1.0), lattice.y(fy + 1.0), z1),
            )
        })))
    }
}

// =============================================================================
// Contour extrusion
// =============================================================================

/// Module regions traced into outlines and extruded once.
///
/// Output is a closed shell: far fewer triangles than [`BoxAssembly`] and
/// no internal faces. Where two regions touch only at a corner, each side
/// gets its own copy of the corner, pulled [`PINCH_INSET`] modules into its
/// own module, so the shared vertical edge never carries four faces.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourExtrusion;

type Corner = (i64, i64);

/// Inset of pinch-corner copies, in modules.
pub const PINCH_INSET: f64 = 2e-3;

/// Vertex identity: lattice corner, owning module at a pinch corner, cap.
type VertexKey = (Corner, Option<Corner>, bool);

impl StampAlgorithm for ContourExtrusion {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn build(&self, grid: &ModuleGrid, spec: &StampSpec) -> Result<Solid> {
        let loops = trace_outlines(grid);
        let caps = triangulate_regions(grid, &loops).map_err(|e| {
            GeometryDegenerateError::InvalidSpec(format!("outline triangulation failed: {e}"))
        })?;

        let lattice = Lattice::new(grid, spec);
        let (z0, z1) = spec.z_range();
        let mut solid = Solid::empty();
        let mut ids: HashMap<VertexKey, u32> = HashMap::new();
        let mut vertex = |c: Corner, owner: Option<Corner>, top: bool, solid: &mut Solid| -> u32 {
            *ids.entry((c, owner, top)).or_insert_with(|| {
                let z = if top { z1 } else { z0 };
                let (mut x, mut y) = (c.0 as f64, c.1 as f64);
                if let Some(m) = owner {
                    x += PINCH_INSET * if m.0 < c.0 { -1.0 } else { 1.0 };
                    y += PINCH_INSET * if m.1 < c.1 { -1.0 } else { 1.0 };
                }
                solid
                    .vertices
                    .push(Point3::new(lattice.x(x), lattice.y(y), z));
                (solid.vertices.len() - 1) as u32
            })
        };

        for tri in &caps {
            let cx = tri.iter().map(|c| c.0 as f64).sum::<f64>() / 3.0;
            let cy = tri.iter().map(|c| c.1 as f64).sum::<f64>() / 3.0;
            let owners = tri.map(|c| pinch_owner(grid, c, (cx - c.0 as f64, cy - c.1 as f64)));
            let top: Vec<u32> = (0..3).map(|k| vertex(tri[k], owners[k], true, &mut solid)).collect();
            let bottom: Vec<u32> =
                (0..3).map(|k| vertex(tri[k], owners[k], false, &mut solid)).collect();
            solid.triangles.push([top[0], top[1], top[2]]);
            solid.triangles.push([bottom[0], bottom[2], bottom[1]]);
        }
        // Loops keep the region on their left, so walls face right.
        for ring in &loops {
            for i in 0..ring.len() {
                let (p, q) = (ring[i], ring[(i + 1) % ring.len()]);
                let d = ((q.0 - p.0).signum() as f64, (q.1 - p.1).signum() as f64);
                let left = (-d.1, d.0);
                let po = pinch_owner(grid, p, (d.0 + left.0, d.1 + left.1));
                let qo = pinch_owner(grid, q, (left.0 - d.0, left.1 - d.1));
                let (pb, qb) = (vertex(p, po, false, &mut solid), vertex(q, qo, false, &mut solid));
                let (pt, qt) = (vertex(p, po, true, &mut solid), vertex(q, qo, true, &mut solid));
                solid.triangles.push([pb, qb, qt]);
                solid.triangles.push([pb, qt, pt]);
            }
        }
        Ok(solid)
    }
}

/// At a corner where only two diagonally opposite modules are active, the
/// module lying in direction `toward`; `None` at ordinary corners.
fn pinch_owner(grid: &ModuleGrid, c: Corner, toward: (f64, f64)) -> Option<Corner> {
    let (x, y) = c;
    let sw = grid.get_signed(x - 1, y - 1);
    let se = grid.get_signed(x, y - 1);
    let nw = grid.get_signed(x - 1, y);
    let ne = grid.get_signed(x, y);
    let pinched = (sw && ne && !se && !nw) || (se && nw && !sw && !ne);
    pinched.then(|| {
        (
            if toward.0 < 0.0 { x - 1 } else { x },
            if toward.1 < 0.0 { y - 1 } else { y },
        )
    })
}

/// Boundary loops of the active regions, in lattice corners.
///
/// Outer boundaries run counter-clockwise and holes clockwise. Regions that
/// touch only at a corner get separate loops. Collinear corners are dropped.
fn trace_outlines(grid: &ModuleGrid) -> Vec<Vec<Corner>> {
    let mut edges: Vec<(Corner, Corner)> = Vec::new();
    for (x, y) in grid.active() {
        let (x, y) = (x as i64, y as i64);
        if !grid.get_signed(x, y - 1) {
            edges.push(((x, y), (x + 1, y)));
        }
        if !grid.get_signed(x + 1, y) {
            edges.push(((x + 1, y), (x + 1, y + 1)));
        }
        if !grid.get_signed(x, y + 1) {
            edges.push(((x + 1, y + 1), (x, y + 1)));
        }
        if !grid.get_signed(x - 1, y) {
            edges.push(((x, y + 1), (x, y)));
        }
    }

    let mut outgoing: HashMap<Corner, Vec<usize>> = HashMap::new();
    for (i, e) in edges.iter().enumerate() {
        outgoing.entry(e.0).or_default().push(i);
    }

    let next = |e: usize| -> usize {
        let (a, b) = edges[e];
        let din = (b.0 - a.0, b.1 - a.1);
        outgoing
            .get(&b)
            .into_iter()
            .flatten()
            .copied()
            .min_by_key(|&o| {
                let (c, d) = edges[o];
                turn_rank(din, (d.0 - c.0, d.1 - c.1))
            })
            .unwrap_or(e)
    };

    let mut used = vec![false; edges.len()];
    let mut loops = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut e = start;
        loop {
            used[e] = true;
            ring.push(edges[e].0);
            e = next(e);
            if e == start || used[e] {
                break;
            }
        }
        loops.push(drop_collinear(ring));
    }
    loops
}

/// Left turn first, then straight, right, and reversing last.
fn turn_rank(din: Corner, dout: Corner) -> u8 {
    let cross = din.0 * dout.1 - din.1 * dout.0;
    let dot = din.0 * dout.0 + din.1 * dout.1;
    match (cross.signum(), dot.signum()) {
        (1, _) => 0,
        (0, 1) => 1,
        (-1, _) => 2,
        _ => 3,
    }
}

fn drop_collinear(ring: Vec<Corner>) -> Vec<Corner> {
    let n = ring.len();
    (0..n)
        .filter(|&i| {
            let (p, c, q) = (ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n]);
            (c.0 - p.0) * (q.1 - c.1) - (c.1 - p.1) * (q.0 - c.0) != 0
        })
        .map(|i| ring[i])
        .collect()
}

/// Triangulate the region interiors. Every triangle is counter-clockwise.
fn triangulate_regions(
    grid: &ModuleGrid,
    loops: &[Vec<Corner>],
) -> std::result::Result<Vec<[Corner; 3]>, InsertionError> {
    let mut cdt = ConstrainedDelaunayTriangulation::<SpadePoint2<f64>>::new();
    for ring in loops {
        let mut handles = Vec::with_capacity(ring.len());
        for c in ring {
            handles.push(cdt.insert(SpadePoint2::new(c.0 as f64, c.1 as f64))?);
        }
        for i in 0..handles.len() {
            let (from, to) = (handles[i], handles[(i + 1) % handles.len()]);
            if from != to {
                cdt.add_constraint(from, to);
            }
        }
    }

    let corner = |p: SpadePoint2<f64>| (p.x.round() as i64, p.y.round() as i64);
    Ok(cdt
        .inner_faces()
        .filter_map(|face| {
            let [a, b, c] = face.vertices().map(|v| v.position());
            let cx = (a.x + b.x + c.x) / 3.0;
            let cy = (a.y + b.y + c.y) / 3.0;
            // Constraints follow cell edges, so a face never straddles an
            // outline and its centroid's cell decides inside/outside.
            grid.get_signed(cx.floor() as i64, cy.floor() as i64)
                .then(|| [corner(a), corner(b), corner(c)])
        })
        .collect())
}
