#![warn(missing_docs)]

//! Triangle-mesh solids for the qrstamp pipeline.
//!
//! A [`Solid`] is an indexed triangle mesh in millimeters. This crate owns
//! everything that treats a solid as geometry: derived properties (bounds,
//! volume, watertightness), primitive builders, planar sections, repair,
//! decimation, point containment, and reading/writing mesh files.

pub mod decimate;
pub mod error;
pub mod io;
pub mod primitives;
pub mod query;
pub mod repair;
pub mod section;
mod solid;

pub use decimate::decimate;
pub use error::{MeshError, Result};
pub use query::point_in_solid;
pub use repair::{repair_mesh, RepairStats};
pub use section::{section_at_z, Polygon2};
pub use solid::Solid;
