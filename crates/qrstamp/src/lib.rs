#![warn(missing_docs)]

//! Stamp encoded payloads into 3D solids.
//!
//! The pipeline turns a short payload (usually a URL) into an engraved or
//! embossed module pattern on a base solid:
//!
//! 1. **Encode**: payload to [`ModuleGrid`] ([`encode`])
//! 2. **Footprint**: usable area of the base ([`analyze_footprint`])
//! 3. **Place**: module size, module filtering, transform ([`PlacementPlanner`])
//! 4. **Build**: grid to stamp solid ([`build_stamp`], [`StampAlgorithm`])
//! 5. **Combine**: boolean with a fallback ladder ([`CombinationEngine`])
//! 6. **Validate**: accept, retry or give up ([`validate`])
//!
//! [`Pipeline`] runs all six from a [`StampConfig`].
//!
//! # Example
//!
//! ```no_run
//! use qrstamp::{Pipeline, RunJournal, StampConfig};
//! use qrstamp_mesh::io::{load_solid, PartMerge};
//!
//! let base = load_solid("tag.stl".as_ref(), PartMerge::All)?;
//! let pipeline = Pipeline::new(StampConfig::default())?;
//! let mut journal = RunJournal::new();
//! let run = pipeline.run("https://example.com/k/42", base, &mut journal)?;
//! println!("{:?}", run.outcome);
//! # Ok::<(), qrstamp::StampError>(())
//! ```

pub mod combine;
pub mod config;
pub mod encoder;
pub mod error;
pub mod footprint;
pub mod grid;
pub mod journal;
pub mod pipeline;
pub mod placement;
pub mod stamp;
pub mod validate;

pub use combine::{
    Attempt, Combination, CombinationEngine, CombineOptions, CombineOutcome, RecoveryStrategy,
    DEFAULT_LADDER,
};
pub use config::{OutputMode, StampConfig};
pub use encoder::{encode, tracking_url, EncodeOptions, ErrorLevel};
pub use error::{GeometryDegenerateError, InputError, Result, StampError};
pub use footprint::{analyze_footprint, Footprint, FootprintKind};
pub use grid::ModuleGrid;
pub use journal::RunJournal;
pub use pipeline::{Pipeline, RunReport, StampRun};
pub use placement::{Placement, PlacementPlanner, Strictness};
pub use stamp::{
    build_stamp, AlgorithmKind, BoxAssembly, ContourExtrusion, Face, StampAlgorithm, StampMode,
    StampSpec,
};
pub use validate::{validate, ValidationReport, Verdict};
