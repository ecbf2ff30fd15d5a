//! # quad-curves
//!
//! Ink-curve synthesis and composite density redistribution for
//! multi-channel monochrome printing.
//!
//! A printer driven through per-channel ink curves needs one 256-sample curve
//! per ink. This library builds those curves from loaded data, Smart control
//! points or ramps, applies linearization LUTs, and then redistributes ink
//! between channels so their combined density follows a target curve.
//!
//! ## Quick Start
//!
//! ```
//! use std::collections::BTreeMap;
//! use quad_curves::composite::{ChannelSpec, CompositeEngine, CompositeRequest};
//! use quad_curves::curve::ramp;
//! use quad_curves::target::TargetEntry;
//!
//! let request = CompositeRequest::new(
//!     vec![ChannelSpec::new("K", 60000), ChannelSpec::new("LK", 20000)],
//!     TargetEntry::identity(),
//! );
//! let bases = BTreeMap::from([
//!     ("K".to_string(), ramp(60000)),
//!     ("LK".to_string(), ramp(20000)),
//! ]);
//!
//! let mut engine = CompositeEngine::default();
//! let result = engine.run(request, &bases)?;
//! assert_eq!(result.ladder.len(), 2);
//!
//! let profile = engine.density_profile(50.0);
//! assert_eq!(profile.channels.len(), 2);
//! # Ok::<(), quad_curves::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`interpolation`]: Spline and LUT interpolation
//! - [`target`]: Target density entries
//! - [`curve`]: Per-channel curve synthesis
//! - [`composite`]: Composite density redistribution
//! - [`import`]: CSV import for measured series

pub mod composite;
pub mod curve;
pub mod error;
pub mod import;
pub mod interpolation;
pub mod target;

/// Samples per channel curve.
pub const CURVE_RESOLUTION: usize = 256;

/// Full-scale ink value.
pub const TOTAL_INK: u32 = 65535;

// Re-export commonly used types
pub use composite::{
    ChannelSpec, CompositeConfig, CompositeEngine, CompositeRequest, CompositeResult, CompositeSession,
    CoverageSummary, DensityProfileEntry, WeightingMode,
};
pub use curve::{CurveSource, CurveSynthesizer, LinearizationEntry, SynthesisOptions};
pub use error::{Error, Result};
pub use import::{TargetCsv, TargetCsvSchema};
pub use interpolation::{InterpolationKind, LutCurve, Spline};
pub use target::{TargetEntry, TargetSamples};
