//! Composite density redistribution.
//!
//! Given several ink channels with baseline curves and a target density
//! curve, the engine rewrites each channel's curve so the combined density
//! tracks the target, lighter inks first, without exceeding coverage
//! ceilings or breaking monotonicity.
//!
//! - [`solver`]: density weights, coverage ceilings and the share prior
//! - [`ladder`]: light-to-dark channel order
//! - [`capacity`]: headroom, front reserve and blend ramps
//! - [`redistribute`]: the per-sample iterator
//! - [`smoothing`]: hand-off cross-fades
//! - [`session::CompositeSession`] / [`session::CompositeEngine`]: running a pass
//! - [`report`]: result and diagnostic types
//! - [`config`]: every tunable constant

pub mod capacity;
pub mod config;
pub mod ladder;
pub mod momentum;
pub mod redistribute;
pub mod report;
pub mod session;
pub mod smoothing;
pub mod solver;

pub use config::{CompositeConfig, CompositeConfigBuilder, SmoothingWindowConfig, WeightingMode};
pub use ladder::Ladder;
pub use report::{
    ChannelCoverage, ChannelDensity, ClampEvent, CompositeResult, CoverageSummary, DensityProfileEntry,
    DensityWeight, ResidualStats, SampleAction, SampleProfile, SampleSnapshot, SmoothingWindow,
};
pub use session::{ChannelSpec, CompositeEngine, CompositeRequest, CompositeSession};
pub use solver::{CoverageLimit, DensitySolution, WeightSource, solve_density_weights};
