//! CLI subcommands.

pub mod inspect;
pub mod solve;
pub mod synth;
