#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::doc_markdown
)]
//! Body state and ephemeris management for a solar system simulation.
//!
//! A [`system::SimSystem`] owns one [`simbody::SimBody`] per simulated
//! body, advances them all to a common epoch (sequentially or on a rayon
//! pool) and aggregates the pairwise relative kinematics that a renderer
//! consumes between update cycles.

pub mod bodies;
pub mod clock;
pub mod config;
pub mod ephemeris;
pub mod error;
pub mod fields;
pub mod kepler;
pub mod kinematics;
pub mod math;
pub mod simbody;
pub mod system;
pub mod time;

pub use error::{Error, Result};
