//! # spinnet-experiment
//!
//! Command-line runner for spin-network diffusion. Builds a template graph,
//! drives a [`spinnet_sim::SimulationEngine`] for a fixed number of steps and
//! records one telemetry row per step.
//!
//! ## What is recorded
//!
//! - **volume**: `Σ φᵢ²` after the step (post-normalization when the
//!   stability monitor rescaled the state).
//! - **max_value**: `max |φᵢ|`.
//! - **entropy**: Shannon entropy of the squared-amplitude distribution.
//! - **normalizations**: cumulative count of stability normalizations.
//!
//! Ordinary diffusion should show flat volume decay and rising entropy; a
//! telegraph run started far above the stability threshold shows a single
//! normalization at step 1.

pub mod telemetry;
