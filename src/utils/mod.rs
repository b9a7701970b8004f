//! Common utilities shared by the solver drivers and the runner binary.
//!
//! - **`stats`**: Running mean and standard-error accumulation for the
//!   per-restart eigenvalue estimates produced by the explicitly restarted
//!   driver.

pub mod stats;
