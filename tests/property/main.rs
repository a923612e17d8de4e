//! Property-based tests for chunk planning and dispatch.
//!
//! Run with: `cargo test --test property`

mod parallel_for;
mod partition;
