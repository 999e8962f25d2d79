//! Shared utilities for the kiln workspace.
//!
//! # Invariants
//! - Nothing in here touches the GPU; crates on both sides of the GPU layer
//!   can depend on it.

pub mod task;

pub use task::{unblock, Canceled};

pub fn crate_info() -> &'static str {
    "kiln-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
