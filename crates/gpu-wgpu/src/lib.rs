//! wgpu backend for the kiln GPU layer.
//!
//! Receives resolved clears and draws from a `kiln_gpu::GpuContext` and
//! replays them as render passes. Pipelines and texture bind groups are
//! created on first use and cached.
//!
//! # Invariants
//! - Nothing reaches the queue before `flush`; texture uploads go through
//!   `Queue::write_texture` and so land ahead of the next submission.
//! - Viewports arrive with a bottom-left origin and are flipped per target.

mod backend;

pub use backend::WgpuBackend;

pub fn crate_info() -> &'static str {
    "kiln-gpu-wgpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("wgpu"));
    }
}
