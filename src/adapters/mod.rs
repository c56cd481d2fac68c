//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the learners and the persistence backend:
//! - `boosting`, `forest`, `linear`: ensemble members
//! - `calibration`: isotonic post-processing of tree ensembles
//! - `kernel`: random Fourier features for the RBF anemia candidate
//! - `scaling`, `sampling`: preprocessing and stratified partitioning
//! - `bundle_file`: manifest-bound artifact files on disk

pub mod boosting;
pub mod bundle_file;
pub mod calibration;
pub mod forest;
pub mod kernel;
pub mod linear;
pub mod sampling;
pub mod scaling;
pub mod tree;

// Re-export store error for lib.rs
pub use bundle_file::{FileBundleStore, StoreError};

/// Logistic function, stable for large |x|.
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
