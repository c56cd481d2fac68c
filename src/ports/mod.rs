//! Ports layer: Trait definitions at the seams.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and its learners and persistence backends.

mod classifier;
mod store;

pub use classifier::ProbabilisticClassifier;
pub use store::BundleStore;
