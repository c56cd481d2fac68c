//! Bundle store port: Trait for persisting trained ensembles.
//!
//! This trait abstracts the artifact backend (files on disk) from the
//! training and serving use cases.

use crate::application::EnsembleBundle;

/// Persistence for the trained `EnsembleBundle`.
///
/// A stored bundle is replaced as a whole on retrain, never patched.
pub trait BundleStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a bundle, replacing any previous one.
    ///
    /// # Errors
    /// Returns error if the bundle cannot be written.
    fn save(&self, bundle: &EnsembleBundle) -> Result<(), Self::Error>;

    /// Load the stored bundle.
    ///
    /// # Returns
    /// `None` if no bundle has been stored.
    ///
    /// # Errors
    /// Returns error if the artifact is unreadable, corrupt or was trained
    /// against a different feature ordering.
    fn load(&self) -> Result<Option<EnsembleBundle>, Self::Error>;

    /// Check whether a bundle exists.
    fn exists(&self) -> bool;
}
