//! Reclamation: what makes values vanish without an explicit removal, and
//! the background task that reconciles the cache's indexes afterwards.

pub mod retainer;
pub mod sweeper;

pub use retainer::SoftRetainer;
pub use sweeper::{ReclaimTarget, Sweeper};
