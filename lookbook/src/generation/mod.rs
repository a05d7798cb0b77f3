//! Generations: the status machine, credit settlement, the generation pipeline and
//! stale expiry.

pub mod lifecycle;
pub mod service;
pub mod settlement;
pub mod status;
pub mod sweeper;

pub use service::{GenerationRequest, GenerationService, ReferenceSource};
pub use status::{FailureReason, GenerationState, GenerationStatus};
