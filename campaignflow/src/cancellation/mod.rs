//! Cooperative cancellation for in-flight runs.
//!
//! The engine cancels a run's token when the deadline expires or a run is
//! aborted; long-running stages (the video poll loop in particular) observe
//! it between attempts and stop without issuing further provider calls.

mod token;

pub use token::CancellationToken;
