//! Cooperative cancellation of in-flight stage work.
//!
//! A failing unit cancels its stage's token; units that have not been
//! dispatched yet observe the token and are reported as not dispatched.

mod token;

pub use token::CancellationToken;
