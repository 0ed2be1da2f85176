//! Application layer: use cases built on the domain types.
//!
//! - [`pipeline`] – the command pipeline (sanitize, gate, dispatch, audit).
//! - [`sampler`] – the periodic status sampler.

pub mod pipeline;
pub mod sampler;
