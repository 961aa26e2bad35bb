//! Analysis passes over the IR
//!
//! Each pass consumes a finished function and produces an immutable
//! result object. Results are invalidated by any mutation of the
//! function they were computed from.

pub mod cfg;
pub mod defuse;
pub mod dominators;

pub use cfg::FlowGraph;
pub use defuse::DefUse;
pub use dominators::Dominators;
