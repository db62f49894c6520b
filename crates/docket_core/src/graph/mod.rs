//! Graph links between documents.
//!
//! An edge `(subject, predicate, object)` is stored six times, once per
//! ordering of (subject table, predicate, object table). Whatever subset of
//! the three a pattern binds, one ordering has exactly those components
//! first, so the candidates for a pattern are always one prefix scan.

mod link;
mod query;

pub use link::{EntityRef, Link, LinkOps, Permutation, Position};
pub use query::{
    Binding, Bindings, GraphExecutor, GraphQuery, GraphResult, PatternNode, Triple, ANY,
};
