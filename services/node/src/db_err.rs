//! Bridges `sqlx::Error` into `NodeError` at the service layer.
//!
//! `core_model::NodeError` deliberately carries no `sqlx` dependency (see
//! DESIGN.md), so the conversion can't be a blanket `From` impl anywhere but
//! here -- this crate is the only place that owns both types at once, and
//! even here a blanket impl would be an orphan-rule violation since neither
//! type is local. A plain function mapped in at each call site instead.

use core_model::NodeError;

pub fn to_node_error(err: sqlx::Error) -> NodeError {
    NodeError::Transient(err.to_string())
}
