//! Page error types

use thiserror::Error;

use crate::dom::NodeId;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Invalid page URL: {0}")]
    InvalidUrl(String),

    #[error("Property is not configurable: {0}")]
    Hardened(&'static str),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Reference node {reference} is not a child of {parent}")]
    NotAChild { parent: NodeId, reference: NodeId },

    #[error("Cannot insert {node} into {parent}: hierarchy request")]
    HierarchyRequest { parent: NodeId, node: NodeId },

    #[error("Page has been closed")]
    Closed,

    #[error("Document body is not available")]
    BodyMissing,

    #[error("HTML error: {0}")]
    Html(String),
}
