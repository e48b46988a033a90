mod error;
mod graph;

pub use error::GraphError;
pub use graph::Graph;
