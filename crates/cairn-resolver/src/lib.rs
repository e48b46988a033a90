mod error;
mod resolver;

pub use error::{Reason, ResolveError, Unresolved};
pub use resolver::resolve;
