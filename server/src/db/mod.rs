//! MongoDB connection and store client.

mod pool;
mod store;

pub use pool::*;
pub use store::*;
