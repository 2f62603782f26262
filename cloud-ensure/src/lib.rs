pub mod accessor;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod model;
pub mod outcome;
pub mod pagination;

pub use coordinator::Coordinator;
pub use error::ProviderError;
pub use outcome::{Change, Outcome};
