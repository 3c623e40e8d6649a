// Application layer - use cases on top of the repository.
// The CLI and any future front end go through LedgerService only.

pub mod error;
pub mod reporting;
pub mod service;

pub use error::*;
pub use reporting::*;
pub use service::*;
