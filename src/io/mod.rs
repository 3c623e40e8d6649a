// Bulk data in and out: JSON backups and CSV member lists and reports.

mod backup;
mod export;
mod import;

pub use backup::*;
pub use export::*;
pub use import::*;
