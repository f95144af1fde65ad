pub mod alerts;
pub mod cycles;
pub mod ingest;
pub mod merge;
pub mod store;
pub mod traversal;

pub use alerts::*;
pub use cycles::*;
pub use ingest::*;
pub use merge::*;
pub use store::*;
pub use traversal::*;
