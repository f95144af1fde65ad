pub mod alert;
pub mod config_manager;
pub mod edge;
pub mod error;
pub mod service;
pub mod snapshot;
pub mod traits;
pub mod types;
pub mod validation;

pub use alert::*;
pub use config_manager::*;
pub use edge::*;
pub use error::*;
pub use service::*;
pub use snapshot::*;
pub use traits::*;
pub use types::*;
pub use validation::*;
