pub mod analyzer;
pub mod composite;
pub mod error_budget;
pub mod external_buffer;
pub mod feasibility;
pub mod telemetry;

pub use analyzer::*;
pub use composite::*;
pub use error_budget::*;
pub use external_buffer::*;
pub use feasibility::*;
pub use telemetry::*;
