// Module declarations
pub mod api;
