pub mod attendance;
pub mod error;
pub mod holidays;
pub mod reader;
pub mod reconciliation;
