pub mod api_types;
pub mod client;
pub mod kinds;
pub mod types;
