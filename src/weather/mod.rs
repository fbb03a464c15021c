pub mod client;
pub mod error;
pub mod payload;
pub mod retry;
pub mod transport;
