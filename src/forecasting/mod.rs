pub mod error;
pub mod fallback;
mod linalg;
pub mod regression;
