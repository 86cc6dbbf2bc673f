pub mod auth;
mod cookie;
mod error;
pub mod health;
pub mod pages;

pub use error::{AppError, ErrorInfo, ErrorResponse};
