//! Client for the provider's v1.1 REST API and OAuth 1.0a sign-in.

mod auth;
mod client;
mod error;
mod models;

pub use client::{TimelineClient, TwitterClient};
pub use error::{AuthError, RemoteError};
pub(crate) use models::RawPost;
pub use models::{Credentials, PageRequest, Post, PostId, Profile};
