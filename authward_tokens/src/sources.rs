//! Token sources

pub mod cache;
pub mod oauth2;

pub use cache::TokenCache;
