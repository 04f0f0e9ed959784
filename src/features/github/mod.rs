pub mod client;
pub mod models;

pub use client::{FetchError, GitHubClient};
pub use models::RepositoryMetadata;
