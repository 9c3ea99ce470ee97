//! Hosting provider clients.

pub mod bitbucket;
pub mod github;
pub mod sources;

pub use bitbucket::BitbucketClient;
pub use github::GitHubClient;
pub use sources::ProviderSources;
