//! Build configuration source port.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{Repo, Result, Settings, User};

/// Path of the build configuration inside a repository.
pub const DEFAULT_CONFIG_PATH: &str = ".drone.yml";

/// Fetches the raw build configuration of a commit from its hosting provider.
///
/// A missing file is reported as [`crate::Error::ConfigNotFound`], content
/// that cannot be decoded as [`crate::Error::ConfigDecode`] and any other
/// provider failure as [`crate::Error::Transport`].
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch_config(
        &self,
        repo: &Repo,
        user: &User,
        settings: &Settings,
        hash: &str,
        path: &str,
    ) -> Result<Bytes>;
}
