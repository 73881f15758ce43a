//! Fetcher trait: turns a target definition into raw pages.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{page::FetchOutcome, target::TargetConfig};

/// Fetches every page a target describes.
///
/// Single-page failures never fail the call: they are collected in
/// [`FetchOutcome::failures`]. An `Err` means the whole target cannot run
/// (missing credentials, rejected login).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_target(&self, target: &TargetConfig) -> Result<FetchOutcome>;
}
