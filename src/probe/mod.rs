//! Release index probes for CI tool version checks.

mod http;
mod version;

pub use http::*;
pub use version::*;

use crate::error::Result;
use crate::query::CiToolType;

use async_trait::async_trait;

/// Fetches a release index page as text.
#[async_trait]
pub trait VersionProbe: Send + Sync + 'static {
    async fn fetch_index(&self, url: &str) -> Result<String>;
}

/// Outcome of comparing a running version with the published one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub update_available: bool,
    pub message: &'static str,
    pub latest: Option<String>,
}

impl VersionCheck {
    fn up_to_date(latest: Option<String>) -> Self {
        Self {
            update_available: false,
            message: MESSAGE_UP_TO_DATE,
            latest,
        }
    }
}

/// Compare `current` against the latest published release for the tool.
///
/// Fetch failures and unparseable versions are logged and reported as no
/// update.
pub async fn check_for_update(probe: &dyn VersionProbe, tool_type: Option<CiToolType>, current: &str) -> VersionCheck {
    let stable = is_stable(current);
    let url = latest_version_url(tool_type, current);

    let body = match probe.fetch_index(url).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Failed to fetch release index {}: {}", url, e);
            return VersionCheck::up_to_date(None);
        }
    };

    let latest = match extract_latest_version(&body) {
        Some(v) => v,
        None => {
            tracing::info!("No version found in release index {}", url);
            return VersionCheck::up_to_date(None);
        }
    };

    match compare_versions(current, &latest) {
        Some(std::cmp::Ordering::Less) => VersionCheck {
            update_available: true,
            message: if stable {
                MESSAGE_NEW_STABLE
            } else {
                MESSAGE_NEW_VERSION
            },
            latest: Some(latest),
        },
        Some(_) => VersionCheck::up_to_date(Some(latest)),
        None => {
            tracing::info!("Cannot compare versions {} and {}", current, latest);
            VersionCheck::up_to_date(Some(latest))
        }
    }
}
