//! Version strings and release index scraping.

use crate::query::CiToolType;

use std::cmp::Ordering;

pub const JENKINS_STABLE_VERSION_URL: &str = "https://get.jenkins.io/war-stable/";
pub const JENKINS_LATEST_VERSION_URL: &str = "https://get.jenkins.io/war/";
pub const CBCI_CJOC_LATEST_VERSION_URL: &str =
    "https://downloads.cloudbees.com/cloudbees-core/traditional/client-master/rolling/war/";

pub const MESSAGE_NEW_STABLE: &str = "New stable version available";
pub const MESSAGE_NEW_VERSION: &str = "New version available";
pub const MESSAGE_UP_TO_DATE: &str = "Up to Date";

fn numeric_parts(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// A version with exactly three numeric components is on the stable line.
pub fn is_stable(version: &str) -> bool {
    numeric_parts(version).is_some_and(|parts| parts.len() == 3)
}

/// Release index to check for a tool running `current`.
pub fn latest_version_url(tool_type: Option<CiToolType>, current: &str) -> &'static str {
    match tool_type {
        Some(CiToolType::Cjoc) | Some(CiToolType::Cbci) => CBCI_CJOC_LATEST_VERSION_URL,
        _ if is_stable(current) => JENKINS_STABLE_VERSION_URL,
        _ => JENKINS_LATEST_VERSION_URL,
    }
}

/// The text after the last `href="` up to the next `/`, keeping digits and
/// dots only.
pub fn extract_latest_version(body: &str) -> Option<String> {
    let start = body.rfind("href=\"")? + "href=\"".len();
    let rest = &body[start..];
    let end = rest.find('/').unwrap_or(rest.len());
    let version: String = rest[..end]
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if version.chars().any(|c| c.is_ascii_digit()) {
        Some(version)
    } else {
        None
    }
}

/// Component-wise numeric comparison; missing components count as zero.
/// `None` when either side is not purely numeric.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = numeric_parts(a)?;
    let b = numeric_parts(b)?;
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}
