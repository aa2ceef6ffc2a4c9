//! Video link selection
//!
//! The CDN only serves a link to requests presenting the identity token the
//! link was published under, so a working link is found by walking every
//! identity and, under each, every tier in the caller's priority order.

use crate::catalog::{LinkTable, QualityTier};
use crate::transport::{HttpResponse, Transport};
use thiserror::Error;
use tracing::{debug, warn};

/// Placeholder the catalog writes instead of `.` inside identity tokens
pub const DOT_PLACEHOLDER: &str = "=+(dot)+=";

/// Errors that can occur while selecting a video link
#[derive(Debug, Error)]
pub enum LinkError {
    /// No (identity, tier) pair answered with 200
    #[error("No working video link ({probed} candidate(s) probed)")]
    NoLinkAvailable { probed: usize },
}

/// A link that answered a probe, with the still-open response
#[derive(Debug)]
pub struct SelectedLink {
    pub url: String,
    pub tier: QualityTier,
    /// De-obfuscated identity the link was probed with
    pub identity: String,
    /// The probe response; its body is the video
    pub response: HttpResponse,
}

/// Restores the dots the catalog replaced in an identity token.
///
/// Idempotent: a token without placeholders is returned unchanged.
pub fn deobfuscate_identity(token: &str) -> String {
    token.replace(DOT_PLACEHOLDER, ".")
}

/// Picks a working transport URL out of a [`LinkTable`]
pub struct MediaLinkSelector<'a> {
    transport: &'a dyn Transport,
}

impl<'a> MediaLinkSelector<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Returns the first (identity, tier) pair whose probe answers 200.
    ///
    /// Identities form the outer loop and are all tried; tiers absent under
    /// an identity are skipped. Rejected probes are dropped unread.
    pub fn select_working_link(
        &self,
        links: &LinkTable,
        priority: &[QualityTier],
    ) -> Result<SelectedLink, LinkError> {
        let mut probed = 0;

        for (published_identity, tiers) in links.iter() {
            let identity = deobfuscate_identity(published_identity);

            for &tier in priority {
                let Some(url) = tiers.get(&tier) else {
                    continue;
                };
                probed += 1;

                match self.transport.get(url, Some(&identity)) {
                    Ok(response) if response.is_ok() => {
                        debug!(%url, %tier, %identity, "selected video link");
                        return Ok(SelectedLink {
                            url: url.clone(),
                            tier,
                            identity,
                            response,
                        });
                    }
                    Ok(response) => {
                        debug!(%url, %tier, status = response.status, "video link rejected");
                    }
                    Err(e) => warn!(%url, %tier, error = %e, "video link probe failed"),
                }
            }
        }

        Err(LinkError::NoLinkAvailable { probed })
    }
}
