//! Outbound HTTP limits and error redaction.

use crate::runtime::HttpToolsError;
use makemcp_core::ToolCallError;
use url::Url;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Do not follow redirects; the 3xx response is returned to the caller.
    None,
    /// Follow redirects (reqwest default, at most 10 hops).
    #[default]
    Follow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundLimits {
    /// Maximum response body size (bytes). `None` = unlimited.
    pub max_response_bytes: Option<usize>,
    /// Redirect behavior.
    pub redirects: RedirectPolicy,
}

impl OutboundLimits {
    #[must_use]
    pub fn with_max_response_bytes(max_response_bytes: Option<usize>) -> Self {
        Self {
            max_response_bytes,
            ..Self::default()
        }
    }

    /// Build the shared client for these limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn build_client(&self) -> Result<reqwest::Client, HttpToolsError> {
        let builder = match self.redirects {
            RedirectPolicy::None => {
                reqwest::Client::builder().redirect(reqwest::redirect::Policy::none())
            }
            RedirectPolicy::Follow => reqwest::Client::builder(),
        };
        builder
            .build()
            .map_err(|e| HttpToolsError::Config(sanitize_reqwest_error(&e)))
    }
}

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

pub(crate) fn transport_error(e: &reqwest::Error) -> ToolCallError {
    ToolCallError::Transport(sanitize_reqwest_error(e))
}

/// Read a response body, enforcing `max_bytes` both on `Content-Length` and while streaming.
pub(crate) async fn read_response_body_limited_bytes(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<Vec<u8>, ToolCallError> {
    let Some(max) = max_bytes else {
        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
        return Ok(bytes.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(ToolCallError::ResponseTooLarge(format!(
            "{len} bytes (limit {max})"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| transport_error(&e))? {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(ToolCallError::ResponseTooLarge(format!(
                "exceeded {max} bytes"
            )));
        }
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}
