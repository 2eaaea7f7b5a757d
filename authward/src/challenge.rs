//! Discovery of delegation targets from `WWW-Authenticate` challenges

use authward_tokens::{TargetId, TargetIdRef};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header;

use crate::transport::Response;

static CLIENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"client_id=([^\s]+)").expect("valid challenge pattern"));

/// A `401 Unauthorized` answer and what it revealed about the expected token
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Challenge {
    target: Option<TargetId>,
}

impl Challenge {
    /// Reads the challenge carried by `response`
    pub fn from_response(response: &Response) -> Self {
        let target = response
            .headers()
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| CLIENT_ID.captures(value))
            .and_then(|captures| captures.get(1))
            .map(|m| TargetId::from(m.as_str()));

        Self { target }
    }

    /// A challenge naming `target`
    pub fn for_target(target: impl Into<TargetId>) -> Self {
        Self {
            target: Some(target.into()),
        }
    }

    /// The service the challenge asked for a token for, if it named one
    pub fn target(&self) -> Option<&TargetIdRef> {
        self.target.as_deref()
    }
}
