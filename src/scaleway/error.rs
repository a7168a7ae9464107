//! Error types for the Scaleway API seam.

use scaleway_rs::ScalewayError;
use serde::Deserialize;
use thiserror::Error;

const REVERSE_UNRESOLVED_MARKER: &str = "cannot be resolved";

/// Errors raised by calls through [`crate::scaleway::InstanceApi`] and its
/// sibling traits.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The addressed resource does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource kind, for example `server`.
        resource: String,
        /// Identifier that was looked up.
        id: String,
    },
    /// The credentials may not access the resource.
    #[error("permission denied: {message}")]
    Forbidden {
        /// Message returned by the API.
        message: String,
    },
    /// The request was rejected by argument validation.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Message returned by the API.
        message: String,
        /// Per-argument details as `(argument_name, reason)` pairs.
        details: Vec<(String, String)>,
    },
    /// The resource is not in a state that allows the request.
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// Message returned by the API.
        message: String,
    },
    /// The request conflicts with a concurrent change.
    #[error("conflict: {message}")]
    Conflict {
        /// Message returned by the API.
        message: String,
    },
    /// The request never reached the API.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// Any other provider-level failure.
    #[error("provider error ({status}): {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Message returned by the API.
        message: String,
    },
}

impl ApiError {
    /// Builds a [`ApiError::NotFound`].
    #[must_use]
    pub fn not_found(resource: &str, id: &str) -> Self {
        Self::NotFound {
            resource: resource.to_owned(),
            id: id.to_owned(),
        }
    }

    /// Returns `true` for 404 responses.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for 403 responses.
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Returns `true` when a reverse DNS update was refused because the
    /// hostname does not resolve to the address yet.
    #[must_use]
    pub fn is_reverse_unresolved(&self) -> bool {
        match self {
            Self::InvalidArguments { message, details } => {
                message.contains(REVERSE_UNRESOLVED_MARKER)
                    || details.iter().any(|(argument, reason)| {
                        argument == "reverse" && reason.contains(REVERSE_UNRESOLVED_MARKER)
                    })
            }
            _ => false,
        }
    }

    /// Maps an HTTP status and error body to an [`ApiError`].
    #[must_use]
    pub fn from_response(status: u16, resource: &str, id: &str, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<ErrorBody>(body).ok();
        let message = parsed.as_ref().map_or_else(
            || String::from_utf8_lossy(body).into_owned(),
            |error| error.message.clone(),
        );
        match status {
            404 => Self::not_found(
                parsed
                    .as_ref()
                    .and_then(|error| error.resource.as_deref())
                    .unwrap_or(resource),
                parsed
                    .as_ref()
                    .and_then(|error| error.resource_id.as_deref())
                    .unwrap_or(id),
            ),
            403 => Self::Forbidden { message },
            409 => Self::Conflict { message },
            412 => Self::PreconditionFailed { message },
            400 if parsed.as_ref().is_some_and(|error| error.etype == "invalid_arguments") => {
                Self::InvalidArguments {
                    message,
                    details: parsed.map(ErrorBody::argument_details).unwrap_or_default(),
                }
            }
            _ => Self::Provider { status, message },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    etype: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    argument_name: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    help_message: String,
}

impl ErrorBody {
    fn argument_details(self) -> Vec<(String, String)> {
        self.details
            .into_iter()
            .map(|detail| {
                let reason = if detail.help_message.is_empty() {
                    detail.reason
                } else {
                    format!("{}: {}", detail.reason, detail.help_message)
                };
                (detail.argument_name, reason)
            })
            .collect()
    }
}

impl From<ScalewayError> for ApiError {
    fn from(value: ScalewayError) -> Self {
        match value {
            ScalewayError::Api(api_err) => match api_err.etype.as_str() {
                "not_found" | "unknown_resource" => Self::NotFound {
                    resource: api_err.resource.unwrap_or_default(),
                    id: api_err.resource_id.unwrap_or_default(),
                },
                "permissions_denied" | "denied_authentication" => Self::Forbidden {
                    message: api_err.message,
                },
                "invalid_arguments" => Self::InvalidArguments {
                    message: api_err.message,
                    details: Vec::new(),
                },
                "precondition_failed" | "resource_locked" => Self::PreconditionFailed {
                    message: api_err.message,
                },
                "conflict" => Self::Conflict {
                    message: api_err.message,
                },
                _ => Self::Provider {
                    status: 0,
                    message: api_err.message,
                },
            },
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(404, true, false)]
    #[case(403, false, true)]
    #[case(500, false, false)]
    fn status_codes_map_to_error_kinds(
        #[case] status: u16,
        #[case] not_found: bool,
        #[case] forbidden: bool,
    ) {
        let err = ApiError::from_response(status, "server", "abc", b"{\"message\":\"boom\"}");
        assert_eq!(err.is_not_found(), not_found);
        assert_eq!(err.is_forbidden(), forbidden);
    }

    #[test]
    fn not_found_prefers_resource_reported_by_body() {
        let body = br#"{"type":"unknown_resource","message":"x","resource":"instance_volume","resource_id":"vol"}"#;
        let err = ApiError::from_response(404, "volume", "ignored", body);
        assert_eq!(err, ApiError::not_found("instance_volume", "vol"));
    }

    #[test]
    fn reverse_unresolved_detected_from_argument_details() {
        let body = br#"{
            "type": "invalid_arguments",
            "message": "Invalid argument(s)",
            "details": [{"argument_name": "reverse", "reason": "constraint", "help_message": "hostname cannot be resolved"}]
        }"#;
        let err = ApiError::from_response(400, "ip", "id", body);
        assert!(err.is_reverse_unresolved());
    }

    #[test]
    fn unrelated_invalid_arguments_are_not_reverse_errors() {
        let body = br#"{"type":"invalid_arguments","message":"name too long"}"#;
        let err = ApiError::from_response(400, "ip", "id", body);
        assert!(!err.is_reverse_unresolved());
    }

    #[test]
    fn non_json_bodies_are_kept_verbatim() {
        let err = ApiError::from_response(502, "server", "id", b"bad gateway");
        assert_eq!(
            err,
            ApiError::Provider {
                status: 502,
                message: String::from("bad gateway"),
            }
        );
    }
}
