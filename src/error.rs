//! Client-level error types shared across the dispatcher, coordinator, and stores.

// crates.io
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
// self
use crate::{_prelude::*, http::RequestDescriptor};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Server answered with a non-2xx status that is not handled by the refresh cycle.
	#[error("Request {request} failed with HTTP status {status}.")]
	Http {
		/// Response status.
		status: StatusCode,
		/// Request that produced the response.
		request: RequestDescriptor,
		/// Response headers.
		headers: HeaderMap,
		/// Response body.
		body: Bytes,
	},
	/// Session could not be renewed; stored credentials have been cleared and the caller
	/// must authenticate again.
	#[error("Session expired while handling {request}.")]
	SessionExpired {
		/// Why renewal failed.
		#[source]
		cause: ExpiryCause,
		/// Request that observed the expiry.
		request: RequestDescriptor,
	},
}
impl Error {
	/// HTTP status attached to the failure, when a response was received.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Http { status, .. } => Some(*status),
			Self::SessionExpired { .. } => Some(StatusCode::UNAUTHORIZED),
			Self::Decode(e) => e.status.and_then(|code| StatusCode::from_u16(code).ok()),
			_ => None,
		}
	}

	/// Request descriptor attached to the failure, if any.
	pub fn request(&self) -> Option<&RequestDescriptor> {
		match self {
			Self::Http { request, .. } | Self::SessionExpired { request, .. } => Some(request),
			_ => None,
		}
	}

	/// Returns `true` for a raw 401 response.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Http { status, .. } if *status == StatusCode::UNAUTHORIZED)
	}

	/// Returns `true` when the caller must authenticate again.
	pub fn is_session_expired(&self) -> bool {
		matches!(self, Self::SessionExpired { .. })
	}

	/// Expiry cause, for session-expired failures.
	pub fn expiry_cause(&self) -> Option<&ExpiryCause> {
		match self {
			Self::SessionExpired { cause, .. } => Some(cause),
			_ => None,
		}
	}
}

impl From<crate::config::ClientConfigError> for Error {
	fn from(e: crate::config::ClientConfigError) -> Self {
		Self::Config(e.into())
	}
}

/// Why a refresh episode (or a replay) ended the session.
///
/// Every caller that took part in the same episode observes an identical cause.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ExpiryCause {
	/// No refresh credential was stored when the episode started.
	#[error("No refresh token is stored.")]
	MissingRefreshToken,
	/// Token exchange endpoint answered with a non-2xx status.
	#[error("Token exchange was rejected with HTTP status {status}.")]
	ExchangeRejected {
		/// Status returned by the exchange endpoint.
		status: u16,
	},
	/// Token exchange could not be completed (network, decoding, or storage failure).
	#[error("Token exchange failed: {message}")]
	ExchangeFailed {
		/// Human-readable summary of the underlying failure.
		message: String,
	},
	/// A request already replayed after a refresh was rejected again.
	#[error("The server rejected a request that was already retried.")]
	RetryRejected,
	/// The episode leader was dropped before the exchange settled.
	#[error("The refresh episode was abandoned before it settled.")]
	Abandoned,
}
impl ExpiryCause {
	/// Whether stored credentials are cleared when this cause ends an episode.
	pub fn clears_session(&self) -> bool {
		!matches!(self, Self::Abandoned)
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] http::Error),
	/// Request path cannot be resolved against the base URL.
	#[error("Request target `{target}` is not a valid URL.")]
	InvalidTarget {
		/// Offending path or URL.
		target: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request payload could not be serialized.
	#[error("Request payload could not be serialized.")]
	Payload(#[from] serde_json::Error),
	/// Stored credential is not a valid header value.
	#[error("Stored credential contains characters that cannot appear in an HTTP header.")]
	InvalidCredential,
	/// Client configuration failed validation.
	#[error(transparent)]
	Client(#[from] crate::config::ClientConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Response body did not match the expected JSON shape.
#[derive(Debug, ThisError)]
#[error("Response body could not be decoded at `{}`.", .source.path())]
pub struct DecodeError {
	/// Structured parsing failure, including the JSON path.
	#[source]
	pub source: serde_path_to_error::Error<serde_json::Error>,
	/// HTTP status of the response, when available.
	pub status: Option<u16>,
}
