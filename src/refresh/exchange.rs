//! Token exchange: trades the refresh credential for a new access credential.

// crates.io
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header::CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, TokenSecret},
	config::ClientConfig,
	error::{ConfigError, DecodeError, ExpiryCause, TransportError},
	http::{self as transport, HttpTransport},
	store::CredentialAttributes,
};

/// Boxed future returned by [`TokenExchanger::exchange`].
pub type ExchangeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenSecret, ExchangeError>> + 'a + Send>>;

/// Exchanges a refresh credential for a new access credential.
///
/// Implementations perform exactly one call per invocation and never retry; the coordinator
/// treats every error as terminal for the episode.
pub trait TokenExchanger
where
	Self: Send + Sync,
{
	/// Performs the exchange.
	fn exchange<'a>(&'a self, refresh: &'a TokenSecret) -> ExchangeFuture<'a>;
}

/// Failures raised by a token exchange.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Endpoint answered with a non-2xx status.
	#[error("Token exchange endpoint answered with HTTP status {status}.")]
	Rejected {
		/// Response status.
		status: StatusCode,
		/// Response body.
		body: Bytes,
	},
	/// Endpoint could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Endpoint answered 2xx without an `access` token.
	#[error(transparent)]
	Decode(#[from] DecodeError),
	/// Exchange request could not be built.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Refresh credential attributes do not permit sending it to the endpoint.
	#[error("Refresh token may not be sent to {endpoint}.")]
	Withheld {
		/// Exchange endpoint URL.
		endpoint: Url,
	},
}
impl ExchangeError {
	/// Cause reported to every caller of the failed episode.
	pub fn cause(&self) -> ExpiryCause {
		match self {
			Self::Rejected { status, .. } => ExpiryCause::ExchangeRejected { status: status.as_u16() },
			other => ExpiryCause::ExchangeFailed { message: other.to_string() },
		}
	}
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
	refresh: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
	access: TokenSecret,
}

/// [`TokenExchanger`] that posts `{"refresh": ..}` to the configured endpoint.
///
/// The call carries no `Authorization` header and bypasses the dispatcher, so a rejected
/// exchange can never start another episode. The refresh credential is only posted when its
/// attributes permit the endpoint. Any rotated refresh token in the response is ignored.
pub struct HttpTokenExchange<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	endpoint: Url,
	origin: String,
	attributes: CredentialAttributes,
	headers: HeaderMap,
}
impl<T> HttpTokenExchange<T>
where
	T: ?Sized + HttpTransport,
{
	/// Targets the refresh endpoint declared in `config`.
	pub fn new(transport: Arc<T>, config: &ClientConfig) -> Result<Self, ConfigError> {
		let endpoint = config.resolve(&config.endpoints.refresh)?;
		let mut headers = config.default_headers.clone();

		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(Self {
			transport,
			endpoint,
			origin: config.origin().to_owned(),
			attributes: config.attributes(CredentialKind::Refresh),
			headers,
		})
	}

	/// Exchange endpoint URL.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	fn build_request(&self, refresh: &TokenSecret) -> Result<http::Request<Bytes>, ConfigError> {
		let body = serde_json::to_vec(&ExchangeRequest { refresh: refresh.expose() })?;
		let mut request = http::Request::builder()
			.method(Method::POST)
			.uri(self.endpoint.as_str())
			.body(Bytes::from(body))?;

		*request.headers_mut() = self.headers.clone();

		Ok(request)
	}
}
impl<T> TokenExchanger for HttpTokenExchange<T>
where
	T: ?Sized + HttpTransport,
{
	fn exchange<'a>(&'a self, refresh: &'a TokenSecret) -> ExchangeFuture<'a> {
		Box::pin(async move {
			if !self.attributes.permits(&self.origin, &self.endpoint) {
				return Err(ExchangeError::Withheld { endpoint: self.endpoint.clone() });
			}

			let request = self.build_request(refresh)?;
			let response = self.transport.execute(request).await?;

			if !response.status.is_success() {
				return Err(ExchangeError::Rejected { status: response.status, body: response.body });
			}

			let payload: ExchangeResponse =
				transport::decode_json(&response.body, Some(response.status))?;

			Ok(payload.access)
		})
	}
}
impl<T> Debug for HttpTokenExchange<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpTokenExchange").field("endpoint", &self.endpoint.as_str()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::ScriptedTransport, config::Environment};

	fn config() -> ClientConfig {
		ClientConfig::builder("http://localhost:8000").build().expect("Config should build.")
	}

	#[tokio::test]
	async fn posts_refresh_and_reads_access() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.respond("/api/accounts/token/refresh/", 200, r#"{"access":"new123"}"#);

		let exchange =
			HttpTokenExchange::new(transport.clone(), &config()).expect("Exchange should build.");
		let access = exchange
			.exchange(&TokenSecret::new("refresh-1"))
			.await
			.expect("Exchange should succeed.");

		assert_eq!(access.expose(), "new123");

		let calls = transport.calls();

		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].method, Method::POST);
		assert_eq!(calls[0].url, "http://localhost:8000/api/accounts/token/refresh/");
		assert_eq!(calls[0].authorization, None);
		assert_eq!(calls[0].body.as_ref(), br#"{"refresh":"refresh-1"}"#);
	}

	#[tokio::test]
	async fn non_success_status_is_rejected() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.respond("/api/accounts/token/refresh/", 400, r#"{"detail":"Token is invalid"}"#);

		let exchange =
			HttpTokenExchange::new(transport.clone(), &config()).expect("Exchange should build.");
		let err = exchange
			.exchange(&TokenSecret::new("refresh-1"))
			.await
			.expect_err("A 400 should reject the exchange.");

		assert_eq!(err.cause(), ExpiryCause::ExchangeRejected { status: 400 });
	}

	#[tokio::test]
	async fn missing_access_field_is_a_decode_failure() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.respond("/api/accounts/token/refresh/", 200, r#"{"token":"x"}"#);

		let exchange =
			HttpTokenExchange::new(transport.clone(), &config()).expect("Exchange should build.");
		let err = exchange
			.exchange(&TokenSecret::new("refresh-1"))
			.await
			.expect_err("A payload without access should fail.");

		assert!(matches!(err, ExchangeError::Decode(_)));
		assert!(matches!(err.cause(), ExpiryCause::ExchangeFailed { .. }));
	}

	#[tokio::test]
	async fn secure_refresh_token_never_goes_over_plain_http() {
		let transport = Arc::new(ScriptedTransport::default());
		let config = ClientConfig::builder("http://127.0.0.1:8000")
			.environment(Environment::Production)
			.build()
			.expect("Loopback config should build.");

		transport.respond("/api/accounts/token/refresh/", 200, r#"{"access":"new123"}"#);

		let exchange =
			HttpTokenExchange::new(transport.clone(), &config).expect("Exchange should build.");
		let err = exchange
			.exchange(&TokenSecret::new("refresh-1"))
			.await
			.expect_err("A secure refresh token should be withheld from plain http.");

		assert!(matches!(err, ExchangeError::Withheld { .. }));
		assert!(matches!(err.cause(), ExpiryCause::ExchangeFailed { .. }));
		assert!(transport.calls().is_empty());
	}
}
