//! Transport primitives: request/response models and the pluggable HTTP transport seam.
//!
//! The client never talks to an HTTP stack directly. It lowers every [`ApiRequest`] into an
//! [`http::Request`] with an absolute URI and hands it to an [`HttpTransport`]. The crate ships
//! [`ReqwestTransport`] behind the default `reqwest` feature; tests and embedders can supply
//! their own implementation.

// crates.io
use bytes::Bytes;
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, DecodeError, TransportError},
};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing a fully-built request.
///
/// Implementations must not follow redirects: a redirect that drops the `Authorization`
/// header would otherwise read as a spurious 401.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the whole response body.
	fn execute(&self, request: http::Request<Bytes>) -> TransportFuture<'_>;
}

/// Outbound API call as described by the caller.
///
/// The request is kept independent of any credential so it can be replayed verbatim: the
/// dispatcher decides the `Authorization` value at send time.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the configured base URL, or an absolute URL.
	pub path: String,
	/// Caller-supplied headers; any `Authorization` entry is replaced at send time.
	pub headers: HeaderMap,
	/// Raw request body.
	pub body: Bytes,
	retried: bool,
	credential: Option<TokenSecret>,
}
impl ApiRequest {
	/// Creates a bodiless request.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: HeaderMap::new(),
			body: Bytes::new(),
			retried: false,
			credential: None,
		}
	}

	/// `GET` shortcut.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` shortcut.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` shortcut.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH` shortcut.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE` shortcut.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets a raw body.
	pub fn body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();

		self
	}

	/// Serializes `payload` as the JSON body and sets the content type.
	pub fn json<T>(mut self, payload: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(payload).map_err(ConfigError::from)?;

		self.body = Bytes::from(body);
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Sets the retried marker. A retried request never enters the refresh cycle again.
	pub fn mark_retried(mut self) -> Self {
		self.retried = true;

		self
	}

	/// Returns `true` once the request has been replayed after a refresh.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	/// Credential pinned for this attempt, if any.
	pub fn pinned_credential(&self) -> Option<&TokenSecret> {
		self.credential.as_ref()
	}

	/// Lightweight description used in error reports.
	pub fn descriptor(&self) -> RequestDescriptor {
		RequestDescriptor {
			method: self.method.clone(),
			path: self.path.clone(),
			retried: self.retried,
		}
	}

	pub(crate) fn with_credential(mut self, credential: TokenSecret) -> Self {
		self.credential = Some(credential);

		self
	}

	/// Lowers the request into an [`http::Request`] against `url`.
	pub(crate) fn to_http(
		&self,
		url: &Url,
		defaults: &HeaderMap,
		credential: Option<&TokenSecret>,
	) -> Result<http::Request<Bytes>> {
		let mut headers = defaults.clone();

		for (name, value) in &self.headers {
			headers.insert(name.clone(), value.clone());
		}

		headers.remove(AUTHORIZATION);

		if let Some(credential) = credential {
			let mut value = HeaderValue::try_from(credential.bearer())
				.map_err(|_| ConfigError::InvalidCredential)?;

			value.set_sensitive(true);
			headers.insert(AUTHORIZATION, value);
		}

		let mut request = http::Request::builder()
			.method(self.method.clone())
			.uri(url.as_str())
			.body(self.body.clone())
			.map_err(ConfigError::from)?;

		*request.headers_mut() = headers;

		Ok(request)
	}
}

/// Method, path, and retry state of a request, attached to every failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Path or URL as supplied by the caller.
	pub path: String,
	/// Whether the failing attempt was a replay.
	pub retried: bool,
}
impl Display for RequestDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} {}", self.method, self.path)?;

		if self.retried {
			f.write_str(" (retried)")?;
		}

		Ok(())
	}
}

/// Fully-buffered HTTP response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Response status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body.
	pub body: Bytes,
}
impl ApiResponse {
	/// Creates a response from its parts.
	pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
		Self { status, headers, body: body.into() }
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T, DecodeError>
	where
		T: DeserializeOwned,
	{
		decode_json(&self.body, Some(self.status))
	}

	/// Returns the body as UTF-8 text, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

pub(crate) fn decode_json<T>(body: &[u8], status: Option<StatusCode>) -> Result<T, DecodeError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de)
		.map_err(|source| DecodeError { source, status: status.map(|s| s.as_u16()) })
}

/// Thin wrapper around [`ReqwestClient`] implementing [`HttpTransport`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with redirects disabled.
	pub fn new() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`]. Configure it to disable redirects.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: http::Request<Bytes>) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request).map_err(TransportError::network)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?;

			Ok(ApiResponse { status, headers, body })
		})
	}
}
