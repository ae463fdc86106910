//! Request dispatcher: resolves targets, attaches the bearer credential, and classifies
//! responses.

// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, TokenSecret},
	config::ClientConfig,
	http::{ApiRequest, ApiResponse, HttpTransport},
	store::CredentialStore,
};

/// Outcome of one [`Dispatcher::dispatch`] call.
#[derive(Debug)]
pub struct Dispatched {
	/// Response for 2xx statuses, [`Error::Http`] or a local failure otherwise.
	pub result: Result<ApiResponse>,
	/// Whether a bearer credential went out with the request.
	pub authenticated: bool,
}

/// Sends [`ApiRequest`]s through an [`HttpTransport`].
///
/// The access credential is read from the store on every call and never cached here. A
/// credential pinned on the request (by the replayer) takes precedence over the store. Either
/// way it is only attached when its attributes permit the target URL.
pub struct Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	config: Arc<ClientConfig>,
}
impl<T> Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a dispatcher over the given transport and store.
	pub fn new(
		transport: Arc<T>,
		store: Arc<dyn CredentialStore>,
		config: Arc<ClientConfig>,
	) -> Self {
		Self { transport, store, config }
	}

	/// Underlying transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Sends `request` once.
	///
	/// Returns the response for 2xx statuses and [`Error::Http`] for everything else; 401 is
	/// reported like any other status so the caller can route it to the refresh cycle.
	pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
		self.dispatch(request).await.result
	}

	/// Sends `request` once and reports whether a credential was attached.
	///
	/// Only a 401 on an authenticated request says anything about the stored session; a 401 on
	/// an anonymous one belongs to the caller.
	pub async fn dispatch(&self, request: &ApiRequest) -> Dispatched {
		let url = match self.config.resolve(&request.path) {
			Ok(url) => url,
			Err(e) => return Dispatched { result: Err(e.into()), authenticated: false },
		};
		let credential = self.credential_for(request, &url).await;
		let authenticated = credential.is_some();
		let result = self.execute(request, &url, credential.as_ref()).await;

		Dispatched { result, authenticated }
	}

	async fn execute(
		&self,
		request: &ApiRequest,
		url: &Url,
		credential: Option<&TokenSecret>,
	) -> Result<ApiResponse> {
		let outbound = request.to_http(url, &self.config.default_headers, credential)?;
		let response = self.transport.execute(outbound).await?;

		if response.status.is_success() {
			return Ok(response);
		}

		let ApiResponse { status, headers, body } = response;

		Err(Error::Http { status, request: request.descriptor(), headers, body })
	}

	async fn credential_for(&self, request: &ApiRequest, url: &Url) -> Option<TokenSecret> {
		let origin = self.config.origin();

		if let Some(pinned) = request.pinned_credential() {
			return self.config.access_attributes.permits(origin, url).then(|| pinned.clone());
		}

		let stored = self.store.get(&self.config.store_key(CredentialKind::Access)).await?;

		stored.attributes.permits(origin, url).then_some(stored.secret)
	}
}
impl<T> Debug for Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher").field("base_url", &self.config.base_url().as_str()).finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::{StatusCode, header::AUTHORIZATION};
	// self
	use super::*;
	use crate::{_preludet::*, store::{CredentialAttributes, MemoryStore}};

	fn dispatcher(
		config: ClientConfig,
	) -> (Dispatcher<ScriptedTransport>, Arc<ScriptedTransport>, Arc<MemoryStore>) {
		let transport = Arc::new(ScriptedTransport::default());
		let store = Arc::new(MemoryStore::default());
		let dispatcher = Dispatcher::new(transport.clone(), store.clone(), Arc::new(config));

		(dispatcher, transport, store)
	}

	fn local() -> ClientConfig {
		ClientConfig::builder("http://localhost:8000").build().expect("Config should build.")
	}

	#[tokio::test]
	async fn attaches_stored_access_token() {
		let config = local();
		let (dispatcher, transport, store) = dispatcher(config.clone());

		seed_credentials(&store, &config, Some("access-1"), None).await;
		transport.respond("/api/cats/", 200, "[]");

		let dispatched = dispatcher.dispatch(&ApiRequest::get("/api/cats/")).await;

		assert!(dispatched.authenticated);

		let response = dispatched.result.expect("Send should succeed.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(transport.calls()[0].authorization.as_deref(), Some("Bearer access-1"));
		assert_eq!(transport.calls()[0].headers["content-type"], "application/json");
	}

	#[tokio::test]
	async fn sends_anonymously_without_a_token() {
		let (dispatcher, transport, _store) = dispatcher(local());

		transport.respond("/api/cats/", 200, "[]");
		dispatcher.send(&ApiRequest::get("/api/cats/")).await.expect("Send should succeed.");

		assert_eq!(transport.calls()[0].authorization, None);
	}

	#[tokio::test]
	async fn pinned_credential_wins_over_store() {
		let config = local();
		let (dispatcher, transport, store) = dispatcher(config.clone());

		seed_credentials(&store, &config, Some("stored"), None).await;
		transport.respond("/api/cats/", 200, "[]");

		let request = ApiRequest::get("/api/cats/")
			.header(AUTHORIZATION, http::HeaderValue::from_static("Bearer caller"))
			.with_credential(TokenSecret::new("pinned"));

		dispatcher.send(&request).await.expect("Send should succeed.");

		assert_eq!(transport.calls()[0].authorization.as_deref(), Some("Bearer pinned"));
	}

	#[tokio::test]
	async fn secure_token_is_withheld_from_plain_http() {
		let config = ClientConfig::builder("http://localhost:8000")
			.access_attributes(CredentialAttributes::access(true))
			.build()
			.expect("Config should build.");
		let (dispatcher, transport, store) = dispatcher(config.clone());

		seed_credentials(&store, &config, Some("access-1"), None).await;
		transport.respond("/api/cats/", 200, "[]");

		let dispatched = dispatcher.dispatch(&ApiRequest::get("/api/cats/")).await;

		dispatched.result.expect("Send should succeed.");

		assert!(!dispatched.authenticated);
		assert_eq!(transport.calls()[0].authorization, None);
	}

	#[tokio::test]
	async fn token_is_not_sent_cross_origin() {
		let config = local();
		let (dispatcher, transport, store) = dispatcher(config.clone());

		seed_credentials(&store, &config, Some("access-1"), None).await;
		transport.respond("/assets/cat.png", 200, "png");

		let dispatched =
			dispatcher.dispatch(&ApiRequest::get("http://cdn.localhost:9000/assets/cat.png")).await;

		dispatched.result.expect("Send should succeed.");

		assert!(!dispatched.authenticated);
		assert_eq!(transport.calls()[0].authorization, None);
	}

	#[tokio::test]
	async fn non_success_carries_status_and_request() {
		let (dispatcher, transport, _store) = dispatcher(local());

		transport.respond("/api/cats/9/", 404, r#"{"detail":"Not found."}"#);

		let err = dispatcher
			.send(&ApiRequest::delete("/api/cats/9/"))
			.await
			.expect_err("A 404 should surface as an error.");

		match err {
			Error::Http { status, request, body, .. } => {
				assert_eq!(status, StatusCode::NOT_FOUND);
				assert_eq!(request.to_string(), "DELETE /api/cats/9/");
				assert_eq!(body.as_ref(), br#"{"detail":"Not found."}"#);
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn transport_failures_propagate() {
		let (dispatcher, transport, _store) = dispatcher(local());

		transport.fail("/api/cats/");

		let err = dispatcher
			.send(&ApiRequest::get("/api/cats/"))
			.await
			.expect_err("A network failure should surface.");

		assert!(matches!(err, Error::Transport(_)));
	}
}
