//! Session-aware API client that drives the dispatch, refresh, and replay cycle.

// crates.io
use http::StatusCode;
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
use crate::{
	_prelude::*,
	config::ClientConfig,
	dispatch::{Dispatched, Dispatcher},
	error::ExpiryCause,
	http::{ApiRequest, ApiResponse, HttpTransport, RequestDescriptor},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{HttpTokenExchange, RefreshCoordinator, RefreshMetrics, TokenExchanger},
	replay::{self, PendingRequest},
	store::CredentialStore,
};

/// Session client backed by [`ReqwestTransport`].
#[cfg(feature = "reqwest")]
pub type ReqwestSessionClient = SessionClient<ReqwestTransport>;

/// Sends API requests with the stored bearer credential and renews the session on 401.
///
/// Every request goes through the same cycle:
///
/// 1. The dispatcher attaches the current access credential and sends the request.
/// 2. A 401 on a first attempt that carried a credential hands the request to the
///    [`RefreshCoordinator`]. Only one token exchange runs per expiry episode; concurrent 401s
///    queue behind it. A 401 on an anonymous request is returned as [`Error::Http`].
/// 3. Once the episode renews the session the request is replayed exactly once with the new
///    credential. A 401 on the replay, or a failed episode, clears the session and surfaces
///    [`Error::SessionExpired`].
///
/// Errors other than 401 are returned unchanged and never touch the stored credentials.
pub struct SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	pub(crate) config: Arc<ClientConfig>,
	pub(crate) store: Arc<dyn CredentialStore>,
	pub(crate) dispatcher: Dispatcher<T>,
	pub(crate) coordinator: Arc<RefreshCoordinator>,
}
#[cfg(feature = "reqwest")]
impl SessionClient<ReqwestTransport> {
	/// Creates a client with a default reqwest transport (redirects disabled).
	pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
		Self::with_transport(config, store, Arc::new(ReqwestTransport::new()?))
	}
}
impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client over a caller-supplied transport.
	///
	/// The token exchange shares the same transport and targets
	/// [`Endpoints::refresh`](crate::config::Endpoints::refresh).
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		transport: Arc<T>,
	) -> Result<Self> {
		let exchanger = Arc::new(HttpTokenExchange::new(transport.clone(), &config)?);

		Ok(Self::with_exchanger(config, store, transport, exchanger))
	}

	/// Creates a client with a custom [`TokenExchanger`].
	pub fn with_exchanger(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		transport: Arc<T>,
		exchanger: Arc<dyn TokenExchanger>,
	) -> Self {
		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), exchanger, &config));
		let config = Arc::new(config);
		let dispatcher = Dispatcher::new(transport, store.clone(), config.clone());

		Self { config, store, dispatcher, coordinator }
	}

	/// Client configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Credential store shared with the coordinator.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Refresh coordinator owning this client's episode state.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	/// Sends `request` through the full session cycle.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = FlowSpan::new(KIND, "send").instrument(self.dispatch(request)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Sends a `GET` to `path`.
	pub async fn get(&self, path: impl Into<String>) -> Result<ApiResponse> {
		self.send(ApiRequest::get(path)).await
	}

	/// Sends a `GET` to `path` and decodes the JSON response.
	pub async fn get_json<R>(&self, path: impl Into<String>) -> Result<R>
	where
		R: DeserializeOwned,
	{
		Ok(self.get(path).await?.json()?)
	}

	/// Sends a `POST` with a JSON body.
	pub async fn post_json<B>(&self, path: impl Into<String>, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(ApiRequest::post(path).json(body)?).await
	}

	/// Sends a `PUT` with a JSON body.
	pub async fn put_json<B>(&self, path: impl Into<String>, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(ApiRequest::put(path).json(body)?).await
	}

	/// Sends a `PATCH` with a JSON body.
	pub async fn patch_json<B>(&self, path: impl Into<String>, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(ApiRequest::patch(path).json(body)?).await
	}

	/// Sends a `DELETE` to `path`.
	pub async fn delete(&self, path: impl Into<String>) -> Result<ApiResponse> {
		self.send(ApiRequest::delete(path)).await
	}

	async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
		match self.dispatcher.dispatch(&request).await {
			Dispatched { result: Err(e), authenticated: true } if e.is_unauthorized() =>
				self.recover(PendingRequest::new(request)).await,
			Dispatched { result, .. } => result,
		}
	}

	async fn recover(&self, pending: PendingRequest) -> Result<ApiResponse> {
		if pending.is_exhausted() {
			return Err(self.expire(ExpiryCause::RetryRejected, pending.descriptor()).await);
		}

		let credential = self
			.coordinator
			.authorize()
			.await
			.map_err(|cause| Error::SessionExpired { cause, request: pending.descriptor() })?;

		match replay::replay(&self.dispatcher, pending, credential).await {
			Dispatched { result: Err(Error::Http { status, request, .. }), authenticated: true }
				if status == StatusCode::UNAUTHORIZED =>
				Err(self.expire(ExpiryCause::RetryRejected, request).await),
			Dispatched { result, .. } => result,
		}
	}

	async fn expire(&self, cause: ExpiryCause, request: RequestDescriptor) -> Error {
		#[cfg(feature = "tracing")]
		tracing::warn!(%request, %cause, "session expired");

		// A running episode owns the session; its outcome decides what stays stored.
		if cause.clears_session() && !self.coordinator.is_refreshing() {
			self.coordinator.expire_session().await;
		}

		Error::SessionExpired { cause, request }
	}
}
impl<T> Debug for SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionClient")
			.field("base_url", &self.config.base_url().as_str())
			.field("environment", &self.config.environment)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::Method;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{CredentialKind, TokenSecret},
		config::{ClientConfig, Environment},
	};

	const CATS: &str = "/api/cats/";
	const PROFILE: &str = "/api/accounts/profile/";
	const REFRESH: &str = "/api/accounts/token/refresh/";

	fn exposed(secret: Option<TokenSecret>) -> Option<String> {
		secret.map(|secret| secret.expose().to_owned())
	}

	async fn stored(fixture: &ScriptedSession, kind: CredentialKind) -> Option<String> {
		fixture
			.store
			.get(&fixture.client.config().store_key(kind))
			.await
			.map(|stored| stored.secret.expose().to_owned())
	}

	fn renewing(fixture: &ScriptedSession) {
		fixture.transport.respond_when(CATS, "Bearer old", 401, r#"{"detail":"expired"}"#);
		fixture.transport.respond_when(CATS, "Bearer new123", 200, r#"[{"name":"Tom"}]"#);
		fixture.transport.respond(REFRESH, 200, r#"{"access":"new123"}"#);
	}

	#[tokio::test]
	async fn unauthorized_request_is_renewed_and_replayed() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("refresh-1")).await;

		renewing(&fixture);

		let response = fixture.client.get(CATS).await.expect("Request should recover.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(response.text(), r#"[{"name":"Tom"}]"#);

		let calls = fixture.transport.calls();
		let trail: Vec<_> =
			calls.iter().map(|call| (call.path.as_str(), call.authorization.as_deref())).collect();

		assert_eq!(trail, vec![
			(CATS, Some("Bearer old")),
			(REFRESH, None),
			(CATS, Some("Bearer new123")),
		]);
		assert_eq!(stored(&fixture, CredentialKind::Access).await.as_deref(), Some("new123"));
		assert_eq!(stored(&fixture, CredentialKind::Refresh).await.as_deref(), Some("refresh-1"));
	}

	#[tokio::test]
	async fn replay_keeps_method_and_body() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("refresh-1")).await;

		renewing(&fixture);
		fixture
			.client
			.post_json(CATS, &serde_json::json!({ "name": "Tom" }))
			.await
			.expect("Request should recover.");

		let replays = fixture.transport.calls_to(CATS);

		assert_eq!(replays.len(), 2);

		for call in replays {
			assert_eq!(call.method, Method::POST);
			assert_eq!(call.body.as_ref(), br#"{"name":"Tom"}"#);
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_unauthorized_requests_share_one_refresh() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("refresh-1")).await;

		renewing(&fixture);

		let gate = fixture.transport.gate(REFRESH);
		let client = Arc::new(fixture.client);
		let handles: Vec<_> = (0..3)
			.map(|_| {
				let client = client.clone();

				tokio::spawn(async move { client.get(CATS).await })
			})
			.collect();

		while client.coordinator().queued() < 2 {
			tokio::task::yield_now().await;
		}

		gate.open();

		for handle in handles {
			let response = handle
				.await
				.expect("Request task should not panic.")
				.expect("Every request should recover.");

			assert_eq!(response.status, StatusCode::OK);
		}

		let calls = fixture.transport.calls();

		assert_eq!(calls.iter().filter(|call| call.path == REFRESH).count(), 1);
		assert_eq!(
			calls
				.iter()
				.filter(|call| call.authorization.as_deref() == Some("Bearer new123"))
				.count(),
			3
		);
		assert_eq!(client.metrics().episodes(), 1);
		assert_eq!(client.metrics().waiters(), 2);
	}

	#[tokio::test]
	async fn rejected_refresh_expires_the_session() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("revoked")).await;

		fixture.transport.respond(CATS, 401, "");
		fixture.transport.respond(REFRESH, 401, r#"{"detail":"Token is blacklisted"}"#);

		let err = fixture.client.get(CATS).await.expect_err("Request should fail.");

		assert!(err.is_session_expired());
		assert_eq!(err.expiry_cause(), Some(&ExpiryCause::ExchangeRejected { status: 401 }));
		assert_eq!(stored(&fixture, CredentialKind::Access).await, None);
		assert_eq!(stored(&fixture, CredentialKind::Refresh).await, None);
		assert_eq!(fixture.transport.calls_to(CATS).len(), 1);
	}

	#[tokio::test]
	async fn replay_rejection_is_terminal() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("refresh-1")).await;

		fixture.transport.respond(CATS, 401, "");
		fixture.transport.respond(REFRESH, 200, r#"{"access":"new123"}"#);

		let err = fixture.client.get(CATS).await.expect_err("Request should fail.");

		assert_eq!(err.expiry_cause(), Some(&ExpiryCause::RetryRejected));
		assert!(err.request().is_some_and(|request| request.retried));
		assert_eq!(fixture.transport.calls_to(REFRESH).len(), 1);
		assert_eq!(fixture.transport.calls_to(CATS).len(), 2);
		assert_eq!(stored(&fixture, CredentialKind::Access).await, None);
		assert_eq!(stored(&fixture, CredentialKind::Refresh).await, None);
	}

	#[tokio::test]
	async fn retried_request_never_refreshes() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("refresh-1")).await;

		fixture.transport.respond(CATS, 401, "");

		let err = fixture
			.client
			.send(ApiRequest::get(CATS).mark_retried())
			.await
			.expect_err("Request should fail.");

		assert_eq!(err.expiry_cause(), Some(&ExpiryCause::RetryRejected));
		assert!(fixture.transport.calls_to(REFRESH).is_empty());
		assert_eq!(stored(&fixture, CredentialKind::Refresh).await, None);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn retried_rejection_leaves_a_running_episode_alone() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("refresh-1")).await;

		renewing(&fixture);
		fixture.transport.respond(PROFILE, 401, "");

		let gate = fixture.transport.gate(REFRESH);
		let client = Arc::new(fixture.client);
		let leader = {
			let client = client.clone();

			tokio::spawn(async move { client.get(CATS).await })
		};

		while !client.coordinator().is_refreshing() {
			tokio::task::yield_now().await;
		}

		let err = client
			.send(ApiRequest::get(PROFILE).mark_retried())
			.await
			.expect_err("A retried request should not be renewed.");

		assert_eq!(err.expiry_cause(), Some(&ExpiryCause::RetryRejected));
		assert_eq!(exposed(client.credentials().await.refresh).as_deref(), Some("refresh-1"));

		gate.open();

		let response = leader
			.await
			.expect("Leader task should not panic.")
			.expect("The running episode should still renew the session.");

		assert_eq!(response.status, StatusCode::OK);

		let credentials = client.credentials().await;

		assert_eq!(exposed(credentials.access).as_deref(), Some("new123"));
		assert_eq!(exposed(credentials.refresh).as_deref(), Some("refresh-1"));
	}

	#[tokio::test]
	async fn anonymous_unauthorized_response_is_returned_as_is() {
		let fixture = ScriptedSession::seeded(Some("good"), Some("refresh-1")).await;

		fixture.transport.respond("/asset", 401, "");

		let err = fixture
			.client
			.get("http://cdn.localhost:9000/asset")
			.await
			.expect_err("A third-party 401 should surface.");

		assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
		assert!(!err.is_session_expired());
		assert_eq!(fixture.transport.calls().len(), 1);
		assert_eq!(fixture.transport.calls()[0].authorization, None);
		assert_eq!(stored(&fixture, CredentialKind::Access).await.as_deref(), Some("good"));
		assert_eq!(stored(&fixture, CredentialKind::Refresh).await.as_deref(), Some("refresh-1"));
	}

	#[tokio::test]
	async fn withheld_secure_token_never_triggers_an_exchange() {
		let config = ClientConfig::builder("http://127.0.0.1:8000")
			.environment(Environment::Production)
			.build()
			.expect("Loopback config should build.");
		let fixture = ScriptedSession::with_config(config, Some("good"), Some("refresh-1")).await;

		fixture.transport.respond(CATS, 401, "");

		let err = fixture.client.get(CATS).await.expect_err("The 401 should surface.");

		assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
		assert!(!err.is_session_expired());
		assert!(fixture.transport.calls_to(REFRESH).is_empty());
		assert_eq!(stored(&fixture, CredentialKind::Access).await.as_deref(), Some("good"));
		assert_eq!(stored(&fixture, CredentialKind::Refresh).await.as_deref(), Some("refresh-1"));
	}

	#[tokio::test]
	async fn missing_refresh_token_expires_without_exchange() {
		let fixture = ScriptedSession::seeded(Some("old"), None).await;

		fixture.transport.respond(CATS, 401, "");

		let err = fixture.client.get(CATS).await.expect_err("Request should fail.");

		assert_eq!(err.expiry_cause(), Some(&ExpiryCause::MissingRefreshToken));
		assert!(fixture.transport.calls_to(REFRESH).is_empty());
		assert_eq!(stored(&fixture, CredentialKind::Access).await, None);
	}

	#[tokio::test]
	async fn other_failures_pass_through_untouched() {
		let fixture = ScriptedSession::seeded(Some("old"), Some("refresh-1")).await;

		fixture.transport.respond(CATS, 500, "boom");

		let err = fixture.client.get(CATS).await.expect_err("Request should fail.");

		assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
		assert!(!err.is_session_expired());
		assert!(fixture.transport.calls_to(REFRESH).is_empty());
		assert_eq!(stored(&fixture, CredentialKind::Access).await.as_deref(), Some("old"));
		assert_eq!(stored(&fixture, CredentialKind::Refresh).await.as_deref(), Some("refresh-1"));
	}

	#[tokio::test]
	async fn get_json_decodes_success_bodies() {
		#[derive(Debug, Deserialize, PartialEq)]
		struct Cat {
			name: String,
		}

		let fixture = ScriptedSession::seeded(Some("new123"), Some("refresh-1")).await;

		renewing(&fixture);

		let cats: Vec<Cat> = fixture.client.get_json(CATS).await.expect("Request should succeed.");

		assert_eq!(cats, vec![Cat { name: "Tom".into() }]);
		assert!(fixture.transport.calls_to(REFRESH).is_empty());
	}
}
