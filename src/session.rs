//! Session lifecycle: login, registration, logout, and restore.
//!
//! Login and registration are sent through the dispatcher directly. They never enter the
//! refresh cycle, so bad credentials surface as a plain [`Error::Http`] with status 401. The
//! profile load that follows a login is an ordinary authenticated request.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, SessionCredentials, TokenPair},
	client::SessionClient,
	http::{ApiRequest, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

#[derive(Serialize)]
struct LoginRequest<'a> {
	username: &'a str,
	password: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse<U> {
	user: U,
	tokens: TokenPair,
}

impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Authenticates with username and password, stores both credentials, and returns the
	/// decoded profile.
	///
	/// A failed profile load is returned as-is; the stored credentials stay in place unless the
	/// refresh cycle expired them.
	pub async fn login<U>(&self, username: &str, password: &str) -> Result<U>
	where
		U: DeserializeOwned,
	{
		const KIND: FlowKind = FlowKind::Session;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result =
			FlowSpan::new(KIND, "login").instrument(self.exchange_login(username, password)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Creates an account, stores the issued credentials, and returns the decoded user.
	///
	/// The endpoint answers `{"user": .., "tokens": {"access": .., "refresh": ..}}`.
	pub async fn register<P, U>(&self, payload: &P) -> Result<U>
	where
		P: ?Sized + Serialize,
		U: DeserializeOwned,
	{
		const KIND: FlowKind = FlowKind::Session;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = FlowSpan::new(KIND, "register").instrument(self.create_account(payload)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Clears both stored credentials.
	pub async fn logout(&self) -> Result<()> {
		self.store.clear_session(self.config.origin()).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(origin = self.config.origin(), "session cleared");

		Ok(())
	}

	/// Reloads the current user from the profile endpoint.
	///
	/// Returns `Ok(None)` without any network call when no access credential is stored. The
	/// profile request takes the full refresh-aware path; if it still fails, both credentials
	/// are cleared and the error is returned.
	pub async fn restore<U>(&self) -> Result<Option<U>>
	where
		U: DeserializeOwned,
	{
		if self.store.get(&self.config.store_key(CredentialKind::Access)).await.is_none() {
			return Ok(None);
		}

		match self.get_json(self.config.endpoints.profile.clone()).await {
			Ok(user) => Ok(Some(user)),
			Err(e) => {
				self.coordinator.expire_session().await;

				Err(e)
			},
		}
	}

	/// Snapshot of the credentials currently stored for this origin.
	pub async fn credentials(&self) -> SessionCredentials {
		self.store.snapshot(self.config.origin()).await
	}

	async fn exchange_login<U>(&self, username: &str, password: &str) -> Result<U>
	where
		U: DeserializeOwned,
	{
		let request = ApiRequest::post(self.config.endpoints.login.clone())
			.json(&LoginRequest { username, password })?;
		let tokens: TokenPair = self.dispatcher.send(&request).await?.json()?;

		self.store_tokens(tokens).await?;
		self.get_json(self.config.endpoints.profile.clone()).await
	}

	async fn create_account<P, U>(&self, payload: &P) -> Result<U>
	where
		P: ?Sized + Serialize,
		U: DeserializeOwned,
	{
		let request = ApiRequest::post(self.config.endpoints.register.clone()).json(payload)?;
		let RegisterResponse { user, tokens } =
			self.dispatcher.send(&request).await?.json::<RegisterResponse<U>>()?;

		self.store_tokens(tokens).await?;

		Ok(user)
	}

	async fn store_tokens(&self, tokens: TokenPair) -> Result<()> {
		let TokenPair { access, refresh } = tokens;
		let pairs = [(CredentialKind::Access, access), (CredentialKind::Refresh, refresh)];

		for (kind, secret) in pairs {
			self.store
				.set(self.config.store_key(kind), secret, self.config.attributes(kind))
				.await?;
		}

		Ok(())
	}
}
