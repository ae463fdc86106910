//! Credential storage contracts, cookie-style attributes, and built-in store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, SessionCredentials, TokenSecret},
};

/// Boxed future returned by fallible [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;
/// Boxed future returned by [`CredentialStore::get`]; lookups never fail.
pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = Option<StoredCredential>> + 'a + Send>>;

/// Storage backend contract for per-origin session credentials.
///
/// Implementations hold at most one credential per [`StoreKey`]. A lookup of a key that was
/// never written, was cleared, or outlived its [`CredentialAttributes::max_age`] yields `None`;
/// stores are expected to evict expired entries when they notice them.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the live credential stored under `key`, if any.
	fn get<'a>(&'a self, key: &'a StoreKey) -> LookupFuture<'a>;

	/// Stores or replaces the credential under `key`.
	fn set(
		&self,
		key: StoreKey,
		token: TokenSecret,
		attributes: CredentialAttributes,
	) -> StoreFuture<'_, ()>;

	/// Removes the credential under `key`. Clearing an absent key succeeds.
	fn clear<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, ()>;
}
impl dyn CredentialStore {
	/// Reads both credentials for `origin`.
	pub async fn snapshot(&self, origin: &str) -> SessionCredentials {
		let access = self.get(&StoreKey::new(origin, CredentialKind::Access)).await;
		let refresh = self.get(&StoreKey::new(origin, CredentialKind::Refresh)).await;

		SessionCredentials {
			access: access.map(|stored| stored.secret),
			refresh: refresh.map(|stored| stored.secret),
		}
	}

	/// Clears both credentials for `origin`, attempting each slot even if one fails.
	pub async fn clear_session(&self, origin: &str) -> Result<(), StoreError> {
		let mut first_error = None;

		for kind in CredentialKind::ALL {
			if let Err(e) = self.clear(&StoreKey::new(origin, kind)).await {
				first_error.get_or_insert(e);
			}
		}

		first_error.map_or(Ok(()), Err)
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Cross-site sending policy for a stored credential.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SameSite {
	/// Only sent to the origin that stored it.
	Strict,
	/// Only sent to the origin that stored it for API subrequests.
	#[default]
	Lax,
	/// Sent to any origin.
	None,
}

/// Expiry and transport attributes recorded alongside a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialAttributes {
	/// How long the credential stays readable after it is stored.
	pub max_age: Duration,
	/// Restricts the credential to `https` targets.
	pub secure: bool,
	/// Cross-site sending policy.
	pub same_site: SameSite,
}
impl CredentialAttributes {
	/// Default lifetime of a stored access credential.
	pub const ACCESS_MAX_AGE: Duration = Duration::days(1);
	/// Default lifetime of a stored refresh credential.
	pub const REFRESH_MAX_AGE: Duration = Duration::days(7);

	/// Attributes for an access credential.
	pub const fn access(secure: bool) -> Self {
		Self { max_age: Self::ACCESS_MAX_AGE, secure, same_site: SameSite::Lax }
	}

	/// Attributes for a refresh credential.
	pub const fn refresh(secure: bool) -> Self {
		Self { max_age: Self::REFRESH_MAX_AGE, secure, same_site: SameSite::Lax }
	}

	/// Overrides the lifetime.
	pub fn with_max_age(mut self, max_age: Duration) -> Self {
		self.max_age = max_age;

		self
	}

	/// Overrides the cross-site policy.
	pub fn with_same_site(mut self, same_site: SameSite) -> Self {
		self.same_site = same_site;

		self
	}

	/// Decides whether a credential stored for `origin` may accompany a request to `target`.
	pub fn permits(&self, origin: &str, target: &Url) -> bool {
		if self.secure && target.scheme() != "https" {
			return false;
		}

		self.same_site == SameSite::None || target.origin().ascii_serialization() == origin
	}
}

/// Credential value plus the attributes and timestamps it was stored with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
	/// Credential value.
	pub secret: TokenSecret,
	/// Attributes supplied when the credential was stored.
	pub attributes: CredentialAttributes,
	/// Instant the credential was stored.
	pub stored_at: OffsetDateTime,
	/// Instant after which the credential reads as absent.
	pub expires_at: OffsetDateTime,
}
impl StoredCredential {
	/// Stamps a credential stored at `now`.
	pub fn new(secret: TokenSecret, attributes: CredentialAttributes, now: OffsetDateTime) -> Self {
		Self { secret, attributes, stored_at: now, expires_at: now + attributes.max_age }
	}

	/// Returns `true` once the credential has outlived its max age.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}

/// Unique key identifying one stored credential.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
	/// ASCII serialization of the owning origin, e.g. `https://api.example.com`.
	pub origin: String,
	/// Credential slot.
	pub kind: CredentialKind,
}
impl StoreKey {
	/// Builds a key from an already-serialized origin.
	pub fn new(origin: impl Into<String>, kind: CredentialKind) -> Self {
		Self { origin: origin.into(), kind }
	}

	/// Builds a key for the origin of `url`.
	pub fn for_url(url: &Url, kind: CredentialKind) -> Self {
		Self::new(url.origin().ascii_serialization(), kind)
	}
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}#{}", self.origin, self.kind)
	}
}
