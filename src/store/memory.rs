//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	store::{
		CredentialAttributes, CredentialStore, LookupFuture, StoreError, StoreFuture, StoreKey,
		StoredCredential,
	},
};

type StoreMap = Arc<RwLock<HashMap<StoreKey, StoredCredential>>>;

/// Thread-safe storage backend that keeps credentials in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of live (unexpired) credentials currently held.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();

		self.0.read().values().filter(|stored| !stored.is_expired_at(now)).count()
	}

	/// Returns `true` when no live credential is held.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Inserts a pre-built entry, bypassing the clock; handy for expiry fixtures.
	pub fn insert_stored(&self, key: StoreKey, stored: StoredCredential) {
		self.0.write().insert(key, stored);
	}

	fn get_now(map: &StoreMap, key: &StoreKey, now: OffsetDateTime) -> Option<StoredCredential> {
		{
			let guard = map.read();

			match guard.get(key) {
				Some(stored) if !stored.is_expired_at(now) => return Some(stored.clone()),
				Some(_) => (),
				None => return None,
			}
		}

		let mut guard = map.write();

		if guard.get(key).is_some_and(|stored| stored.is_expired_at(now)) {
			guard.remove(key);
		}

		None
	}

	fn set_now(
		map: &StoreMap,
		key: StoreKey,
		token: TokenSecret,
		attributes: CredentialAttributes,
	) -> Result<(), StoreError> {
		let stored = StoredCredential::new(token, attributes, OffsetDateTime::now_utc());

		map.write().insert(key, stored);

		Ok(())
	}
}
impl CredentialStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a StoreKey) -> LookupFuture<'a> {
		Box::pin(async move { Self::get_now(&self.0, key, OffsetDateTime::now_utc()) })
	}

	fn set(
		&self,
		key: StoreKey,
		token: TokenSecret,
		attributes: CredentialAttributes,
	) -> StoreFuture<'_, ()> {
		Box::pin(async move { Self::set_now(&self.0, key, token, attributes) })
	}

	fn clear<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(key);

			Ok(())
		})
	}
}
