//! Simple file-backed [`CredentialStore`] for CLIs and long-running agents.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	store::{
		CredentialAttributes, CredentialStore, LookupFuture, StoreError, StoreFuture, StoreKey,
		StoredCredential,
	},
};

type Snapshot = HashMap<StoreKey, StoredCredential>;

/// Persists credentials to a JSON file after each mutation.
///
/// Expired entries read as absent; reading one evicts it and rewrites the file.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entries: Vec<(StoreKey, StoredCredential)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(entries.into_iter().collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &mut Snapshot) -> Result<(), StoreError> {
		let now = OffsetDateTime::now_utc();

		contents.retain(|_, stored| !stored.is_expired_at(now));

		Self::ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.iter().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn get<'a>(&'a self, key: &'a StoreKey) -> LookupFuture<'a> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			{
				let guard = self.inner.read();

				match guard.get(key) {
					Some(stored) if !stored.is_expired_at(now) => return Some(stored.clone()),
					Some(_) => (),
					None => return None,
				}
			}

			let mut guard = self.inner.write();

			if guard.get(key).is_some_and(|stored| stored.is_expired_at(now)) {
				guard.remove(key);

				// Lookups cannot fail; the next successful write retries the prune.
				let _ = self.persist_locked(&mut guard);
			}

			None
		})
	}

	fn set(
		&self,
		key: StoreKey,
		token: TokenSecret,
		attributes: CredentialAttributes,
	) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let stored = StoredCredential::new(token, attributes, OffsetDateTime::now_utc());
			let mut guard = self.inner.write();

			guard.insert(key, stored);

			self.persist_locked(&mut guard)
		})
	}

	fn clear<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.remove(key).is_none() {
				return Ok(());
			}

			self.persist_locked(&mut guard)
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::auth::CredentialKind;

	fn temp_path(label: &str) -> PathBuf {
		let unique = format!(
			"session_relay_file_store_{label}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path("reload");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let key = StoreKey::new("https://api.example.com", CredentialKind::Refresh);
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.set(
			key.clone(),
			TokenSecret::new("refresh-1"),
			CredentialAttributes::refresh(true),
		))
		.expect("Failed to save fixture credential to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.get(&key))
			.expect("File store lost credential after reopen.");

		assert_eq!(fetched.secret.expose(), "refresh-1");
		assert!(fetched.attributes.secure);
		assert_eq!(fetched.attributes.max_age, CredentialAttributes::REFRESH_MAX_AGE);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn clear_removes_credential_from_disk() {
		let path = temp_path("clear");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let key = StoreKey::new("http://localhost:8000", CredentialKind::Access);
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.set(
			key.clone(),
			TokenSecret::new("access-1"),
			CredentialAttributes::access(false),
		))
		.expect("Failed to save fixture credential to file store.");
		rt.block_on(store.clear(&key)).expect("Clearing a stored credential should succeed.");
		rt.block_on(store.clear(&key)).expect("Clearing an absent credential should succeed.");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert!(rt.block_on(reopened.get(&key)).is_none());

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn expired_entry_is_evicted_from_disk_on_read() {
		let path = temp_path("evict");
		let key = StoreKey::new("http://localhost:8000", CredentialKind::Access);
		let now = OffsetDateTime::now_utc();
		let expired = StoredCredential::new(
			TokenSecret::new("stale"),
			CredentialAttributes::access(false),
			now - Duration::days(2),
		);
		let snapshot = serde_json::to_vec(&vec![(&key, &expired)])
			.expect("Failed to serialize fixture snapshot.");

		fs::write(&path, snapshot).expect("Failed to write fixture snapshot.");

		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		assert!(store.inner.read().contains_key(&key));
		assert!(rt.block_on(store.get(&key)).is_none());
		assert!(!store.inner.read().contains_key(&key));

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert!(!reopened.inner.read().contains_key(&key));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn expired_entries_read_as_absent() {
		let path = temp_path("expired");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let key = StoreKey::new("http://localhost:8000", CredentialKind::Access);
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let attributes = CredentialAttributes::access(false).with_max_age(Duration::ZERO);

		rt.block_on(store.set(key.clone(), TokenSecret::new("gone"), attributes))
			.expect("Failed to save fixture credential to file store.");

		assert!(rt.block_on(store.get(&key)).is_none());

		let _ = fs::remove_file(&path);
	}
}
