//! Bearer-session HTTP client: attach access tokens, coordinate a single refresh per expiry
//! episode, and replay queued requests once the session is renewed.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod replay;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// crates.io
	use bytes::Bytes;
	use http::{HeaderMap, Method, StatusCode, header::AUTHORIZATION};
	use tokio::sync::Semaphore;
	// self
	use crate::{
		auth::{CredentialKind, TokenSecret},
		client::SessionClient,
		config::ClientConfig,
		error::TransportError,
		http::{ApiResponse, HttpTransport, TransportFuture},
		store::{CredentialStore, MemoryStore},
	};

	/// Request observed by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct RecordedCall {
		/// HTTP method.
		pub method: Method,
		/// Absolute request URL.
		pub url: String,
		/// URL path component.
		pub path: String,
		/// `Authorization` header value, if any.
		pub authorization: Option<String>,
		/// All request headers.
		pub headers: HeaderMap,
		/// Request body.
		pub body: Bytes,
	}

	#[derive(Clone)]
	enum Reply {
		Respond { status: StatusCode, body: Bytes },
		Fail,
	}

	struct Route {
		path: String,
		authorization: Option<String>,
		reply: Reply,
	}

	/// Holds requests to one path until [`Gate::open`] is called.
	#[derive(Clone, Debug)]
	pub struct Gate(Arc<Semaphore>);
	impl Gate {
		/// Releases every held and future request.
		pub fn open(&self) {
			self.0.close();
		}
	}

	/// In-process [`HttpTransport`] that answers from a route table and records every call.
	///
	/// Routes match on path, optionally narrowed to one exact `Authorization` value; narrowed
	/// routes win. Unmatched requests get an empty 404.
	#[derive(Default)]
	pub struct ScriptedTransport {
		routes: Mutex<Vec<Route>>,
		calls: Mutex<Vec<RecordedCall>>,
		gates: Mutex<HashMap<String, Gate>>,
	}
	impl ScriptedTransport {
		/// Answers every request to `path` with `status` and `body`.
		pub fn respond(&self, path: &str, status: u16, body: impl Into<Bytes>) {
			self.push(path, None, Reply::Respond { status: status_code(status), body: body.into() });
		}

		/// Answers requests to `path` carrying exactly `authorization`.
		pub fn respond_when(
			&self,
			path: &str,
			authorization: &str,
			status: u16,
			body: impl Into<Bytes>,
		) {
			self.push(
				path,
				Some(authorization.to_owned()),
				Reply::Respond { status: status_code(status), body: body.into() },
			);
		}

		/// Fails every request to `path` with a network error.
		pub fn fail(&self, path: &str) {
			self.push(path, None, Reply::Fail);
		}

		/// Holds requests to `path` until the returned gate opens. Calls are recorded before they
		/// block.
		pub fn gate(&self, path: &str) -> Gate {
			let gate = Gate(Arc::new(Semaphore::new(0)));

			self.gates.lock().insert(path.to_owned(), gate.clone());

			gate
		}

		/// Every call observed so far, in arrival order.
		pub fn calls(&self) -> Vec<RecordedCall> {
			self.calls.lock().clone()
		}

		/// Calls observed for `path`.
		pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
			self.calls.lock().iter().filter(|call| call.path == path).cloned().collect()
		}

		fn push(&self, path: &str, authorization: Option<String>, reply: Reply) {
			self.routes.lock().push(Route { path: path.to_owned(), authorization, reply });
		}

		fn route(&self, path: &str, authorization: Option<&str>) -> Option<Reply> {
			let routes = self.routes.lock();
			let narrowed = routes.iter().rev().find(|route| {
				route.path == path
					&& route.authorization.is_some()
					&& route.authorization.as_deref() == authorization
			});
			let route = narrowed.or_else(|| {
				routes.iter().rev().find(|route| route.path == path && route.authorization.is_none())
			});

			route.map(|route| route.reply.clone())
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: http::Request<Bytes>) -> TransportFuture<'_> {
			let (parts, body) = request.into_parts();
			let path = parts.uri.path().to_owned();
			let authorization = parts
				.headers
				.get(AUTHORIZATION)
				.and_then(|value| value.to_str().ok())
				.map(ToOwned::to_owned);
			let reply = self.route(&path, authorization.as_deref());
			let gate = self.gates.lock().get(&path).cloned();

			self.calls.lock().push(RecordedCall {
				method: parts.method,
				url: parts.uri.to_string(),
				path,
				authorization,
				headers: parts.headers,
				body,
			});

			Box::pin(async move {
				if let Some(Gate(semaphore)) = gate {
					// Closing the semaphore is the release signal.
					let _ = semaphore.acquire().await;
				}

				match reply {
					Some(Reply::Respond { status, body }) =>
						Ok(ApiResponse::new(status, HeaderMap::new(), body)),
					Some(Reply::Fail) => Err(TransportError::network(std::io::Error::new(
						std::io::ErrorKind::ConnectionRefused,
						"scripted connection failure",
					))),
					None => Ok(ApiResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), Bytes::new())),
				}
			})
		}
	}

	/// A [`SessionClient`] wired to a [`ScriptedTransport`] and a [`MemoryStore`].
	pub struct ScriptedSession {
		/// Client under test.
		pub client: SessionClient<ScriptedTransport>,
		/// Transport shared with the client.
		pub transport: Arc<ScriptedTransport>,
		/// Store shared with the client.
		pub store: Arc<MemoryStore>,
	}
	impl ScriptedSession {
		/// Builds a client for `http://localhost:8000` and seeds the given credentials.
		pub async fn seeded(access: Option<&str>, refresh: Option<&str>) -> Self {
			let config = ClientConfig::builder("http://localhost:8000")
				.build()
				.expect("Local config fixture should build.");

			Self::with_config(config, access, refresh).await
		}

		/// Builds a client for `config` and seeds the given credentials.
		pub async fn with_config(
			config: ClientConfig,
			access: Option<&str>,
			refresh: Option<&str>,
		) -> Self {
			let transport = Arc::new(ScriptedTransport::default());
			let store = Arc::new(MemoryStore::default());

			seed_credentials(&store, &config, access, refresh).await;

			let client = SessionClient::with_transport(config, store.clone(), transport.clone())
				.expect("Scripted client should build.");

			Self { client, transport, store }
		}
	}

	/// Writes the given credentials with the attributes `config` assigns them.
	pub async fn seed_credentials(
		store: &MemoryStore,
		config: &ClientConfig,
		access: Option<&str>,
		refresh: Option<&str>,
	) {
		for (kind, value) in [(CredentialKind::Access, access), (CredentialKind::Refresh, refresh)] {
			if let Some(value) = value {
				store
					.set(config.store_key(kind), TokenSecret::new(value), config.attributes(kind))
					.await
					.expect("Seeding a credential should succeed.");
			}
		}
	}

	fn status_code(status: u16) -> StatusCode {
		StatusCode::from_u16(status).expect("Scripted status should be a valid HTTP status.")
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
