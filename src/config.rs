//! Client configuration: API location, endpoint paths, environment, and credential attributes.

// crates.io
use http::{HeaderMap, HeaderValue, header::CONTENT_TYPE};
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::CredentialKind,
	error::ConfigError,
	store::{CredentialAttributes, StoreKey},
};

/// Environment variable holding the API base URL.
pub const API_URL_VAR: &str = "SESSION_RELAY_API_URL";
/// Environment variable selecting [`Environment`].
pub const ENVIRONMENT_VAR: &str = "SESSION_RELAY_ENV";
/// Base URL used when [`API_URL_VAR`] is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Deployment environment. Controls the transport-security flag on stored credentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	/// Local development; credentials may travel over plain `http`.
	#[default]
	Development,
	/// Anything deployed; credentials are restricted to `https`.
	Production,
}
impl Environment {
	/// Whether credentials stored in this environment carry the secure flag.
	pub const fn secure_transport(self) -> bool {
		matches!(self, Environment::Production)
	}

	/// Returns a stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Environment::Development => "development",
			Environment::Production => "production",
		}
	}
}
impl FromStr for Environment {
	type Err = ClientConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"production" | "prod" => Ok(Self::Production),
			"development" | "dev" | "local" | "test" => Ok(Self::Development),
			_ => Err(ClientConfigError::UnknownEnvironment { value: s.to_owned() }),
		}
	}
}
impl Display for Environment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Errors raised while validating a [`ClientConfig`].
#[derive(Debug, ThisError)]
pub enum ClientConfigError {
	/// Base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than `http` or `https`.
	#[error("Base URL scheme `{scheme}` is not supported.")]
	UnsupportedScheme {
		/// Offending scheme.
		scheme: String,
	},
	/// Base URL cannot have paths joined onto it.
	#[error("Base URL cannot be used as a base for request paths.")]
	CannotBeABase,
	/// Production deployments must talk to a remote API over `https`.
	#[error("Base URL `{url}` must use https in production.")]
	InsecureBaseUrl {
		/// Offending base URL.
		url: String,
	},
	/// An endpoint path is empty.
	#[error("The {endpoint} endpoint path is empty.")]
	EmptyEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
	},
	/// Environment label is not recognized.
	#[error("Environment `{value}` is not recognized.")]
	UnknownEnvironment {
		/// Offending label.
		value: String,
	},
}

/// Paths of the session endpoints, relative to the base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
	/// Token exchange endpoint.
	pub refresh: String,
	/// Username/password login endpoint.
	pub login: String,
	/// Account registration endpoint.
	pub register: String,
	/// Current-user profile endpoint.
	pub profile: String,
}
impl Default for Endpoints {
	fn default() -> Self {
		Self {
			refresh: "/api/accounts/token/refresh/".into(),
			login: "/api/accounts/login/".into(),
			register: "/api/accounts/register/".into(),
			profile: "/api/accounts/profile/".into(),
		}
	}
}

/// Validated client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	base_url: Url,
	origin: String,
	/// Session endpoint paths.
	pub endpoints: Endpoints,
	/// Deployment environment.
	pub environment: Environment,
	/// Attributes applied when storing the access credential.
	pub access_attributes: CredentialAttributes,
	/// Attributes applied when storing the refresh credential.
	pub refresh_attributes: CredentialAttributes,
	/// Headers sent with every request unless the request overrides them.
	pub default_headers: HeaderMap,
}
impl ClientConfig {
	/// Starts a builder for the API at `base_url`.
	pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Builds a configuration from [`API_URL_VAR`] and [`ENVIRONMENT_VAR`].
	pub fn from_env() -> Result<Self, ClientConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Builds a configuration from an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let base_url = lookup(API_URL_VAR)
			.filter(|value| !value.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_API_URL.to_owned());
		let environment = match lookup(ENVIRONMENT_VAR) {
			Some(label) if !label.trim().is_empty() => label.parse()?,
			_ => Environment::default(),
		};

		Self::builder(base_url).environment(environment).build()
	}

	/// API base URL.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// ASCII serialization of the API origin; credentials are stored under it.
	pub fn origin(&self) -> &str {
		&self.origin
	}

	/// Store key for `kind` under the API origin.
	pub fn store_key(&self, kind: CredentialKind) -> StoreKey {
		StoreKey::new(self.origin.clone(), kind)
	}

	/// Attributes used when storing `kind`.
	pub fn attributes(&self, kind: CredentialKind) -> CredentialAttributes {
		match kind {
			CredentialKind::Access => self.access_attributes,
			CredentialKind::Refresh => self.refresh_attributes,
		}
	}

	/// Resolves a request path (or absolute URL) against the base URL.
	pub fn resolve(&self, target: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(target)
			.map_err(|source| ConfigError::InvalidTarget { target: target.to_owned(), source })
	}
}

/// Builder for [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct ClientConfigBuilder {
	base_url: String,
	endpoints: Endpoints,
	environment: Environment,
	access_attributes: Option<CredentialAttributes>,
	refresh_attributes: Option<CredentialAttributes>,
	default_headers: HeaderMap,
}
impl ClientConfigBuilder {
	fn new(base_url: impl Into<String>) -> Self {
		let mut default_headers = HeaderMap::new();

		default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Self {
			base_url: base_url.into(),
			endpoints: Endpoints::default(),
			environment: Environment::default(),
			access_attributes: None,
			refresh_attributes: None,
			default_headers,
		}
	}

	/// Sets the deployment environment.
	pub fn environment(mut self, environment: Environment) -> Self {
		self.environment = environment;

		self
	}

	/// Replaces every endpoint path.
	pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides the token exchange path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.endpoints.refresh = path.into();

		self
	}

	/// Overrides the access credential attributes (defaults follow the environment).
	pub fn access_attributes(mut self, attributes: CredentialAttributes) -> Self {
		self.access_attributes = Some(attributes);

		self
	}

	/// Overrides the refresh credential attributes (defaults follow the environment).
	pub fn refresh_attributes(mut self, attributes: CredentialAttributes) -> Self {
		self.refresh_attributes = Some(attributes);

		self
	}

	/// Replaces the default headers.
	pub fn default_headers(mut self, headers: HeaderMap) -> Self {
		self.default_headers = headers;

		self
	}

	/// Validates the configuration.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		let base_url = Url::parse(self.base_url.trim())
			.map_err(|source| ClientConfigError::InvalidBaseUrl { source })?;

		if !matches!(base_url.scheme(), "http" | "https") {
			return Err(ClientConfigError::UnsupportedScheme { scheme: base_url.scheme().into() });
		}
		if base_url.cannot_be_a_base() {
			return Err(ClientConfigError::CannotBeABase);
		}
		if self.environment == Environment::Production
			&& base_url.scheme() != "https"
			&& !is_loopback(&base_url)
		{
			return Err(ClientConfigError::InsecureBaseUrl { url: base_url.to_string() });
		}

		for (endpoint, path) in [
			("refresh", &self.endpoints.refresh),
			("login", &self.endpoints.login),
			("register", &self.endpoints.register),
			("profile", &self.endpoints.profile),
		] {
			if path.trim().is_empty() {
				return Err(ClientConfigError::EmptyEndpoint { endpoint });
			}
		}

		let secure = self.environment.secure_transport();
		let origin = base_url.origin().ascii_serialization();

		Ok(ClientConfig {
			base_url,
			origin,
			endpoints: self.endpoints,
			environment: self.environment,
			access_attributes: self
				.access_attributes
				.unwrap_or_else(|| CredentialAttributes::access(secure)),
			refresh_attributes: self
				.refresh_attributes
				.unwrap_or_else(|| CredentialAttributes::refresh(secure)),
			default_headers: self.default_headers,
		})
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}
