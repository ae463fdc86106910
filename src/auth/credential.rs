//! Credential kinds and the access/refresh pair that makes up a session.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Identifies which half of the session a stored credential belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
	/// Short-lived bearer token attached to API calls.
	Access,
	/// Longer-lived token exchanged for a new access token.
	Refresh,
}
impl CredentialKind {
	/// Every kind, in the order a session is cleared.
	pub const ALL: [CredentialKind; 2] = [CredentialKind::Access, CredentialKind::Refresh];

	/// Returns the stable slot name used by stores.
	pub const fn slot(self) -> &'static str {
		match self {
			CredentialKind::Access => "access_token",
			CredentialKind::Refresh => "refresh_token",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.slot())
	}
}

/// Snapshot of the credentials currently held for one origin. Either half may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCredentials {
	/// Current access credential.
	pub access: Option<TokenSecret>,
	/// Current refresh credential.
	pub refresh: Option<TokenSecret>,
}
impl SessionCredentials {
	/// Returns the credential for `kind`.
	pub fn get(&self, kind: CredentialKind) -> Option<&TokenSecret> {
		match kind {
			CredentialKind::Access => self.access.as_ref(),
			CredentialKind::Refresh => self.refresh.as_ref(),
		}
	}

	/// Returns `true` when neither credential is present.
	pub fn is_empty(&self) -> bool {
		self.access.is_none() && self.refresh.is_none()
	}
}

/// Token pair returned by login and registration endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPair {
	/// Newly issued access credential.
	pub access: TokenSecret,
	/// Newly issued refresh credential.
	pub refresh: TokenSecret,
}
