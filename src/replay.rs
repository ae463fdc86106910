//! Retry replayer: re-submits a request that failed with 401 once a fresh credential exists.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	dispatch::{Dispatched, Dispatcher},
	http::{ApiRequest, HttpTransport, RequestDescriptor},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// A request held back while its refresh episode runs.
///
/// The original request is kept untouched; [`PendingRequest::into_replay`] derives the single
/// retry from it.
#[derive(Clone, Debug)]
pub struct PendingRequest {
	request: ApiRequest,
}
impl PendingRequest {
	/// Holds `request` for replay.
	pub fn new(request: ApiRequest) -> Self {
		Self { request }
	}

	/// The request as originally issued.
	pub fn request(&self) -> &ApiRequest {
		&self.request
	}

	/// Returns `true` when the held request is itself a replay and must not be retried again.
	pub fn is_exhausted(&self) -> bool {
		self.request.is_retried()
	}

	/// Describes the held request for error reporting.
	pub fn descriptor(&self) -> RequestDescriptor {
		self.request.descriptor()
	}

	/// Builds the retry: same method, target, headers, and body, with `credential` pinned and the
	/// retried marker set.
	pub fn into_replay(self, credential: TokenSecret) -> ApiRequest {
		self.request.with_credential(credential).mark_retried()
	}
}

/// Sends the retry for `pending` exactly once and returns its outcome unchanged.
///
/// A 401 here comes back as [`Error::Http`]; classifying it as terminal is the caller's job.
pub async fn replay<T>(
	dispatcher: &Dispatcher<T>,
	pending: PendingRequest,
	credential: TokenSecret,
) -> Dispatched
where
	T: ?Sized + HttpTransport,
{
	const KIND: FlowKind = FlowKind::Replay;

	let request = pending.into_replay(credential);

	obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

	let dispatched = FlowSpan::new(KIND, "replay").instrument(dispatcher.dispatch(&request)).await;

	obs::record_result(KIND, &dispatched.result);

	dispatched
}
