//! Refresh coordination: one token exchange per expiry episode, with queued waiters.
//!
//! [`RefreshCoordinator`] is a two-state machine. The first caller that reports a 401 while
//! the coordinator is Idle flips it to Refreshing and becomes the episode leader; the flip
//! happens under a mutex with no `.await` in between, so concurrent callers can never start a
//! second exchange. Callers arriving while an episode runs push a one-shot slot onto a FIFO
//! queue and suspend. When the leader settles the episode, the state returns to Idle and every
//! slot is fulfilled, in arrival order, with the same outcome the leader observed.

mod exchange;
mod metrics;

pub use exchange::*;
pub use metrics::RefreshMetrics;

// std
use std::mem;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, TokenSecret},
	config::ClientConfig,
	error::ExpiryCause,
	obs::{self, EpisodeEvent, FlowKind, FlowOutcome, FlowSpan},
	store::{CredentialAttributes, CredentialStore, StoreKey},
};

/// Result every participant of an episode receives.
pub type EpisodeOutcome = Result<TokenSecret, ExpiryCause>;

type Waiter = oneshot::Sender<EpisodeOutcome>;

#[derive(Default)]
enum EpisodeState {
	#[default]
	Idle,
	Refreshing {
		waiters: Vec<Waiter>,
	},
}

enum Role {
	Leader,
	Waiter(oneshot::Receiver<EpisodeOutcome>),
}

/// Owns the refresh state for one origin and serializes token exchanges.
pub struct RefreshCoordinator {
	store: Arc<dyn CredentialStore>,
	exchanger: Arc<dyn TokenExchanger>,
	origin: String,
	access_key: StoreKey,
	refresh_key: StoreKey,
	access_attributes: CredentialAttributes,
	state: Mutex<EpisodeState>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	/// Creates an Idle coordinator for the origin described by `config`.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		exchanger: Arc<dyn TokenExchanger>,
		config: &ClientConfig,
	) -> Self {
		Self {
			store,
			exchanger,
			origin: config.origin().to_owned(),
			access_key: config.store_key(CredentialKind::Access),
			refresh_key: config.store_key(CredentialKind::Refresh),
			access_attributes: config.access_attributes,
			state: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Shares an existing metrics recorder.
	pub fn with_metrics(mut self, metrics: Arc<RefreshMetrics>) -> Self {
		self.metrics = metrics;

		self
	}

	/// Counters for this coordinator.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns `true` while an episode is running.
	pub fn is_refreshing(&self) -> bool {
		matches!(*self.state.lock(), EpisodeState::Refreshing { .. })
	}

	/// Number of callers queued behind the running episode.
	pub fn queued(&self) -> usize {
		match &*self.state.lock() {
			EpisodeState::Idle => 0,
			EpisodeState::Refreshing { waiters } => waiters.len(),
		}
	}

	/// Obtains a fresh access credential after a 401.
	///
	/// Starts an episode when Idle, otherwise waits for the running one. On success the new
	/// credential is already in the store when this returns; on failure both credentials have
	/// been cleared (unless the episode was abandoned).
	pub async fn authorize(&self) -> EpisodeOutcome {
		match self.join_or_lead() {
			Role::Waiter(slot) => slot.await.unwrap_or(Err(ExpiryCause::Abandoned)),
			Role::Leader => {
				const KIND: FlowKind = FlowKind::Refresh;

				let mut episode = Episode { coordinator: self, settled: false };

				obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

				let outcome =
					FlowSpan::new(KIND, "authorize").instrument(self.run_exchange()).await;

				obs::record_result(KIND, &outcome);
				episode.settle(outcome.clone());

				outcome
			},
		}
	}

	/// Clears both credentials for this origin, ignoring storage failures.
	pub async fn expire_session(&self) {
		let _ = <dyn CredentialStore>::clear_session(self.store.as_ref(), &self.origin).await;
	}

	fn join_or_lead(&self) -> Role {
		let mut state = self.state.lock();

		if let EpisodeState::Refreshing { waiters } = &mut *state {
			let (slot, receiver) = oneshot::channel();

			waiters.push(slot);
			self.metrics.record_waiter();
			obs::record_episode_event(EpisodeEvent::Queued(waiters.len()), waiters.len());

			return Role::Waiter(receiver);
		}

		*state = EpisodeState::Refreshing { waiters: Vec::new() };

		self.metrics.record_episode();
		obs::record_episode_event(EpisodeEvent::Started, 0);

		Role::Leader
	}

	async fn run_exchange(&self) -> EpisodeOutcome {
		let cause = match self.store.get(&self.refresh_key).await {
			Some(refresh) => match self.renew(&refresh.secret).await {
				Ok(access) => return Ok(access),
				Err(cause) => cause,
			},
			None => ExpiryCause::MissingRefreshToken,
		};

		if cause.clears_session() {
			self.expire_session().await;
		}

		Err(cause)
	}

	async fn renew(&self, refresh: &TokenSecret) -> EpisodeOutcome {
		self.metrics.record_exchange();

		let access = self.exchanger.exchange(refresh).await.map_err(|e| e.cause())?;

		self.store
			.set(self.access_key.clone(), access.clone(), self.access_attributes)
			.await
			.map_err(|e| ExpiryCause::ExchangeFailed {
				message: format!("Renewed access token could not be stored: {e}"),
			})?;

		Ok(access)
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("origin", &self.origin)
			.field("refreshing", &self.is_refreshing())
			.field("queued", &self.queued())
			.finish()
	}
}

/// Leader-side handle for the running episode. Dropping it unsettled abandons the episode.
struct Episode<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl Episode<'_> {
	fn settle(&mut self, outcome: EpisodeOutcome) {
		self.settled = true;

		let state = mem::take(&mut *self.coordinator.state.lock());
		let waiters = match state {
			EpisodeState::Refreshing { waiters } => waiters,
			EpisodeState::Idle => Vec::new(),
		};
		let metrics = &self.coordinator.metrics;
		let event = match &outcome {
			Ok(_) => {
				metrics.record_success();

				EpisodeEvent::Renewed
			},
			Err(ExpiryCause::Abandoned) => {
				metrics.record_failure();

				EpisodeEvent::Abandoned
			},
			Err(_) => {
				metrics.record_failure();

				EpisodeEvent::Expired
			},
		};

		obs::record_episode_event(event, waiters.len());

		for waiter in waiters {
			let _ = waiter.send(outcome.clone());
		}
	}
}
impl Drop for Episode<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.settle(Err(ExpiryCause::Abandoned));
		}
	}
}
