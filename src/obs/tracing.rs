// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by client flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_relay.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Refresh-episode transitions worth a debug event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodeEvent {
	/// This caller flipped Idle to Refreshing.
	Started,
	/// This caller joined the waiter queue at the given position.
	Queued(usize),
	/// The episode settled with a fresh access credential.
	Renewed,
	/// The episode settled with a terminal failure.
	Expired,
	/// The leader was dropped before the episode settled.
	Abandoned,
}

/// Emits a debug event for an episode transition (when tracing is enabled).
pub fn record_episode_event(event: EpisodeEvent, waiters: usize) {
	#[cfg(feature = "tracing")]
	{
		match event {
			EpisodeEvent::Started => tracing::debug!("refresh episode started"),
			EpisodeEvent::Queued(position) =>
				tracing::debug!(position, "request queued behind active refresh episode"),
			EpisodeEvent::Renewed => tracing::debug!(waiters, "refresh episode renewed the session"),
			EpisodeEvent::Expired => tracing::warn!(waiters, "refresh episode expired the session"),
			EpisodeEvent::Abandoned =>
				tracing::warn!(waiters, "refresh episode abandoned before settling"),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (event, waiters);
	}
}
