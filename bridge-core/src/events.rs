//! Format-change notifications for downstream consumers.
//!
//! The state machine pushes [`FormatEvent`]s into an [`EventSink`]. Delivery
//! is best effort and never blocks the poll tick: the channel-backed sink
//! drops the oldest queued event when a subscriber falls behind.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pubsub::{self, ImmediatePublisher, PubSubChannel, Subscriber};

/// Events queued per subscriber before the oldest is overwritten.
pub const FORMAT_EVENT_DEPTH: usize = 4;
/// Maximum concurrent format-change subscribers.
pub const MAX_FORMAT_SUBSCRIBERS: usize = 4;
/// Publishers; only the bridge core publishes.
const MAX_FORMAT_PUBLISHERS: usize = 1;

/// Edge-triggered notification about the incoming video format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormatEvent {
    /// A stable signal was found and its timing is available.
    FormatDetected,
    /// The stable signal went away.
    SignalLost,
    /// The stable signal changed format.
    SignalChanged,
}

impl fmt::Display for FormatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormatEvent::FormatDetected => "format-detected",
            FormatEvent::SignalLost => "signal-lost",
            FormatEvent::SignalChanged => "signal-changed",
        })
    }
}

/// Receives notifications from the bridge core. Must not block.
pub trait EventSink {
    fn notify(&mut self, event: FormatEvent);
}

/// Sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn notify(&mut self, _event: FormatEvent) {}
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn notify(&mut self, event: FormatEvent) {
        (**self).notify(event);
    }
}

/// Channel type carrying format events to subscribers.
pub type FormatEventChannel<M> = PubSubChannel<
    M,
    FormatEvent,
    FORMAT_EVENT_DEPTH,
    MAX_FORMAT_SUBSCRIBERS,
    MAX_FORMAT_PUBLISHERS,
>;

/// Subscription handle returned by [`FormatEvents::subscribe`].
pub type FormatSubscriber<'a, M> = Subscriber<
    'a,
    M,
    FormatEvent,
    FORMAT_EVENT_DEPTH,
    MAX_FORMAT_SUBSCRIBERS,
    MAX_FORMAT_PUBLISHERS,
>;

/// Broadcast bus shared by the bridge core and its consumers.
pub struct FormatEvents<M: RawMutex> {
    channel: FormatEventChannel<M>,
}

impl<M: RawMutex> FormatEvents<M> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channel: PubSubChannel::new(),
        }
    }

    /// Returns the sink the bridge core publishes through.
    #[must_use]
    pub fn sink(&self) -> ChannelEventSink<'_, M> {
        ChannelEventSink {
            publisher: self.channel.immediate_publisher(),
        }
    }

    /// Registers a new consumer.
    ///
    /// # Errors
    ///
    /// Fails once [`MAX_FORMAT_SUBSCRIBERS`] subscriptions are live.
    pub fn subscribe(&self) -> Result<FormatSubscriber<'_, M>, pubsub::Error> {
        self.channel.subscriber()
    }
}

impl<M: RawMutex> Default for FormatEvents<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`EventSink`] backed by a [`FormatEventChannel`].
pub struct ChannelEventSink<'a, M: RawMutex> {
    publisher: ImmediatePublisher<
        'a,
        M,
        FormatEvent,
        FORMAT_EVENT_DEPTH,
        MAX_FORMAT_SUBSCRIBERS,
        MAX_FORMAT_PUBLISHERS,
    >,
}

impl<M: RawMutex> EventSink for ChannelEventSink<'_, M> {
    fn notify(&mut self, event: FormatEvent) {
        self.publisher.publish_immediate(event);
    }
}
