//! Event Source trait and implementations
//!
//! Implement `EventSource` to feed a session. Each session asks for a fresh,
//! finite stream; an `Err` item ends the session with an `error` frame.

use futures::stream::{self, BoxStream, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Identity;
use crate::event::StreamEvent;

/// One event plus the pause to take before pulling the next one
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// The event to emit
    pub event: StreamEvent,
    /// Cooperative delay after emitting `event`
    pub delay: Option<Duration>,
}

impl SourceItem {
    /// Item with no delay
    pub fn new(event: StreamEvent) -> Self {
        Self { event, delay: None }
    }

    /// Set the delay before the next item
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Stream handed to a session
pub type EventStream = BoxStream<'static, anyhow::Result<SourceItem>>;

/// Trait for event sources
///
/// # Example
///
/// ```rust,ignore
/// use sse_session::{EventSource, EventStream, Identity, SourceItem, StreamEvent};
/// use futures::stream::{self, StreamExt};
///
/// struct Countdown;
///
/// impl EventSource for Countdown {
///     fn produce(&self, _identity: Option<&Identity>) -> EventStream {
///         stream::iter((1..=3).rev())
///             .map(|n| Ok(SourceItem::new(StreamEvent::progress(format!("t-{n}"), "tick"))))
///             .boxed()
///     }
///
///     fn name(&self) -> &'static str { "Countdown" }
/// }
/// ```
pub trait EventSource: Send + Sync + 'static {
    /// Produce a fresh event stream for one session
    fn produce(&self, identity: Option<&Identity>) -> EventStream;

    /// Return the source name (for logging)
    fn name(&self) -> &'static str;
}

/// Inter-event delay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayPolicy {
    /// Pull the next event immediately
    #[default]
    None,
    /// Always wait this long
    Fixed(Duration),
    /// Wait a uniformly random duration in `0..max`
    RandomUpTo(Duration),
}

impl DelayPolicy {
    /// Pick the delay for the next gap
    pub fn next_delay(&self) -> Option<Duration> {
        match *self {
            DelayPolicy::None => None,
            DelayPolicy::Fixed(d) => Some(d),
            DelayPolicy::RandomUpTo(max) => {
                let max_ms = max.as_millis() as u64;
                if max_ms == 0 {
                    return Some(Duration::ZERO);
                }
                Some(Duration::from_millis(rand::thread_rng().gen_range(0..max_ms)))
            }
        }
    }
}

/// A fixed list of items, optionally failing part-way
///
/// Useful for testing and for endpoints with a known script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    items: Vec<SourceItem>,
    delay: Option<DelayPolicy>,
    failure: Option<(usize, String)>,
}

impl ScriptedSource {
    pub fn new(items: Vec<SourceItem>) -> Self {
        Self {
            items,
            delay: None,
            failure: None,
        }
    }

    /// Build from events sharing one delay policy
    ///
    /// The policy is sampled again for every session.
    pub fn from_events(events: impl IntoIterator<Item = StreamEvent>, delay: DelayPolicy) -> Self {
        Self {
            items: events.into_iter().map(SourceItem::new).collect(),
            delay: Some(delay),
            failure: None,
        }
    }

    /// Yield an error after `emitted` items instead of continuing
    pub fn fail_after(mut self, emitted: usize, message: impl Into<String>) -> Self {
        self.failure = Some((emitted, message.into()));
        self
    }
}

impl EventSource for ScriptedSource {
    fn produce(&self, _identity: Option<&Identity>) -> EventStream {
        let policy = self.delay;
        let mut items: Vec<anyhow::Result<SourceItem>> = self
            .items
            .iter()
            .cloned()
            .map(|mut item| {
                if let Some(policy) = policy {
                    item.delay = policy.next_delay();
                }
                Ok(item)
            })
            .collect();
        if let Some((emitted, message)) = &self.failure {
            items.truncate(*emitted);
            items.push(Err(anyhow::anyhow!("{}", message)));
        }
        stream::iter(items).boxed()
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}

/// Builds event `n` given the delay chosen after it
pub type EventBuilder = Arc<dyn Fn(usize, Option<Duration>) -> StreamEvent + Send + Sync>;

/// Lazily generates `count` progress events
///
/// The delay is chosen per event from the policy when the event is pulled,
/// so the builder can report it in the message.
#[derive(Clone)]
pub struct GeneratedSource {
    count: usize,
    delay: DelayPolicy,
    builder: EventBuilder,
}

impl GeneratedSource {
    pub fn new<F>(count: usize, builder: F) -> Self
    where
        F: Fn(usize, Option<Duration>) -> StreamEvent + Send + Sync + 'static,
    {
        Self {
            count,
            delay: DelayPolicy::None,
            builder: Arc::new(builder),
        }
    }

    /// Set the inter-event delay policy
    pub fn with_delay(mut self, delay: DelayPolicy) -> Self {
        self.delay = delay;
        self
    }
}

impl EventSource for GeneratedSource {
    fn produce(&self, _identity: Option<&Identity>) -> EventStream {
        let builder = self.builder.clone();
        let policy = self.delay;
        stream::iter(1..=self.count)
            .map(move |n| {
                let delay = policy.next_delay();
                Ok(SourceItem {
                    event: builder(n, delay),
                    delay,
                })
            })
            .boxed()
    }

    fn name(&self) -> &'static str {
        "Generated"
    }
}
