//! Lifecycle events delivered to host callbacks.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use tracing::{error, warn};

use crate::error::SdkError;

/// Events a host can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SdkEvent {
    /// Discovery overlay opened.
    DiscoveryOpen,
    /// Discovery overlay closed.
    DiscoveryClose,
    /// The visitor looks about to leave.
    ExitIntent,
    /// Sidebar layout established.
    SidebarEnable,
    /// Sidebar layout removed.
    SidebarDisable,
}

impl SdkEvent {
    /// Every event, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::DiscoveryOpen,
        Self::DiscoveryClose,
        Self::ExitIntent,
        Self::SidebarEnable,
        Self::SidebarDisable,
    ];

    /// Name used by the host API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DiscoveryOpen => "discoveryOpen",
            Self::DiscoveryClose => "discoveryClose",
            Self::ExitIntent => "exitIntent",
            Self::SidebarEnable => "sidebarEnable",
            Self::SidebarDisable => "sidebarDisable",
        }
    }
}

impl fmt::Display for SdkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SdkEvent {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| SdkError::UnknownEvent(s.to_string()))
    }
}

/// Registered callbacks per event. `C` is the platform callback type.
#[derive(Debug, Clone)]
pub struct EventBus<C> {
    callbacks: Vec<(SdkEvent, C)>,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }
}

impl<C: Clone> EventBus<C> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback by event name. Unknown names are rejected.
    pub fn on(&mut self, name: &str, callback: C) -> Result<SdkEvent, SdkError> {
        let event = name.parse::<SdkEvent>().map_err(|err| {
            warn!(event = name, "ignoring registration for unknown event");
            err
        })?;
        self.register(event, callback);
        Ok(event)
    }

    /// Register a callback.
    pub fn register(&mut self, event: SdkEvent, callback: C) {
        self.callbacks.push((event, callback));
    }

    /// Callbacks for `event`, in registration order.
    #[must_use]
    pub fn callbacks(&self, event: SdkEvent) -> Vec<C> {
        self.callbacks
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Number of callbacks for `event`.
    #[must_use]
    pub fn count(&self, event: SdkEvent) -> usize {
        self.callbacks.iter().filter(|(e, _)| *e == event).count()
    }

    /// Invoke every callback for `event` in registration order, each one
    /// awaited before the next starts. A failing callback is logged and the
    /// rest still run. Resolves to the number of failures.
    pub fn emit<F, Fut>(&self, event: SdkEvent, mut invoke: F) -> impl Future<Output = usize>
    where
        F: FnMut(C) -> Fut,
        Fut: Future<Output = Result<(), SdkError>>,
    {
        let callbacks = self.callbacks(event);
        async move {
            let mut failures = 0;
            for callback in callbacks {
                if let Err(err) = invoke(callback).await {
                    log_callback_failure(event, &err);
                    failures += 1;
                }
            }
            failures
        }
    }
}

/// Log a failed host callback.
pub fn log_callback_failure(event: SdkEvent, err: &dyn fmt::Display) {
    error!(%event, error = %err, "event callback failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::future;
    use std::cell::RefCell;
    use std::task::Poll;

    #[test]
    fn test_names_round_trip() {
        for event in SdkEvent::ALL {
            assert_eq!(event.as_str().parse::<SdkEvent>(), Ok(event));
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let mut bus = EventBus::new();
        assert_eq!(
            bus.on("discoveryToggle", 1),
            Err(SdkError::UnknownEvent("discoveryToggle".into()))
        );
        assert_eq!(bus.count(SdkEvent::DiscoveryOpen), 0);
    }

    #[test]
    fn test_failing_callback_does_not_stop_others() {
        let mut bus = EventBus::new();
        bus.on("exitIntent", 1).unwrap();
        bus.on("exitIntent", 2).unwrap();
        bus.on("exitIntent", 3).unwrap();
        bus.on("sidebarEnable", 4).unwrap();

        let mut seen = Vec::new();
        let failures = block_on(bus.emit(SdkEvent::ExitIntent, |c| {
            seen.push(c);
            future::ready(if c == 2 {
                Err(SdkError::Callback("boom".into()))
            } else {
                Ok(())
            })
        }));
        assert_eq!(failures, 1);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    async fn yield_once() {
        let mut yielded = false;
        future::poll_fn(|cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await;
    }

    #[test]
    fn test_callbacks_awaited_one_at_a_time() {
        let mut bus = EventBus::new();
        bus.on("discoveryOpen", 1).unwrap();
        bus.on("discoveryOpen", 2).unwrap();

        let log = RefCell::new(Vec::new());
        block_on(bus.emit(SdkEvent::DiscoveryOpen, |c| {
            let log = &log;
            async move {
                log.borrow_mut().push(format!("start {c}"));
                yield_once().await;
                log.borrow_mut().push(format!("end {c}"));
                Ok(())
            }
        }));
        assert_eq!(*log.borrow(), ["start 1", "end 1", "start 2", "end 2"]);
    }
}
