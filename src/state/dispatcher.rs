//! Event dispatcher for the pub-sub pattern

use crate::state::events::{Cancel, GridChange, GridEvent, HookResult, Proceed};
use tracing::{debug, info};

/// Trait for components that observe grid changes
pub trait GridSubscriber {
    /// Consulted before a cancelable change is applied
    fn before_change(&mut self, _change: &GridChange) -> HookResult {
        Ok(Proceed)
    }

    /// Handle an event after the fact
    fn on_event(&mut self, _event: &GridEvent) {}

    /// Get subscriber name for debugging
    fn name(&self) -> &str;
}

/// Dispatches events to subscribers and queues rendering signals
pub struct GridDispatcher {
    subscribers: Vec<Box<dyn GridSubscriber>>,

    /// Signals waiting to be drained by the rendering layer
    pending_signals: Vec<GridEvent>,

    /// Event history for debugging
    event_history: Vec<GridEvent>,

    /// Maximum event history size
    max_history: usize,
}

impl Default for GridDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GridDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            pending_signals: Vec::new(),
            event_history: Vec::new(),
            max_history: 100,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn GridSubscriber>) {
        info!(target: "grid", "GridDispatcher: Adding subscriber: {}", subscriber.name());
        self.subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Ask every subscriber; the first veto wins
    pub fn check(&mut self, change: &GridChange) -> HookResult {
        for subscriber in &mut self.subscribers {
            if let Err(cancel) = subscriber.before_change(change) {
                info!(
                    target: "grid",
                    "GridDispatcher: {} vetoed {:?}: {}",
                    subscriber.name(),
                    change,
                    cancel.reason
                );
                return Err(Cancel::new(format!("{}: {}", subscriber.name(), cancel.reason)));
            }
        }
        Ok(Proceed)
    }

    pub fn dispatch(&mut self, event: GridEvent) {
        debug!(target: "grid", "GridDispatcher: Dispatching event: {:?}", event);

        self.event_history.push(event.clone());
        if self.event_history.len() > self.max_history {
            self.event_history.remove(0);
        }

        for subscriber in &mut self.subscribers {
            subscriber.on_event(&event);
        }

        // At most one queued signal per kind; the newest replaces an older one
        if event.is_signal() {
            let kind = std::mem::discriminant(&event);
            self.pending_signals
                .retain(|queued| std::mem::discriminant(queued) != kind);
            self.pending_signals.push(event);
        }
    }

    /// Take the queued rendering signals
    pub fn drain_signals(&mut self) -> Vec<GridEvent> {
        std::mem::take(&mut self.pending_signals)
    }

    pub fn get_event_history(&self) -> &[GridEvent] {
        &self.event_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generation::Generation;
    use crate::data::datatable::RowId;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        seen: Rc<RefCell<Vec<GridEvent>>>,
        veto_unpin: bool,
    }

    impl GridSubscriber for Recorder {
        fn before_change(&mut self, change: &GridChange) -> HookResult {
            match change {
                GridChange::UnpinRow { .. } if self.veto_unpin => Err(Cancel::new("locked")),
                _ => Ok(Proceed),
            }
        }

        fn on_event(&mut self, event: &GridEvent) {
            self.seen.borrow_mut().push(event.clone());
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    #[test]
    fn test_veto_and_delivery() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = GridDispatcher::new();
        dispatcher.subscribe(Box::new(Recorder {
            seen: seen.clone(),
            veto_unpin: true,
        }));

        let id = RowId::new("1");
        assert!(dispatcher.check(&GridChange::PinRow { id: id.clone(), at: None }).is_ok());
        let veto = dispatcher.check(&GridChange::UnpinRow { id: id.clone() }).unwrap_err();
        assert_eq!(veto.reason, "recorder: locked");

        dispatcher.dispatch(GridEvent::RowPinned { id });
        dispatcher.dispatch(GridEvent::RecomputeRequested);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(dispatcher.drain_signals(), vec![GridEvent::RecomputeRequested]);
        assert!(dispatcher.drain_signals().is_empty());
    }

    #[test]
    fn test_undrained_signals_collapse_per_kind() {
        let mut dispatcher = GridDispatcher::new();
        for _ in 0..50 {
            dispatcher.dispatch(GridEvent::RecomputeRequested);
            dispatcher.dispatch(GridEvent::SelectionChanged);
        }
        dispatcher.dispatch(GridEvent::RepaintRequested {
            generation: Generation::INITIAL,
        });
        dispatcher.dispatch(GridEvent::RecomputeRequested);

        let signals = dispatcher.drain_signals();
        assert_eq!(signals.len(), 2);
        assert!(matches!(signals[0], GridEvent::RepaintRequested { .. }));
        assert_eq!(signals[1], GridEvent::RecomputeRequested);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut dispatcher = GridDispatcher::new().with_max_history(3);
        for _ in 0..5 {
            dispatcher.dispatch(GridEvent::SelectionChanged);
        }
        assert_eq!(dispatcher.get_event_history().len(), 3);
    }
}
