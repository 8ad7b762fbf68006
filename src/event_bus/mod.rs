// =============================================================================
// Event Bus — Async PubSub broadcasting for the dashboard/operator surface
// =============================================================================
//
// Five named channels (tick, position, trade, balance, status). Each
// subscriber gets its own bounded `tokio::sync::mpsc` queue; when a
// subscriber can't keep up, the oldest queued event is dropped to make room
// rather than blocking the publisher. The bus also keeps a process-wide
// snapshot (open positions, bounded trade history, latest balance/status,
// per-symbol last tick) so a freshly-connected dashboard client can render
// immediately without waiting for the next event.

mod events;

pub use events::*;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::constants::{EVENT_QUEUE_MAX_SIZE, MAX_TRADE_HISTORY};

/// A bounded per-subscriber queue the publisher can evict from directly.
/// `tokio::sync::mpsc` only lets the *receiver* pop, so a publisher facing a
/// full channel can only skip its own send — that drops the newest event,
/// backwards from the oldest-first policy every other queue in this engine
/// follows. Managing the queue ourselves lets `publish()` pop the oldest
/// entry before pushing the new one.
struct SubscriberQueue {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self { queue: Mutex::new(VecDeque::with_capacity(EVENT_QUEUE_MAX_SIZE)), notify: Notify::new(), closed: AtomicBool::new(false) })
    }

    /// Push `event`, evicting the oldest queued event first if already at
    /// capacity. Returns `false` if this subscriber has since disconnected.
    fn push(&self, event: Event) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut queue = self.queue.lock();
        if queue.len() >= EVENT_QUEUE_MAX_SIZE {
            queue.pop_front();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
        true
    }
}

/// Receive handle for one `EventBus::subscribe()` call. Dropping it marks
/// the subscriber closed so the next `publish()` prunes it from the bus.
pub struct Subscription {
    inner: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Await the next event on this channel, oldest first.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.inner.queue.lock().pop_front() {
                return Some(event);
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Tick,
    Position,
    Trade,
    Balance,
    Status,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Position => "position",
            Self::Trade => "trade",
            Self::Balance => "balance",
            Self::Status => "status",
        }
    }

    pub const ALL: [Channel; 5] = [
        Channel::Tick,
        Channel::Position,
        Channel::Trade,
        Channel::Balance,
        Channel::Status,
    ];
}

struct Inner {
    subscribers: HashMap<Channel, Vec<Arc<SubscriberQueue>>>,
    open_positions: HashMap<String, PositionOpenEvent>,
    trade_history: VecDeque<TradeHistoryEvent>,
    current_balance: Option<BalanceUpdateEvent>,
    current_status: Option<StatusEvent>,
    last_ticks: HashMap<String, TickEvent>,
}

/// Process-wide pub/sub broadcaster plus snapshot state, shared via `Arc`.
pub struct EventBus {
    inner: RwLock<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let mut subscribers = HashMap::new();
        for ch in Channel::ALL {
            subscribers.insert(ch, Vec::new());
        }

        Self {
            inner: RwLock::new(Inner {
                subscribers,
                open_positions: HashMap::new(),
                trade_history: VecDeque::with_capacity(MAX_TRADE_HISTORY),
                current_balance: None,
                current_status: None,
                last_ticks: HashMap::new(),
            }),
        }
    }

    /// Subscribe to `channel`, returning a bounded receiver.
    pub fn subscribe(&self, channel: Channel) -> Subscription {
        let inner = SubscriberQueue::new();
        self.inner.write().subscribers.get_mut(&channel).unwrap().push(inner.clone());
        debug!(channel = channel.as_str(), "new event bus subscriber");
        Subscription { inner }
    }

    /// Publish an event to its channel, updating the snapshot and fanning out
    /// to all live subscribers. A subscriber whose queue is already at
    /// capacity has its oldest queued event evicted to make room for the new
    /// one — drop-oldest, not drop-newest.
    pub fn publish(&self, event: Event) {
        let channel = event.channel();
        let mut inner = self.inner.write();

        match &event {
            Event::Tick(e) => {
                inner.last_ticks.insert(e.symbol.clone(), e.clone());
            }
            Event::PositionOpen(e) => {
                inner.open_positions.insert(e.contract_id.clone(), e.clone());
            }
            Event::PositionClose(e) => {
                inner.open_positions.remove(&e.contract_id);
            }
            Event::PositionsReset(_) => {
                inner.open_positions.clear();
            }
            Event::Balance(e) => {
                inner.current_balance = Some(e.clone());
            }
            Event::Status(e) => {
                inner.current_status = Some(e.clone());
            }
            Event::TradeHistory(e) => {
                inner.trade_history.push_back(e.clone());
                while inner.trade_history.len() > MAX_TRADE_HISTORY {
                    inner.trade_history.pop_front();
                }
            }
            Event::PositionUpdate(_) => {}
        }

        let subs = inner.subscribers.get_mut(&channel).unwrap();
        subs.retain(|sub| {
            let was_full = sub.queue.lock().len() >= EVENT_QUEUE_MAX_SIZE;
            if was_full {
                warn!(channel = channel.as_str(), "subscriber queue full, dropping oldest event");
            }
            sub.push(event.clone())
        });
    }

    pub fn snapshot(&self) -> EventBusSnapshot {
        let inner = self.inner.read();
        EventBusSnapshot {
            open_positions: inner.open_positions.values().cloned().collect(),
            trade_history: inner.trade_history.iter().cloned().collect(),
            current_balance: inner.current_balance.clone(),
            current_status: inner.current_status.clone(),
            last_ticks: inner.last_ticks.clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventBusSnapshot {
    pub open_positions: Vec<PositionOpenEvent>,
    pub trade_history: Vec<TradeHistoryEvent>,
    pub current_balance: Option<BalanceUpdateEvent>,
    pub current_status: Option<StatusEvent>,
    pub last_ticks: HashMap<String, TickEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Channel::Tick);
        bus.publish(Event::Tick(TickEvent {
            symbol: "R_100".into(),
            price: 123.45,
            timestamp: 0,
        }));
        let ev = rx.recv().await.expect("event delivered");
        match ev {
            Event::Tick(t) => assert_eq!(t.symbol, "R_100"),
            _ => panic!("wrong event variant"),
        }
    }

    #[test]
    fn snapshot_tracks_open_positions_and_trade_history_cap() {
        let bus = EventBus::new();
        bus.publish(Event::PositionOpen(PositionOpenEvent {
            contract_id: "c1".into(),
            symbol: "R_100".into(),
            entry_price: 100.0,
            stake: 1.0,
            direction: "CALL".into(),
            martingale_level: 0,
            timestamp: 0,
        }));
        assert_eq!(bus.snapshot().open_positions.len(), 1);

        bus.publish(Event::PositionClose(PositionCloseEvent {
            contract_id: "c1".into(),
            symbol: "R_100".into(),
            exit_price: 101.0,
            profit: 0.85,
            is_win: true,
            timestamp: 0,
        }));
        assert!(bus.snapshot().open_positions.is_empty());

        for i in 0..(MAX_TRADE_HISTORY + 10) {
            bus.publish(Event::TradeHistory(TradeHistoryEvent {
                trade_id: format!("t{i}"),
                symbol: "R_100".into(),
                direction: "CALL".into(),
                stake: 1.0,
                result: "win".into(),
                profit: 0.85,
                timestamp: 0,
            }));
        }
        assert_eq!(bus.snapshot().trade_history.len(), MAX_TRADE_HISTORY);
    }

    #[tokio::test]
    async fn full_subscriber_queue_drops_oldest_not_newest() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Channel::Tick);

        for i in 0..(EVENT_QUEUE_MAX_SIZE + 1) {
            bus.publish(Event::Tick(TickEvent { symbol: "R_100".into(), price: i as f64, timestamp: i as i64 }));
        }

        let ev = rx.recv().await.expect("event delivered");
        match ev {
            Event::Tick(t) => assert_eq!(t.price, 1.0, "oldest event (price 0) should have been evicted"),
            _ => panic!("wrong event variant"),
        }
    }

    #[test]
    fn positions_reset_clears_open_positions() {
        let bus = EventBus::new();
        bus.publish(Event::PositionOpen(PositionOpenEvent {
            contract_id: "c1".into(),
            symbol: "R_100".into(),
            entry_price: 100.0,
            stake: 1.0,
            direction: "CALL".into(),
            martingale_level: 0,
            timestamp: 0,
        }));
        bus.publish(Event::PositionsReset(PositionsResetEvent {
            reason: "stop".into(),
            timestamp: 0,
        }));
        assert!(bus.snapshot().open_positions.is_empty());
    }
}
