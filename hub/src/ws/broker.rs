//! Connection broker for the push channel.
//!
//! One registry for all live WebSocket clients plus a per-symbol
//! subscriber index, so a broadcast touches only the connections that
//! asked for that symbol. Every connection owns a bounded FIFO of
//! serialized frames: when it fills, the OLDEST frame is dropped and
//! counted, so one stalled client never backpressures the
//! broadcaster or its neighbours.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::messages::BrokerStats;

/// Bounded lossy outbound queue, one per connection.
pub struct ClientQueue {
    capacity: usize,
    buf: Mutex<VecDeque<String>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl ClientQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buf: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue without ever blocking; overflow evicts the oldest
    /// frame (slow-consumer policy).
    pub fn push(&self, frame: String) {
        {
            let mut buf = self.buf.lock().unwrap();
            if buf.len() == self.capacity {
                buf.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buf.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Next frame in order; `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<String> {
        loop {
            {
                let mut buf = self.buf.lock().unwrap();
                if let Some(frame) = buf.pop_front() {
                    return Some(frame);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Frames evicted because this client fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct ConnEntry {
    queue: Arc<ClientQueue>,
    symbols: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    connections: HashMap<u64, ConnEntry>,
    by_symbol: HashMap<String, HashSet<u64>>,
}

pub struct Broker {
    queue_capacity: usize,
    registry: Mutex<Registry>,
}

impl Broker {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn register(&self) -> (u64, Arc<ClientQueue>) {
        let queue = Arc::new(ClientQueue::new(self.queue_capacity));
        let mut reg = self.registry.lock().unwrap();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.connections.insert(
            id,
            ConnEntry {
                queue: queue.clone(),
                symbols: HashSet::new(),
            },
        );
        (id, queue)
    }

    pub fn unregister(&self, id: u64) {
        let mut reg = self.registry.lock().unwrap();
        if let Some(entry) = reg.connections.remove(&id) {
            for symbol in &entry.symbols {
                if let Some(subs) = reg.by_symbol.get_mut(symbol) {
                    subs.remove(&id);
                    if subs.is_empty() {
                        reg.by_symbol.remove(symbol);
                    }
                }
            }
            entry.queue.close();
        }
    }

    /// Add subscriptions; returns the normalized symbols.
    pub fn subscribe(&self, id: u64, symbols: &[String]) -> Vec<String> {
        let normalized = normalize(symbols);
        let mut reg = self.registry.lock().unwrap();
        if reg.connections.contains_key(&id) {
            for symbol in &normalized {
                reg.by_symbol
                    .entry(symbol.clone())
                    .or_default()
                    .insert(id);
            }
            if let Some(entry) = reg.connections.get_mut(&id) {
                entry.symbols.extend(normalized.iter().cloned());
            }
        }
        normalized
    }

    pub fn unsubscribe(&self, id: u64, symbols: &[String]) -> Vec<String> {
        let normalized = normalize(symbols);
        let mut reg = self.registry.lock().unwrap();
        for symbol in &normalized {
            if let Some(subs) = reg.by_symbol.get_mut(symbol) {
                subs.remove(&id);
                if subs.is_empty() {
                    reg.by_symbol.remove(symbol);
                }
            }
        }
        if let Some(entry) = reg.connections.get_mut(&id) {
            for symbol in &normalized {
                entry.symbols.remove(symbol);
            }
        }
        normalized
    }

    /// Enqueue a frame for every subscriber of `symbol`; cost is
    /// O(subscribers of this symbol). Returns how many were reached.
    pub fn broadcast_to_symbol(&self, symbol: &str, frame: &str) -> usize {
        let targets: Vec<Arc<ClientQueue>> = {
            let reg = self.registry.lock().unwrap();
            match reg.by_symbol.get(&symbol.to_ascii_uppercase()) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| reg.connections.get(id))
                    .map(|entry| entry.queue.clone())
                    .collect(),
                None => Vec::new(),
            }
        };
        for queue in &targets {
            queue.push(frame.to_string());
        }
        targets.len()
    }

    pub fn stats(&self) -> BrokerStats {
        let reg = self.registry.lock().unwrap();
        BrokerStats {
            total_connections: reg.connections.len(),
            subscriptions: reg
                .by_symbol
                .iter()
                .map(|(symbol, subs)| (symbol.clone(), subs.len()))
                .collect(),
        }
    }
}

fn normalize(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(broker: &Broker, id: u64, symbols: &[&str]) -> Vec<String> {
        let list: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
        broker.subscribe(id, &list)
    }

    #[test]
    fn broadcast_reaches_only_subscribers() {
        let broker = Broker::new(8);
        let (a, qa) = broker.register();
        let (b, qb) = broker.register();
        subs(&broker, a, &["btcusdt"]);
        subs(&broker, b, &["ETHUSDT"]);

        assert_eq!(broker.broadcast_to_symbol("BTCUSDT", "x"), 1);
        assert_eq!(qa.buf.lock().unwrap().len(), 1);
        assert_eq!(qb.buf.lock().unwrap().len(), 0);
        assert_eq!(broker.broadcast_to_symbol("DOGEUSDT", "x"), 0);
    }

    #[test]
    fn slow_consumer_drops_oldest_and_counts() {
        let broker = Broker::new(3);
        let (id, queue) = broker.register();
        subs(&broker, id, &["BTCUSDT"]);

        for i in 0..10 {
            broker.broadcast_to_symbol("BTCUSDT", &format!("event-{i}"));
        }

        // Queue holds at most its bound, newest-last; seven evicted.
        assert_eq!(queue.dropped(), 7);
        let frames: Vec<String> = queue.buf.lock().unwrap().iter().cloned().collect();
        assert_eq!(frames, vec!["event-7", "event-8", "event-9"]);
    }

    #[tokio::test]
    async fn draining_consumer_sees_every_event_in_order() {
        let broker = Broker::new(16);
        let (id, queue) = broker.register();
        subs(&broker, id, &["BTCUSDT"]);

        for i in 0..10 {
            broker.broadcast_to_symbol("BTCUSDT", &format!("event-{i}"));
        }
        for i in 0..10 {
            assert_eq!(queue.pop().await.unwrap(), format!("event-{i}"));
        }
        assert_eq!(queue.dropped(), 0);
    }

    #[tokio::test]
    async fn closed_queue_drains_then_ends() {
        let broker = Broker::new(4);
        let (id, queue) = broker.register();
        subs(&broker, id, &["BTCUSDT"]);
        broker.broadcast_to_symbol("BTCUSDT", "last");
        broker.unregister(id);

        assert_eq!(queue.pop().await.unwrap(), "last");
        assert!(queue.pop().await.is_none());

        // Unregistered connections no longer receive broadcasts.
        assert_eq!(broker.broadcast_to_symbol("BTCUSDT", "gone"), 0);
    }

    #[test]
    fn unsubscribe_prunes_the_index() {
        let broker = Broker::new(4);
        let (id, _q) = broker.register();
        subs(&broker, id, &["BTCUSDT", "ETHUSDT"]);
        assert_eq!(broker.stats().subscriptions.len(), 2);

        broker.unsubscribe(id, &["BTCUSDT".to_string()]);
        let stats = broker.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.subscriptions.len(), 1);
        assert_eq!(stats.subscriptions.get("ETHUSDT"), Some(&1));
    }
}
