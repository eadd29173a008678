//! Bounded price and portfolio histories
//!
//! The return ledger keeps per-symbol price and return history, the portfolio
//! ledger keeps portfolio-value snapshots and the returns derived from them.
//! Both are fixed-capacity ring buffers: the oldest entry is evicted once the
//! capacity is reached.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use crate::stats::simple_return;

/// Reserved pseudo-symbol under which portfolio returns are stored
pub const PORTFOLIO_SYMBOL: &str = "__portfolio__";

/// Default number of observations retained per series
pub const DEFAULT_CAPACITY: usize = 1000;

/// Return ledger shared between the ingestion path and the aggregator
pub type SharedReturnLedger = Arc<RwLock<ReturnLedger>>;

/// Portfolio ledger shared between the ingestion path and the aggregator
pub type SharedPortfolioLedger = Arc<RwLock<PortfolioLedger>>;

/// A single price tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// A return derived from two consecutive observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnObservation {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Portfolio value and dollar positions at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub positions: BTreeMap<String, f64>,
}

/// Fixed-capacity FIFO buffer
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer; a zero capacity is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest one when full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Per-symbol price and return history
#[derive(Debug, Clone)]
pub struct ReturnLedger {
    capacity: usize,
    prices: HashMap<String, RingBuffer<PriceObservation>>,
    returns: HashMap<String, RingBuffer<ReturnObservation>>,
}

impl Default for ReturnLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ReturnLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            prices: HashMap::new(),
            returns: HashMap::new(),
        }
    }

    /// Wrap a new ledger in a shared handle
    pub fn shared(capacity: usize) -> SharedReturnLedger {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Record a price tick
    ///
    /// Non-positive or non-finite prices, and ticks for the reserved portfolio
    /// symbol, are dropped. A return is derived once a prior positive price
    /// exists. Returns whether the tick was accepted.
    pub fn record_price(&mut self, symbol: &str, price: f64, timestamp: DateTime<Utc>) -> bool {
        if !(price > 0.0 && price.is_finite()) {
            tracing::debug!(symbol = %symbol, price, "Dropping non-positive price");
            return false;
        }
        if symbol == PORTFOLIO_SYMBOL {
            tracing::debug!(symbol = %symbol, "Dropping tick for reserved symbol");
            return false;
        }

        let capacity = self.capacity;
        let history = self
            .prices
            .entry(symbol.to_string())
            .or_insert_with(|| RingBuffer::new(capacity));

        let derived = history
            .last()
            .and_then(|prev| simple_return(prev.price, price));

        history.push(PriceObservation {
            symbol: symbol.to_string(),
            timestamp,
            price,
        });

        if let Some(value) = derived {
            self.returns
                .entry(symbol.to_string())
                .or_insert_with(|| RingBuffer::new(capacity))
                .push(ReturnObservation {
                    symbol: symbol.to_string(),
                    timestamp,
                    value,
                });
        }

        true
    }

    /// Symbols with at least one recorded price, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.prices.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        self.prices
            .get(symbol)
            .map(|h| h.iter().map(|o| o.price).collect())
            .unwrap_or_default()
    }

    pub fn returns(&self, symbol: &str) -> Vec<f64> {
        self.returns
            .get(symbol)
            .map(|h| h.iter().map(|o| o.value).collect())
            .unwrap_or_default()
    }

    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).and_then(|h| h.last()).map(|o| o.price)
    }

    /// Copy every series so a computation never observes a concurrent append
    pub fn snapshot(&self) -> MarketHistory {
        let mut series = BTreeMap::new();
        for symbol in self.prices.keys() {
            series.insert(
                symbol.clone(),
                SeriesHistory {
                    prices: self.prices(symbol),
                    returns: self.returns(symbol),
                },
            );
        }
        MarketHistory { series }
    }
}

/// Price and return values of one symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesHistory {
    pub prices: Vec<f64>,
    pub returns: Vec<f64>,
}

/// Point-in-time copy of the return ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketHistory {
    pub series: BTreeMap<String, SeriesHistory>,
}

/// Portfolio value and position history
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    snapshots: RingBuffer<PortfolioSnapshot>,
    returns: RingBuffer<ReturnObservation>,
}

impl Default for PortfolioLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PortfolioLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: RingBuffer::new(capacity),
            returns: RingBuffer::new(capacity),
        }
    }

    /// Wrap a new ledger in a shared handle
    pub fn shared(capacity: usize) -> SharedPortfolioLedger {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Record a portfolio snapshot
    ///
    /// Non-positive or non-finite values are dropped. Returns whether the
    /// snapshot was accepted.
    pub fn record_portfolio(
        &mut self,
        value: f64,
        positions: BTreeMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> bool {
        if !(value > 0.0 && value.is_finite()) {
            tracing::debug!(value, "Dropping non-positive portfolio value");
            return false;
        }

        if let Some(ret) = self
            .snapshots
            .last()
            .and_then(|prev| simple_return(prev.value, value))
        {
            self.returns.push(ReturnObservation {
                symbol: PORTFOLIO_SYMBOL.to_string(),
                timestamp,
                value: ret,
            });
        }

        self.snapshots.push(PortfolioSnapshot {
            timestamp,
            value,
            positions,
        });
        true
    }

    pub fn values(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.value).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.returns.iter().map(|r| r.value).collect()
    }

    pub fn latest(&self) -> Option<&PortfolioSnapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Copy the history for one report computation
    pub fn snapshot(&self) -> PortfolioHistory {
        PortfolioHistory {
            values: self.values(),
            returns: self.returns(),
            latest: self.latest().cloned(),
        }
    }
}

/// Point-in-time copy of the portfolio ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioHistory {
    pub values: Vec<f64>,
    pub returns: Vec<f64>,
    pub latest: Option<PortfolioSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut buf = RingBuffer::new(3);
        assert_eq!(buf.push(1), None);
        buf.push(2);
        buf.push(3);
        assert_eq!(buf.push(4), Some(1));
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_returns_need_two_prices() {
        let mut ledger = ReturnLedger::new(10);
        let now = Utc::now();

        assert!(ledger.record_price("BTC", 100.0, now));
        assert!(ledger.returns("BTC").is_empty());

        ledger.record_price("BTC", 110.0, now);
        ledger.record_price("BTC", 99.0, now);

        let returns = ledger.returns("BTC");
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns[0], 0.1);
        assert_relative_eq!(returns[1], -0.1);
    }

    #[test]
    fn test_rejects_non_positive_prices() {
        let mut ledger = ReturnLedger::new(10);
        let now = Utc::now();

        ledger.record_price("ETH", 50.0, now);
        assert!(!ledger.record_price("ETH", 0.0, now));
        assert!(!ledger.record_price("ETH", -3.0, now));
        assert!(!ledger.record_price("ETH", f64::NAN, now));
        ledger.record_price("ETH", 55.0, now);

        assert_eq!(ledger.prices("ETH"), vec![50.0, 55.0]);
        assert_eq!(ledger.returns("ETH").len(), 1);
    }

    #[test]
    fn test_reserved_symbol_rejected() {
        let mut ledger = ReturnLedger::new(10);
        assert!(!ledger.record_price(PORTFOLIO_SYMBOL, 1.0, Utc::now()));
        assert!(ledger.symbols().is_empty());
    }

    #[test]
    fn test_ledger_capacity() {
        let mut ledger = ReturnLedger::new(5);
        let now = Utc::now();
        for i in 0..20 {
            ledger.record_price("SOL", 100.0 + i as f64, now);
        }
        assert_eq!(ledger.prices("SOL").len(), 5);
        assert_eq!(ledger.returns("SOL").len(), 5);
        assert_eq!(ledger.latest_price("SOL"), Some(119.0));
    }

    #[test]
    fn test_portfolio_returns() {
        let mut ledger = PortfolioLedger::new(10);
        let now = Utc::now();
        let mut positions = BTreeMap::new();
        positions.insert("BTC".to_string(), 600.0);

        ledger.record_portfolio(1000.0, positions.clone(), now);
        assert!(!ledger.record_portfolio(0.0, positions.clone(), now));
        ledger.record_portfolio(1050.0, positions, now);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.values, vec![1000.0, 1050.0]);
        assert_eq!(snapshot.returns.len(), 1);
        assert_relative_eq!(snapshot.returns[0], 0.05);
        assert_eq!(snapshot.latest.unwrap().positions["BTC"], 600.0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let ledger = ReturnLedger::shared(10);
        let now = Utc::now();
        ledger.write().record_price("BTC", 1.0, now);
        ledger.write().record_price("BTC", 2.0, now);

        let snapshot = ledger.read().snapshot();
        ledger.write().record_price("BTC", 3.0, now);

        assert_eq!(snapshot.series["BTC"].prices, vec![1.0, 2.0]);
        assert_eq!(ledger.read().prices("BTC").len(), 3);
    }
}
