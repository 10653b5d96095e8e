//! Canonical ticker record

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Normalized update for one option symbol at one point in time.
///
/// Every numeric field is optional: `None` means the upstream frame did not
/// carry the field, which is distinct from zero. Values pass through from
/// the exchange verbatim; nothing is computed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerRecord {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub last_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub bid_price: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub bid_iv: Option<Decimal>,
    pub ask_iv: Option<Decimal>,
    pub mark_iv: Option<Decimal>,
    pub index_price: Option<Decimal>,
    pub underlying_price: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub turnover_24h: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub gamma: Option<Decimal>,
    pub theta: Option<Decimal>,
    pub vega: Option<Decimal>,
}

impl TickerRecord {
    /// A record carrying only the required fields
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            last_price: None,
            mark_price: None,
            bid_price: None,
            ask_price: None,
            bid_iv: None,
            ask_iv: None,
            mark_iv: None,
            index_price: None,
            underlying_price: None,
            volume_24h: None,
            turnover_24h: None,
            open_interest: None,
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
        }
    }

    /// Render the present fields as store hash (field, value) pairs.
    ///
    /// Absent fields are simply omitted, so a later sparse update never
    /// overwrites an earlier value with an empty one.
    pub fn store_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("symbol", self.symbol.clone()),
            ("timestamp", self.timestamp.timestamp_millis().to_string()),
        ];

        let mut push = |name: &'static str, value: &Option<Decimal>| {
            if let Some(v) = value {
                fields.push((name, v.to_string()));
            }
        };

        push("last_price", &self.last_price);
        push("mark_price", &self.mark_price);
        push("bid_price", &self.bid_price);
        push("ask_price", &self.ask_price);
        push("bid_iv", &self.bid_iv);
        push("ask_iv", &self.ask_iv);
        push("mark_iv", &self.mark_iv);
        push("index_price", &self.index_price);
        push("underlying_price", &self.underlying_price);
        push("volume_24h", &self.volume_24h);
        push("turnover_24h", &self.turnover_24h);
        push("open_interest", &self.open_interest);
        push("delta", &self.delta);
        push("gamma", &self.gamma);
        push("theta", &self.theta);
        push("vega", &self.vega);

        fields
    }
}
