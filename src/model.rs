//! Entities shared between the pipeline and its storage collaborators

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::compiler::CompiledScript;
use crate::error::ScriptError;
use crate::execution::{EvaluationContext, ScriptConsumer};
use crate::hash::UNCOMPILED;

pub type RecordId = i64;
pub type ScriptId = i64;
pub type ResultId = i64;

/// A user-authored script and, once compiled, its artifact
///
/// `binary` and `script_hash` are always written together from the same
/// compiled source; a hash of 0 means the script is not compiled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub id: ScriptId,
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<Vec<u8>>,
    #[serde(default)]
    pub script_hash: i32,
}

impl Script {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.script_hash != UNCOMPILED && self.binary.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Store a freshly compiled artifact on the script
    pub fn apply(&mut self, compiled: CompiledScript) {
        self.binary = Some(compiled.binary);
        self.script_hash = compiled.hash;
    }

    /// The compiled binary, or `MissingBinary` when the script is not compiled
    pub fn compiled_binary(&self) -> Result<&[u8], ScriptError> {
        match &self.binary {
            Some(binary) if !binary.is_empty() && self.script_hash != UNCOMPILED => Ok(binary),
            _ => Err(ScriptError::MissingBinary { script_id: self.id }),
        }
    }
}

/// One persisted evaluation output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(default)]
    pub id: ResultId,
    pub record_id: RecordId,
    pub script_id: ScriptId,
    /// Canonical JSON encoding of the script value
    pub result: String,
}

/// Daily stock quote, the record type scripts are evaluated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuote {
    #[serde(default)]
    pub id: RecordId,
    pub symbol: String,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: i64,
    pub market_cap: f64,
    pub timestamp: DateTime<Utc>,
}

impl StockQuote {
    /// Placeholder for a backend lookup: a random price inside the day range
    pub fn year_average_price(&self) -> f64 {
        let (low, high) = (self.low_price, self.high_price);
        if !low.is_finite() || !high.is_finite() || high <= low {
            return low;
        }
        rand::rng().random_range(low..high)
    }
}

impl ScriptConsumer for StockQuote {
    const TYPE_ID: &'static str = "stock_quote";
    const TEMPLATE: &'static str = include_str!("templates/stock_quote_function.js");

    fn record_id(&self) -> RecordId {
        self.id
    }

    fn context(&self) -> EvaluationContext {
        let quote = self.clone();
        EvaluationContext::new(self.id)
            .with_field("Symbol", self.symbol.clone())
            .with_field("OpenPrice", self.open_price)
            .with_field("HighPrice", self.high_price)
            .with_field("LowPrice", self.low_price)
            .with_field("ClosePrice", self.close_price)
            .with_field("Volume", self.volume)
            .with_field("MarketCap", self.market_cap)
            .with_field("Timestamp", self.timestamp)
            .with_helper("GetYearAveragePrice", move || quote.year_average_price())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::FieldValue;

    fn quote() -> StockQuote {
        StockQuote {
            id: 3,
            symbol: "ABC".to_string(),
            open_price: 100.0,
            high_price: 120.0,
            low_price: 90.0,
            close_price: 110.0,
            volume: 5000,
            market_cap: 1_000_000.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_uncompiled_script_has_no_binary() {
        let script = Script::new("spread", "return 1;");
        assert!(!script.is_compiled());
        assert!(matches!(
            script.compiled_binary(),
            Err(ScriptError::MissingBinary { script_id: 0 })
        ));
    }

    #[test]
    fn test_zero_hash_counts_as_uncompiled() {
        let script = Script {
            binary: Some(vec![1, 2, 3]),
            script_hash: 0,
            ..Script::new("spread", "return 1;")
        };
        assert!(!script.is_compiled());
        assert!(script.compiled_binary().is_err());
    }

    #[test]
    fn test_apply_sets_binary_and_hash_together() {
        let mut script = Script::new("spread", "return 1;");
        script.apply(CompiledScript {
            binary: vec![9, 9],
            hash: 42,
        });
        assert!(script.is_compiled());
        assert_eq!(script.compiled_binary().unwrap(), &[9, 9]);
        assert_eq!(script.script_hash, 42);
    }

    #[test]
    fn test_quote_context_exposes_accessors() {
        let context = quote().context();
        assert_eq!(context.record_id(), 3);
        assert_eq!(
            context.field("OpenPrice"),
            Some(&FieldValue::Number(100.0))
        );
        assert_eq!(context.field("Volume"), Some(&FieldValue::Integer(5000)));
        assert!(context.helper("GetYearAveragePrice").is_some());
    }

    #[test]
    fn test_year_average_price_within_range() {
        let quote = quote();
        for _ in 0..100 {
            let price = quote.year_average_price();
            assert!((90.0..120.0).contains(&price));
        }
    }

    #[test]
    fn test_year_average_price_non_finite_range() {
        let mut quote = quote();
        quote.high_price = f64::INFINITY;
        assert_eq!(quote.year_average_price(), 90.0);

        quote.high_price = 120.0;
        quote.low_price = f64::NAN;
        assert!(quote.year_average_price().is_nan());

        quote.low_price = f64::NEG_INFINITY;
        assert_eq!(quote.year_average_price(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_quote_deserializes_camel_case() {
        let json = r#"{
            "id": 1, "symbol": "XYZ", "openPrice": 100, "highPrice": 110,
            "lowPrice": 90, "closePrice": 105, "volume": 1000,
            "marketCap": 1000000.5, "timestamp": "2024-01-02T03:04:05Z"
        }"#;
        let quote: StockQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.symbol, "XYZ");
        assert_eq!(quote.low_price, 90.0);
    }
}
