//! Best-effort extraction of price records from arbitrarily shaped payloads.
//!
//! The remote schema is not documented and changes between event names, so
//! instead of deserializing into fixed structs the normalizer walks the JSON
//! tree and probes each object for a prioritized list of field names:
//!
//! - topic: `conditionId`, `condition_id`, `marketAddress`, `address`, `id`, `market`
//! - price: `prices`, `price`, `odds`, `pricesFormatted`, `bestPrices`, `outcomesPrices`
//! - volume: `volumeFormatted`, `volume`
//!
//! Elements of an `outcomes` array are probed as outcome objects, which may be
//! identified by `conditionId`, `id` or `label`.
//!
//! Matches are yielded lazily in document (pre-order) order. Descent stops at
//! [`MAX_DEPTH`]; nothing in here can fail.

use serde_json::{Map, Value};

use super::NormalizedEvent;

/// Deepest nesting level that is still inspected. The root is level 0.
pub const MAX_DEPTH: usize = 32;

const MARKET_TOPIC_FIELDS: &[&str] = &[
    "conditionId",
    "condition_id",
    "marketAddress",
    "address",
    "id",
    "market",
];
const MARKET_PRICE_FIELDS: &[&str] = &[
    "prices",
    "price",
    "odds",
    "pricesFormatted",
    "bestPrices",
    "outcomesPrices",
];
const OUTCOME_TOPIC_FIELDS: &[&str] = &["conditionId", "id", "label"];
const OUTCOME_PRICE_FIELDS: &[&str] = &["prices", "price", "odds"];
const VOLUME_FIELDS: &[&str] = &["volumeFormatted", "volume"];

const OUTCOMES_KEY: &str = "outcomes";

/// Which candidate lists apply to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Market,
    Outcome,
}

impl Role {
    fn topic_fields(self) -> &'static [&'static str] {
        match self {
            Role::Market => MARKET_TOPIC_FIELDS,
            Role::Outcome => OUTCOME_TOPIC_FIELDS,
        }
    }

    fn price_fields(self) -> &'static [&'static str] {
        match self {
            Role::Market => MARKET_PRICE_FIELDS,
            Role::Outcome => OUTCOME_PRICE_FIELDS,
        }
    }
}

struct Frame<'a> {
    value: &'a Value,
    path: String,
    depth: usize,
    role: Role,
}

/// Lazy iterator over the records found in one payload.
pub struct Normalized<'a> {
    stack: Vec<Frame<'a>>,
}

/// Returns the price records contained in `payload`.
pub fn normalize(payload: &Value) -> Normalized<'_> {
    Normalized {
        stack: vec![Frame {
            value: payload,
            path: "root".to_string(),
            depth: 0,
            role: Role::Market,
        }],
    }
}

impl<'a> Normalized<'a> {
    fn push_child(&mut self, value: &'a Value, path: String, depth: usize, role: Role) {
        if matches!(value, Value::Object(_) | Value::Array(_)) {
            self.stack.push(Frame { value, path, depth, role });
        }
    }
}

impl<'a> Iterator for Normalized<'a> {
    type Item = NormalizedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            let descend = frame.depth < MAX_DEPTH;
            match frame.value {
                Value::Object(map) => {
                    let found = extract(map, frame.role, &frame.path);
                    if descend {
                        // Reverse push so children pop in document order.
                        for (key, child) in map.iter().rev() {
                            let role = if key == OUTCOMES_KEY && child.is_array() {
                                Role::Outcome
                            } else {
                                Role::Market
                            };
                            let path = format!("{}.{}", frame.path, key);
                            self.push_child(child, path, frame.depth + 1, role);
                        }
                    }
                    if found.is_some() {
                        return found;
                    }
                }
                Value::Array(items) if descend => {
                    for (i, item) in items.iter().enumerate().rev() {
                        let path = format!("{}[{}]", frame.path, i);
                        self.push_child(item, path, frame.depth + 1, frame.role);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Probes a single object for a topic and price.
fn extract(map: &Map<String, Value>, role: Role, path: &str) -> Option<NormalizedEvent> {
    let topic = role
        .topic_fields()
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(topic_text)?;
    let price = role
        .price_fields()
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|v| is_present(v))?;

    let volume = VOLUME_FIELDS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(parse_number);
    let (yes_price, no_price, unparsed_price) = split_prices(price);

    Some(NormalizedEvent {
        topic,
        yes_price,
        no_price,
        volume,
        source_path: path.to_string(),
        unparsed_price,
    })
}

/// Null, `false` and empty strings/arrays/objects count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

fn topic_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts numbers and numeric strings such as `"0.62"` or `"1,250.5"`.
fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Splits a price value into (yes, no). A pair maps to both sides, a scalar
/// to yes only. The raw value is kept whenever any part fails to parse.
fn split_prices(price: &Value) -> (Option<f64>, Option<f64>, Option<Value>) {
    match price {
        Value::Array(items) if items.len() == 2 => {
            let yes = parse_number(&items[0]);
            let no = parse_number(&items[1]);
            let unparsed = (yes.is_none() || no.is_none()).then(|| price.clone());
            (yes, no, unparsed)
        }
        Value::Number(_) | Value::String(_) => match parse_number(price) {
            Some(yes) => (Some(yes), None, None),
            None => (None, None, Some(price.clone())),
        },
        _ => (None, None, Some(price.clone())),
    }
}
