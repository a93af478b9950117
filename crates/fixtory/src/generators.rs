//! Stock sequence generators.
//!
//! Every generator is a pure function of the counter (and params), so the
//! same counter always yields the same value.

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::sequence::Params;
use crate::value::Value;

/// Renders `pattern`, replacing `{n}` with the counter and `{name}` with the
/// matching generate-time param.
pub fn formatted(pattern: impl Into<String>) -> impl Fn(i64, &Params) -> Value + 'static {
    let pattern = pattern.into();
    move |n: i64, params: &Params| -> Value {
        let mut rendered = pattern.replace("{n}", &n.to_string());
        for (name, value) in params {
            rendered = rendered.replace(&format!("{{{name}}}"), &value.to_string());
        }
        Value::Text(rendered)
    }
}

pub fn counter_int() -> impl Fn(i64, &Params) -> Value + 'static {
    |n: i64, _: &Params| -> Value { Value::Int(n) }
}

/// Deterministic UUID derived from the counter.
pub fn counter_uuid() -> impl Fn(i64, &Params) -> Value + 'static {
    |n: i64, _: &Params| -> Value {
        let bits = u128::from(n.unsigned_abs());
        Value::Text(Uuid::from_u128(bits).to_string())
    }
}

pub fn counter_email(domain: impl Into<String>) -> impl Fn(i64, &Params) -> Value + 'static {
    let domain = domain.into();
    move |n: i64, _: &Params| -> Value { Value::Text(format!("user{n:05}@{domain}")) }
}

/// `base` plus `n` days, as `YYYY-MM-DD`.
pub fn counter_date(base: NaiveDate) -> impl Fn(i64, &Params) -> Value + 'static {
    move |n: i64, _: &Params| -> Value {
        let date = base
            .checked_add_signed(Duration::days(n))
            .unwrap_or(base);
        Value::Text(date.format("%Y-%m-%d").to_string())
    }
}
