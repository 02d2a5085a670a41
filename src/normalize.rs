//! Coercion of loosely-typed documents into canonical shapes.
//!
//! Documents reach the gateway from two places: the remote store, which may
//! hand back timestamp wrapper objects or numeric strings, and the local
//! cache, which holds whatever an earlier version of the app wrote. Every
//! record is run through [`normalize_document`] before it is deserialized
//! into a typed model so that numbers are finite and dates are RFC 3339.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Describes which fields of a document need coercion.
#[derive(Debug)]
pub struct FieldSpec {
    /// Whole numbers (quantities, counters).
    pub integers: &'static [&'static str],
    /// Whole numbers clamped to `0..=100`.
    pub percentages: &'static [&'static str],
    /// Currency amounts, stored as decimal strings.
    pub money: &'static [&'static str],
    /// Fractional numbers that are not currency.
    pub floats: &'static [&'static str],
    /// Dates that must always be present; missing values become "now".
    pub dates: &'static [&'static str],
    /// Dates that may be absent; unparseable values become `null`.
    pub optional_dates: &'static [&'static str],
    /// Arrays of nested objects and the spec for each element.
    pub nested: &'static [(&'static str, &'static FieldSpec)],
}

impl FieldSpec {
    pub const EMPTY: FieldSpec = FieldSpec {
        integers: &[],
        percentages: &[],
        money: &[],
        floats: &[],
        dates: &[],
        optional_dates: &[],
        nested: &[],
    };
}

/// Coerces a value to a finite number, or returns `fallback`.
///
/// Accepts JSON numbers, numeric strings (a single comma is read as the
/// decimal separator), booleans, and wrapper objects such as
/// `{"$numberDecimal": "1.5"}` or `{"value": 3}`.
pub fn coerce_number(value: &Value, fallback: f64) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_str(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Object(map) => [
            "$numberDecimal",
            "$numberDouble",
            "$numberLong",
            "$numberInt",
            "value",
        ]
        .iter()
        .find_map(|key| map.get(*key))
        .map(|inner| coerce_number(inner, f64::NAN)),
        Value::Null | Value::Array(_) => None,
    };

    match parsed {
        Some(n) if n.is_finite() => n,
        _ => fallback,
    }
}

fn parse_numeric_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Some(n);
    }
    // "12,50" style input
    if trimmed.matches(',').count() == 1 && !trimmed.contains('.') {
        return trimmed.replace(',', ".").parse::<f64>().ok();
    }
    None
}

/// Coerces a value to a [`Decimal`], going through [`coerce_number`] only when
/// the value is not already an exact decimal string.
pub fn coerce_decimal(value: &Value, fallback: Decimal) -> Decimal {
    if let Value::String(s) = value {
        if let Ok(d) = Decimal::from_str(s.trim()) {
            return d;
        }
    }
    let n = coerce_number(value, f64::NAN);
    if !n.is_finite() {
        return fallback;
    }
    Decimal::from_str(&n.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(n))
        .unwrap_or(fallback)
}

/// Parses any supported date representation into a UTC timestamp.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => {
            if let Some(inner) = map.get("$date") {
                return parse_datetime(inner);
            }
            let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?;
            let seconds = coerce_number(seconds, f64::NAN);
            if !seconds.is_finite() {
                return None;
            }
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .map(|n| coerce_number(n, 0.0))
                .unwrap_or(0.0);
            Utc.timestamp_opt(seconds as i64, nanos.clamp(0.0, 999_999_999.0) as u32)
                .single()
        }
        Value::Null | Value::Bool(_) | Value::Array(_) => None,
    }
}

fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Canonical ISO-8601 rendering used for every stored date.
pub fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Coerces a value to a canonical ISO string, or returns `fallback`.
pub fn coerce_iso(value: &Value, fallback: &str) -> String {
    parse_datetime(value)
        .map(|dt| to_iso(&dt))
        .unwrap_or_else(|| fallback.to_string())
}

/// Normalizes a document in place according to `spec`. Non-object values are
/// left untouched.
pub fn normalize_document(doc: &mut Value, spec: &FieldSpec) {
    let now = to_iso(&Utc::now());
    normalize_with_now(doc, spec, &now);
}

fn normalize_with_now(doc: &mut Value, spec: &FieldSpec, now: &str) {
    let Some(map) = doc.as_object_mut() else {
        return;
    };

    for field in spec.integers {
        if let Some(v) = map.get_mut(*field) {
            let n = coerce_number(v, 0.0).round();
            *v = Value::from(n as i64);
        }
    }

    for field in spec.percentages {
        if let Some(v) = map.get_mut(*field) {
            let n = coerce_number(v, 0.0).round().clamp(0.0, 100.0);
            *v = Value::from(n as i64);
        }
    }

    for field in spec.money {
        if let Some(v) = map.get_mut(*field) {
            *v = Value::String(coerce_decimal(v, Decimal::ZERO).normalize().to_string());
        }
    }

    for field in spec.floats {
        if let Some(v) = map.get_mut(*field) {
            *v = Value::from(coerce_number(v, 0.0));
        }
    }

    for field in spec.dates {
        let canonical = coerce_iso(map.get(*field).unwrap_or(&Value::Null), now);
        map.insert((*field).to_string(), Value::String(canonical));
    }

    for field in spec.optional_dates {
        if let Some(v) = map.get_mut(*field) {
            *v = parse_datetime(v)
                .map(|dt| Value::String(to_iso(&dt)))
                .unwrap_or(Value::Null);
        }
    }

    for (field, nested_spec) in spec.nested {
        match map.get_mut(*field) {
            Some(Value::Array(items)) => {
                for item in items.iter_mut() {
                    normalize_with_now(item, nested_spec, now);
                }
            }
            Some(other) => *other = Value::Array(Vec::new()),
            None => {}
        }
    }
}

/// Shallow JSON merge: every key of `patch` replaces the same key of `target`.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    static LINE: FieldSpec = FieldSpec {
        integers: &["quantity"],
        money: &["unit_price"],
        ..FieldSpec::EMPTY
    };

    static ORDERISH: FieldSpec = FieldSpec {
        integers: &["total_quantity"],
        percentages: &["progress"],
        money: &["total_amount"],
        floats: &["ratio"],
        dates: &["created_at"],
        optional_dates: &["delivery_date"],
        nested: &[("products", &LINE)],
    };

    #[test]
    fn numbers_from_loose_inputs() {
        assert_eq!(coerce_number(&json!(4), 0.0), 4.0);
        assert_eq!(coerce_number(&json!("12.5"), 0.0), 12.5);
        assert_eq!(coerce_number(&json!(" 7 "), 0.0), 7.0);
        assert_eq!(coerce_number(&json!("12,50"), 0.0), 12.5);
        assert_eq!(coerce_number(&json!({"$numberDecimal": "3.25"}), 0.0), 3.25);
        assert_eq!(coerce_number(&json!({"value": 9}), 0.0), 9.0);
        assert_eq!(coerce_number(&json!(null), -1.0), -1.0);
        assert_eq!(coerce_number(&json!("abc"), -1.0), -1.0);
        assert_eq!(coerce_number(&json!([1]), -1.0), -1.0);
        assert_eq!(coerce_number(&json!("NaN"), 2.0), 2.0);
        assert_eq!(coerce_number(&json!("inf"), 2.0), 2.0);
    }

    #[test]
    fn decimals_keep_exact_strings() {
        assert_eq!(coerce_decimal(&json!("100.10"), Decimal::ZERO), dec!(100.10));
        assert_eq!(coerce_decimal(&json!(0.1), Decimal::ZERO), dec!(0.1));
        assert_eq!(coerce_decimal(&json!(null), dec!(5)), dec!(5));
    }

    #[test]
    fn dates_from_every_representation() {
        let expected = "2024-03-05T10:00:00.000Z";
        assert_eq!(coerce_iso(&json!("2024-03-05T10:00:00Z"), ""), expected);
        assert_eq!(coerce_iso(&json!("2024-03-05T07:00:00-03:00"), ""), expected);
        assert_eq!(coerce_iso(&json!("2024-03-05T10:00:00"), ""), expected);
        assert_eq!(coerce_iso(&json!(1_709_632_800_000_i64), ""), expected);
        assert_eq!(
            coerce_iso(&json!({"seconds": 1_709_632_800, "nanoseconds": 0}), ""),
            expected
        );
        assert_eq!(
            coerce_iso(&json!({"_seconds": 1_709_632_800, "_nanoseconds": 0}), ""),
            expected
        );
        assert_eq!(coerce_iso(&json!({"$date": "2024-03-05T10:00:00Z"}), ""), expected);
        assert_eq!(
            coerce_iso(&json!("2024-03-05"), ""),
            "2024-03-05T00:00:00.000Z"
        );
        assert_eq!(coerce_iso(&json!("not a date"), "fallback"), "fallback");
        assert_eq!(coerce_iso(&json!(null), "fallback"), "fallback");
    }

    #[test]
    fn normalizes_nested_documents() {
        let mut doc = json!({
            "total_quantity": "5",
            "total_amount": 400,
            "ratio": "0.5",
            "progress": 140,
            "created_at": {"seconds": 1_709_632_800},
            "delivery_date": "garbage",
            "products": [
                {"quantity": "3", "unit_price": "100.00"},
                {"quantity": 2.0, "unit_price": 50}
            ]
        });

        normalize_document(&mut doc, &ORDERISH);

        assert_eq!(doc["total_quantity"], json!(5));
        assert_eq!(doc["total_amount"], json!("400"));
        assert_eq!(doc["ratio"], json!(0.5));
        assert_eq!(doc["progress"], json!(100));
        assert_eq!(doc["created_at"], json!("2024-03-05T10:00:00.000Z"));
        assert_eq!(doc["delivery_date"], Value::Null);
        assert_eq!(doc["products"][0]["quantity"], json!(3));
        assert_eq!(doc["products"][0]["unit_price"], json!("100"));
        assert_eq!(doc["products"][1]["quantity"], json!(2));
    }

    #[test]
    fn missing_required_dates_are_filled() {
        let mut doc = json!({});
        normalize_document(&mut doc, &ORDERISH);
        assert!(parse_datetime(&doc["created_at"]).is_some());
        assert!(doc.get("delivery_date").is_none());
    }

    #[test]
    fn merge_patch_replaces_top_level_keys() {
        let mut target = json!({"a": 1, "b": {"c": 2}});
        merge_patch(&mut target, &json!({"b": {"d": 3}, "e": null}));
        assert_eq!(target, json!({"a": 1, "b": {"d": 3}, "e": null}));
    }

    proptest! {
        #[test]
        fn coerced_numbers_are_always_finite(s in ".*") {
            let n = coerce_number(&Value::String(s), 0.0);
            prop_assert!(n.is_finite());
        }

        #[test]
        fn integer_strings_roundtrip(n in -1_000_000i64..1_000_000) {
            prop_assert_eq!(coerce_number(&json!(n.to_string()), 0.0), n as f64);
        }
    }
}
