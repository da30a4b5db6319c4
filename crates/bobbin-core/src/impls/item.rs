//! Item codec - ストア内部の表現（DynamoDB の属性値に相当）
//!
//! ストアは数値を任意精度の `Decimal` として保持します。
//! ストアの外に出るときは必ず `decode_record` を通り、
//! 数値は `normalize_number` で整数または浮動小数点に正規化されます。
//! 正規化はこのモジュールだけで行います。
//!
//! 往復の規則（`domain::canonical_number` と一致すること）:
//! - 整数値は整数として戻る（`1.0` -> `1`）
//! - それ以外の浮動小数点は元の f64 と同じ値で戻る
//! - `Decimal` で表せない f64（`1e30`, `1e-30` など）は `F` にそのまま保持

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Number, Value};

use crate::domain::{JobId, JobRecord, StoreError};

/// Stored attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    S(String),
    N(Decimal),
    /// Float outside what `Decimal` holds exactly.
    F(f64),
    Bool(bool),
    Null,
    L(Vec<AttributeValue>),
    M(BTreeMap<String, AttributeValue>),
}

/// A stored record: attribute name -> value.
pub type Item = BTreeMap<String, AttributeValue>;

/// Encode a record for storage.
pub fn encode_record(record: &JobRecord) -> Result<Item, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: record.id.clone(),
        reason,
    };
    let value = serde_json::to_value(record).map_err(|e| corrupt(e.to_string()))?;
    match to_attribute(&value).map_err(corrupt)? {
        AttributeValue::M(item) => Ok(item),
        _ => Err(corrupt("record did not encode to a map".into())),
    }
}

/// Decode a stored record, normalizing every number on the way out.
pub fn decode_record(id: &JobId, item: &Item) -> Result<JobRecord, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };
    let value = Value::Object(
        item.iter()
            .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
            .collect::<Result<_, String>>()
            .map_err(corrupt)?,
    );
    serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))
}

/// A value exactly as it reads back after storage.
pub fn stored_form(value: &Value) -> Result<Value, String> {
    to_json(&to_attribute(value)?)
}

/// Convert plain JSON into the stored representation.
pub fn to_attribute(value: &Value) -> Result<AttributeValue, String> {
    Ok(match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => number_attribute(n)?,
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => {
            AttributeValue::L(items.iter().map(to_attribute).collect::<Result<_, _>>()?)
        }
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), to_attribute(v)?)))
                .collect::<Result<_, String>>()?,
        ),
    })
}

/// Convert a stored value back into plain JSON.
pub fn to_json(value: &AttributeValue) -> Result<Value, String> {
    Ok(match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(d) => Value::Number(normalize_number(d)?),
        AttributeValue::F(f) => Value::Number(
            Number::from_f64(*f).ok_or_else(|| format!("stored float {f} is not finite"))?,
        ),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::L(items) => {
            Value::Array(items.iter().map(to_json).collect::<Result<_, _>>()?)
        }
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
                .collect::<Result<_, String>>()?,
        ),
    })
}

/// Integral decimals become integers, everything else a float.
pub fn normalize_number(d: &Decimal) -> Result<Number, String> {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Ok(Number::from(i));
        }
        if let Some(u) = d.to_u64() {
            return Ok(Number::from(u));
        }
    }
    // 10 進表記から読み直すと元の f64 に正しく丸められる
    d.to_string()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| format!("number {d} has no finite float form"))
}

fn number_attribute(n: &Number) -> Result<AttributeValue, String> {
    if let Some(i) = n.as_i64() {
        return Ok(AttributeValue::N(Decimal::from(i)));
    }
    if let Some(u) = n.as_u64() {
        return Ok(AttributeValue::N(Decimal::from(u)));
    }
    let f = n
        .as_f64()
        .ok_or_else(|| format!("number {n} is not representable"))?;
    match float_decimal(f) {
        Some(d) => Ok(AttributeValue::N(d)),
        None => Ok(AttributeValue::F(f)),
    }
}

/// `f` as a decimal, only when reading it back yields the same float.
fn float_decimal(f: f64) -> Option<Decimal> {
    let text = f.to_string();
    let d = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    let back = d.to_string().parse::<f64>().ok()?;
    (back == f).then_some(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobParams, JobResult, Row, TerminalOutcome};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::integer("42", json!(42))]
    #[case::negative("-7", json!(-7))]
    #[case::integral_with_scale("3.0", json!(3))]
    #[case::fraction("0.8", json!(0.8))]
    #[case::big_unsigned("18446744073709551615", json!(18446744073709551615u64))]
    fn normalizes_decimals(#[case] stored: &str, #[case] expected: Value) {
        let d = Decimal::from_str(stored).unwrap();
        assert_eq!(Value::Number(normalize_number(&d).unwrap()), expected);
    }

    #[rstest]
    #[case::whole_float(json!(1.0), json!(1))]
    #[case::fraction(json!(0.1), json!(0.1))]
    #[case::long_fraction(json!(0.30000000000000004), json!(0.30000000000000004))]
    #[case::beyond_u64(json!(1e20), json!(1e20))]
    #[case::beyond_decimal(json!(1e30), json!(1e30))]
    #[case::tiny(json!(1e-30), json!(1e-30))]
    #[case::huge(json!(-1e300), json!(-1e300))]
    fn stored_form_matches_canonical_form(#[case] input: Value, #[case] expected: Value) {
        assert_eq!(stored_form(&input).unwrap(), expected);
        assert_eq!(crate::domain::canonical_value(input), expected);
    }

    #[test]
    fn floats_outside_decimal_range_use_the_float_fallback() {
        assert_eq!(to_attribute(&json!(1e30)).unwrap(), AttributeValue::F(1e30));
        assert!(matches!(to_attribute(&json!(2.5)).unwrap(), AttributeValue::N(_)));
    }

    #[test]
    fn numbers_are_stored_as_decimals() {
        let attr = to_attribute(&json!({"objects": 12, "pct": 0.25})).unwrap();
        let AttributeValue::M(map) = attr else {
            panic!("expected a map");
        };
        assert_eq!(map["objects"], AttributeValue::N(Decimal::from(12)));
        assert_eq!(map["pct"], AttributeValue::N(Decimal::from_str("0.25").unwrap()));
    }

    #[test]
    fn record_survives_storage_with_plain_numbers() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let mut record = JobRecord::queued(
            JobId::parse("job-7").unwrap(),
            JobParams::new().with("sql_1", "true").with("sql_2", 1),
            now,
        );
        let mut row = Row::new();
        row.insert("label".into(), json!("cat"));
        row.insert("instance_count".into(), json!(1234));
        row.insert("pct_within_split".into(), json!(0.125));
        record
            .finish(
                TerminalOutcome::Succeeded(JobResult::from([("sql_1".to_string(), vec![row])])),
                now,
            )
            .unwrap();

        let item = encode_record(&record).unwrap();
        assert!(matches!(item["created_at"], AttributeValue::N(_)));

        let back = decode_record(&record.id, &item).unwrap();
        assert_eq!(back, record);
        let rows = &back.result().unwrap()["sql_1"];
        assert!(rows[0]["instance_count"].is_i64());
        assert!(rows[0]["pct_within_split"].is_f64());
    }

    #[test]
    fn unreadable_items_are_reported_as_corrupt() {
        let id = JobId::parse("job-x").unwrap();
        let item = Item::from([("status".to_string(), AttributeValue::S("bogus".into()))]);
        assert!(matches!(
            decode_record(&id, &item),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
