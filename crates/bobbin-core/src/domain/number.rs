//! JSON 数値の正規形
//!
//! ストアは整数値の浮動小数点を整数として返すので、
//! 比較する値は先にこの形へ揃えておきます（`1.0` -> `1`）。

use serde_json::{Number, Value};

/// Whole-number floats that fit `i64`/`u64` become integers; other numbers are kept.
pub fn canonical_number(n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }
    let Some(f) = n.as_f64() else {
        return n.clone();
    };
    if f.fract() != 0.0 {
        return n.clone();
    }
    if (-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&f) {
        return Number::from(f as i64);
    }
    if (0.0..18_446_744_073_709_551_616.0).contains(&f) {
        return Number::from(f as u64);
    }
    n.clone()
}

/// `canonical_number` applied through arrays and objects.
pub fn canonical_value(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(&n)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, canonical_value(v)))
                .collect(),
        ),
        other => other,
    }
}
