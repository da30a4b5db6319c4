//! Job parameters: which named operations a job should run.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::number::canonical_value;

/// Mapping of operation name -> boolean-ish flag.
///
/// Values are kept as raw JSON so the record echoes what the client sent
/// (numbers in canonical form); truthiness is only decided when the worker
/// selects operations. Names the catalog does not know, blank ones included,
/// are skipped by the worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParams(BTreeMap<String, serde_json::Value>);

impl JobParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style flag insertion.
    pub fn with(mut self, name: impl Into<String>, flag: impl Into<serde_json::Value>) -> Self {
        self.0.insert(name.into(), flag.into());
        self
    }

    /// Same params with every number in canonical form, as the store returns them.
    pub fn canonical(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|(name, flag)| (name, canonical_value(flag)))
                .collect(),
        )
    }

    /// Names whose flag is truthy, in name order.
    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, flag)| is_truthy(flag))
            .map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for JobParams {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Deserialize `null` (or a missing field, with `#[serde(default)]`) as empty params.
pub fn nullable<'de, D>(deserializer: D) -> Result<JobParams, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<JobParams>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// `true`, `"true"` (trimmed, any case) and the number 1 (`1` or `1.0`) enable an operation.
pub fn is_truthy(flag: &serde_json::Value) -> bool {
    match flag {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        serde_json::Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::bool_true(json!(true), true)]
    #[case::bool_false(json!(false), false)]
    #[case::string_true(json!("true"), true)]
    #[case::string_true_upper(json!(" TRUE "), true)]
    #[case::string_false(json!("false"), false)]
    #[case::string_yes(json!("yes"), false)]
    #[case::one(json!(1), true)]
    #[case::zero(json!(0), false)]
    #[case::float_one(json!(1.0), true)]
    #[case::fraction(json!(1.5), false)]
    #[case::null(json!(null), false)]
    #[case::object(json!({"on": true}), false)]
    fn truthiness(#[case] flag: serde_json::Value, #[case] expected: bool) {
        assert_eq!(is_truthy(&flag), expected);
    }

    #[test]
    fn enabled_skips_falsy_flags() {
        let params = JobParams::new()
            .with("op_b", false)
            .with("op_a", true)
            .with("op_c", "true");
        let enabled: Vec<&str> = params.enabled().collect();
        assert_eq!(enabled, vec!["op_a", "op_c"]);
    }

    #[test]
    fn blank_names_are_kept_and_enabled_like_any_other() {
        let params = JobParams::new().with("  ", true).with("op_a", true);
        let enabled: Vec<&str> = params.enabled().collect();
        assert_eq!(enabled, vec!["  ", "op_a"]);
    }

    #[test]
    fn canonical_turns_whole_floats_into_integers() {
        let params = JobParams::new().with("op_a", 1.0).with("op_b", "true");
        let canonical = params.clone().canonical();
        assert_eq!(canonical.get("op_a"), Some(&json!(1)));
        assert_eq!(canonical.get("op_b"), Some(&json!("true")));
        assert_eq!(
            params.enabled().collect::<Vec<_>>(),
            canonical.enabled().collect::<Vec<_>>()
        );
    }

    #[test]
    fn deserializes_from_a_plain_object() {
        let params: JobParams = serde_json::from_value(json!({"sql_1": "true"})).unwrap();
        assert_eq!(params.get("sql_1"), Some(&json!("true")));
        assert_eq!(params.len(), 1);
    }
}
