//! Operation catalog and fixture loading for the binary.
//!
//! Without `BOBBIN_CATALOG_PATH` the service knows two operations over the
//! `annotations_parquet` table: instances per label and a deterministic
//! train/val split summary.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use bobbin_core::app::OperationCatalog;
use bobbin_core::impls::FixtureQueryEngine;

const LABEL_INSTANCE_COUNTS: &str = "\
SELECT label,
       COUNT(*) AS instance_count
FROM annotations_parquet
GROUP BY label
ORDER BY instance_count DESC";

const TRAIN_VAL_SPLIT: &str = "\
WITH images_per_label AS (
  SELECT DISTINCT label, image_id FROM annotations_parquet
),
ranked AS (
  SELECT label, image_id,
         row_number() OVER (
           PARTITION BY label
           ORDER BY mod(crc32(to_utf8(concat(label, ':', image_id, ':seed42'))), 1000000)
         ) AS rn
  FROM images_per_label
),
picked AS (
  SELECT label, image_id FROM ranked WHERE rn <= 500
),
split_assigned AS (
  SELECT p.label, p.image_id,
         CASE WHEN mod(crc32(to_utf8(concat(p.image_id, ':splitseed'))), 100) < 80
              THEN 'train' ELSE 'val'
         END AS split
  FROM picked p
),
final AS (
  SELECT a.*, s.split
  FROM annotations_parquet a
  JOIN split_assigned s ON a.label = s.label AND a.image_id = s.image_id
)
SELECT split,
       label,
       COUNT(*) AS objects,
       CAST(COUNT(*) AS DOUBLE) / SUM(COUNT(*)) OVER (PARTITION BY split) AS pct_within_split
FROM final
GROUP BY split, label
ORDER BY split, objects DESC";

pub fn builtin_catalog() -> anyhow::Result<OperationCatalog> {
    let mut catalog = OperationCatalog::new();
    catalog.register("sql_1", LABEL_INSTANCE_COUNTS)?;
    catalog.register("sql_2", TRAIN_VAL_SPLIT)?;
    Ok(catalog)
}

/// Read `{"name": "query text", ...}`.
pub fn load_catalog(path: &Path) -> anyhow::Result<OperationCatalog> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    parse_catalog(&raw).with_context(|| format!("parsing catalog {}", path.display()))
}

fn parse_catalog(raw: &str) -> anyhow::Result<OperationCatalog> {
    let entries: BTreeMap<String, String> = serde_json::from_str(raw)?;
    let mut catalog = OperationCatalog::new();
    for (name, query) in entries {
        catalog.register(name, query)?;
    }
    Ok(catalog)
}

/// Read `{"name": [rows], ...}`; also returns the operation names so the
/// builder can check they are all in the catalog.
pub fn load_fixtures(path: &Path) -> anyhow::Result<(FixtureQueryEngine, Vec<String>)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixtures {}", path.display()))?;
    parse_fixtures(&raw).with_context(|| format!("parsing fixtures {}", path.display()))
}

fn parse_fixtures(raw: &str) -> anyhow::Result<(FixtureQueryEngine, Vec<String>)> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let names = value
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    let engine = FixtureQueryEngine::from_json(&value)?;
    Ok((engine, names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_both_queries() {
        let catalog = builtin_catalog().unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["sql_1", "sql_2"]);
        assert!(catalog.get("sql_2").unwrap().query().contains("pct_within_split"));
    }

    #[test]
    fn catalog_file_replaces_builtin() {
        let catalog = parse_catalog(r#"{"top_labels": "SELECT label FROM t LIMIT 10"}"#).unwrap();
        assert!(catalog.contains("top_labels"));
        assert!(!catalog.contains("sql_1"));
    }

    #[test]
    fn catalog_file_rejects_empty_query() {
        assert!(parse_catalog(r#"{"sql_1": "  "}"#).is_err());
        assert!(parse_catalog("[]").is_err());
    }

    #[test]
    fn fixtures_report_their_operation_names() {
        let (_, names) = parse_fixtures(r#"{"sql_1": [{"label": "cat", "instance_count": 2}]}"#)
            .unwrap();
        assert_eq!(names, vec!["sql_1".to_string()]);
    }
}
