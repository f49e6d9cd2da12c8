//! Hive-style partition directories.
//!
//! Partition values are written as `column=value` path segments. Characters
//! that are unsafe in a path segment are percent-escaped, and nulls are
//! written as [`DEFAULT_PARTITION`].

use std::collections::HashMap;

/// Directory value standing in for a null partition value.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

fn needs_escape(c: char) -> bool {
    c.is_ascii_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '}' | '[' | ']' | '^'
        )
}

/// Percent-escape a partition value for use in a path segment.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse [`escape`]. Malformed escapes are kept as-is.
pub fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &value[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Directory for a set of partition values, e.g. `year=2018/month=11`.
///
/// Null and empty values both go to [`DEFAULT_PARTITION`]. Returns an empty
/// string for an unpartitioned table.
pub fn partition_dir(columns: &[&str], values: &[Option<String>]) -> String {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| match value.as_deref() {
            Some(value) if !value.is_empty() => format!("{column}={}", escape(value)),
            _ => format!("{column}={DEFAULT_PARTITION}"),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Extracts partition values from file paths.
///
/// Only segments naming one of the configured columns are considered.
///
/// ```
/// use sparkify_lake::partition::PartitionExtractor;
///
/// let extractor = PartitionExtractor::new(vec!["year".into(), "month".into()]);
/// let values = extractor.extract("time/time.parquet/year=2018/month=11/part-00000.parquet");
/// assert_eq!(values["year"].as_deref(), Some("2018"));
/// assert_eq!(values["month"].as_deref(), Some("11"));
/// ```
#[derive(Debug, Clone)]
pub struct PartitionExtractor {
    columns: Vec<String>,
}

impl PartitionExtractor {
    /// Create an extractor for specific partition columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Extract partition values from a path.
    ///
    /// Values are unescaped; [`DEFAULT_PARTITION`] becomes `None`. Columns
    /// absent from the path are absent from the map.
    pub fn extract(&self, path: &str) -> HashMap<String, Option<String>> {
        let mut values = HashMap::new();

        for segment in path.split('/') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            if !self.columns.iter().any(|c| c == key) {
                continue;
            }
            let value = (value != DEFAULT_PARTITION).then(|| unescape(value));
            values.insert(key.to_string(), value);
        }

        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(columns: &[&str]) -> PartitionExtractor {
        PartitionExtractor::new(columns.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_extract_nested_partitions() {
        let values = extractor(&["year", "artist_id"])
            .extract("songs/songs.parquet/year=2000/artist_id=A1/part-00000.parquet");

        assert_eq!(values["year"].as_deref(), Some("2000"));
        assert_eq!(values["artist_id"].as_deref(), Some("A1"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_extract_ignores_unconfigured_columns() {
        let values = extractor(&["year"]).extract("year=2018/month=11/part-00000.parquet");

        assert_eq!(values.len(), 1);
        assert!(!values.contains_key("month"));
    }

    #[test]
    fn test_extract_matches_whole_segment_names() {
        let values = extractor(&["year"]).extract("fiscal_year=1999/part-00000.parquet");
        assert!(values.is_empty());
    }

    #[test]
    fn test_default_partition_is_null() {
        let values = extractor(&["year", "month"]).extract(
            "songplays/songplays.parquet/year=__HIVE_DEFAULT_PARTITION__/month=__HIVE_DEFAULT_PARTITION__/part-00000.parquet",
        );

        assert_eq!(values["year"], None);
        assert_eq!(values["month"], None);
    }

    #[test]
    fn test_partition_dir_escapes_values() {
        let dir = partition_dir(
            &["year", "artist_id"],
            &[Some("2000".to_string()), Some("AC/DC=50%".to_string())],
        );
        assert_eq!(dir, "year=2000/artist_id=AC%2FDC%3D50%25");

        let values = extractor(&["year", "artist_id"]).extract(&format!("{dir}/part-00000.parquet"));
        assert_eq!(values["artist_id"].as_deref(), Some("AC/DC=50%"));
    }

    #[test]
    fn test_partition_dir_null_and_unpartitioned() {
        assert_eq!(
            partition_dir(&["year", "month"], &[None, Some("11".to_string())]),
            "year=__HIVE_DEFAULT_PARTITION__/month=11"
        );
        assert_eq!(partition_dir(&[], &[]), "");
    }

    #[test]
    fn test_partition_dir_empty_value_is_default() {
        assert_eq!(
            partition_dir(&["year", "artist_id"], &[Some("2000".to_string()), Some(String::new())]),
            "year=2000/artist_id=__HIVE_DEFAULT_PARTITION__"
        );
    }

    #[test]
    fn test_escape_roundtrip_keeps_unicode() {
        let raw = "Beyoncé: \"Halo\"";
        assert_eq!(unescape(&escape(raw)), raw);
        assert_eq!(unescape("100%"), "100%");
    }
}
