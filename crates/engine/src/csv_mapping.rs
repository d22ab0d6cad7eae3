//! Turns an uploaded CSV, already split into a header and records, into
//! delivery rows using the column mapping chosen by the user.

use channel_audit_core::types::{fields, normalize_channel_id, FactValue, Metric};
use channel_audit_core::{AuditError, AuditResult, RawMetricRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fields a CSV column may be mapped onto.
pub fn mappable_fields() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Metric::ALL.iter().map(|m| m.field_name()).collect();
    names.extend([
        fields::CHANNEL_ID,
        fields::COST,
        fields::IMPRESSIONS,
        fields::VIDEO_VIEWS,
    ]);
    names
}

/// Header name -> field name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsvColumnMapping {
    columns: HashMap<String, String>,
}

impl CsvColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, header: &str, field: &str) -> AuditResult<Self> {
        if !mappable_fields().contains(&field) {
            return Err(AuditError::Config(format!(
                "column '{header}' mapped to unknown field '{field}'"
            )));
        }
        self.columns.insert(header.trim().to_string(), field.to_string());
        Ok(self)
    }

    /// Build delivery rows. The file is unusable without a channel id
    /// column. Empty cells are dropped; unparseable cells are kept raw and
    /// skipped later at comparison time.
    pub fn rows(&self, header: &[String], records: &[Vec<String>]) -> AuditResult<Vec<RawMetricRow>> {
        let positions: Vec<(usize, &str)> = header
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                self.columns
                    .get(name.trim())
                    .map(|field| (i, field.as_str()))
            })
            .collect();

        if !positions.iter().any(|(_, f)| *f == fields::CHANNEL_ID) {
            return Err(AuditError::DataFetch(
                "CSV has no column mapped to channel_id".to_string(),
            ));
        }

        let rows = records
            .iter()
            .map(|record| {
                let mut row = RawMetricRow::default();
                for (i, field) in &positions {
                    let Some(cell) = record.get(*i).map(|c| c.trim()) else {
                        continue;
                    };
                    if cell.is_empty() {
                        continue;
                    }
                    if *field == fields::CHANNEL_ID {
                        row.channel_id = normalize_channel_id(cell);
                    } else {
                        row.values
                            .insert(field.to_string(), FactValue::Text(cell.to_string()));
                    }
                }
                row
            })
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(CsvColumnMapping::new().with_column("Spend", "spend").is_err());
    }

    #[test]
    fn test_rows_mapped() {
        let mapping = CsvColumnMapping::new()
            .with_column("Placement", "channel_id")
            .unwrap()
            .with_column("Avg. CPM", "cpm")
            .unwrap()
            .with_column("CTR", "ctr")
            .unwrap();
        let header = strings(&["Placement", "Avg. CPM", "CTR", "Notes"]);
        let records = vec![
            strings(&["youtube.com/channel/UC1", "$2.10", "1.5%", "x"]),
            strings(&["", "3.00", "", "y"]),
            strings(&["UC3", "4.00"]),
        ];

        let rows = mapping.rows(&header, &records).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].channel_id.as_deref(), Some("UC1"));
        assert_eq!(rows[0].values.get("cpm"), Some(&FactValue::Text("$2.10".to_string())));
        assert!(!rows[0].values.contains_key("Notes"));
        assert_eq!(rows[1].channel_id, None);
        assert!(!rows[1].values.contains_key("ctr"));
        assert_eq!(rows[2].channel_id.as_deref(), Some("UC3"));
    }

    #[test]
    fn test_missing_id_column_is_fatal() {
        let mapping = CsvColumnMapping::new().with_column("CPM", "cpm").unwrap();
        let result = mapping.rows(&strings(&["CPM"]), &[strings(&["1.0"])]);
        assert!(matches!(result, Err(AuditError::DataFetch(_))));
    }
}
