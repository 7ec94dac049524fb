use csv::{ReaderBuilder, StringRecord};

use crate::config::ColumnNames;
use crate::error::{EngineError, Result};
use crate::types::LocationRecord;

fn read_error(e: csv::Error) -> EngineError {
    EngineError::DataSource(format!("unreadable CSV: {}", e))
}

/// Parse the location dataset (header row + data rows) into records.
///
/// Columns are looked up by header name, so their order does not matter.
/// Rows may be short or long; missing columns other than the district
/// yield blank values. Blank lines are skipped.
pub fn parse_locations(text: &str, columns: &ColumnNames) -> Result<Vec<LocationRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader.headers().map_err(read_error)?.clone();
    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(EngineError::DataSource("dataset is empty".to_string()));
    }
    let position = |name: &str| {
        header
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
    };

    let district_col = position(&columns.district).ok_or_else(|| {
        EngineError::DataSource(format!("missing '{}' column in header", columns.district))
    })?;
    let chiefdom_col = position(&columns.chiefdom);
    let section_col = position(&columns.section);
    let facility_col = position(&columns.facility);

    let cell = |row: &StringRecord, col: Option<usize>| -> String {
        col.and_then(|i| row.get(i)).unwrap_or_default().to_string()
    };

    reader
        .records()
        .map(|row| {
            let row = row.map_err(read_error)?;
            Ok(LocationRecord {
                district: cell(&row, Some(district_col)),
                chiefdom: cell(&row, chiefdom_col),
                section: cell(&row, section_col),
                facility: cell(&row, facility_col),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locations() {
        let text = "hf,adm1,adm2,adm3\nKpetema CHP,Bo,Badjia,Ngelehun\n,Kenema,,\n";
        let records = parse_locations(text, &ColumnNames::default()).unwrap();
        assert_eq!(
            records,
            vec![
                LocationRecord::new("Bo", "Badjia", "Ngelehun", "Kpetema CHP"),
                LocationRecord::new("Kenema", "", "", ""),
            ]
        );
    }

    #[test]
    fn test_quoted_fields_and_blank_lines() {
        let text = "adm1,adm2,adm3,hf\r\n\"Western Area, Urban\",\"Central \"\"I\"\"\",Sec1,\"Two\nLines CHC\"\r\n\r\nBo,Badjia,Ngelehun,X\r\n";
        let records = parse_locations(text, &ColumnNames::default()).unwrap();
        assert_eq!(
            records,
            vec![
                LocationRecord::new("Western Area, Urban", "Central \"I\"", "Sec1", "Two\nLines CHC"),
                LocationRecord::new("Bo", "Badjia", "Ngelehun", "X"),
            ]
        );
    }

    #[test]
    fn test_ragged_rows() {
        let text = "adm1,adm2,adm3,hf\nBo,Badjia\nKenema,Nongowa,Kenema Town,Govt Hospital,extra\n";
        let records = parse_locations(text, &ColumnNames::default()).unwrap();
        assert_eq!(
            records,
            vec![
                LocationRecord::new("Bo", "Badjia", "", ""),
                LocationRecord::new("Kenema", "Nongowa", "Kenema Town", "Govt Hospital"),
            ]
        );
    }

    #[test]
    fn test_byte_order_mark_and_custom_headers() {
        let columns = ColumnNames {
            district: "District".into(),
            chiefdom: "Chiefdom".into(),
            section: "Section".into(),
            facility: "Facility".into(),
        };
        let text = "\u{feff}District,Chiefdom,Section,Facility\nBo,Badjia,Ngelehun,Ngelehun CHC\n";
        let records = parse_locations(text, &columns).unwrap();
        assert_eq!(records, vec![LocationRecord::new("Bo", "Badjia", "Ngelehun", "Ngelehun CHC")]);
    }

    #[test]
    fn test_missing_optional_columns() {
        let records = parse_locations("adm1,adm2\nBo,Badjia\n", &ColumnNames::default()).unwrap();
        assert_eq!(records, vec![LocationRecord::new("Bo", "Badjia", "", "")]);
    }

    #[test]
    fn test_missing_district_column() {
        let err = parse_locations("region,hf\nBo,X\n", &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, EngineError::DataSource(_)));
        assert!(parse_locations("", &ColumnNames::default()).is_err());
    }

    #[test]
    fn test_header_only() {
        let records = parse_locations("adm1,adm2,adm3,hf\n", &ColumnNames::default()).unwrap();
        assert!(records.is_empty());
    }
}
