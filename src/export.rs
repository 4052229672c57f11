use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::OffsetDateTime;

use crate::models::{NormalizedRow, CSV_COLUMNS};

/// `<dir>/transactions_<address>_<YYYYmmdd_HHMMSS>.csv`, stamped in UTC.
pub fn output_path(output_dir: &Path, address: &str) -> PathBuf {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string());
    output_dir.join(format!("transactions_{address}_{stamp}.csv"))
}

/// Write the header and `rows` in the order given. Returns the row count.
pub fn write_csv<I>(path: &Path, rows: I) -> io::Result<usize>
where
    I: IntoIterator<Item = NormalizedRow>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_COLUMNS)?;
    let mut count = 0;
    for row in rows {
        writer.write_record(row.csv_record())?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_quotes_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let row = NormalizedRow {
            hash: "0x1".into(),
            timestamp: 0,
            date_time: "1970-01-01 00:00:00".into(),
            from: "0xa".into(),
            to: "0xb".into(),
            kind: "ERC-721 NFT Transfer".into(),
            asset_contract: "0xc".into(),
            asset_symbol: "Bored Ape, \"Yacht\" Club".into(),
            token_id: "7".into(),
            amount: "1".into(),
            gas_fee: "0.0".into(),
        };

        assert_eq!(write_csv(&path, vec![row]).unwrap(), 1);
        let body = fs::read_to_string(&path).unwrap();
        let mut lines = body.lines();
        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "0x1,1970-01-01 00:00:00,0xa,0xb,ERC-721 NFT Transfer,0xc,\"Bored Ape, \"\"Yacht\"\" Club\",7,1,0.0"
        );
    }

    #[test]
    fn output_name_carries_address() {
        let path = output_path(Path::new("out"), "0xAbC");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("transactions_0xAbC_"));
        assert!(name.ends_with(".csv"));
    }
}
