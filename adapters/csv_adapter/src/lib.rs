use presence_core::domain::{PresenceRow, PresenceTable, TOTAL_ONLINE};
use presence_core::error::PresenceError;
use presence_core::ports::{Result, TableStore};
use presence_core::utils::parse_row_timestamp;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// CSV implementation of the TableStore trait
///
/// Layout: an unnamed index column holding the row timestamp, then
/// `Total_Online`, then one 0/1 column per username.
pub struct CsvTableStore {
    path: PathBuf,
}

impl CsvTableStore {
    /// Creates a new CsvTableStore backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("presence-log"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn csv_error(err: csv::Error) -> PresenceError {
    if !err.is_io_error() {
        return PresenceError::MalformedTable(err.to_string());
    }
    match err.into_kind() {
        csv::ErrorKind::Io(io) => PresenceError::Io(io),
        other => PresenceError::MalformedTable(format!("{:?}", other)),
    }
}

/// Reads an integer cell. Empty cells count as 0 and integral floats such as
/// "1.0" are accepted.
fn parse_count(cell: &str) -> Option<u64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(0);
    }
    if let Ok(value) = cell.parse::<u64>() {
        return Some(value);
    }
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => {
            Some(value as u64)
        }
        _ => None,
    }
}

fn parse_flag(cell: &str, timestamp: &str, column: &str) -> Result<u8> {
    match parse_count(cell) {
        Some(0) => Ok(0),
        Some(1) => Ok(1),
        _ => Err(PresenceError::MalformedTable(format!(
            "row '{}' column '{}': expected 0 or 1, found '{}'",
            timestamp, column, cell
        ))),
    }
}

fn parse_total(cell: &str, timestamp: &str) -> Result<u32> {
    parse_count(cell)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| {
            PresenceError::MalformedTable(format!(
                "row '{}': invalid {} value '{}'",
                timestamp, TOTAL_ONLINE, cell
            ))
        })
}

/// Parses a persisted presence table
pub fn read_table<R: Read>(input: R) -> Result<PresenceTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input);

    let headers = reader.headers().map_err(csv_error)?.clone();

    // Positions are record indexes; index 0 is the timestamp label
    let mut total_index = None;
    let mut user_columns: Vec<(usize, String)> = Vec::new();
    for (index, name) in headers.iter().enumerate().skip(1) {
        if name == TOTAL_ONLINE {
            if total_index.is_some() {
                return Err(PresenceError::MalformedTable(format!(
                    "duplicate column '{}'",
                    TOTAL_ONLINE
                )));
            }
            total_index = Some(index);
        } else {
            user_columns.push((index, name.to_string()));
        }
    }

    if total_index.is_none() && !user_columns.is_empty() {
        tracing::warn!(
            "Presence log has no {} column, recomputing totals from user columns",
            TOTAL_ONLINE
        );
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let timestamp = record.get(0).unwrap_or_default().to_string();
        if parse_row_timestamp(&timestamp).is_none() {
            tracing::warn!("Row label '{}' is not a timestamp", timestamp);
        }

        let flags = user_columns
            .iter()
            .map(|(index, name)| parse_flag(record.get(*index).unwrap_or_default(), &timestamp, name))
            .collect::<Result<Vec<u8>>>()?;

        let flag_sum: u32 = flags.iter().map(|&flag| u32::from(flag)).sum();
        let total_online = match total_index {
            Some(index) => parse_total(record.get(index).unwrap_or_default(), &timestamp)?,
            None => flag_sum,
        };
        if total_online != flag_sum {
            tracing::warn!(
                "Row '{}' stores {} = {} but flags sum to {}",
                timestamp,
                TOTAL_ONLINE,
                total_online,
                flag_sum
            );
        }

        rows.push(PresenceRow {
            timestamp,
            total_online,
            flags,
        });
    }

    let names = user_columns.into_iter().map(|(_, name)| name).collect();
    PresenceTable::from_parts(names, rows)
}

/// Writes the full table with `Total_Online` as the first data column
pub fn write_table<W: Write>(output: W, table: &PresenceTable) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);

    let header = std::iter::once("").chain(table.columns());
    writer.write_record(header).map_err(csv_error)?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(row.flags.len() + 2);
        record.push(row.timestamp.clone());
        record.push(row.total_online.to_string());
        record.extend(row.flags.iter().map(|flag| flag.to_string()));
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

impl TableStore for CsvTableStore {
    fn load(&self) -> Result<PresenceTable> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(
                    "No presence log at {}, starting a new table",
                    self.path.display()
                );
                return Ok(PresenceTable::new());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.is_empty() {
            tracing::warn!("Presence log {} is empty, starting a new table", self.path.display());
            return Ok(PresenceTable::new());
        }

        read_table(contents.as_slice())
    }

    fn save(&self, table: &PresenceTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write next to the target, then swap it in
        let temp_path = self.temp_path();
        let file = fs::File::create(&temp_path)?;
        write_table(io::BufWriter::new(file), table)?;
        fs::rename(&temp_path, &self.path)?;

        tracing::debug!(
            "Wrote {} rows to {}",
            table.row_count(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_table() -> PresenceTable {
        let mut table = PresenceTable::new();
        table.append_presence("2025-01-01 10:00:00", &names(&["alice", "bob"]));
        table.append_presence("2025-01-01 10:10:00", &names(&["alice"]));
        table.append_presence("2025-01-01 10:20:00", &names(&["alice", "carol"]));
        table
    }

    #[test]
    fn test_load_missing_file_gives_empty_table() {
        let dir = TempDir::new().unwrap();
        let store = CsvTableStore::new(dir.path().join("user_log.csv"));
        let table = store.load().unwrap();
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[test]
    fn test_load_zero_byte_file_gives_empty_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user_log.csv");
        fs::write(&path, "").unwrap();
        assert!(CsvTableStore::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn test_write_table_layout() {
        let mut out = Vec::new();
        write_table(&mut out, &sample_table()).unwrap();
        let text = String::from_utf8(out).unwrap();

        let expected = "\
,Total_Online,alice,bob,carol
2025-01-01 10:00:00,2,1,1,0
2025-01-01 10:10:00,1,1,0,0
2025-01-01 10:20:00,2,1,0,1
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_save_then_load_preserves_table() {
        let dir = TempDir::new().unwrap();
        let store = CsvTableStore::new(dir.path().join("user_log.csv"));
        let table = sample_table();

        store.save(&table).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, table);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = CsvTableStore::new(dir.path().join("logs").join("nested").join("user_log.csv"));
        store.save(&sample_table()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_save_overwrites_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = CsvTableStore::new(dir.path().join("user_log.csv"));
        store.save(&sample_table()).unwrap();

        let mut table = store.load().unwrap();
        table.append_presence("2025-01-01 10:30:00", &names(&["dave"]));
        store.save(&table).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.row_count(), 4);
        assert_eq!(loaded.columns(), vec![TOTAL_ONLINE, "alice", "bob", "carol", "dave"]);
        assert_eq!(loaded.value(0, "dave"), Some(0));
        assert_eq!(loaded.value(3, TOTAL_ONLINE), Some(1));
    }

    #[test]
    fn test_read_accepts_empty_and_float_cells() {
        let input = "\
,Total_Online,alice,bob
2025-01-01 10:00:00,1.0,1.0,
2025-01-01 10:10:00,2,1,1
";
        let table = read_table(input.as_bytes()).unwrap();
        assert_eq!(table.value(0, TOTAL_ONLINE), Some(1));
        assert_eq!(table.value(0, "alice"), Some(1));
        assert_eq!(table.value(0, "bob"), Some(0));
        assert_eq!(table.value(1, "bob"), Some(1));
    }

    #[test]
    fn test_read_reorders_total_to_front() {
        let input = "\
,alice,Total_Online,bob
2025-01-01 10:00:00,1,2,1
";
        let table = read_table(input.as_bytes()).unwrap();
        assert_eq!(table.columns(), vec![TOTAL_ONLINE, "alice", "bob"]);
        assert_eq!(table.rows()[0].flags, vec![1, 1]);
        assert_eq!(table.rows()[0].total_online, 2);
    }

    #[test]
    fn test_read_without_total_recomputes_it() {
        let input = "\
,alice,bob
2025-01-01 10:00:00,1,1
2025-01-01 10:10:00,0,1
";
        let table = read_table(input.as_bytes()).unwrap();
        assert_eq!(table.value(0, TOTAL_ONLINE), Some(2));
        assert_eq!(table.value(1, TOTAL_ONLINE), Some(1));
    }

    #[test]
    fn test_read_quoted_usernames() {
        let mut table = PresenceTable::new();
        table.append_presence("2025-01-01 10:00:00", &names(&["a,b", "quote\"d"]));
        let mut out = Vec::new();
        write_table(&mut out, &table).unwrap();

        let loaded = read_table(out.as_slice()).unwrap();
        assert_eq!(loaded.user_columns(), &names(&["a,b", "quote\"d"])[..]);
    }

    #[test]
    fn test_read_rejects_ragged_rows() {
        let input = "\
,Total_Online,alice
2025-01-01 10:00:00,1,1,1
";
        let err = read_table(input.as_bytes()).unwrap_err();
        assert!(matches!(err, PresenceError::MalformedTable(_)));
    }

    #[test]
    fn test_read_rejects_non_numeric_flag() {
        let input = "\
,Total_Online,alice
2025-01-01 10:00:00,1,yes
";
        let err = read_table(input.as_bytes()).unwrap_err();
        assert!(matches!(err, PresenceError::MalformedTable(_)));
    }

    #[test]
    fn test_read_rejects_flag_above_one() {
        let input = "\
,Total_Online,alice
2025-01-01 10:00:00,2,2
";
        assert!(read_table(input.as_bytes()).is_err());
    }

    #[test]
    fn test_read_rejects_duplicate_columns() {
        let input = "\
,Total_Online,alice,alice
2025-01-01 10:00:00,1,1,0
";
        assert!(matches!(
            read_table(input.as_bytes()),
            Err(PresenceError::MalformedTable(_))
        ));
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user_log.csv");
        fs::write(&path, ",Total_Online,alice\n2025-01-01 10:00:00,1\n").unwrap();
        assert!(CsvTableStore::new(&path).load().is_err());
    }

    #[test]
    fn test_parse_count_variants() {
        assert_eq!(parse_count(""), Some(0));
        assert_eq!(parse_count(" 3 "), Some(3));
        assert_eq!(parse_count("2.0"), Some(2));
        assert_eq!(parse_count("1.5"), None);
        assert_eq!(parse_count("-1"), None);
        assert_eq!(parse_count("NaN"), None);
    }
}
