use crate::error::PresenceError;
use crate::ports::Result;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Reserved aggregate column, always the first column of the table
pub const TOTAL_ONLINE: &str = "Total_Online";

/// A user entry as returned by the presence endpoint. Only `username` is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    #[serde(default, deserialize_with = "lenient_username")]
    pub username: Option<String>,
}

// Strings are taken as-is, numbers and booleans by their JSON text.
// null, arrays and objects count as a missing username.
fn lenient_username<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(name) => Some(name),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    })
}

impl UserRecord {
    /// Parses a JSON array of user objects.
    /// Any element that is not an object invalidates the whole payload.
    pub fn list_from_json(body: &str) -> Result<Vec<UserRecord>> {
        let values: Vec<Value> = serde_json::from_str(body)?;

        values
            .into_iter()
            .enumerate()
            .map(|(position, value)| match value {
                Value::Object(_) => {
                    serde_json::from_value::<UserRecord>(value).map_err(PresenceError::from)
                }
                other => Err(PresenceError::Decode(format!(
                    "element {} is not an object: {}",
                    position, other
                ))),
            })
            .collect()
    }
}

/// One timestamped presence record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRow {
    pub timestamp: String,
    pub total_online: u32,
    /// 0/1 flags aligned with the table's user columns
    pub flags: Vec<u8>,
}

impl PresenceRow {
    pub fn flag_sum(&self) -> u32 {
        self.flags.iter().map(|&flag| u32::from(flag)).sum()
    }
}

/// Ordered set of known usernames, one per table column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ColumnRegistry {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnRegistry {
    fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Returns false when the name was already registered
    fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.positions.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        true
    }
}

/// What a single append changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub total_online: u32,
    pub new_columns: usize,
}

/// Wide presence log: rows keyed by timestamp, one column per username ever seen.
///
/// Columns are never removed. A column added after rows already exist is
/// back-filled with 0 in every earlier row, so rows are always dense.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceTable {
    registry: ColumnRegistry,
    rows: Vec<PresenceRow>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from persisted parts, checking that the shape is consistent
    pub fn from_parts(user_columns: Vec<String>, rows: Vec<PresenceRow>) -> Result<Self> {
        let mut registry = ColumnRegistry::default();
        for name in &user_columns {
            if name == TOTAL_ONLINE {
                return Err(PresenceError::MalformedTable(format!(
                    "{} listed as a user column",
                    TOTAL_ONLINE
                )));
            }
            if !registry.insert(name) {
                return Err(PresenceError::MalformedTable(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }

        for row in &rows {
            if row.flags.len() != registry.names.len() {
                return Err(PresenceError::MalformedTable(format!(
                    "row '{}' has {} values, expected {}",
                    row.timestamp,
                    row.flags.len(),
                    registry.names.len()
                )));
            }
        }

        Ok(Self { registry, rows })
    }

    /// Username columns in creation order, without `Total_Online`
    pub fn user_columns(&self) -> &[String] {
        &self.registry.names
    }

    /// All columns in persisted order: `Total_Online` first, then usernames.
    /// A table that has never been written to has no columns at all.
    pub fn columns(&self) -> Vec<&str> {
        if self.rows.is_empty() && self.registry.names.is_empty() {
            return Vec::new();
        }
        std::iter::once(TOTAL_ONLINE)
            .chain(self.registry.names.iter().map(String::as_str))
            .collect()
    }

    pub fn rows(&self) -> &[PresenceRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        if name == TOTAL_ONLINE {
            return !self.columns().is_empty();
        }
        self.registry.contains(name)
    }

    /// Value of `column` in row `row`, if both exist
    pub fn value(&self, row: usize, column: &str) -> Option<u32> {
        let row = self.rows.get(row)?;
        if column == TOTAL_ONLINE {
            return Some(row.total_online);
        }
        let position = self.registry.position(column)?;
        row.flags.get(position).map(|&flag| u32::from(flag))
    }

    /// Registers a username column, back-filling 0 into existing rows.
    /// Returns true if the column was created.
    pub fn ensure_column(&mut self, username: &str) -> bool {
        if username == TOTAL_ONLINE || !self.registry.insert(username) {
            return false;
        }
        for row in &mut self.rows {
            row.flags.push(0);
        }
        true
    }

    /// Appends one presence row for `usernames` at `timestamp`.
    ///
    /// Unknown usernames become new columns first. Every user column gets 1 if
    /// the username is in the input, else 0; duplicates in the input count once.
    pub fn append_presence(&mut self, timestamp: &str, usernames: &[String]) -> AppendOutcome {
        let mut new_columns = 0;
        for username in usernames {
            if username == TOTAL_ONLINE {
                tracing::warn!("Skipping username that collides with reserved column {}", TOTAL_ONLINE);
                continue;
            }
            if self.ensure_column(username) {
                tracing::debug!("Added column for new user {}", username);
                new_columns += 1;
            }
        }

        let online: HashSet<&str> = usernames.iter().map(String::as_str).collect();
        let flags: Vec<u8> = self
            .registry
            .names
            .iter()
            .map(|name| u8::from(online.contains(name.as_str())))
            .collect();

        let row = PresenceRow {
            timestamp: timestamp.to_string(),
            total_online: 0,
            flags,
        };
        let total_online = row.flag_sum();
        self.rows.push(PresenceRow { total_online, ..row });

        AppendOutcome {
            total_online,
            new_columns,
        }
    }
}
