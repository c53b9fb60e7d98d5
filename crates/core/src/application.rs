use crate::ports::{Result, TableStore, UserSource};
use crate::utils::current_timestamp;

/// Result of appending one presence row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub timestamp: String,
    /// Usernames received, duplicates included
    pub usernames: usize,
    pub total_online: u32,
    pub new_columns: usize,
    /// Rows in the table after the append
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The fetch came back empty and no row was written
    Skipped,
    Logged(UpdateSummary),
}

/// Application service that polls the user source and maintains the presence log
pub struct PresenceLogService {
    user_source: Box<dyn UserSource>,
    table_store: Box<dyn TableStore>,
    record_empty: bool,
}

impl PresenceLogService {
    /// Creates a new PresenceLogService with the given dependencies
    pub fn new(user_source: Box<dyn UserSource>, table_store: Box<dyn TableStore>) -> Self {
        Self {
            user_source,
            table_store,
            record_empty: false,
        }
    }

    /// Also append an all-zero row when the fetch returns nobody
    pub fn with_record_empty(mut self, record_empty: bool) -> Self {
        self.record_empty = record_empty;
        self
    }

    pub fn fetch_usernames(&self) -> Vec<String> {
        self.user_source.fetch_usernames()
    }

    /// Appends a row for `usernames` stamped with the current local time
    pub fn update_log(&self, usernames: &[String]) -> Result<UpdateSummary> {
        self.update_log_at(usernames, &current_timestamp())
    }

    /// Loads the table, appends one row at `timestamp` and writes the whole table back
    pub fn update_log_at(&self, usernames: &[String], timestamp: &str) -> Result<UpdateSummary> {
        let mut table = self.table_store.load()?;
        tracing::debug!(
            "Loaded presence table with {} rows and {} user columns",
            table.row_count(),
            table.user_columns().len()
        );

        let outcome = table.append_presence(timestamp, usernames);
        self.table_store.save(&table)?;

        tracing::info!(
            "[{}] Updated presence log with {} users ({} online, {} new columns, {} rows)",
            timestamp,
            usernames.len(),
            outcome.total_online,
            outcome.new_columns,
            table.row_count()
        );

        Ok(UpdateSummary {
            timestamp: timestamp.to_string(),
            usernames: usernames.len(),
            total_online: outcome.total_online,
            new_columns: outcome.new_columns,
            row_count: table.row_count(),
        })
    }

    /// Executes one polling run: fetch, then append unless there is nothing to record
    pub fn run(&self) -> Result<RunOutcome> {
        let usernames = self.fetch_usernames();

        if usernames.is_empty() && !self.record_empty {
            tracing::info!("No users fetched.");
            return Ok(RunOutcome::Skipped);
        }

        self.update_log(&usernames).map(RunOutcome::Logged)
    }
}
