use crate::domain::PresenceTable;
use crate::error::PresenceError;

pub type Result<T> = std::result::Result<T, PresenceError>;

/// Source of currently online usernames.
///
/// Implementations never fail: any transport or decoding problem is logged
/// and reported as an empty list, which callers treat as "nothing to do".
pub trait UserSource {
    fn fetch_usernames(&self) -> Vec<String>;
}

/// Trait for loading and persisting the presence table
/// This is a port (interface) that defines how the core communicates with storage adapters
pub trait TableStore {
    // Returns an empty table when nothing has been persisted yet
    fn load(&self) -> Result<PresenceTable>;

    fn save(&self, table: &PresenceTable) -> Result<()>;
}
