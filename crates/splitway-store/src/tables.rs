//! redb table definitions for the embedded backend.
//!
//! A single table holds every record; key prefixes (`metric::`, `users::`,
//! `result::`) separate the record kinds. Values carry an 8-byte big-endian
//! expiry header (unix milliseconds, 0 = never) ahead of the payload.

use redb::TableDefinition;

/// All records keyed by their encoded `::`-delimited key.
pub const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
