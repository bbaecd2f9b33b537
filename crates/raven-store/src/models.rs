/// Row of the `kv` table. Values are JSON documents.
pub struct EntryRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// Keys the client writes.
pub mod keys {
    pub const LAST_CHANNEL: &str = "last_channel";
    pub const QUICK_REACTIONS: &str = "quick_reactions";
}

/// Reaction set offered before the user customises it.
pub const DEFAULT_QUICK_REACTIONS: [&str; 4] = ["👍", "✅", "👀", "🎉"];
