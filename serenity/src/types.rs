//! Shared identifier types used across the API and database layers.

use uuid::Uuid;

/// Identifier for a user account.
pub type UserId = Uuid;

/// Shorten a UUID to its first segment for log fields.
pub fn abbrev_uuid(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
