// 🗄️ Profile store - embedded SQLite with an audit trail
//
// Profiles are keyed by the auth provider's id (`firebase_id`). The whole
// document is kept as JSON next to the columns we query on.

use crate::error::PersistenceError;
use crate::identity::email_for_username;
use crate::users::{Profile, UserRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, PersistenceError>;

/// Event for audit trail. One row per profile save.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Result of a profile save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Created,
    Updated,
}

/// Counts reported by `import_profiles`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Open (or create) the database file and make sure the schema exists
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Profiles Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id TEXT UNIQUE NOT NULL,
            firebase_id TEXT UNIQUE NOT NULL,
            email TEXT NOT NULL,
            city TEXT NOT NULL,
            profile TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profiles_email ON profiles(email)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// PROFILES
// ============================================================================

/// Create or replace the profile owned by `profile.firebase_id`.
///
/// A client-supplied `_id` is discarded: the stored id is kept on update and
/// minted on create. `updated_at` is always stamped here.
pub fn upsert_profile(conn: &Connection, mut profile: Profile, actor: &str) -> Result<(Profile, SaveKind)> {
    let firebase_id = profile
        .firebase_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(PersistenceError::MissingIdentity)?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT profile_id FROM profiles WHERE firebase_id = ?1",
            [&firebase_id],
            |row| row.get(0),
        )
        .optional()?;

    let kind = if existing.is_some() { SaveKind::Updated } else { SaveKind::Created };
    let profile_id = existing.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    profile.id = Some(profile_id.clone());
    profile.firebase_id = Some(firebase_id.clone());
    profile.updated_at = Some(Utc::now());

    let json = serde_json::to_string(&profile)?;
    let updated_at = profile.updated_at.map(|dt| dt.to_rfc3339()).unwrap_or_default();

    conn.execute(
        "INSERT INTO profiles (profile_id, firebase_id, email, city, profile, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(firebase_id) DO UPDATE SET
            email = excluded.email,
            city = excluded.city,
            profile = excluded.profile,
            updated_at = excluded.updated_at",
        params![profile_id, firebase_id, profile.email, profile.city, json, updated_at],
    )?;

    let event_type = match kind {
        SaveKind::Created => "profile_created",
        SaveKind::Updated => "profile_updated",
    };
    let event = Event::new(
        event_type,
        "profile",
        &profile_id,
        serde_json::json!({
            "city": profile.city,
            "neighborhoods": profile.neighborhoods,
        }),
        actor,
    );
    if let Err(e) = insert_event(conn, &event) {
        warn!(profile_id = %profile_id, error = %e, "audit event not recorded");
    }

    debug!(profile_id = %profile_id, ?kind, "profile saved");
    Ok((profile, kind))
}

/// Field-wise save: keys present in `patch` overwrite the stored profile,
/// everything else is kept. Any `_id` in the patch is dropped.
pub fn patch_profile(
    conn: &Connection,
    mut patch: serde_json::Map<String, serde_json::Value>,
    actor: &str,
) -> Result<(Profile, SaveKind)> {
    patch.remove("_id");

    let firebase_id = patch
        .get("firebase_id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(PersistenceError::MissingIdentity)?;

    let mut merged = match get_profile_by_identity(conn, firebase_id)? {
        Some(existing) => match serde_json::to_value(existing)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        },
        None => serde_json::Map::new(),
    };
    merged.extend(patch);

    let profile: Profile = serde_json::from_value(serde_json::Value::Object(merged))
        .map_err(|e| PersistenceError::InvalidProfile(e.to_string()))?;
    upsert_profile(conn, profile, actor)
}

pub fn get_profile_by_identity(conn: &Connection, firebase_id: &str) -> Result<Option<Profile>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT profile FROM profiles WHERE firebase_id = ?1",
            [firebase_id],
            |row| row.get(0),
        )
        .optional()?;

    json.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(PersistenceError::from)
}

/// First profile with exactly this email, as a listing record
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRecord>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT profile FROM profiles WHERE email = ?1 ORDER BY id LIMIT 1",
            [email],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(s) => Ok(Some(serde_json::from_str::<Profile>(&s)?.to_user_record())),
        None => Ok(None),
    }
}

/// Profile page lookup: `username` is the local part of an institutional email
pub fn get_user_by_username(conn: &Connection, username: &str, domain: &str) -> Result<Option<UserRecord>> {
    get_user_by_email(conn, &email_for_username(username, domain))
}

/// Every stored profile as a listing record, in creation order
pub fn list_users(conn: &Connection) -> Result<Vec<UserRecord>> {
    let mut stmt = conn.prepare("SELECT profile FROM profiles ORDER BY id")?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut users = Vec::with_capacity(rows.len());
    for json in rows {
        let profile: Profile = serde_json::from_str(&json)?;
        users.push(profile.to_user_record());
    }

    Ok(users)
}

pub fn count_profiles(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;

    Ok(count)
}

/// Bulk load (e.g. from a JSON export). Profiles without an identity id are skipped.
pub fn import_profiles(conn: &Connection, profiles: Vec<Profile>, actor: &str) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for profile in profiles {
        match upsert_profile(conn, profile, actor) {
            Ok((_, SaveKind::Created)) => summary.created += 1,
            Ok((_, SaveKind::Updated)) => summary.updated += 1,
            Err(PersistenceError::MissingIdentity) => summary.skipped += 1,
            Err(e) => return Err(e),
        }
    }

    Ok(summary)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut events = Vec::with_capacity(rows.len());
    for (event_id, timestamp, event_type, entity_type, entity_id, data, actor) in rows {
        // Rows we wrote ourselves; a bad timestamp falls back to the epoch
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default();

        events.push(Event {
            event_id,
            timestamp,
            event_type,
            entity_type,
            entity_id,
            data: serde_json::from_str(&data)?,
            actor,
        });
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn create_test_profile(firebase_id: &str, email: &str, neighborhoods: &[&str]) -> Profile {
        Profile {
            firebase_id: Some(firebase_id.to_string()),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            country: "USA".to_string(),
            state: "MA".to_string(),
            city: "Boston".to_string(),
            neighborhoods: neighborhoods.iter().map(|n| n.to_string()).collect(),
            ..Profile::default()
        }
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let conn = test_conn();

        let (first, kind1) =
            upsert_profile(&conn, create_test_profile("fb-1", "ada@caltech.edu", &["Back Bay"]), "test").unwrap();
        assert_eq!(kind1, SaveKind::Created);
        let id = first.id.clone().unwrap();

        let mut edited = create_test_profile("fb-1", "ada@caltech.edu", &["Fenway"]);
        edited.id = Some("client-forged-id".to_string());
        let (second, kind2) = upsert_profile(&conn, edited, "test").unwrap();

        assert_eq!(kind2, SaveKind::Updated);
        assert_eq!(second.id.as_deref(), Some(id.as_str()));
        assert_eq!(count_profiles(&conn).unwrap(), 1);

        let stored = get_profile_by_identity(&conn, "fb-1").unwrap().unwrap();
        assert_eq!(stored.neighborhoods, vec!["Fenway".to_string()]);
        assert!(stored.updated_at.is_some());
    }

    #[test]
    fn test_upsert_requires_identity() {
        let conn = test_conn();
        let mut profile = create_test_profile("  ", "ada@caltech.edu", &[]);

        assert!(matches!(
            upsert_profile(&conn, profile.clone(), "test"),
            Err(PersistenceError::MissingIdentity)
        ));

        profile.firebase_id = None;
        assert!(matches!(
            upsert_profile(&conn, profile, "test"),
            Err(PersistenceError::MissingIdentity)
        ));
        assert_eq!(count_profiles(&conn).unwrap(), 0);
    }

    #[test]
    fn test_lookup_by_username_and_listing() {
        let conn = test_conn();
        upsert_profile(&conn, create_test_profile("fb-1", "ada@caltech.edu", &["Back Bay"]), "test").unwrap();
        upsert_profile(&conn, create_test_profile("fb-2", "bob@caltech.edu", &[]), "test").unwrap();

        let ada = get_user_by_username(&conn, "ada", "caltech.edu").unwrap().unwrap();
        assert_eq!(ada.primary_neighborhood(), Some("Back Bay"));
        assert!(get_user_by_username(&conn, "nobody", "caltech.edu").unwrap().is_none());
        assert!(get_profile_by_identity(&conn, "fb-9").unwrap().is_none());

        let users = list_users(&conn).unwrap();
        let emails: Vec<&str> = users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["ada@caltech.edu", "bob@caltech.edu"]);
        assert!(users.iter().all(|u| !u.id.is_empty()));
    }

    #[test]
    fn test_patch_keeps_unsent_fields() {
        let conn = test_conn();
        upsert_profile(&conn, create_test_profile("fb-1", "ada@caltech.edu", &["Back Bay"]), "test").unwrap();

        let patch = serde_json::json!({
            "_id": "forged",
            "firebase_id": "fb-1",
            "city": "Cambridge",
            "pronouns": "she/her",
        });
        let serde_json::Value::Object(patch) = patch else { unreachable!() };
        let (saved, kind) = patch_profile(&conn, patch, "test").unwrap();

        assert_eq!(kind, SaveKind::Updated);
        assert_ne!(saved.id.as_deref(), Some("forged"));
        assert_eq!(saved.city, "Cambridge");
        assert_eq!(saved.first_name, "Ada");
        assert_eq!(saved.neighborhoods, vec!["Back Bay".to_string()]);
        assert_eq!(saved.extra["pronouns"], "she/her");
    }

    #[test]
    fn test_import_counts() {
        let conn = test_conn();
        let mut orphan = create_test_profile("x", "orphan@caltech.edu", &[]);
        orphan.firebase_id = None;

        let summary = import_profiles(
            &conn,
            vec![
                create_test_profile("fb-1", "ada@caltech.edu", &[]),
                create_test_profile("fb-1", "ada@caltech.edu", &["Fenway"]),
                orphan,
            ],
            "test",
        )
        .unwrap();

        assert_eq!(summary, ImportSummary { created: 1, updated: 1, skipped: 1 });
    }

    #[test]
    fn test_event_log() {
        let conn = test_conn();
        let (profile, _) =
            upsert_profile(&conn, create_test_profile("fb-1", "ada@caltech.edu", &["Back Bay"]), "tester").unwrap();
        upsert_profile(&conn, create_test_profile("fb-1", "ada@caltech.edu", &[]), "tester").unwrap();

        let events = get_events_for_entity(&conn, "profile", profile.id.as_deref().unwrap()).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "profile_created");
        assert_eq!(events[1].event_type, "profile_updated");
        assert_eq!(events[0].actor, "tester");
        assert_eq!(events[0].data["neighborhoods"][0], "Back Bay");
    }
}
