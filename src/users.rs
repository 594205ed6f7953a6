// 👤 Users & Profiles
//
// A Profile is what the edit form saves. A UserRecord is the sanitized,
// read-only projection every listing and the map pipeline work with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// USER RECORD
// ============================================================================

/// Listing entry handed out by `/api/users` and consumed by the resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub city: String,
    /// Ordered by preference. Only the first entry is used for mapping.
    #[serde(default)]
    pub neighborhoods: Vec<String>,
}

impl UserRecord {
    /// The neighborhood that decides where the user shows up on the map
    pub fn primary_neighborhood(&self) -> Option<&str> {
        self.neighborhoods.first().map(String::as_str)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Local part of the email, used as the public username
    pub fn username(&self) -> &str {
        crate::identity::username_from_email(&self.email)
    }

    /// `/user/<username>` with the username percent-encoded
    pub fn profile_url(&self) -> String {
        format!("/user/{}", urlencoding::encode(self.username()))
    }
}

// ============================================================================
// PROFILE
// ============================================================================

/// Full profile document as saved by the edit form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Storage id. Anything a client sends here is ignored on save.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// External identity id from the auth provider (upsert key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_id: Option<String>,

    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub neighborhoods: Vec<String>,
    #[serde(default)]
    pub looking_for_roommate: bool,
    #[serde(default)]
    pub looking_for_friend: bool,
    /// `YYYY-MM-DD` as entered in the form, possibly empty
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub other_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Fields the form sends that this struct doesn't know about
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Profile {
    /// Sanitized listing projection
    pub fn to_user_record(&self) -> UserRecord {
        UserRecord {
            id: self.id.clone().unwrap_or_default(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            country: self.country.clone(),
            state: Some(self.state.clone()).filter(|s| !s.is_empty()),
            city: self.city.clone(),
            neighborhoods: self.neighborhoods.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(start: &str, end: &str) -> Profile {
        Profile {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@caltech.edu".to_string(),
            city: "Boston".to_string(),
            neighborhoods: vec!["Back Bay".to_string(), "Fenway".to_string()],
            start_date: start.to_string(),
            end_date: end.to_string(),
            ..Profile::default()
        }
    }

    #[test]
    fn test_user_record_json_shape() {
        let json = serde_json::json!({
            "_id": "abc",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@caltech.edu",
            "city": "Boston",
            "neighborhoods": ["Back Bay"]
        });

        let user: UserRecord = serde_json::from_value(json).unwrap();
        assert_eq!(user.id, "abc");
        assert_eq!(user.primary_neighborhood(), Some("Back Bay"));
        assert_eq!(user.country, "");

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["_id"], "abc");
        assert!(back.get("state").is_none());
    }

    #[test]
    fn test_missing_neighborhoods_default_to_empty() {
        let user: UserRecord = serde_json::from_str(r#"{"_id":"x","city":"Austin"}"#).unwrap();
        assert!(user.neighborhoods.is_empty());
        assert_eq!(user.primary_neighborhood(), None);
    }

    #[test]
    fn test_profile_url_uses_local_part() {
        let user = profile("", "").to_user_record();
        assert_eq!(user.profile_url(), "/user/ada");
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_profile_url_is_encoded() {
        let mut user = profile("", "").to_user_record();
        user.email = "a b@caltech.edu".to_string();
        assert_eq!(user.profile_url(), "/user/a%20b");
    }

    #[test]
    fn test_unknown_fields_survive() {
        let json = r#"{"firebase_id":"f1","first_name":"Ada","pronouns":"she/her"}"#;
        let profile: Profile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.extra.get("pronouns").unwrap(), "she/her");
        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back["pronouns"], "she/her");
    }
}
