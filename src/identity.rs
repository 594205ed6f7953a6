// 🪪 Session identity
//
// The auth provider is external. What the rest of the crate sees is a plain
// `Identity` value handed in explicitly, never ambient global state.

use serde::{Deserialize, Serialize};

/// Currently signed-in account, as vouched for by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
        }
    }

    pub fn username(&self) -> &str {
        username_from_email(&self.email)
    }

    /// Whether `/user/<username>` is this identity's own page
    pub fn is_own_profile(&self, username: &str) -> bool {
        !username.is_empty() && self.username() == username
    }
}

/// Everything before the `@`; the whole string when there is none
pub fn username_from_email(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// `<username>@<domain>`
pub fn email_for_username(username: &str, domain: &str) -> String {
    format!("{username}@{domain}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupError {
    InvalidEmail,
    InvalidDomain { required: String },
}

impl SignupError {
    /// User-facing message for the sign-up form
    pub fn message(&self) -> String {
        match self {
            SignupError::InvalidEmail => "Please enter a valid email address.".to_string(),
            SignupError::InvalidDomain { required } => {
                format!("You must use an @{required} email to sign up.")
            }
        }
    }
}

/// Only institutional addresses may sign up
pub fn validate_signup_email(email: &str, domain: &str) -> Result<(), SignupError> {
    let email = email.trim();
    let (local, host) = email.split_once('@').ok_or(SignupError::InvalidEmail)?;
    if local.is_empty() || host.is_empty() || host.contains('@') {
        return Err(SignupError::InvalidEmail);
    }
    if !host.eq_ignore_ascii_case(domain) {
        return Err(SignupError::InvalidDomain {
            required: domain.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// PROFILE GUARD
// ============================================================================

/// Pages reachable without a finished profile
pub const OPEN_PATHS: [&str; 3] = ["/signin", "/signup", "/profile/edit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    RedirectSignIn,
    RedirectEditProfile,
}

impl GuardDecision {
    pub fn location(&self) -> Option<&'static str> {
        match self {
            GuardDecision::Allow => None,
            GuardDecision::RedirectSignIn => Some("/signin"),
            GuardDecision::RedirectEditProfile => Some("/profile/edit"),
        }
    }
}

/// Decide where a visitor may go.
///
/// `profile_exists` is `None` when the lookup itself failed; the visitor is
/// let through rather than bounced on a transient error.
pub fn guard(path: &str, identity: Option<&Identity>, profile_exists: Option<bool>) -> GuardDecision {
    if OPEN_PATHS.contains(&path) {
        return GuardDecision::Allow;
    }
    if identity.is_none() {
        return GuardDecision::RedirectSignIn;
    }
    match profile_exists {
        Some(false) => GuardDecision::RedirectEditProfile,
        Some(true) | None => GuardDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_from_email() {
        assert_eq!(username_from_email("ada@caltech.edu"), "ada");
        assert_eq!(username_from_email("plain"), "plain");
        assert_eq!(email_for_username("ada", "caltech.edu"), "ada@caltech.edu");
    }

    #[test]
    fn test_signup_domain() {
        assert!(validate_signup_email("ada@caltech.edu", "caltech.edu").is_ok());
        assert!(validate_signup_email("ada@CALTECH.EDU", "caltech.edu").is_ok());
        assert_eq!(
            validate_signup_email("ada@gmail.com", "caltech.edu"),
            Err(SignupError::InvalidDomain { required: "caltech.edu".to_string() })
        );
        assert_eq!(validate_signup_email("@caltech.edu", "caltech.edu"), Err(SignupError::InvalidEmail));
        assert_eq!(validate_signup_email("nope", "caltech.edu"), Err(SignupError::InvalidEmail));
    }

    #[test]
    fn test_guard_decisions() {
        let me = Identity::new("uid-1", "ada@caltech.edu");

        assert_eq!(guard("/signup", None, None), GuardDecision::Allow);
        assert_eq!(guard("/", None, None), GuardDecision::RedirectSignIn);
        assert_eq!(guard("/", Some(&me), Some(false)), GuardDecision::RedirectEditProfile);
        assert_eq!(guard("/", Some(&me), Some(true)), GuardDecision::Allow);
        assert_eq!(guard("/", Some(&me), None), GuardDecision::Allow);
        assert_eq!(guard("/profile/edit", Some(&me), Some(false)), GuardDecision::Allow);
    }

    #[test]
    fn test_own_profile() {
        let me = Identity::new("uid-1", "ada@caltech.edu");
        assert!(me.is_own_profile("ada"));
        assert!(!me.is_own_profile("grace"));
        assert!(!me.is_own_profile(""));
    }
}
