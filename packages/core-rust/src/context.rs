use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Claims carried by a verified bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier of the authenticated principal.
    pub sub: String,
    /// Expiry, in seconds since the Unix epoch.
    pub exp: u64,
    /// Role names granted to the principal. Accepts either a `roles` or a
    /// `role` claim, each as a single string or an array of strings.
    #[serde(default, alias = "role", deserialize_with = "one_or_many")]
    pub roles: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(role) => vec![role],
        OneOrMany::Many(roles) => roles,
    })
}

/// Per-request identity: the raw bearer credential plus its verified claims.
///
/// Built once by the request pipeline after the credential verifies, then
/// shared read-only (behind an `Arc`) with the handler and any outbound
/// calls made on the caller's behalf. Never shared across requests.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityContext {
    token: String,
    claims: Claims,
}

impl IdentityContext {
    #[must_use]
    pub fn new(token: impl Into<String>, claims: Claims) -> Self {
        Self {
            token: token.into(),
            claims,
        }
    }

    /// The bearer credential exactly as presented by the caller.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.claims.roles
    }

    /// Returns `true` if the principal carries `role` (exact match).
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.claims.roles.iter().any(|r| r == role)
    }
}

// The credential must never end up in logs.
impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(roles: &[&str]) -> Claims {
        Claims {
            sub: "42".to_string(),
            exp: 4_102_444_800,
            roles: roles.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn roles_claim_as_array() {
        let c: Claims =
            serde_json::from_str(r#"{"sub":"7","exp":1,"roles":["Doctor","Admin"]}"#).unwrap();
        assert_eq!(c.roles, vec!["Doctor", "Admin"]);
    }

    #[test]
    fn role_claim_as_single_string() {
        let c: Claims = serde_json::from_str(r#"{"sub":"7","exp":1,"role":"Nurse"}"#).unwrap();
        assert_eq!(c.roles, vec!["Nurse"]);
    }

    #[test]
    fn missing_roles_claim_is_empty() {
        let c: Claims = serde_json::from_str(r#"{"sub":"7","exp":1}"#).unwrap();
        assert!(c.roles.is_empty());
    }

    #[test]
    fn has_role_is_case_sensitive() {
        let id = IdentityContext::new("abc123", claims(&["Admin"]));
        assert!(id.has_role("Admin"));
        assert!(!id.has_role("admin"));
        assert_eq!(id.subject(), "42");
    }

    #[test]
    fn debug_redacts_token() {
        let id = IdentityContext::new("super-secret-token", claims(&[]));
        let rendered = format!("{id:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
