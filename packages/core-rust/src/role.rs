//! Role authorization gate.
//!
//! A [`RoleRequirement`] is attached to a protected operation when it is
//! registered; [`authorize`] evaluates it against the request's identity
//! before the handler runs. Evaluation is pure and synchronous.

use std::collections::BTreeSet;

use crate::context::IdentityContext;
use crate::error::RoleRequirementError;

/// Non-empty set of role names. A request satisfies the requirement when the
/// caller holds at least one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequirement {
    roles: BTreeSet<String>,
}

impl RoleRequirement {
    /// Builds a requirement from role names.
    ///
    /// # Errors
    ///
    /// Returns [`RoleRequirementError::Empty`] if no roles are given, and
    /// [`RoleRequirementError::BlankRole`] if any role name is blank.
    pub fn any_of<I, S>(roles: I) -> Result<Self, RoleRequirementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for role in roles {
            let role = role.into();
            if role.trim().is_empty() {
                return Err(RoleRequirementError::BlankRole);
            }
            set.insert(role);
        }
        if set.is_empty() {
            return Err(RoleRequirementError::Empty);
        }
        Ok(Self { roles: set })
    }

    /// Returns `true` if any of `held` is in this requirement.
    #[must_use]
    pub fn intersects<S: AsRef<str>>(&self, held: &[S]) -> bool {
        held.iter().any(|r| self.roles.contains(r.as_ref()))
    }
}

/// Why a request was rejected by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No valid identity (missing, malformed, or unverifiable credential).
    Unauthenticated,
    /// Valid identity whose roles do not intersect the requirement.
    Forbidden,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
        }
    }
}

/// Outcome of evaluating an access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny(reason) => reason.as_str(),
        }
    }
}

/// Evaluates a role requirement against the request's identity.
///
/// An absent identity never satisfies a requirement.
#[must_use]
pub fn authorize(identity: Option<&IdentityContext>, requirement: &RoleRequirement) -> Decision {
    match identity {
        None => Decision::Deny(DenyReason::Unauthenticated),
        Some(id) if requirement.intersects(id.roles()) => Decision::Allow,
        Some(_) => Decision::Deny(DenyReason::Forbidden),
    }
}

/// Access policy attached to a route at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// No gate. Any identity present is still resolved for credential relay.
    Public,
    /// Any valid identity, regardless of roles.
    Authenticated,
    /// Valid identity holding at least one of the required roles.
    Roles(RoleRequirement),
}

impl Access {
    /// Shorthand for `Access::Roles(RoleRequirement::any_of(roles)?)`.
    ///
    /// # Errors
    ///
    /// See [`RoleRequirement::any_of`].
    pub fn roles<I, S>(roles: I) -> Result<Self, RoleRequirementError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RoleRequirement::any_of(roles).map(Self::Roles)
    }

    #[must_use]
    pub fn evaluate(&self, identity: Option<&IdentityContext>) -> Decision {
        match self {
            Self::Public => Decision::Allow,
            Self::Authenticated if identity.is_some() => Decision::Allow,
            Self::Authenticated => Decision::Deny(DenyReason::Unauthenticated),
            Self::Roles(requirement) => authorize(identity, requirement),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::context::Claims;

    fn identity(roles: &[&str]) -> IdentityContext {
        IdentityContext::new(
            "token",
            Claims {
                sub: "1".to_string(),
                exp: 4_102_444_800,
                roles: roles.iter().map(ToString::to_string).collect(),
            },
        )
    }

    #[test]
    fn empty_requirement_rejected() {
        let err = RoleRequirement::any_of(Vec::<String>::new()).unwrap_err();
        assert_eq!(err, RoleRequirementError::Empty);
    }

    #[test]
    fn blank_role_rejected() {
        let err = RoleRequirement::any_of(["Admin", "  "]).unwrap_err();
        assert_eq!(err, RoleRequirementError::BlankRole);
    }

    #[test]
    fn nurse_cannot_reach_admin_operation() {
        let req = RoleRequirement::any_of(["admin"]).unwrap();
        let nurse = identity(&["nurse"]);
        assert_eq!(
            authorize(Some(&nurse), &req),
            Decision::Deny(DenyReason::Forbidden)
        );
    }

    #[test]
    fn any_listed_role_is_enough() {
        let req = RoleRequirement::any_of(["Admin", "SysAdmin"]).unwrap();
        assert_eq!(authorize(Some(&identity(&["SysAdmin"])), &req), Decision::Allow);
    }

    #[test]
    fn public_access_allows_anonymous() {
        assert_eq!(Access::Public.evaluate(None), Decision::Allow);
    }

    #[test]
    fn authenticated_access_ignores_roles() {
        assert_eq!(
            Access::Authenticated.evaluate(Some(&identity(&[]))),
            Decision::Allow
        );
        assert_eq!(
            Access::Authenticated.evaluate(None),
            Decision::Deny(DenyReason::Unauthenticated)
        );
    }

    fn role_name() -> impl Strategy<Value = String> {
        "[A-Za-z]{1,8}"
    }

    proptest! {
        #[test]
        fn anonymous_never_satisfies_requirement(
            required in prop::collection::vec(role_name(), 1..5),
        ) {
            let req = RoleRequirement::any_of(required).unwrap();
            prop_assert_eq!(authorize(None, &req), Decision::Deny(DenyReason::Unauthenticated));
        }

        #[test]
        fn disjoint_roles_are_forbidden(
            required in prop::collection::vec(role_name(), 1..5),
            held in prop::collection::vec(role_name(), 0..5),
        ) {
            // Prefixing keeps the two sets disjoint.
            let required: Vec<String> = required.into_iter().map(|r| format!("req_{r}")).collect();
            let held: Vec<String> = held.into_iter().map(|r| format!("held_{r}")).collect();
            let req = RoleRequirement::any_of(required).unwrap();
            let held_refs: Vec<&str> = held.iter().map(String::as_str).collect();
            let id = identity(&held_refs);
            prop_assert_eq!(authorize(Some(&id), &req), Decision::Deny(DenyReason::Forbidden));
        }

        #[test]
        fn intersecting_roles_are_allowed(
            required in prop::collection::vec(role_name(), 1..5),
            extra in prop::collection::vec(role_name(), 0..5),
            pick in any::<prop::sample::Index>(),
        ) {
            let shared = pick.get(&required).clone();
            let req = RoleRequirement::any_of(required).unwrap();
            let mut held = extra;
            held.push(shared);
            let held_refs: Vec<&str> = held.iter().map(String::as_str).collect();
            prop_assert_eq!(authorize(Some(&identity(&held_refs)), &req), Decision::Allow);
        }
    }
}
