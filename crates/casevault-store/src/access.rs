//! Role-based decryption gate.
//!
//! A pure predicate over the caller's roles. No I/O, no clock, no state:
//! the same role set always gets the same answer, and the gate is consulted
//! before the vault touches storage at all.

use std::{collections::BTreeSet, fmt, str::FromStr};

use crate::error::UnknownRole;

/// A caller role.
///
/// Citizens submit evidence; dispatchers and responders additionally
/// handle it once submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Member of the public reporting an incident.
    Citizen,
    /// Dispatch operator triaging incidents.
    Dispatcher,
    /// Field responder assigned to an incident.
    Responder,
}

impl Role {
    /// Lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Dispatcher => "dispatcher",
            Role::Responder => "responder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Role::Citizen),
            "dispatcher" => Ok(Role::Dispatcher),
            "responder" => Ok(Role::Responder),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Decides which roles may decrypt stored evidence.
///
/// Storing and listing are not gated; only decryption reveals plaintext,
/// so only decryption asks the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGate {
    allowed: BTreeSet<Role>,
}

impl AccessGate {
    /// Gate permitting an explicit set of roles to decrypt.
    pub fn allowing(roles: impl IntoIterator<Item = Role>) -> Self {
        Self { allowed: roles.into_iter().collect() }
    }

    /// True if any of the presented roles may decrypt.
    ///
    /// An empty role set is always denied.
    pub fn permits_decrypt(&self, presented: &[Role]) -> bool {
        presented.iter().any(|role| self.allowed.contains(role))
    }
}

impl Default for AccessGate {
    /// The deployment default: dispatchers and responders decrypt,
    /// citizens do not.
    fn default() -> Self {
        Self::allowing([Role::Dispatcher, Role::Responder])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gate_permits_dispatcher_and_responder() {
        let gate = AccessGate::default();

        assert!(gate.permits_decrypt(&[Role::Dispatcher]));
        assert!(gate.permits_decrypt(&[Role::Responder]));
        assert!(!gate.permits_decrypt(&[Role::Citizen]));
    }

    #[test]
    fn any_permitted_role_is_enough() {
        let gate = AccessGate::default();

        assert!(gate.permits_decrypt(&[Role::Citizen, Role::Dispatcher]));
    }

    #[test]
    fn empty_role_set_is_denied() {
        let gate = AccessGate::default();

        assert!(!gate.permits_decrypt(&[]));
    }

    #[test]
    fn custom_gate_overrides_default() {
        let gate = AccessGate::allowing([Role::Citizen]);

        assert!(gate.permits_decrypt(&[Role::Citizen]));
        assert!(!gate.permits_decrypt(&[Role::Dispatcher]));
    }

    #[test]
    fn role_names_roundtrip() {
        for role in [Role::Citizen, Role::Dispatcher, Role::Responder] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "admin".parse::<Role>().unwrap_err();
        assert_eq!(err, UnknownRole("admin".to_string()));
    }
}
