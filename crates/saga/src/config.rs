//! Saga participant settings.

use std::str::FromStr;

use thiserror::Error;

/// How the inventory participant answers `ORDER_CANCELLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestorePolicy {
    /// Restore only stock that a recorded reservation actually took, once.
    #[default]
    RequireReservation,
    /// Restore the event quantity on every cancellation.
    ///
    /// Over-credits stock when a cancellation races a rejected reservation.
    Unconditional,
}

impl RestorePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestorePolicy::RequireReservation => "require-reservation",
            RestorePolicy::Unconditional => "unconditional",
        }
    }
}

impl std::fmt::Display for RestorePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown restore policy '{0}' (expected require-reservation or unconditional)")]
pub struct UnknownRestorePolicy(pub String);

impl FromStr for RestorePolicy {
    type Err = UnknownRestorePolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require-reservation" => Ok(RestorePolicy::RequireReservation),
            "unconditional" => Ok(RestorePolicy::Unconditional),
            other => Err(UnknownRestorePolicy(other.to_string())),
        }
    }
}

/// Settings for the saga participants, constructed once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    pub restore_policy: RestorePolicy,
    /// Consumer tasks started for each participant.
    pub consumers_per_participant: usize,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            restore_policy: RestorePolicy::default(),
            consumers_per_participant: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_restore_policy() {
        assert_eq!(
            "require-reservation".parse::<RestorePolicy>().unwrap(),
            RestorePolicy::RequireReservation
        );
        assert_eq!(
            " Unconditional ".parse::<RestorePolicy>().unwrap(),
            RestorePolicy::Unconditional
        );
        assert!("sometimes".parse::<RestorePolicy>().is_err());
    }

    #[test]
    fn test_default_requires_reservation() {
        let config = SagaConfig::default();
        assert_eq!(config.restore_policy, RestorePolicy::RequireReservation);
        assert_eq!(config.consumers_per_participant, 2);
    }
}
