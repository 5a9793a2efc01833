//! Shared types used across lbsync crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pool member endpoint: the public address and port of one gear.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    pub address: String,
    pub port: u16,
}

impl Member {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemberParseError {
    #[error("member `{0}` is not of the form address:port")]
    MissingPort(String),

    #[error("member `{0}` has an invalid port")]
    InvalidPort(String),
}

impl FromStr for Member {
    type Err = MemberParseError;

    /// Parses the `address:port` form load balancers use to name members.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| MemberParseError::MissingPort(s.to_string()))?;
        if address.is_empty() {
            return Err(MemberParseError::MissingPort(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| MemberParseError::InvalidPort(s.to_string()))?;
        Ok(Member::new(address, port))
    }
}

// ── Backend inventory ─────────────────────────────────────────────

/// A pool as reported by a backend at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolRecord {
    pub name: String,
    pub members: Vec<Member>,
    pub monitor: Option<String>,
}

/// A routing rule as reported by a backend at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteRecord {
    pub name: String,
    /// Pool the route forwards to (empty when the backend does not say).
    pub pool: String,
    /// Path prefix the route matches (empty when the backend does not say).
    pub path: String,
    /// Virtual server the route is attached to, if any.
    pub attached_to: Option<String>,
}

/// A health monitor as reported by a backend at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonitorRecord {
    pub name: String,
    pub path: String,
    pub up_code: String,
}

/// Everything a backend currently holds. Used to rebuild the resource
/// directory when the daemon starts, since no state is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub pools: Vec<PoolRecord>,
    pub routes: Vec<RouteRecord>,
    pub monitors: Vec<MonitorRecord>,
}

impl Inventory {
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty() && self.routes.is_empty() && self.monitors.is_empty()
    }

    /// Total member count across all pools.
    pub fn member_count(&self) -> usize {
        self.pools.iter().map(|p| p.members.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_display_uses_address_colon_port() {
        let m = Member::new("10.0.0.1", 8080);
        assert_eq!(m.to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn member_parses_address_and_port() {
        let m: Member = "10.0.0.1:8080".parse().unwrap();
        assert_eq!(m, Member::new("10.0.0.1", 8080));
    }

    #[test]
    fn member_parse_splits_on_last_colon() {
        let m: Member = "[::1]:443".parse().unwrap();
        assert_eq!(m.address, "[::1]");
        assert_eq!(m.port, 443);
    }

    #[test]
    fn member_parse_rejects_missing_port() {
        assert_eq!(
            "10.0.0.1".parse::<Member>(),
            Err(MemberParseError::MissingPort("10.0.0.1".to_string()))
        );
        assert!(matches!(
            ":80".parse::<Member>(),
            Err(MemberParseError::MissingPort(_))
        ));
    }

    #[test]
    fn member_parse_rejects_bad_port() {
        assert!(matches!(
            "10.0.0.1:http".parse::<Member>(),
            Err(MemberParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "10.0.0.1:70000".parse::<Member>(),
            Err(MemberParseError::InvalidPort(_))
        ));
    }

    #[test]
    fn inventory_counts_members() {
        let inv = Inventory {
            pools: vec![
                PoolRecord {
                    name: "a".into(),
                    members: vec![Member::new("10.0.0.1", 80), Member::new("10.0.0.2", 80)],
                    monitor: None,
                },
                PoolRecord {
                    name: "b".into(),
                    members: vec![Member::new("10.0.0.3", 80)],
                    monitor: None,
                },
            ],
            ..Default::default()
        };
        assert!(!inv.is_empty());
        assert_eq!(inv.member_count(), 3);
        assert!(Inventory::default().is_empty());
    }
}
