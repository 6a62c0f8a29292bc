//! Named strategies for ordering remote and local lookups.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Strategy governing the order and conditions under which the remote
/// and the local store are consulted.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
  /// Always fetch; never read or write the store.
  NoCache,
  /// Fetch first, fall back to a stale stored value on failure.
  PreferRemote,
  /// Serve from the store when present, otherwise fetch and store at version 1.
  #[default]
  PreferLocal,
  /// Serve from the store while its version is current, otherwise refetch.
  LocalThenRemote,
}

impl PolicyKind {
  pub const ALL: [PolicyKind; 4] = [
    PolicyKind::NoCache,
    PolicyKind::PreferRemote,
    PolicyKind::PreferLocal,
    PolicyKind::LocalThenRemote,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NoCache => "no-cache",
      Self::PreferRemote => "prefer-remote",
      Self::PreferLocal => "prefer-local",
      Self::LocalThenRemote => "local-then-remote",
    }
  }

  /// Whether this policy consults an expected version.
  pub fn is_versioned(&self) -> bool {
    matches!(self, Self::LocalThenRemote)
  }
}

impl fmt::Display for PolicyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PolicyKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace('_', "-");
    Self::ALL
      .into_iter()
      .find(|p| p.as_str() == normalized)
      .ok_or_else(|| format!("Unknown cache policy: {}", s))
  }
}
