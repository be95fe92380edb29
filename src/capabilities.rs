//! Static capability map: which product surfaces keep working while
//! offline. Policy configuration for the UI, not engine behavior.

/// One product surface and whether it remains usable offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
  pub feature: &'static str,
  pub available_offline: bool,
}

/// The capability table, in display order.
pub const CAPABILITIES: &[Capability] = &[
  Capability {
    feature: "view cached research results",
    available_offline: true,
  },
  Capability {
    feature: "favorites",
    available_offline: true,
  },
  Capability {
    feature: "history",
    available_offline: true,
  },
  Capability {
    feature: "dashboards",
    available_offline: true,
  },
  Capability {
    feature: "new research",
    available_offline: false,
  },
  Capability {
    feature: "chat",
    available_offline: false,
  },
];

/// Offline availability for one feature, `None` if unknown.
pub fn available_offline(feature: &str) -> Option<bool> {
  CAPABILITIES
    .iter()
    .find(|c| c.feature == feature)
    .map(|c| c.available_offline)
}
