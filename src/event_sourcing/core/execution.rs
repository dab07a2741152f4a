use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Execution Mode - LIVE / REPLAY
// ============================================================================
//
// Passed explicitly down the call chain (Repository::save -> EventBus ->
// EventHandler). Side effects that must not repeat when history is
// replayed (sending mail, issuing tokens) check `has(LIVE)`.
//
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionMode(u8);

impl ExecutionMode {
    pub const LIVE: ExecutionMode = ExecutionMode(1);
    pub const REPLAY: ExecutionMode = ExecutionMode(1 << 1);

    pub const fn empty() -> Self {
        ExecutionMode(0)
    }

    pub fn live() -> Self {
        Self::LIVE
    }

    pub fn with(self, flag: ExecutionMode) -> Self {
        ExecutionMode(self.0 | flag.0)
    }

    pub fn clear(self, flag: ExecutionMode) -> Self {
        ExecutionMode(self.0 & !flag.0)
    }

    pub fn toggle(self, flag: ExecutionMode) -> Self {
        ExecutionMode(self.0 ^ flag.0)
    }

    /// True when every bit of `flag` is set. The empty flag is never "had".
    pub fn has(self, flag: ExecutionMode) -> bool {
        flag.0 != 0 && self.0 & flag.0 == flag.0
    }

    pub fn is_live(self) -> bool {
        self.has(Self::LIVE)
    }

    pub fn is_replay(self) -> bool {
        self.has(Self::REPLAY)
    }
}

impl BitOr for ExecutionMode {
    type Output = ExecutionMode;

    fn bitor(self, rhs: ExecutionMode) -> ExecutionMode {
        self.with(rhs)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.is_live() {
            parts.push("LIVE");
        }
        if self.is_replay() {
            parts.push("REPLAY");
        }
        if parts.is_empty() {
            return f.write_str("NONE");
        }
        f.write_str(&parts.join("|"))
    }
}

impl fmt::Debug for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionMode({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_operations() {
        let mode = ExecutionMode::empty().with(ExecutionMode::LIVE);
        assert!(mode.has(ExecutionMode::LIVE));
        assert!(!mode.has(ExecutionMode::REPLAY));

        let both = mode | ExecutionMode::REPLAY;
        assert!(both.is_live() && both.is_replay());

        let replay_only = both.clear(ExecutionMode::LIVE);
        assert_eq!(replay_only, ExecutionMode::REPLAY);

        assert_eq!(replay_only.toggle(ExecutionMode::LIVE), both);
        assert!(!ExecutionMode::LIVE.has(ExecutionMode::empty()));
    }

    #[test]
    fn test_display() {
        assert_eq!(ExecutionMode::LIVE.to_string(), "LIVE");
        assert_eq!((ExecutionMode::LIVE | ExecutionMode::REPLAY).to_string(), "LIVE|REPLAY");
        assert_eq!(ExecutionMode::empty().to_string(), "NONE");
    }

    #[test]
    fn test_serializes_as_bits() {
        assert_eq!(serde_json::to_string(&ExecutionMode::REPLAY).unwrap(), "2");
        let mode: ExecutionMode = serde_json::from_str("1").unwrap();
        assert!(mode.is_live());
    }
}
