//! Timer capability negotiation.
//!
//! The host platform may or may not allow exact wakes that bypass
//! idle/power-saving deferral, and may gate exact scheduling behind a
//! user-granted permission. Instead of branching on platform versions
//! at every call site, the scheduler consults a capability table once
//! per registration and picks the best primitive available.

use std::time::Duration;

/// Deferral slack applied to windowed (best-effort) wakes.
const WINDOWED_SLACK: Duration = Duration::from_millis(500);

/// An underlying timer primitive, ordered from most to least precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPrimitive {
    /// Exact wake that bypasses idle/power-saving deferral.
    ExactWhileIdle,
    /// Exact wake, subject to idle deferral.
    Exact,
    /// Best-effort wake within a deferral window.
    Windowed,
}

impl TimerPrimitive {
    /// Extra delay the platform may impose before the wake fires.
    pub fn deferral_slack(self) -> Duration {
        match self {
            TimerPrimitive::ExactWhileIdle | TimerPrimitive::Exact => Duration::ZERO,
            TimerPrimitive::Windowed => WINDOWED_SLACK,
        }
    }
}

/// What the host platform's timer facility supports.
#[derive(Debug, Clone, Copy)]
pub struct TimerCapabilities {
    /// Exact scheduling is permitted (the platform's exact-alarm
    /// permission, where one exists).
    pub exact_permitted: bool,
    /// Exact wakes may bypass idle/power-saving deferral.
    pub idle_bypass: bool,
}

impl TimerCapabilities {
    /// Candidate primitives in preference order.
    const PREFERENCE: [TimerPrimitive; 3] = [
        TimerPrimitive::ExactWhileIdle,
        TimerPrimitive::Exact,
        TimerPrimitive::Windowed,
    ];

    /// Capabilities of a platform with no restrictions.
    pub fn unrestricted() -> Self {
        Self {
            exact_permitted: true,
            idle_bypass: true,
        }
    }

    /// Whether exact scheduling is currently permitted.
    pub fn can_schedule_exact(&self) -> bool {
        self.exact_permitted
    }

    /// Select the best primitive this platform supports. Windowed is
    /// always available as the fallback.
    pub fn best_primitive(&self) -> TimerPrimitive {
        Self::PREFERENCE
            .into_iter()
            .find(|p| self.supports(*p))
            .unwrap_or(TimerPrimitive::Windowed)
    }

    fn supports(&self, primitive: TimerPrimitive) -> bool {
        match primitive {
            TimerPrimitive::ExactWhileIdle => self.exact_permitted && self.idle_bypass,
            TimerPrimitive::Exact => self.exact_permitted,
            TimerPrimitive::Windowed => true,
        }
    }
}
