//! Bridge configuration.

use dino_state::DecodeLimits;

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Header-tier ceilings applied to every decode.
    pub limits: DecodeLimits,
}

impl BridgeConfig {
    #[must_use]
    pub const fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn with_max_obstacles(mut self, max: usize) -> Self {
        self.limits.max_obstacles = max;
        self
    }

    #[must_use]
    pub const fn with_max_total_cells(mut self, max: usize) -> Self {
        self.limits.max_total_cells = max;
        self
    }
}
