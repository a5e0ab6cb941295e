//! Volume tiers and the discount/share tables keyed on them.
//!
//! All rates are basis points of the fee they apply to.

use rust_decimal::Decimal;

use crate::types::Tier;

/// Lower bound (SOL, inclusive) of each tier band, ascending.
pub const TIER_THRESHOLDS: [(Tier, u64); 5] = [
    (Tier::Unranked, 0),
    (Tier::Bronze, 100),
    (Tier::Silver, 250),
    (Tier::Gold, 500),
    (Tier::Diamond, 1_000),
];

/// Highest tier whose threshold `volume` meets. Negative volume maps to unranked.
pub fn tier_for_volume(volume: Decimal) -> Tier {
    TIER_THRESHOLDS
        .iter()
        .rev()
        .find(|(_, threshold)| volume >= Decimal::from(*threshold))
        .map(|(tier, _)| *tier)
        .unwrap_or(Tier::Unranked)
}

impl Tier {
    /// Discount an account gets on its own fees.
    pub fn self_discount_bps(self) -> u64 {
        match self {
            Tier::Unranked => 0,
            Tier::Bronze => 500,
            Tier::Silver => 1_000,
            Tier::Gold => 1_500,
            Tier::Diamond => 2_500,
        }
    }

    /// Extra discount a referred account gets, keyed on its direct referrer's tier.
    pub fn referee_bonus_bps(self) -> u64 {
        match self {
            Tier::Unranked => 0,
            Tier::Bronze => 250,
            Tier::Silver => 500,
            Tier::Gold => 750,
            Tier::Diamond => 1_000,
        }
    }

    /// Share of the effective fee paid to a level-1 referrer of this tier.
    pub fn level_one_share_bps(self) -> u64 {
        match self {
            Tier::Unranked => 1_000,
            Tier::Bronze => 1_250,
            Tier::Silver => 1_500,
            Tier::Gold => 2_000,
            Tier::Diamond => 2_500,
        }
    }
}
