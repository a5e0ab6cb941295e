//! Fee arithmetic: tier discounts and the four-level referral split.
//!
//! Everything is integer lamports. Each percentage is applied with a
//! flooring division, so rounding dust always lands in the platform share.

use crate::types::{AccountId, FeeDistribution, ReferralShare, Tier};

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Referral levels paid out, including the direct referrer.
pub const MAX_REFERRAL_DEPTH: usize = 4;

/// Shares of the effective fee for levels 2, 3 and 4.
pub const UPLINE_SHARES_BPS: [u64; 3] = [1_000, 500, 250];

/// One link in an account's referral chain, nearest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
    pub id: AccountId,
    pub tier: Tier,
}

/// `amount * bps / 10_000`, floored, without intermediate overflow.
pub fn apply_bps(amount: u64, bps: u64) -> u64 {
    ((amount as u128 * bps as u128) / BPS_DENOMINATOR as u128) as u64
}

/// `amount` reduced by `bps`, floored.
pub fn discount(amount: u64, bps: u64) -> u64 {
    apply_bps(amount, BPS_DENOMINATOR.saturating_sub(bps))
}

/// Split the fee owed on `volume_lamports` of traded SOL.
///
/// `chain` is the referral chain nearest-first; entries past
/// [`MAX_REFERRAL_DEPTH`] are ignored.
pub fn compute_distribution(
    volume_lamports: u64,
    rate_bps: u64,
    own_tier: Tier,
    chain: &[Referrer],
) -> FeeDistribution {
    let base_fee = apply_bps(volume_lamports, rate_bps);

    let mut effective_fee = discount(base_fee, own_tier.self_discount_bps());
    if let Some(direct) = chain.first() {
        effective_fee = discount(effective_fee, direct.tier.referee_bonus_bps());
    }

    let shares: Vec<ReferralShare> = chain
        .iter()
        .take(MAX_REFERRAL_DEPTH)
        .enumerate()
        .map(|(i, referrer)| {
            let bps = if i == 0 {
                referrer.tier.level_one_share_bps()
            } else {
                UPLINE_SHARES_BPS[i - 1]
            };
            ReferralShare {
                referrer_id: referrer.id.clone(),
                level: (i + 1) as u8,
                tier: referrer.tier,
                lamports: apply_bps(effective_fee, bps),
            }
        })
        .filter(|share| share.lamports > 0)
        .collect();

    let referral_total: u64 = shares.iter().map(|s| s.lamports).sum();
    let platform = effective_fee.saturating_sub(referral_total);

    FeeDistribution {
        base_fee,
        effective_fee,
        shares,
        platform,
    }
}
