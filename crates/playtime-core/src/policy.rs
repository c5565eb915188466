//! Tier and budget resolution

use playtime_api::Tier;
use playtime_config::{Capability, Policy};
use playtime_util::UserId;

/// Everything the engine needs to know about a user's standing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedUser {
    pub tier: Tier,
    pub bypass_exempt: bool,
    pub max_budget_seconds: u64,
}

impl ResolvedUser {
    /// Privileged users must be live to start a session, unless they bypass
    pub fn requires_live_gate(&self) -> bool {
        self.tier == Tier::Privileged && !self.bypass_exempt
    }
}

/// Capability a user must hold to be in `tier`. `None` means everyone qualifies.
fn tier_capability(tier: Tier) -> Option<Capability> {
    match tier {
        Tier::Privileged => Some(Capability::Privileged),
        Tier::Standard => None,
    }
}

/// First tier in priority order whose capability the identity holds
pub fn tier_of(policy: &Policy, identity: &UserId) -> Tier {
    Tier::PRIORITY
        .into_iter()
        .find(|tier| match tier_capability(*tier) {
            Some(cap) => policy.has_capability(identity, cap),
            None => true,
        })
        .unwrap_or(Tier::Standard)
}

pub fn is_bypass_exempt(policy: &Policy, identity: &UserId) -> bool {
    policy.has_capability(identity, Capability::Bypass)
}

pub fn max_budget_seconds(policy: &Policy, tier: Tier) -> u64 {
    policy.max_budget_seconds(tier)
}

/// The single resolution used by session start, the enforcement tick and
/// both feedback ticks
pub fn resolve(policy: &Policy, identity: &UserId) -> ResolvedUser {
    let tier = tier_of(policy, identity);
    ResolvedUser {
        tier,
        bypass_exempt: is_bypass_exempt(policy, identity),
        max_budget_seconds: max_budget_seconds(policy, tier),
    }
}
