use crate::session::Identity;

pub const REGISTERED_VOTE_WEIGHT: u32 = 5;
pub const ANONYMOUS_VOTE_WEIGHT: u32 = 1;

/// Points a single vote adds. Only the credential type counts, so an
/// administrator signed in anonymously still votes as anonymous.
pub const fn vote_weight(identity: &Identity) -> u32 {
    if identity.anonymous {
        ANONYMOUS_VOTE_WEIGHT
    } else {
        REGISTERED_VOTE_WEIGHT
    }
}

pub const fn apply_vote(votes: u32, weight: u32) -> u32 {
    votes.saturating_add(weight)
}

/// Administrator override. Negative input clamps to zero.
pub fn set_votes(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}
