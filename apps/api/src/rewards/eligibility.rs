//! Early adopter eligibility.
//!
//! Rank is taken over the auth provider's user list, oldest signup first. The
//! profile table can lag behind auth, so its row count only acts as a cap.

use uuid::Uuid;

use crate::models::auth::AuthUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Zero-based signup position.
    Eligible { rank: usize },
    OverLimit(LimitReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    /// Count query failed; treated as over the limit so nothing is granted twice.
    CountUnavailable,
    ProfileCount(i64),
    /// `None` when the user is missing from the auth list.
    SignupRank(Option<usize>),
}

/// First gate: the profile table must not already hold more rows than the limit.
pub fn check_profile_count(count: Option<i64>, limit: usize) -> Result<(), LimitReason> {
    match count {
        None => Err(LimitReason::CountUnavailable),
        Some(c) if c < 0 || c as u64 > limit as u64 => Err(LimitReason::ProfileCount(c)),
        Some(_) => Ok(()),
    }
}

/// Second gate: the user's signup position must fall inside the limit.
pub fn check_rank(rank: Option<usize>, limit: usize) -> Eligibility {
    match rank {
        Some(rank) if rank < limit => Eligibility::Eligible { rank },
        other => Eligibility::OverLimit(LimitReason::SignupRank(other)),
    }
}

/// Oldest first; ties broken by id so the order is stable across calls.
pub fn sort_by_signup(users: &mut [AuthUser]) {
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

pub fn signup_rank(users: &[AuthUser], user_id: Uuid) -> Option<usize> {
    let mut ordered = users.to_vec();
    sort_by_signup(&mut ordered);
    ordered.iter().position(|u| u.id == user_id)
}

/// The first `limit` users to ever sign up.
pub fn first_signups(mut users: Vec<AuthUser>, limit: usize) -> Vec<AuthUser> {
    sort_by_signup(&mut users);
    users.truncate(limit);
    users
}
