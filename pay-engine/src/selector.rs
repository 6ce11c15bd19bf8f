//! Profile selection
//!
//! A subject may hold several profiles, each tiered by the threshold of its
//! BASE rule (short-haul at 0 mi, long-haul at 500 mi, ...). The selector
//! picks the highest tier the leg qualifies for.

use rust_decimal::Decimal;
use uuid::Uuid;

/// One assignment of the subject, joined with its profile's BASE threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCandidate {
    /// Assignment
    pub assignment_id: Uuid,
    /// Assigned profile
    pub profile_id: Uuid,
    /// Subject's default assignment
    pub is_default: bool,
    /// Highest active BASE rule threshold of the profile
    pub base_threshold: Option<Decimal>,
}

impl ProfileCandidate {
    fn threshold(&self) -> Decimal {
        self.base_threshold.unwrap_or(Decimal::ZERO)
    }
}

/// Pick the profile for a leg of `leg_miles`.
///
/// Candidates whose threshold (absent = 0) is at most `leg_miles` apply; the
/// highest threshold wins and ties go to the default. With nothing applicable
/// the default is used, then the first candidate.
pub fn select_profile(candidates: &[ProfileCandidate], leg_miles: Decimal) -> Option<Uuid> {
    let mut best: Option<&ProfileCandidate> = None;
    for candidate in candidates.iter().filter(|c| c.threshold() <= leg_miles) {
        let better = match best {
            None => true,
            Some(current) => {
                (candidate.threshold(), candidate.is_default)
                    > (current.threshold(), current.is_default)
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    if let Some(best) = best {
        return Some(best.profile_id);
    }

    candidates
        .iter()
        .find(|c| c.is_default)
        .or_else(|| candidates.first())
        .map(|c| c.profile_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(threshold: Option<i64>, is_default: bool) -> ProfileCandidate {
        ProfileCandidate {
            assignment_id: Uuid::now_v7(),
            profile_id: Uuid::now_v7(),
            is_default,
            base_threshold: threshold.map(Decimal::from),
        }
    }

    #[test]
    fn test_highest_applicable_tier_wins() {
        let short = candidate(None, true);
        let long = candidate(Some(500), false);
        let candidates = vec![short.clone(), long.clone()];

        assert_eq!(select_profile(&candidates, Decimal::from(120)), Some(short.profile_id));
        assert_eq!(select_profile(&candidates, Decimal::from(500)), Some(long.profile_id));
        assert_eq!(select_profile(&candidates, Decimal::from(900)), Some(long.profile_id));
    }

    #[test]
    fn test_tie_prefers_default() {
        let a = candidate(Some(100), false);
        let b = candidate(Some(100), true);
        let c = candidate(Some(100), false);
        let candidates = vec![a, b.clone(), c];
        assert_eq!(select_profile(&candidates, Decimal::from(150)), Some(b.profile_id));
    }

    #[test]
    fn test_tie_without_default_keeps_first() {
        let a = candidate(Some(100), false);
        let b = candidate(Some(100), false);
        let candidates = vec![a.clone(), b];
        assert_eq!(select_profile(&candidates, Decimal::from(150)), Some(a.profile_id));
    }

    #[test]
    fn test_fallbacks_when_nothing_applies() {
        let first = candidate(Some(300), false);
        let default = candidate(Some(400), true);
        assert_eq!(
            select_profile(&[first.clone(), default.clone()], Decimal::from(10)),
            Some(default.profile_id)
        );
        assert_eq!(
            select_profile(&[first.clone()], Decimal::from(10)),
            Some(first.profile_id)
        );
        assert_eq!(select_profile(&[], Decimal::from(10)), None);
    }
}
