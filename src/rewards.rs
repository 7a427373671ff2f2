//! Reward rules and the progress state machine.
//!
//! Catalog rows carry a stable `rule` key. Progress is recomputed from an
//! [`ActivitySnapshot`] of the user's history, so running the engine twice
//! over unchanged data yields the same rows.

use serde::Serialize;

use crate::errors::ApiError;
use crate::models::{RewardState, UserReward};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardRule {
    RegularTopUp,
    GymExplorer,
    PremiumMember,
    PowerUser,
    SocialButterfly,
    CommunityLeader,
    WorkoutBuddy,
    EarlyBird,
    ConsistencyKing,
    MilestoneMaster,
    VarietyVirtuoso,
    ChallengeChampion,
}

/// Aggregates over one user's history, gathered in a single query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ActivitySnapshot {
    pub payment_count: i64,
    pub distinct_centers: i64,
    pub subscription_months: i64,
    pub credits_used: i64,
    pub activities_joined: i64,
    pub activities_hosted: i64,
    pub workouts_with_friends: i64,
    pub early_workouts: i64,
    pub workouts_this_month: i64,
    pub total_workout_minutes: i64,
    pub distinct_workout_types: i64,
    pub completed_challenges: i64,
}

/// Display metadata for a catalog row inserted at startup.
#[derive(Debug, Clone, Copy)]
pub struct CatalogSeed {
    pub rule: RewardRule,
    pub name: &'static str,
    pub description: &'static str,
    pub points_required: i32,
    pub category: &'static str,
    pub reward_type: &'static str,
    pub reward_value: f64,
    pub reward_description: &'static str,
}

impl RewardRule {
    pub const ALL: [RewardRule; 12] = [
        RewardRule::RegularTopUp,
        RewardRule::GymExplorer,
        RewardRule::PremiumMember,
        RewardRule::PowerUser,
        RewardRule::SocialButterfly,
        RewardRule::CommunityLeader,
        RewardRule::WorkoutBuddy,
        RewardRule::EarlyBird,
        RewardRule::ConsistencyKing,
        RewardRule::MilestoneMaster,
        RewardRule::VarietyVirtuoso,
        RewardRule::ChallengeChampion,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RewardRule::RegularTopUp => "regular_top_up",
            RewardRule::GymExplorer => "gym_explorer",
            RewardRule::PremiumMember => "premium_member",
            RewardRule::PowerUser => "power_user",
            RewardRule::SocialButterfly => "social_butterfly",
            RewardRule::CommunityLeader => "community_leader",
            RewardRule::WorkoutBuddy => "workout_buddy",
            RewardRule::EarlyBird => "early_bird",
            RewardRule::ConsistencyKing => "consistency_king",
            RewardRule::MilestoneMaster => "milestone_master",
            RewardRule::VarietyVirtuoso => "variety_virtuoso",
            RewardRule::ChallengeChampion => "challenge_champion",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rule| rule.key() == key)
    }

    pub fn threshold(self) -> i64 {
        match self {
            RewardRule::RegularTopUp => 5,
            RewardRule::GymExplorer => 5,
            RewardRule::PremiumMember => 3,
            RewardRule::PowerUser => 500,
            RewardRule::SocialButterfly => 5,
            RewardRule::CommunityLeader => 3,
            RewardRule::WorkoutBuddy => 10,
            RewardRule::EarlyBird => 10,
            RewardRule::ConsistencyKing => 20,
            RewardRule::MilestoneMaster => 1000,
            RewardRule::VarietyVirtuoso => 5,
            RewardRule::ChallengeChampion => 3,
        }
    }

    pub fn progress(self, snapshot: &ActivitySnapshot) -> i64 {
        match self {
            RewardRule::RegularTopUp => snapshot.payment_count,
            RewardRule::GymExplorer => snapshot.distinct_centers,
            RewardRule::PremiumMember => snapshot.subscription_months,
            RewardRule::PowerUser => snapshot.credits_used,
            RewardRule::SocialButterfly => snapshot.activities_joined,
            RewardRule::CommunityLeader => snapshot.activities_hosted,
            RewardRule::WorkoutBuddy => snapshot.workouts_with_friends,
            RewardRule::EarlyBird => snapshot.early_workouts,
            RewardRule::ConsistencyKing => snapshot.workouts_this_month,
            RewardRule::MilestoneMaster => snapshot.total_workout_minutes,
            RewardRule::VarietyVirtuoso => snapshot.distinct_workout_types,
            RewardRule::ChallengeChampion => snapshot.completed_challenges,
        }
    }

    pub fn seed(self) -> CatalogSeed {
        match self {
            RewardRule::RegularTopUp => CatalogSeed {
                rule: self,
                name: "Regular Top-Up",
                description: "Top up your account 5 times",
                points_required: 1000,
                category: "payments",
                reward_type: "credits",
                reward_value: 50.0,
                reward_description: "50 Flex Pass Credits",
            },
            RewardRule::GymExplorer => CatalogSeed {
                rule: self,
                name: "Gym Explorer",
                description: "Visit 5 different fitness centers",
                points_required: 1500,
                category: "visits",
                reward_type: "credits",
                reward_value: 100.0,
                reward_description: "100 Flex Pass Credits",
            },
            RewardRule::PremiumMember => CatalogSeed {
                rule: self,
                name: "Premium Member",
                description: "Maintain subscription for 3 months",
                points_required: 2000,
                category: "payments",
                reward_type: "discount",
                reward_value: 15.0,
                reward_description: "15% off next renewal",
            },
            RewardRule::PowerUser => CatalogSeed {
                rule: self,
                name: "Power User",
                description: "Use 500 flex pass credits",
                points_required: 1200,
                category: "visits",
                reward_type: "credits",
                reward_value: 75.0,
                reward_description: "75 Bonus Credits",
            },
            RewardRule::SocialButterfly => CatalogSeed {
                rule: self,
                name: "Social Butterfly",
                description: "Join 5 group activities",
                points_required: 800,
                category: "social",
                reward_type: "credits",
                reward_value: 40.0,
                reward_description: "40 Flex Pass Credits",
            },
            RewardRule::CommunityLeader => CatalogSeed {
                rule: self,
                name: "Community Leader",
                description: "Create and host 3 group activities",
                points_required: 1500,
                category: "social",
                reward_type: "credits",
                reward_value: 75.0,
                reward_description: "75 Flex Pass Credits",
            },
            RewardRule::WorkoutBuddy => CatalogSeed {
                rule: self,
                name: "Workout Buddy",
                description: "Complete 10 workouts with friends",
                points_required: 1000,
                category: "social",
                reward_type: "credits",
                reward_value: 50.0,
                reward_description: "50 Flex Pass Credits",
            },
            RewardRule::EarlyBird => CatalogSeed {
                rule: self,
                name: "Early Bird",
                description: "Complete 10 workouts before 8 AM",
                points_required: 1200,
                category: "achievements",
                reward_type: "credits",
                reward_value: 60.0,
                reward_description: "60 Flex Pass Credits",
            },
            RewardRule::ConsistencyKing => CatalogSeed {
                rule: self,
                name: "Consistency King",
                description: "Work out 20 times in one month",
                points_required: 2000,
                category: "achievements",
                reward_type: "credits",
                reward_value: 100.0,
                reward_description: "100 Flex Pass Credits",
            },
            RewardRule::MilestoneMaster => CatalogSeed {
                rule: self,
                name: "Milestone Master",
                description: "Reach 1000 total workout minutes",
                points_required: 1500,
                category: "achievements",
                reward_type: "credits",
                reward_value: 75.0,
                reward_description: "75 Flex Pass Credits + Achievement Badge",
            },
            RewardRule::VarietyVirtuoso => CatalogSeed {
                rule: self,
                name: "Variety Virtuoso",
                description: "Try 5 different types of workouts",
                points_required: 1000,
                category: "achievements",
                reward_type: "credits",
                reward_value: 50.0,
                reward_description: "50 Flex Pass Credits + Special Badge",
            },
            RewardRule::ChallengeChampion => CatalogSeed {
                rule: self,
                name: "Challenge Champion",
                description: "Complete 3 monthly challenges",
                points_required: 2500,
                category: "achievements",
                reward_type: "credits",
                reward_value: 125.0,
                reward_description: "125 Flex Pass Credits + Champion Badge",
            },
        }
    }
}

/// One recomputed row, before it is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub rule: RewardRule,
    pub progress: i64,
    pub total: i64,
    pub state: RewardState,
    pub newly_unlocked: bool,
}

/// Claimed is terminal; otherwise the state follows progress.
pub fn next_state(previous: Option<RewardState>, progress: i64, total: i64) -> RewardState {
    match previous {
        Some(RewardState::Claimed) => RewardState::Claimed,
        _ if progress >= total => RewardState::Unlocked,
        _ => RewardState::Locked,
    }
}

pub fn evaluate(
    rule: RewardRule,
    snapshot: &ActivitySnapshot,
    previous: Option<RewardState>,
) -> Evaluation {
    let progress = rule.progress(snapshot);
    let total = rule.threshold();
    let state = next_state(previous, progress, total);
    Evaluation {
        rule,
        progress,
        total,
        state,
        newly_unlocked: state == RewardState::Unlocked && previous != Some(RewardState::Unlocked),
    }
}

/// Checks a claim against the stored row. `None` means the engine never
/// produced a row for this reward.
pub fn ensure_claimable(user_reward: Option<&UserReward>) -> Result<(), ApiError> {
    let user_reward = user_reward.ok_or_else(|| ApiError::not_found("Reward not unlocked"))?;
    if user_reward.state == RewardState::Claimed {
        return Err(ApiError::conflict("Reward already claimed"));
    }
    if user_reward.progress < user_reward.total {
        return Err(ApiError::conflict("Reward not yet unlocked"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use chrono::Utc;
    use uuid::Uuid;

    fn user_reward(progress: i64, total: i64, state: RewardState) -> UserReward {
        UserReward {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            reward_id: Uuid::new_v4(),
            progress,
            total,
            state,
            unlocked_at: None,
            claimed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_keys_round_trip_and_are_unique() {
        let mut keys: Vec<_> = RewardRule::ALL.iter().map(|r| r.key()).collect();
        for rule in RewardRule::ALL {
            assert_eq!(RewardRule::from_key(rule.key()), Some(rule));
        }
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), RewardRule::ALL.len());
        assert_eq!(RewardRule::from_key("Regular Top-Up"), None);
    }

    #[test]
    fn test_five_payments_unlock_regular_top_up() {
        let snapshot = ActivitySnapshot {
            payment_count: 5,
            ..Default::default()
        };
        let eval = evaluate(RewardRule::RegularTopUp, &snapshot, None);
        assert_eq!(eval.progress, 5);
        assert_eq!(eval.total, 5);
        assert_eq!(eval.state, RewardState::Unlocked);
        assert!(eval.newly_unlocked);
    }

    #[test]
    fn test_empty_history_is_locked_everywhere() {
        let snapshot = ActivitySnapshot::default();
        for rule in RewardRule::ALL {
            let eval = evaluate(rule, &snapshot, None);
            assert_eq!(eval.progress, 0);
            assert_eq!(eval.state, RewardState::Locked);
        }
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let snapshot = ActivitySnapshot {
            payment_count: 7,
            distinct_centers: 2,
            total_workout_minutes: 1200,
            ..Default::default()
        };
        for rule in RewardRule::ALL {
            let first = evaluate(rule, &snapshot, None);
            let second = evaluate(rule, &snapshot, Some(first.state));
            assert_eq!(first.progress, second.progress);
            assert_eq!(first.total, second.total);
            assert_eq!(first.state, second.state);
            assert!(!second.newly_unlocked);
        }
    }

    #[test]
    fn test_claimed_is_terminal() {
        assert_eq!(
            next_state(Some(RewardState::Claimed), 0, 5),
            RewardState::Claimed
        );
        assert_eq!(
            next_state(Some(RewardState::Unlocked), 3, 5),
            RewardState::Locked
        );
    }

    #[test]
    fn test_claim_rules() {
        let missing = ensure_claimable(None).unwrap_err();
        assert_eq!(missing.status_code().as_u16(), 404);
        assert_eq!(missing.to_string(), "Reward not unlocked");

        let locked = ensure_claimable(Some(&user_reward(3, 5, RewardState::Locked))).unwrap_err();
        assert_eq!(locked.status_code().as_u16(), 400);
        assert_eq!(locked.to_string(), "Reward not yet unlocked");

        let claimed =
            ensure_claimable(Some(&user_reward(5, 5, RewardState::Claimed))).unwrap_err();
        assert_eq!(claimed.to_string(), "Reward already claimed");

        assert!(ensure_claimable(Some(&user_reward(6, 5, RewardState::Unlocked))).is_ok());
    }

    #[test]
    fn test_seed_matches_catalog() {
        let seed = RewardRule::GymExplorer.seed();
        assert_eq!(seed.name, "Gym Explorer");
        assert_eq!(seed.points_required, 1500);
        assert_eq!(seed.reward_value, 100.0);
        assert_eq!(RewardRule::PremiumMember.seed().reward_type, "discount");
    }
}
