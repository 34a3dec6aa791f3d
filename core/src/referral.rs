//! Campus ambassador referral points.
//!
//! When a referred user's registration is verified, the ambassador who
//! referred them earns a fixed number of points. The award is recorded per
//! (ambassador, referred user) pair and the store refuses a second record for
//! the same pair, so re-verifying after a cancel and re-register cycle never
//! pays out twice.

use crate::environment::Environment;
use crate::error::Result;
use crate::store::{Constraint, Mutation, StoreError};
use crate::types::{User, UserId};

/// Points awarded per converted referral unless configured otherwise.
pub const REFERRAL_POINTS: u64 = 10;

/// Most entries returned by [`ReferralLedger::leaderboard`].
pub const MAX_LEADERBOARD: usize = 100;

/// What [`ReferralLedger::award_on_verification`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// Points were added to the ambassador
    Awarded {
        /// Ambassador credited
        ambassador_id: UserId,
        /// Points added
        points: u64,
    },
    /// This pair was already awarded earlier
    AlreadyAwarded,
    /// The user was not referred by anyone
    NotReferred,
    /// The referrer no longer exists
    ReferrerMissing,
}

/// Awards referral points and ranks ambassadors.
#[derive(Clone)]
pub struct ReferralLedger {
    env: Environment,
    points: u64,
}

impl ReferralLedger {
    /// Creates a ledger awarding `points` per referral.
    #[must_use]
    pub const fn new(env: Environment, points: u64) -> Self {
        Self { env, points }
    }

    /// Points awarded per referral
    #[must_use]
    pub const fn points(&self) -> u64 {
        self.points
    }

    /// Credits the referrer of `user`, at most once per pair.
    ///
    /// A missing referrer is logged and reported, never an error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WorkflowError::Store`] on persistence failures.
    pub async fn award_on_verification(&self, user: &User) -> Result<ReferralOutcome> {
        let Some(referrer_id) = user.referred_by else {
            return Ok(ReferralOutcome::NotReferred);
        };
        if referrer_id == user.id {
            return Ok(ReferralOutcome::NotReferred);
        }

        let Some(referrer) = self.env.store.get_user(referrer_id).await? else {
            tracing::warn!(
                user_id = %user.id,
                referrer_id = %referrer_id,
                "Referrer no longer exists, skipping referral award"
            );
            return Ok(ReferralOutcome::ReferrerMissing);
        };

        let result = self
            .env
            .store
            .commit(vec![Mutation::AwardReferral {
                ambassador_id: referrer.id,
                referred_user_id: user.id,
                points: self.points,
                at: self.env.clock.now(),
            }])
            .await;

        match result {
            Ok(()) => {
                metrics::counter!("referrals.awarded").increment(1);
                tracing::info!(
                    ambassador_id = %referrer.id,
                    referred_user_id = %user.id,
                    points = self.points,
                    "Referral points awarded"
                );
                Ok(ReferralOutcome::Awarded {
                    ambassador_id: referrer.id,
                    points: self.points,
                })
            }
            Err(StoreError::Conflict(Constraint::ReferralAward)) => {
                tracing::debug!(
                    ambassador_id = %referrer.id,
                    referred_user_id = %user.id,
                    "Referral already awarded"
                );
                Ok(ReferralOutcome::AlreadyAwarded)
            }
            Err(StoreError::NotFound { .. }) => Ok(ReferralOutcome::ReferrerMissing),
            Err(other) => Err(other.into()),
        }
    }

    /// Ambassadors ordered by points, highest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WorkflowError::Store`] on persistence failures.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<User>> {
        let limit = limit.clamp(1, MAX_LEADERBOARD);
        Ok(self.env.store.list_ambassadors(limit).await?)
    }
}
