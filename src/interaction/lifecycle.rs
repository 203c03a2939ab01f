//! Join and leave handling.
//!
//! A join subscribes the user to every known keyword; there is no per-keyword opt-in.

use crate::{
    base::types::{JoinOutcome, LeaveOutcome},
    interaction::keywords::KeywordRegistry,
    prelude::*,
    service::{db::DbClient, report::Reporter},
};

/// Turns join/leave commands into store mutations.
#[derive(Clone)]
pub struct LifecycleManager {
    db: DbClient,
    registry: KeywordRegistry,
    reporter: Reporter,
}

impl LifecycleManager {
    pub fn new(db: DbClient, registry: KeywordRegistry, reporter: Reporter) -> Self {
        Self { db, registry, reporter }
    }

    /// Activate `identity` and subscribe it to every keyword.
    ///
    /// Re-joining while active changes nothing and yields [`JoinOutcome::AlreadyJoined`].
    /// A previously soft-deleted user is restored on its original row. A display name held by
    /// another user yields [`JoinOutcome::NameTaken`].
    #[instrument(skip(self))]
    pub async fn join(&self, identity: &str, display_name: &str) -> Res<JoinOutcome> {
        if self.db.find_active_user(identity).await?.is_some() {
            return Ok(JoinOutcome::AlreadyJoined);
        }

        let restored = self.db.find_any_user(identity).await?.is_some();

        let user = match self.db.create_or_restore_user(identity, display_name).await {
            Ok(user) => user,
            Err(e) if RelayError::is_display_name_taken(&e) => {
                warn!("Display name `{}` is taken; `{}` not added.", display_name, identity);
                self.reporter.warning(&format!("{e:#}"));
                return Ok(JoinOutcome::NameTaken);
            }
            Err(e) if RelayError::is_conflict(&e) => {
                // A concurrent join won the race; confirm it is visible before reporting.
                warn!("Concurrent join detected for `{}`.", identity);
                return match self.db.find_active_user(identity).await? {
                    Some(_) => Ok(JoinOutcome::AlreadyJoined),
                    None => Err(e),
                };
            }
            Err(e) => return Err(e),
        };

        let keywords = self.registry.all().await?;
        self.db.replace_user_keywords(&user, &keywords).await?;

        self.reporter.info(&format!("Added user: {}", user.display_name));

        Ok(JoinOutcome::Joined { restored })
    }

    /// Soft-delete `identity`. Always succeeds with [`LeaveOutcome::Left`] unless the store fails.
    #[instrument(skip(self))]
    pub async fn leave(&self, identity: &str) -> Res<LeaveOutcome> {
        self.db.delete_user(identity).await?;

        self.reporter.info(&format!("Deleted user: {}", identity));

        Ok(LeaveOutcome::Left)
    }
}
