//! Access Guards (spec §4.7).
//!
//! The original decorator-stacked checks (`challenge_worker_access_to_job`,
//! `challenge_job_exists`, ...) become plain functions returning a typed
//! [`GuardOutcome`] instead of raising. Callers in `broker-server` map the
//! outcome onto an HTTP status; callers in `broker-core` short-circuit with
//! `BrokerError` via `GuardOutcome::into_result`.

use crate::error::{BrokerError, GuardOutcome};
use crate::types::{Job, Key, KeyRole};
use uuid::Uuid;

impl GuardOutcome {
    pub fn into_result(self, entity: &'static str, id: Uuid) -> Result<(), BrokerError> {
        match self {
            GuardOutcome::Ok => Ok(()),
            GuardOutcome::NotFound => Err(BrokerError::NotFound { entity, id }),
            GuardOutcome::Forbidden | GuardOutcome::Conflict => {
                Err(BrokerError::Forbidden { entity })
            }
        }
    }
}

/// A job is visible to its owner and to any ADMIN key (spec §4.7).
pub fn owner_access(job: &Job, caller: &Key) -> GuardOutcome {
    if caller.role == KeyRole::Admin || job.owner_key_id == caller.id {
        GuardOutcome::Ok
    } else {
        GuardOutcome::Forbidden
    }
}

/// A WORKER key may only act on a job it currently holds the lease for
/// (spec §4.7) — ADMIN bypasses the lease check entirely.
pub fn worker_access(job: &Job, caller: &Key) -> GuardOutcome {
    if caller.role == KeyRole::Admin {
        return GuardOutcome::Ok;
    }
    if caller.role != KeyRole::Worker {
        return GuardOutcome::Forbidden;
    }
    match job.worker_key_id {
        Some(worker_id) if worker_id == caller.id => GuardOutcome::Ok,
        _ => GuardOutcome::Forbidden,
    }
}

/// ADMIN-only actions (key/engine management) (spec §4.7).
pub fn admin_only(caller: &Key) -> GuardOutcome {
    if caller.role == KeyRole::Admin {
        GuardOutcome::Ok
    } else {
        GuardOutcome::Forbidden
    }
}

/// A key must be active to authenticate at all (spec §4.7, §6 Auth).
pub fn key_active(caller: &Key) -> GuardOutcome {
    if caller.active {
        GuardOutcome::Ok
    } else {
        GuardOutcome::Forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessingState;
    use chrono::Utc;

    fn key(role: KeyRole, active: bool) -> Key {
        Key {
            id: Uuid::new_v4(),
            label: "test".into(),
            role,
            active,
            created: Utc::now(),
            last_used: None,
        }
    }

    fn job(owner: Uuid, worker: Option<Uuid>) -> Job {
        Job {
            id: Uuid::new_v4(),
            owner_key_id: owner,
            worker_key_id: worker,
            engine_id: None,
            definition: serde_json::json!({}),
            alto_required: false,
            page_required: false,
            meta_json_required: false,
            meta_json_uploaded: false,
            state: ProcessingState::New,
            progress: 0.0,
            previous_attempts: 0,
            created: Utc::now(),
            started: None,
            last_change: Utc::now(),
            finished: None,
            log: None,
            log_user: None,
        }
    }

    #[test]
    fn owner_may_access_own_job() {
        let owner = key(KeyRole::User, true);
        let j = job(owner.id, None);
        assert_eq!(owner_access(&j, &owner), GuardOutcome::Ok);
    }

    #[test]
    fn another_user_is_forbidden_from_someone_elses_job() {
        let owner = key(KeyRole::User, true);
        let stranger = key(KeyRole::User, true);
        let j = job(owner.id, None);
        assert_eq!(owner_access(&j, &stranger), GuardOutcome::Forbidden);
    }

    #[test]
    fn admin_bypasses_owner_check() {
        let admin = key(KeyRole::Admin, true);
        let j = job(Uuid::new_v4(), None);
        assert_eq!(owner_access(&j, &admin), GuardOutcome::Ok);
    }

    #[test]
    fn worker_must_hold_the_current_lease() {
        let worker = key(KeyRole::Worker, true);
        let other_worker = key(KeyRole::Worker, true);
        let j = job(Uuid::new_v4(), Some(worker.id));
        assert_eq!(worker_access(&j, &worker), GuardOutcome::Ok);
        assert_eq!(worker_access(&j, &other_worker), GuardOutcome::Forbidden);
    }

    #[test]
    fn non_worker_role_cannot_act_as_worker() {
        let user = key(KeyRole::User, true);
        let j = job(user.id, Some(user.id));
        assert_eq!(worker_access(&j, &user), GuardOutcome::Forbidden);
    }

    #[test]
    fn admin_only_rejects_non_admin_roles() {
        assert_eq!(admin_only(&key(KeyRole::Worker, true)), GuardOutcome::Forbidden);
        assert_eq!(admin_only(&key(KeyRole::Admin, true)), GuardOutcome::Ok);
    }

    #[test]
    fn inactive_key_fails_the_active_check_regardless_of_role() {
        assert_eq!(key_active(&key(KeyRole::Admin, false)), GuardOutcome::Forbidden);
    }
}
