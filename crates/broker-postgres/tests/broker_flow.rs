mod common;

use broker_core::{ArtifactKind, CancelOutcome, ClaimOutcome, CompleteOutcome, FailOutcome, HeartbeatOutcome, KeyRole, ProcessingState, Requirements, Store, SweeperPolicy, UploadOutcome};
use chrono::{Duration, Utc};
use common::test_store;

fn policy() -> SweeperPolicy {
    SweeperPolicy::new(Duration::seconds(300), Duration::seconds(10), 3)
}

#[tokio::test]
async fn job_enqueues_only_once_all_required_artifacts_are_uploaded() {
    let store = test_store().await;
    let owner = store.create_key("owner-1".into(), KeyRole::User, "hash-owner-1".into()).await.unwrap();

    let job = store
        .create_job(
            owner.id,
            None,
            serde_json::json!({"kind": "ocr"}),
            Requirements {
                alto_required: true,
                page_required: false,
                meta_json_required: false,
            },
            vec![broker_testing::new_image("page-1", 0)],
        )
        .await
        .unwrap();
    assert_eq!(job.state, ProcessingState::New);

    let outcome = store
        .mark_image_uploaded(job.id, "page-1", ArtifactKind::Image, Some("abc123".into()))
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Recorded);
    assert_eq!(store.get_job(job.id).await.unwrap().state, ProcessingState::New);

    let outcome = store
        .mark_image_uploaded(job.id, "page-1", ArtifactKind::Alto, None)
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::RecordedAndEnqueued);
    assert_eq!(store.get_job(job.id).await.unwrap().state, ProcessingState::Queued);
}

#[tokio::test]
async fn reuploading_an_already_uploaded_artifact_is_reported_as_reupload() {
    let store = test_store().await;
    let owner = store.create_key("owner-2".into(), KeyRole::User, "hash-owner-2".into()).await.unwrap();
    let job = store
        .create_job(owner.id, None, serde_json::json!({}), Requirements::default(), vec![broker_testing::new_image("p", 0)])
        .await
        .unwrap();

    let first = store.mark_image_uploaded(job.id, "p", ArtifactKind::Image, None).await.unwrap();
    assert_eq!(first, UploadOutcome::RecordedAndEnqueued);

    let second = store.mark_image_uploaded(job.id, "p", ArtifactKind::Image, None).await.unwrap();
    assert_eq!(second, UploadOutcome::Reuploaded);
}

#[tokio::test]
async fn claim_one_takes_oldest_queued_job_and_nothing_when_empty() {
    let store = test_store().await;
    let owner = store.create_key("owner-3".into(), KeyRole::User, "hash-owner-3".into()).await.unwrap();
    let worker = store.create_key("worker-3".into(), KeyRole::Worker, "hash-worker-3".into()).await.unwrap();

    let empty = store.claim_one(worker.id, &policy()).await.unwrap();
    assert!(matches!(empty, ClaimOutcome::QueueEmpty));

    let job = store
        .create_job(owner.id, None, serde_json::json!({}), Requirements::default(), vec![broker_testing::new_image("p", 0)])
        .await
        .unwrap();
    store.mark_image_uploaded(job.id, "p", ArtifactKind::Image, None).await.unwrap();

    let claimed = store.claim_one(worker.id, &policy()).await.unwrap();
    match claimed {
        ClaimOutcome::Claimed(claimed_job) => {
            assert_eq!(claimed_job.id, job.id);
            assert_eq!(claimed_job.state, ProcessingState::Processing);
            assert_eq!(claimed_job.worker_key_id, Some(worker.id));
        }
        ClaimOutcome::QueueEmpty => panic!("expected a claimable job"),
    }

    let second_claim = store.claim_one(worker.id, &policy()).await.unwrap();
    assert!(matches!(second_claim, ClaimOutcome::QueueEmpty));
}

#[tokio::test]
async fn heartbeat_rejected_once_job_is_no_longer_processing() {
    let store = test_store().await;
    let owner = store.create_key("owner-4".into(), KeyRole::User, "hash-owner-4".into()).await.unwrap();
    let worker = store.create_key("worker-4".into(), KeyRole::Worker, "hash-worker-4".into()).await.unwrap();
    let job = store
        .create_job(owner.id, None, serde_json::json!({}), Requirements::default(), vec![broker_testing::new_image("p", 0)])
        .await
        .unwrap();
    store.mark_image_uploaded(job.id, "p", ArtifactKind::Image, None).await.unwrap();
    let claimed = match store.claim_one(worker.id, &policy()).await.unwrap() {
        ClaimOutcome::Claimed(j) => j,
        _ => panic!("expected claim"),
    };

    assert_eq!(store.heartbeat(claimed.id, worker.id).await.unwrap(), HeartbeatOutcome::Accepted);

    let other_worker = store.create_key("worker-4b".into(), KeyRole::Worker, "hash-worker-4b".into()).await.unwrap();
    assert_eq!(
        store.heartbeat(claimed.id, other_worker.id).await.unwrap(),
        HeartbeatOutcome::Rejected
    );
}

#[tokio::test]
async fn completing_a_job_twice_is_idempotent() {
    let store = test_store().await;
    let owner = store.create_key("owner-5".into(), KeyRole::User, "hash-owner-5".into()).await.unwrap();
    let worker = store.create_key("worker-5".into(), KeyRole::Worker, "hash-worker-5".into()).await.unwrap();
    let job = store
        .create_job(owner.id, None, serde_json::json!({}), Requirements::default(), vec![broker_testing::new_image("p", 0)])
        .await
        .unwrap();
    store.mark_image_uploaded(job.id, "p", ArtifactKind::Image, None).await.unwrap();
    let claimed = match store.claim_one(worker.id, &policy()).await.unwrap() {
        ClaimOutcome::Claimed(j) => j,
        _ => panic!("expected claim"),
    };

    assert_eq!(store.complete_job(claimed.id, worker.id).await.unwrap(), CompleteOutcome::Completed);
    assert_eq!(store.complete_job(claimed.id, worker.id).await.unwrap(), CompleteOutcome::AlreadyCompleted);

    let finished = store.get_job(claimed.id).await.unwrap();
    assert_eq!(finished.state, ProcessingState::Done);
    assert_eq!(finished.progress, 1.0);
}

#[tokio::test]
async fn failed_job_is_requeued_by_the_sweeper_until_attempts_are_exhausted() {
    let store = test_store().await;
    let owner = store.create_key("owner-6".into(), KeyRole::User, "hash-owner-6".into()).await.unwrap();
    let worker = store.create_key("worker-6".into(), KeyRole::Worker, "hash-worker-6".into()).await.unwrap();
    let job = store
        .create_job(owner.id, None, serde_json::json!({}), Requirements::default(), vec![broker_testing::new_image("p", 0)])
        .await
        .unwrap();
    store.mark_image_uploaded(job.id, "p", ArtifactKind::Image, None).await.unwrap();

    // max_attempts = 3: two retries, then dead-letter.
    let tight_policy = SweeperPolicy::new(Duration::seconds(300), Duration::seconds(0), 3);

    for attempt in 0..2 {
        let claimed = match store.claim_one(worker.id, &tight_policy).await.unwrap() {
            ClaimOutcome::Claimed(j) => j,
            ClaimOutcome::QueueEmpty => panic!("expected a claimable job on attempt {attempt}"),
        };
        assert_eq!(store.fail_job(claimed.id, worker.id).await.unwrap(), FailOutcome::Accepted);
        assert_eq!(store.get_job(claimed.id).await.unwrap().state, ProcessingState::Error);
    }

    // Third claim sweeps the ERROR job; attempts are now exhausted so it
    // must dead-letter instead of becoming claimable again.
    let result = store.claim_one(worker.id, &tight_policy).await.unwrap();
    assert!(matches!(result, ClaimOutcome::QueueEmpty));
    assert_eq!(store.get_job(job.id).await.unwrap().state, ProcessingState::Failed);
}

#[tokio::test]
async fn cancel_is_a_legal_terminal_transition_and_idempotent_afterward() {
    let store = test_store().await;
    let owner = store.create_key("owner-7".into(), KeyRole::User, "hash-owner-7".into()).await.unwrap();
    let job = store
        .create_job(owner.id, None, serde_json::json!({}), Requirements::default(), vec![])
        .await
        .unwrap();

    assert_eq!(store.cancel_job(job.id).await.unwrap(), CancelOutcome::Cancelled);
    assert_eq!(store.get_job(job.id).await.unwrap().state, ProcessingState::Cancelled);
    assert_eq!(store.cancel_job(job.id).await.unwrap(), CancelOutcome::AlreadyTerminal);
}

#[tokio::test]
async fn key_lookup_and_deactivation_round_trip() {
    let store = test_store().await;
    let key = store.create_key("admin-1".into(), KeyRole::Admin, "hash-admin-1".into()).await.unwrap();
    assert!(store.key_hash_in_use("hash-admin-1").await.unwrap());
    assert!(!store.key_hash_in_use("hash-admin-nope").await.unwrap());

    let looked_up = store.lookup_key_by_hash("hash-admin-1").await.unwrap();
    assert_eq!(looked_up.id, key.id);
    assert!(looked_up.active);

    let deactivated = store.update_key(key.id, Some(false)).await.unwrap();
    assert!(!deactivated.active);
}
