//! Integration tests for the job service: idempotent submission, the token
//! ledger, and claim exclusivity.

use std::sync::Arc;

use artifex::artifact::ArtifactType;
use artifex::model::{GenerationOptions, JobStatus, NewArtifactJob};
use artifex::retrieval::StaticRetriever;
use artifex::service::JobService;
use artifex::store::JobStore;

fn test_service() -> Arc<JobService> {
    let store = Arc::new(JobStore::in_memory().expect("in-memory store"));
    let retriever = Arc::new(StaticRetriever::fixed(
        "The mitochondrion is the powerhouse of the cell.",
    ));
    Arc::new(JobService::new(store, retriever))
}

fn quiz_request() -> NewArtifactJob {
    NewArtifactJob::new(
        "user-1",
        "notebook-1",
        ArtifactType::Quiz,
        "Explain cellular respiration.",
    )
}

// ---------------------------------------------------------------------------
// Idempotent submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identical_submissions_yield_the_same_job() {
    let service = test_service();

    let first = service.create_job(quiz_request()).await.unwrap();
    let second = service.create_job(quiz_request()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, JobStatus::Pending);
}

#[tokio::test]
async fn dedup_holds_while_the_job_is_in_flight() {
    let service = test_service();

    let first = service.create_job(quiz_request()).await.unwrap();
    let claimed = service.claim_next_pending("w1").unwrap().unwrap();
    assert_eq!(claimed.id, first.id);

    // Still active (planning) — identical submission lands on the same job.
    let second = service.create_job(quiz_request()).await.unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn failed_jobs_do_not_shield_resubmission() {
    let service = test_service();

    let first = service.create_job(quiz_request()).await.unwrap();
    service.claim_next_pending("w1").unwrap().unwrap();
    service.fail_job(first.id, "planning exploded").unwrap();

    let second = service.create_job(quiz_request()).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.status, JobStatus::Pending);
}

#[tokio::test]
async fn different_options_are_different_requests() {
    let service = test_service();

    let first = service.create_job(quiz_request()).await.unwrap();
    let second = service
        .create_job(quiz_request().options(GenerationOptions {
            item_count: Some(10),
            ..Default::default()
        }))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn snapshot_is_frozen_at_creation() {
    let service = test_service();
    let job = service.create_job(quiz_request()).await.unwrap();
    assert_eq!(
        job.retrieval_snapshot,
        "The mitochondrion is the powerhouse of the cell."
    );
}

// ---------------------------------------------------------------------------
// Token ledger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ledger_rejects_over_budget_without_mutation() {
    let service = test_service();
    let job = service
        .create_job(quiz_request().token_budget(100))
        .await
        .unwrap();

    // An estimated cost of 150 against a budget of 100 is rejected up front.
    assert!(!service.increment_tokens_used(job.id, 150).unwrap());
    assert_eq!(service.get(job.id).unwrap().tokens_used, 0);

    // A sequence of legal increments can never cross the ceiling.
    assert!(service.increment_tokens_used(job.id, 40).unwrap());
    assert!(service.increment_tokens_used(job.id, 60).unwrap());
    assert!(!service.increment_tokens_used(job.id, 1).unwrap());
    assert_eq!(service.get(job.id).unwrap().tokens_used, 100);
}

#[tokio::test]
async fn ledger_supports_negative_correction() {
    let service = test_service();
    let job = service
        .create_job(quiz_request().token_budget(1000))
        .await
        .unwrap();

    assert!(service.increment_tokens_used(job.id, 200).unwrap());
    // Actual usage turned out lower than the estimate.
    assert!(service.increment_tokens_used(job.id, -80).unwrap());
    assert_eq!(service.get(job.id).unwrap().tokens_used, 120);
}

// ---------------------------------------------------------------------------
// Claiming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_returns_none_when_queue_empty() {
    let service = test_service();
    assert!(service.claim_next_pending("w1").unwrap().is_none());
}

#[tokio::test]
async fn exactly_one_concurrent_claimer_wins() {
    let service = test_service();
    let job = service.create_job(quiz_request()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.claim_next_pending(&format!("w{i}")).unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if let Some(claimed) = handle.await.unwrap() {
            assert_eq!(claimed.id, job.id);
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let claimed = service.get(job.id).unwrap();
    assert_eq!(claimed.status, JobStatus::Planning);
    assert!(claimed.worker_id.is_some());
}

#[tokio::test]
async fn claims_hand_out_distinct_jobs() {
    let service = test_service();
    let a = service.create_job(quiz_request()).await.unwrap();
    let b = service
        .create_job(NewArtifactJob::new(
            "user-1",
            "notebook-1",
            ArtifactType::Flashcards,
            "Explain cellular respiration.",
        ))
        .await
        .unwrap();

    let first = service.claim_next_pending("w1").unwrap().unwrap();
    let second = service.claim_next_pending("w2").unwrap().unwrap();
    assert_ne!(first.id, second.id);
    assert!(
        [a.id, b.id].contains(&first.id) && [a.id, b.id].contains(&second.id),
        "claims should cover both submitted jobs"
    );
    assert!(service.claim_next_pending("w3").unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Query surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_recent_is_scoped_to_the_user() {
    let service = test_service();
    service.create_job(quiz_request()).await.unwrap();
    service
        .create_job(NewArtifactJob::new(
            "user-2",
            "notebook-9",
            ArtifactType::Mindmap,
            "Photosynthesis.",
        ))
        .await
        .unwrap();

    let jobs = service.list_recent("user-1", 10).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].user_id, "user-1");
}
