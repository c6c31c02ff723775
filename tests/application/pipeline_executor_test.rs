use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};

use assessor::application::ports::{
    AnalyzerError, AnnotationMode, ClaimOutcome, JobStore, ProgressTracker,
};
use assessor::application::services::{
    AnalyzerRegistry, ExecutorSettings, ExecutionOutcome, PipelineError, PipelineExecutor,
    StageRegistration, SynthesisOutcome, SynthesisPlan, SynthesisStep,
};
use assessor::domain::{
    Article, CompletedJob, ContentType, FileJobOptions, FilterPolicy, JobId, JobPayload,
    ParsedArticle, PendingFile, PendingJob, PendingStatus, Phase, TaskState, TextField,
};
use assessor::infrastructure::persistence::InMemoryJobStore;
use assessor::infrastructure::progress::InMemoryProgressTracker;
use assessor::infrastructure::text_processing::SentenceTokenizer;

use crate::helpers::{
    FailingAnalyzer, MisalignedAnalyzer, ParsedTitleAnalyzer, RecordingTracker, ScriptedJobStore,
    SlowAnalyzer, StaticAnalyzer, StubSynthesizer, TrialFilter, article, executor, stage,
    standard_registry, text_only_loader,
};

fn batch_job(documents: Vec<Article>, stages: &[&str], policy: Option<FilterPolicy>) -> PendingJob {
    PendingJob::batch(JobPayload {
        documents,
        stages: stages.iter().map(|s| stage(s)).collect(),
        filter_policy: policy,
    })
}

async fn submitted(store: &InMemoryJobStore, job: &PendingJob) -> JobId {
    store.submit(job).await.unwrap();
    job.id
}

#[tokio::test]
async fn given_batch_job_when_executed_then_result_is_recorded_and_queue_row_removed() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker.clone());
    let job = batch_job(
        vec![article("Aspirin trial", "Abstract one."), article("Statins", "Abstract two.")],
        &["pico", "bias"],
        None,
    );
    let job_id = submitted(&store, &job).await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert_eq!(
        outcome,
        ExecutionOutcome::Completed {
            documents: 2,
            skipped: 0,
            synthesis: vec![],
        }
    );
    let completed = store.fetch_completed(job_id).await.unwrap().unwrap();
    assert_eq!(completed.result.len(), 2);
    assert_eq!(
        completed.result[0].annotation("pico"),
        Some(&json!({ "population": "adults" }))
    );
    assert!(completed.result[1].annotation("bias").is_some());
    assert!(completed.archive.is_empty());
    assert!(store.fetch_pending(job_id).await.unwrap().is_none());

    let progress = tracker.get(job_id).await.unwrap();
    assert_eq!(progress.phase, Phase::Done);
    assert_eq!(progress.percentage, 100);
}

#[tokio::test]
async fn given_job_when_executed_then_progress_moves_forward_through_every_phase() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = RecordingTracker::new();
    let executor = executor(store.clone(), standard_registry(), tracker.clone());
    let job_id = submitted(
        &store,
        &batch_job(vec![article("A", "B")], &["pico", "bias"], None),
    )
    .await;

    executor.execute(job_id, "worker-1").await.unwrap();

    let history = tracker.history();
    let phases: Vec<Phase> = history.iter().map(|s| s.phase.clone()).collect();
    assert_eq!(
        phases,
        vec![
            Phase::Fetching,
            Phase::TextPreparation,
            Phase::Stage(stage("pico")),
            Phase::Stage(stage("bias")),
            Phase::Persisting,
            Phase::Done,
        ]
    );
    let percentages: Vec<u8> = history.iter().map(|s| s.percentage).collect();
    assert_eq!(percentages, vec![5, 35, 40, 62, 92, 100]);
    assert_eq!(history[3].label, "assessing risk of bias");
}

#[tokio::test]
async fn given_no_stages_when_executed_then_result_echoes_the_input_verbatim() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = RecordingTracker::new();
    let executor = executor(store.clone(), standard_registry(), tracker.clone());
    let input = json!([
        { "ti": "A", "ab": "B", "skip_annotation": false, "pmid": "1", "doi": null },
        { "ti": null, "fullText": "Body text.", "source": { "db": "pubmed" } }
    ]);
    let documents: Vec<Article> = serde_json::from_value(input.clone()).unwrap();
    let job_id = submitted(
        store.as_ref(),
        &batch_job(documents, &[], Some(FilterPolicy::None)),
    )
    .await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert!(matches!(
        outcome,
        ExecutionOutcome::Completed { documents: 2, skipped: 0, .. }
    ));
    let phases: Vec<Phase> = tracker.history().iter().map(|s| s.phase.clone()).collect();
    assert_eq!(
        phases,
        vec![Phase::Fetching, Phase::TextPreparation, Phase::Persisting, Phase::Done]
    );
    let completed = store.fetch_completed(job_id).await.unwrap().unwrap();
    let output: Value = serde_json::to_value(&completed.result).unwrap();
    assert_eq!(output, input);
}

#[tokio::test]
async fn given_job_when_executed_then_result_is_written_before_queue_rows_are_deleted() {
    let store = ScriptedJobStore::new();
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker);
    let job = batch_job(vec![article("A", "B")], &["pico"], None);
    store.submit(&job).await.unwrap();
    let job_id = job.id;

    executor.execute(job_id, "worker-1").await.unwrap();

    assert_eq!(
        store.calls(),
        vec!["submit", "claim", "fetch_completed", "record_completed", "delete_pending"]
    );
}

#[tokio::test]
async fn given_queue_delete_failure_when_executed_then_job_still_completes() {
    let store = ScriptedJobStore::failing(&["delete_pending"]);
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker.clone());
    let job = batch_job(vec![article("A", "B")], &["pico"], None);
    store.submit(&job).await.unwrap();
    let job_id = job.id;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Completed { documents: 1, .. }));
    assert!(store.fetch_completed(job_id).await.unwrap().is_some());
    assert!(store.fetch_pending(job_id).await.unwrap().is_some());
    assert_eq!(tracker.get(job_id).await.unwrap().phase, Phase::Done);
    assert!(!store.calls().contains(&"mark_failed"));
}

#[tokio::test]
async fn given_completed_lookup_failure_after_claim_when_executed_then_job_is_marked_failed() {
    let store = ScriptedJobStore::failing(&["fetch_completed"]);
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker.clone());
    let job = batch_job(vec![article("A", "B")], &["pico"], None);
    store.submit(&job).await.unwrap();
    let job_id = job.id;

    let result = executor.execute(job_id, "worker-1").await;

    assert!(matches!(result, Err(PipelineError::Store(_))));
    assert!(matches!(
        store.pending_status(job_id).await.unwrap(),
        Some(PendingStatus::Failed(diagnostic)) if diagnostic.contains("fetch_completed")
    ));
    assert_eq!(
        tracker.get(job_id).await.unwrap().phase.task_state(),
        TaskState::Failure
    );
}

#[tokio::test]
async fn given_expired_claim_when_two_deliveries_overlap_then_one_consistent_result_is_kept() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let pico = SlowAnalyzer::new(Duration::from_millis(50));
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("pico"), "extracting PICO", pico.clone()))
            .build()
            .unwrap(),
    );
    let executor = PipelineExecutor::new(
        store.clone(),
        registry,
        tracker.clone(),
        Arc::new(SentenceTokenizer::new()),
        text_only_loader(),
        ExecutorSettings {
            visibility_timeout: Duration::ZERO,
            ..ExecutorSettings::default()
        },
    );
    let documents = vec![article("A", "B"), article("C", "D")];
    let job_id = submitted(
        store.as_ref(),
        &batch_job(documents.clone(), &["pico"], None),
    )
    .await;

    let (first, second) = tokio::join!(
        executor.execute(job_id, "worker-1"),
        executor.execute(job_id, "worker-2"),
    );

    assert!(matches!(first, Ok(ExecutionOutcome::Completed { documents: 2, .. })));
    assert!(matches!(second, Ok(ExecutionOutcome::Completed { documents: 2, .. })));
    assert_eq!(pico.calls(), 2);

    let completed = store.fetch_completed(job_id).await.unwrap().unwrap();
    assert_eq!(completed.result.len(), 2);
    for (result, input) in completed.result.iter().zip(&documents) {
        assert_eq!(result.text(TextField::Title), input.text(TextField::Title));
        assert_eq!(result.annotation("pico"), Some(&json!({ "population": "adults" })));
    }
    assert!(store.fetch_pending(job_id).await.unwrap().is_none());
    assert_eq!(tracker.get(job_id).await.unwrap().phase, Phase::Done);
}

#[tokio::test]
async fn given_active_filter_policy_when_executed_then_rejected_documents_are_skipped() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let pico = StaticAnalyzer::new(json!({ "population": "adults" }));
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("rct"), "classifying trials", Arc::new(TrialFilter)))
            .register(StageRegistration::new(stage("pico"), "extracting PICO", pico.clone()))
            .filter_stage(stage("rct"))
            .build()
            .unwrap(),
    );
    let executor = executor(store.clone(), registry, tracker);
    let job_id = submitted(
        &store,
        &batch_job(
            vec![
                article("A randomized controlled trial of aspirin", "x"),
                article("A case report", "y"),
            ],
            &["pico"],
            Some(FilterPolicy::Field("is_rct".to_string())),
        ),
    )
    .await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert!(matches!(
        outcome,
        ExecutionOutcome::Completed { documents: 2, skipped: 1, .. }
    ));
    assert_eq!(pico.batch_sizes(), vec![1]);

    let completed = store.fetch_completed(job_id).await.unwrap().unwrap();
    let kept = &completed.result[0];
    let rejected = &completed.result[1];
    assert_eq!(kept.annotation("rct").map(|v| &v["is_rct"]), Some(&json!(true)));
    assert!(kept.annotation("pico").is_some());
    assert!(rejected.is_skipped());
    assert_eq!(rejected.annotations().count(), 0);
}

#[tokio::test]
async fn given_filter_output_without_policy_field_when_executed_then_document_is_rejected() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker);
    let job_id = submitted(
        &store,
        &batch_job(
            vec![article("A randomized trial", "x")],
            &["pico"],
            Some(FilterPolicy::Field("is_human".to_string())),
        ),
    )
    .await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert!(matches!(
        outcome,
        ExecutionOutcome::Completed { skipped: 1, .. }
    ));
}

#[tokio::test]
async fn given_text_documents_when_executed_then_stages_see_parsed_text_and_result_omits_it() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("tokens"), "counting tokens", Arc::new(ParsedTitleAnalyzer)))
            .build()
            .unwrap(),
    );
    let executor = executor(store.clone(), registry, tracker);
    let job_id = submitted(
        &store,
        &batch_job(vec![article("Aspirin reduces pain", "Short abstract.")], &["tokens"], None),
    )
    .await;

    executor.execute(job_id, "worker-1").await.unwrap();

    let completed = store.fetch_completed(job_id).await.unwrap().unwrap();
    assert_eq!(
        completed.result[0].annotation("tokens"),
        Some(&json!({ "title_tokens": 3 }))
    );
    assert_eq!(completed.result[0].parsed, ParsedArticle::default());
}

#[tokio::test]
async fn given_failing_stage_when_executed_then_job_fails_visibly_and_keeps_no_result() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("pico"), "extracting PICO", Arc::new(FailingAnalyzer)))
            .build()
            .unwrap(),
    );
    let executor = executor(store.clone(), registry, tracker.clone());
    let job_id = submitted(&store, &batch_job(vec![article("A", "B")], &["pico"], None)).await;

    let result = executor.execute(job_id, "worker-1").await;

    assert!(matches!(
        result,
        Err(PipelineError::Stage { source: AnalyzerError::RequestFailed(_), .. })
    ));
    let progress = tracker.get(job_id).await.unwrap();
    assert_eq!(progress.phase.task_state(), TaskState::Failure);
    assert!(progress.label.contains("model offline"));
    assert_eq!(progress.percentage, 40);

    assert!(store.fetch_completed(job_id).await.unwrap().is_none());
    assert!(matches!(
        store.pending_status(job_id).await.unwrap(),
        Some(PendingStatus::Failed(diagnostic)) if diagnostic.contains("pico")
    ));
}

#[tokio::test]
async fn given_failed_job_when_task_is_redelivered_then_it_is_not_retried() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("pico"), "extracting PICO", Arc::new(FailingAnalyzer)))
            .build()
            .unwrap(),
    );
    let executor = executor(store.clone(), registry, tracker);
    let job_id = submitted(&store, &batch_job(vec![article("A", "B")], &["pico"], None)).await;
    let _ = executor.execute(job_id, "worker-1").await;

    let outcome = executor.execute(job_id, "worker-2").await.unwrap();

    assert_eq!(outcome, ExecutionOutcome::AlreadyFailed);
}

#[tokio::test]
async fn given_misaligned_analyzer_when_executed_then_batch_is_rejected() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("pico"), "extracting PICO", Arc::new(MisalignedAnalyzer)))
            .build()
            .unwrap(),
    );
    let executor = executor(store.clone(), registry, tracker);
    let job_id = submitted(
        &store,
        &batch_job(vec![article("A", "B"), article("C", "D")], &["pico"], None),
    )
    .await;

    let result = executor.execute(job_id, "worker-1").await;

    assert!(matches!(
        result,
        Err(PipelineError::Stage {
            source: AnalyzerError::BatchMisaligned { expected: 2, actual: 1 },
            ..
        })
    ));
}

#[tokio::test]
async fn given_job_claimed_by_another_worker_when_task_is_duplicated_then_it_is_dropped() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker);
    let job_id = submitted(&store, &batch_job(vec![article("A", "B")], &["pico"], None)).await;
    let claim = store
        .claim(job_id, "worker-other", Duration::from_secs(60))
        .await
        .unwrap();
    assert!(matches!(claim, ClaimOutcome::Claimed(_)));

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert_eq!(outcome, ExecutionOutcome::AlreadyClaimed);
    assert!(store.fetch_completed(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn given_completed_job_when_task_is_redelivered_then_it_is_not_run_again() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let pico = StaticAnalyzer::new(json!({}));
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("pico"), "extracting PICO", pico.clone()))
            .build()
            .unwrap(),
    );
    let executor = executor(store.clone(), registry, tracker);
    let job_id = submitted(&store, &batch_job(vec![article("A", "B")], &["pico"], None)).await;
    executor.execute(job_id, "worker-1").await.unwrap();

    let outcome = executor.execute(job_id, "worker-2").await.unwrap();

    assert_eq!(outcome, ExecutionOutcome::AlreadyCompleted);
    assert_eq!(pico.batch_sizes().len(), 1);
}

#[tokio::test]
async fn given_stale_pending_row_for_completed_job_when_executed_then_row_is_removed() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker);
    let job = batch_job(vec![article("A", "B")], &["pico"], None);
    let job_id = submitted(&store, &job).await;
    store
        .record_completed(&CompletedJob {
            id: job_id,
            result: vec![article("A", "B")],
            submitted_at: job.submitted_at,
            completed_at: Utc::now(),
            archive: vec![],
        })
        .await
        .unwrap();

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert_eq!(outcome, ExecutionOutcome::AlreadyCompleted);
    assert!(store.fetch_pending(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn given_unknown_job_when_executed_then_reports_missing() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store, standard_registry(), tracker);

    let outcome = executor.execute(JobId::new(), "worker-1").await.unwrap();

    assert_eq!(outcome, ExecutionOutcome::Missing);
}

#[tokio::test]
async fn given_file_job_when_executed_then_text_is_extracted_and_upload_is_archived() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = RecordingTracker::new();
    let pico = StaticAnalyzer::new(json!({ "population": "adults" }));
    let registry = Arc::new(
        AnalyzerRegistry::builder()
            .register(StageRegistration::new(stage("pico"), "extracting PICO", pico.clone()))
            .build()
            .unwrap(),
    );
    let executor = executor(store.clone(), registry, tracker.clone());
    let file = PendingFile::new(
        "trial.txt".to_string(),
        ContentType::Text,
        b"Patients were randomized.\n\nOutcomes improved.".to_vec(),
    );
    let sha256 = file.document.sha256.clone();
    let job = PendingJob::files(
        FileJobOptions {
            stages: vec![stage("pico")],
            dont_delete: false,
        },
        vec![file],
    );
    let job_id = submitted(&store, &job).await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Completed { documents: 1, .. }));
    assert_eq!(pico.modes(), vec![AnnotationMode::FullDocument]);

    let completed = store.fetch_completed(job_id).await.unwrap().unwrap();
    let document = &completed.result[0];
    assert_eq!(
        document.text(TextField::FullText),
        Some("Patients were randomized.\n\nOutcomes improved.")
    );
    assert_eq!(document.fields["filename"], json!("trial.txt"));
    assert_eq!(document.fields["sha256"], json!(sha256.clone()));

    assert_eq!(completed.archive.len(), 1);
    assert_eq!(completed.archive[0].sha256, sha256);
    assert!(!completed.archive[0].dont_delete);
    assert!(completed.archive[0].annotations.annotation("pico").is_some());

    assert!(tracker.history().iter().any(|s| s.phase == Phase::Extraction));
}

#[tokio::test]
async fn given_unsupported_upload_when_executed_then_extraction_failure_fails_the_job() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker);
    let job = PendingJob::files(
        FileJobOptions {
            stages: vec![stage("pico")],
            dont_delete: true,
        },
        vec![PendingFile::new("scan.pdf".to_string(), ContentType::Pdf, b"%PDF-1.4".to_vec())],
    );
    let job_id = submitted(&store, &job).await;

    let result = executor.execute(job_id, "worker-1").await;

    assert!(matches!(result, Err(PipelineError::Extraction { .. })));
    assert!(matches!(
        store.pending_status(job_id).await.unwrap(),
        Some(PendingStatus::Failed(_))
    ));
}

fn synthesis_step(synthesizer: Arc<StubSynthesizer>) -> SynthesisStep {
    SynthesisStep::new(
        SynthesisPlan {
            source_stage: stage("pico"),
            span_fields: vec!["population".to_string()],
            article_fields: vec!["ti".to_string()],
            target: stage("summary"),
        },
        synthesizer,
    )
}

#[tokio::test]
async fn given_synthesis_configured_when_executed_then_derived_field_is_added_where_inputs_exist() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker)
        .with_synthesis(synthesis_step(StubSynthesizer::working()));
    let untitled = Article::default().with_text(TextField::Abstract, "Only an abstract.");
    let job_id = submitted(
        &store,
        &batch_job(vec![article("Aspirin", "x"), untitled], &["pico"], None),
    )
    .await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    let ExecutionOutcome::Completed { synthesis, .. } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(
        synthesis,
        vec![
            SynthesisOutcome::Derived,
            SynthesisOutcome::MissingInput {
                field: "ti".to_string()
            },
        ]
    );
    let completed = store.fetch_completed(job_id).await.unwrap().unwrap();
    assert_eq!(
        completed.result[0].annotation("summary"),
        Some(&json!({ "fields": 2 }))
    );
    assert!(completed.result[1].annotation("summary").is_none());
}

#[tokio::test]
async fn given_failing_synthesis_engine_when_executed_then_job_still_completes() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker)
        .with_synthesis(synthesis_step(StubSynthesizer::failing()));
    let job_id = submitted(&store, &batch_job(vec![article("Aspirin", "x")], &["pico"], None)).await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert!(matches!(
        outcome,
        ExecutionOutcome::Completed { ref synthesis, .. }
            if matches!(synthesis[..], [SynthesisOutcome::Failed { .. }])
    ));
    assert!(store.fetch_completed(job_id).await.unwrap().is_some());
}

#[tokio::test]
async fn given_source_stage_not_requested_when_executed_then_synthesis_is_skipped() {
    let store = Arc::new(InMemoryJobStore::new());
    let tracker = Arc::new(InMemoryProgressTracker::new());
    let executor = executor(store.clone(), standard_registry(), tracker)
        .with_synthesis(synthesis_step(StubSynthesizer::working()));
    let job_id = submitted(&store, &batch_job(vec![article("Aspirin", "x")], &["rct"], None)).await;

    let outcome = executor.execute(job_id, "worker-1").await.unwrap();

    assert!(matches!(
        outcome,
        ExecutionOutcome::Completed { ref synthesis, .. } if synthesis.is_empty()
    ));
}
