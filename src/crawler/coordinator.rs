//! Crawl coordinator
//!
//! Owns the shared crawl context and the worker pool. Each worker loops
//! `next → fetch → extract → commit → report` until the scheduler is
//! drained or the stop signal fires. Workers never abort an in-flight
//! fetch: cancellation is observed only between cycles, and every finished
//! fetch is committed before the worker exits.

use crate::checkpoint::{CommitBatch, RunStatus, SqliteStore, Store, Transition};
use crate::config::Config;
use crate::crawler::summary::{load_summary, print_summary, RunSummary};
use crate::extract::{list_url, search_url, Extractor};
use crate::scheduler::{Dispatch, Outcome, ReportOutcome, Scheduler};
use crate::state::{DedupIndex, Target, TargetKind, TargetSeed, TargetState};
use crate::transport::{CredentialSource, FailureKind, FetchResult, FileCredentials, Transport};
use crate::HarvestError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Shared crawl state, passed down to every worker
///
/// The scheduler queue and the dedup index are each guarded by their own
/// mutex; the store serializes all commits behind a third. There are no
/// process-wide singletons.
pub struct CrawlContext {
    pub config: Config,
    pub run_id: i64,
    pub scheduler: Mutex<Scheduler>,
    pub dedup: Mutex<DedupIndex>,
    pub store: Mutex<SqliteStore>,
    pub transport: Transport,
}

/// Main crawl coordinator
pub struct Coordinator {
    context: Arc<CrawlContext>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Coordinator {
    /// Creates a coordinator with file-backed credentials from the config
    pub fn new(config: Config, config_hash: &str, fresh: bool) -> crate::Result<Self> {
        let source = Box::new(FileCredentials::new(&config.session.credentials_path));
        Self::with_credential_source(config, config_hash, fresh, source)
    }

    /// Creates a coordinator with an explicit credential source
    pub fn with_credential_source(
        config: Config,
        config_hash: &str,
        fresh: bool,
        source: Box<dyn CredentialSource>,
    ) -> crate::Result<Self> {
        let db_path = Path::new(&config.output.database_path);

        if fresh && db_path.exists() {
            tracing::warn!("Fresh crawl requested, removing {}", db_path.display());
            std::fs::remove_file(db_path)?;
        }

        let mut store = SqliteStore::new(db_path)?;

        // Resume an interrupted run or start a new one
        let run_id = match store.get_latest_run()? {
            Some(run) if run.status == RunStatus::Running => {
                if run.config_hash != config_hash {
                    tracing::warn!(
                        "Configuration changed since run {} was checkpointed",
                        run.id
                    );
                }
                tracing::info!("Resuming interrupted run {}", run.id);
                run.id
            }
            _ => store.create_run(config_hash)?,
        };

        let transport = Transport::new(
            &config.session,
            Duration::from_secs(config.crawler.request_timeout),
            source,
        )?;

        let mut scheduler = Scheduler::new(config.crawler.clone());
        let state = store.load()?;

        let mut resumed = 0usize;
        for target in state.targets {
            match target.state {
                TargetState::Pending | TargetState::Deferred => {
                    let mut target = target;
                    target.state = TargetState::Pending;
                    if scheduler.enqueue(target) {
                        resumed += 1;
                    }
                }
                _ => scheduler.mark_known(&target.url),
            }
        }
        if resumed > 0 {
            tracing::info!("Restored {} queued targets from checkpoint", resumed);
        }

        let dedup = DedupIndex::from_fingerprints(state.fingerprints);

        // Seed targets from the configured accounts; URLs already in the
        // checkpoint come back as None and are skipped.
        for account in &config.accounts {
            let seed = match &account.fakeid {
                Some(fakeid) => TargetSeed::new(
                    list_url(
                        &config.session.api_base,
                        fakeid,
                        0,
                        config.extraction.list_page_size,
                    ),
                    TargetKind::ArticleList {
                        account: account.name.clone(),
                        fakeid: fakeid.clone(),
                        page: 0,
                    },
                ),
                None => TargetSeed::new(
                    search_url(&config.session.api_base, &account.name),
                    TargetKind::AccountSearch {
                        account: account.name.clone(),
                    },
                ),
            };

            if let Some(target) = store.insert_seed(&seed, run_id)? {
                tracing::info!(account = %account.name, url = %target.url, "Seeded account");
                scheduler.enqueue(target);
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Self {
            context: Arc::new(CrawlContext {
                config,
                run_id,
                scheduler: Mutex::new(scheduler),
                dedup: Mutex::new(dedup),
                store: Mutex::new(store),
                transport,
            }),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        })
    }

    /// A handle that cancels the crawl when sent `true`
    pub fn stop_handle(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.stop_tx)
    }

    /// Runs the crawl to completion or cancellation
    ///
    /// Returns the end-of-run summary after flushing the checkpoint.
    pub async fn run(&self) -> crate::Result<RunSummary> {
        let started = Instant::now();
        tracing::info!(
            run = self.context.run_id,
            workers = self.context.config.crawler.workers,
            "Starting crawl"
        );

        let mut handles = Vec::new();
        for worker_id in 0..self.context.config.crawler.workers {
            let context = Arc::clone(&self.context);
            let stop = self.stop_rx.clone();
            let stop_tx = Arc::clone(&self.stop_tx);
            handles.push(tokio::spawn(worker_loop(context, stop, stop_tx, worker_id)));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker panicked: {}", e);
            }
        }

        let cancelled = *self.stop_rx.borrow();
        let summary = {
            let mut store = self.context.store.lock().unwrap();
            if cancelled {
                store.interrupt_run(self.context.run_id)?;
            } else {
                store.complete_run(self.context.run_id)?;
            }
            load_summary(&*store)?
        };

        tracing::info!(
            run = self.context.run_id,
            elapsed = ?started.elapsed(),
            cancelled,
            "Crawl finished: {} done, {} failed, {} records",
            summary.done,
            summary.failed,
            summary.records
        );
        print_summary(&summary);

        Ok(summary)
    }
}

/// One worker's crawl loop
async fn worker_loop(
    context: Arc<CrawlContext>,
    mut stop: watch::Receiver<bool>,
    stop_tx: Arc<watch::Sender<bool>>,
    worker_id: u32,
) {
    loop {
        if *stop.borrow() {
            tracing::debug!(worker_id, "Stop signal observed, exiting");
            break;
        }

        let dispatch = {
            let mut scheduler = context.scheduler.lock().unwrap();
            scheduler.next(Instant::now())
        };

        match dispatch {
            Dispatch::Exhausted => {
                tracing::debug!(worker_id, "Scheduler drained, exiting");
                break;
            }
            Dispatch::Wait(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.changed() => {}
                }
            }
            Dispatch::Fetch(target) => {
                if let Err(e) = context.store.lock().unwrap().mark_in_flight(target.id) {
                    tracing::error!(url = %target.url, "Cannot mark target in flight: {}", e);
                }

                let fetch = context.transport.fetch(&target).await;

                if !process_fetch(&context, &target, fetch) {
                    tracing::error!(worker_id, "Checkpoint commit failed, stopping crawl");
                    let _ = stop_tx.send(true);
                    break;
                }
            }
        }
    }
}

/// Handles one completed fetch: extract, commit, report
///
/// Returns false only when the checkpoint store itself failed, which is
/// fatal for this worker.
fn process_fetch(context: &CrawlContext, target: &Target, fetch: FetchResult) -> bool {
    match fetch.failure() {
        Some(kind) => {
            let kind = kind.clone();
            tracing::debug!(url = %target.url, "Fetch failed: {}", kind);
            report_failure(context, target, kind)
        }
        None => {
            let extractor = Extractor::for_kind(&context.config, &target.kind);
            match extractor.extract(&fetch) {
                Ok(mut extraction) => {
                    // Cross-target dedup within the run; the store's UNIQUE
                    // constraint covers earlier runs.
                    {
                        let mut dedup = context.dedup.lock().unwrap();
                        extraction.records.retain(|r| dedup.insert(&r.fingerprint));
                    }

                    let record_count = extraction.records.len();
                    let batch = CommitBatch {
                        transitions: vec![Transition {
                            target_id: target.id,
                            state: TargetState::Done,
                            retry_count: target.retry_count,
                            error: None,
                        }],
                        records: extraction.records,
                        discovered: extraction.discovered,
                    };

                    let outcome = {
                        let mut store = context.store.lock().unwrap();
                        store.commit(context.run_id, target.id, batch)
                    };

                    match outcome {
                        Ok(outcome) => {
                            tracing::info!(
                                url = %target.url,
                                records = record_count,
                                discovered = outcome.inserted_targets.len(),
                                "Target done"
                            );
                            let mut scheduler = context.scheduler.lock().unwrap();
                            scheduler.report(target.id, Outcome::Success, Instant::now());
                            for new_target in outcome.inserted_targets {
                                scheduler.enqueue(new_target);
                            }
                            true
                        }
                        Err(e) => {
                            tracing::error!(url = %target.url, "Commit failed: {}", e);
                            false
                        }
                    }
                }
                Err(parse_error) => {
                    tracing::warn!(url = %target.url, "Extraction failed: {}", parse_error);
                    report_failure(context, target, FailureKind::Parse(parse_error.to_string()))
                }
            }
        }
    }
}

/// Applies the scheduler's retry decision for a failure and persists it
fn report_failure(context: &CrawlContext, target: &Target, kind: FailureKind) -> bool {
    let error_text = kind.to_string();
    let decision = {
        let mut scheduler = context.scheduler.lock().unwrap();
        scheduler.report(target.id, Outcome::Failure(kind), Instant::now())
    };

    let transition = match decision {
        Some(ReportOutcome::Deferred { retry_count, delay }) => {
            tracing::info!(
                url = %target.url,
                retry = retry_count,
                ?delay,
                "Target deferred"
            );
            Transition {
                target_id: target.id,
                state: TargetState::Deferred,
                retry_count,
                error: Some(error_text),
            }
        }
        Some(ReportOutcome::Failed { retry_count }) => Transition {
            target_id: target.id,
            state: TargetState::Failed,
            retry_count,
            error: Some(error_text),
        },
        // Success cannot come back from a failure report; an unknown id
        // means the target was never dispatched and there is nothing to
        // persist.
        Some(ReportOutcome::Completed) | None => return true,
    };

    let result = {
        let mut store = context.store.lock().unwrap();
        store.commit(
            context.run_id,
            target.id,
            CommitBatch {
                transitions: vec![transition],
                ..Default::default()
            },
        )
    };

    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(url = %target.url, "Commit failed: {}", e);
            false
        }
    }
}

/// Runs the main crawl operation
///
/// Seeds the configured accounts, resumes any checkpointed state, and
/// drives the worker pool until the frontier drains or ctrl-c fires.
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
) -> Result<RunSummary, HarvestError> {
    let coordinator = Coordinator::new(config, config_hash, fresh)?;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received; letting in-flight fetches finish");
            let _ = stop.send(true);
        }
    });

    coordinator.run().await
}
