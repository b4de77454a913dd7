//! Batch orchestrator: one long-lived background loop that walks the
//! evidence sources in order, selects under-verified businesses, runs
//! adapter checks with bounded parallelism, classifies and persists the
//! outcomes, then re-fuses and rescores the affected businesses.
//!
//! Stop requests are observed between batches, never mid-batch; in-flight
//! adapter calls finish under their per-source timeout so no verification
//! state is left half-written.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex as AsyncMutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::errors::AppError;
use crate::fusion::{FusionEngine, FusionOutcome};
use crate::models::{Business, SourceStats, VerificationSource, Verdict};
use crate::scoring::{score_business, ScoreCaps, ScoringFeatures};
use crate::sources::{AdapterRegistry, RawOutcome};
use crate::store::VerificationStore;
use crate::verdict::classify;

/// Outcome code recorded when an adapter call exceeds its timeout. Not in
/// any classifier table, so it degrades to inconclusive.
const TIMEOUT_OUTCOME: &str = "timeout";

/// Per-source knobs. Paid and rate-limited sources get smaller batches,
/// higher score gates and longer timeouts than the free prober.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    pub enabled: bool,
    pub batch_size: i64,
    pub min_score: Option<f64>,
    pub timeout_secs: u64,
}

impl SourceSettings {
    fn new(batch_size: i64, min_score: Option<f64>, timeout_secs: u64) -> Self {
        Self {
            enabled: true,
            batch_size,
            min_score,
            timeout_secs,
        }
    }
}

/// The one owned settings object the loop reads. Configure requests patch
/// it through named fields, never free-form strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub parallelism: usize,
    pub pacing_delay_ms: u64,
    pub idle_pause_secs: u64,
    pub retry_horizon_days: i32,
    pub rescore_after_batch: bool,
    pub domain_guess: SourceSettings,
    pub search_engine: SourceSettings,
    pub ai_disambiguator: SourceSettings,
    pub places_api: SourceSettings,
    pub directory_api: SourceSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            parallelism: 8,
            pacing_delay_ms: 500,
            idle_pause_secs: 900,
            retry_horizon_days: 30,
            rescore_after_batch: true,
            domain_guess: SourceSettings::new(200, None, 30),
            search_engine: SourceSettings::new(100, Some(30.0), 20),
            ai_disambiguator: SourceSettings::new(50, Some(30.0), 45),
            places_api: SourceSettings::new(50, Some(40.0), 20),
            directory_api: SourceSettings::new(50, Some(40.0), 20),
        }
    }
}

impl PipelineSettings {
    pub fn source(&self, source: VerificationSource) -> &SourceSettings {
        match source {
            VerificationSource::DomainGuess => &self.domain_guess,
            VerificationSource::SearchEngine => &self.search_engine,
            VerificationSource::AiDisambiguator => &self.ai_disambiguator,
            VerificationSource::PlacesApi => &self.places_api,
            VerificationSource::DirectoryApi => &self.directory_api,
        }
    }

    fn source_mut(&mut self, source: VerificationSource) -> &mut SourceSettings {
        match source {
            VerificationSource::DomainGuess => &mut self.domain_guess,
            VerificationSource::SearchEngine => &mut self.search_engine,
            VerificationSource::AiDisambiguator => &mut self.ai_disambiguator,
            VerificationSource::PlacesApi => &mut self.places_api,
            VerificationSource::DirectoryApi => &mut self.directory_api,
        }
    }

    /// Clamp values into sane ranges so a bad patch cannot wedge the loop.
    pub fn normalize(&mut self) {
        self.parallelism = self.parallelism.clamp(1, 64);
        self.idle_pause_secs = self.idle_pause_secs.max(5);
        self.retry_horizon_days = self.retry_horizon_days.max(1);
        for source in VerificationSource::ALL {
            let cfg = self.source_mut(source);
            cfg.batch_size = cfg.batch_size.clamp(0, 10_000);
            cfg.timeout_secs = cfg.timeout_secs.clamp(1, 600);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcePatch {
    pub enabled: Option<bool>,
    pub batch_size: Option<i64>,
    pub min_score: Option<f64>,
    pub timeout_secs: Option<u64>,
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub parallelism: Option<usize>,
    pub pacing_delay_ms: Option<u64>,
    pub idle_pause_secs: Option<u64>,
    pub retry_horizon_days: Option<i32>,
    pub rescore_after_batch: Option<bool>,
    pub domain_guess: Option<SourcePatch>,
    pub search_engine: Option<SourcePatch>,
    pub ai_disambiguator: Option<SourcePatch>,
    pub places_api: Option<SourcePatch>,
    pub directory_api: Option<SourcePatch>,
}

impl SettingsPatch {
    fn source(&self, source: VerificationSource) -> Option<&SourcePatch> {
        match source {
            VerificationSource::DomainGuess => self.domain_guess.as_ref(),
            VerificationSource::SearchEngine => self.search_engine.as_ref(),
            VerificationSource::AiDisambiguator => self.ai_disambiguator.as_ref(),
            VerificationSource::PlacesApi => self.places_api.as_ref(),
            VerificationSource::DirectoryApi => self.directory_api.as_ref(),
        }
    }

    pub fn apply(&self, settings: &mut PipelineSettings) {
        if let Some(v) = self.parallelism {
            settings.parallelism = v;
        }
        if let Some(v) = self.pacing_delay_ms {
            settings.pacing_delay_ms = v;
        }
        if let Some(v) = self.idle_pause_secs {
            settings.idle_pause_secs = v;
        }
        if let Some(v) = self.retry_horizon_days {
            settings.retry_horizon_days = v;
        }
        if let Some(v) = self.rescore_after_batch {
            settings.rescore_after_batch = v;
        }
        for source in VerificationSource::ALL {
            if let Some(patch) = self.source(source) {
                let cfg = settings.source_mut(source);
                if let Some(v) = patch.enabled {
                    cfg.enabled = v;
                }
                if let Some(v) = patch.batch_size {
                    cfg.batch_size = v;
                }
                if let Some(v) = patch.min_score {
                    cfg.min_score = Some(v);
                }
                if let Some(v) = patch.timeout_secs {
                    cfg.timeout_secs = v;
                }
            }
        }
        settings.normalize();
    }
}

/// Where one source currently is in its cycle, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePhase {
    Idle,
    Selecting,
    Dispatching,
    AwaitingResults,
    Classifying,
    CoolingDown,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub phase: SourcePhase,
    #[serde(flatten)]
    pub stats: SourceStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub busy: bool,
    pub cycle_count: u64,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub available_sources: Vec<VerificationSource>,
    pub sources: BTreeMap<String, SourceStatus>,
    pub settings: PipelineSettings,
}

#[derive(Debug, Default)]
struct RuntimeState {
    cycle_count: u64,
    last_cycle_started_at: Option<DateTime<Utc>>,
    last_cycle_finished_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug)]
struct SourceRuntime {
    phase: SourcePhase,
    stats: SourceStats,
}

impl Default for SourceRuntime {
    fn default() -> Self {
        Self {
            phase: SourcePhase::Idle,
            stats: SourceStats::default(),
        }
    }
}

pub struct PipelineController {
    store: Arc<VerificationStore>,
    registry: Arc<AdapterRegistry>,
    fusion: Arc<FusionEngine>,
    caps: ScoreCaps,
    settings: RwLock<PipelineSettings>,
    running: AtomicBool,
    state: Mutex<RuntimeState>,
    source_state: Mutex<BTreeMap<VerificationSource, SourceRuntime>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    loop_handle: AsyncMutex<Option<JoinHandle<()>>>,
    /// At most one in-flight check per (business, source): a second
    /// dispatch for the same pair is skipped rather than spending a
    /// duplicate upstream call.
    in_flight: moka::future::Cache<(Uuid, VerificationSource), ()>,
    /// Serializes cycles between the background loop and run-once.
    cycle_lock: AsyncMutex<()>,
}

impl PipelineController {
    pub fn new(
        store: Arc<VerificationStore>,
        registry: Arc<AdapterRegistry>,
        fusion: FusionEngine,
        settings: PipelineSettings,
    ) -> Self {
        let mut settings = settings;
        settings.normalize();
        Self {
            store,
            registry,
            fusion: Arc::new(fusion),
            caps: ScoreCaps::default(),
            settings: RwLock::new(settings),
            running: AtomicBool::new(false),
            state: Mutex::new(RuntimeState::default()),
            source_state: Mutex::new(BTreeMap::new()),
            stop_tx: Mutex::new(None),
            loop_handle: AsyncMutex::new(None),
            in_flight: moka::future::Cache::builder()
                .time_to_live(Duration::from_secs(600))
                .max_capacity(100_000)
                .build(),
            cycle_lock: AsyncMutex::new(()),
        }
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> PipelineSettings {
        let mut settings = self.settings.write().expect("settings lock poisoned");
        patch.apply(&mut settings);
        settings.clone()
    }

    fn snapshot_settings(&self) -> PipelineSettings {
        self.settings.read().expect("settings lock poisoned").clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the background loop. Idempotent: a second start while
    /// running just returns the current status.
    pub async fn start(self: &Arc<Self>, patch: Option<SettingsPatch>) -> PipelineStatus {
        if let Some(patch) = patch {
            self.update_settings(&patch);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return self.status();
        }

        let (tx, rx) = watch::channel(false);
        *self.stop_tx.lock().expect("stop lock poisoned") = Some(tx);

        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            controller.run_loop(rx).await;
        });
        *self.loop_handle.lock().await = Some(handle);

        tracing::info!("verification pipeline started");
        self.status()
    }

    /// Request a stop and wait briefly for the loop to wind down. The
    /// current batch is allowed to finish.
    pub async fn stop(&self) -> PipelineStatus {
        if let Some(tx) = self.stop_tx.lock().expect("stop lock poisoned").take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.loop_handle.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                tracing::warn!("pipeline loop did not stop within 5s; detaching");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("verification pipeline stopped");
        self.status()
    }

    /// Run a single cycle inline. Returns an error string in the status
    /// rather than failing the request when a batch fails.
    pub async fn run_once(self: &Arc<Self>) -> PipelineStatus {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            return self.status();
        };
        let (_, stop_rx) = watch::channel(false);
        self.run_cycle_recorded(&stop_rx).await;
        self.status()
    }

    pub fn status(&self) -> PipelineStatus {
        let state = self.state.lock().expect("state lock poisoned");
        let source_state = self.source_state.lock().expect("source state lock poisoned");
        let sources = source_state
            .iter()
            .map(|(source, runtime)| {
                (
                    source.as_str().to_string(),
                    SourceStatus {
                        phase: runtime.phase,
                        stats: runtime.stats.clone(),
                    },
                )
            })
            .collect();
        PipelineStatus {
            running: self.is_running(),
            busy: self.cycle_lock.try_lock().is_err(),
            cycle_count: state.cycle_count,
            last_cycle_started_at: state.last_cycle_started_at,
            last_cycle_finished_at: state.last_cycle_finished_at,
            last_error: state.last_error.clone(),
            available_sources: self.registry.available(),
            sources,
            settings: self.snapshot_settings(),
        }
    }

    async fn run_loop(self: Arc<Self>, stop_rx: watch::Receiver<bool>) {
        tracing::info!(sources = ?self.registry.available(), "pipeline loop running");
        loop {
            {
                let _guard = self.cycle_lock.lock().await;
                self.run_cycle_recorded(&stop_rx).await;
            }

            if *stop_rx.borrow() {
                break;
            }
            let idle = self.snapshot_settings().idle_pause_secs;
            let mut stop_rx = stop_rx.clone();
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(Duration::from_secs(idle)) => {}
            }
        }
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("pipeline loop exited");
    }

    /// One full pass across all sources, with errors captured into
    /// `last_error` — the loop never dies silently.
    async fn run_cycle_recorded(&self, stop_rx: &watch::Receiver<bool>) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            state.last_cycle_started_at = Some(Utc::now());
            state.last_error = None;
        }

        let result = self.run_cycle(stop_rx).await;

        let mut state = self.state.lock().expect("state lock poisoned");
        state.last_cycle_finished_at = Some(Utc::now());
        match result {
            Ok(()) => {
                state.cycle_count += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "verification cycle failed");
                state.last_error = Some(e.to_string());
            }
        }
    }

    async fn run_cycle(&self, stop_rx: &watch::Receiver<bool>) -> Result<(), AppError> {
        for source in self.registry.available() {
            if *stop_rx.borrow() {
                break;
            }

            let settings = self.snapshot_settings();
            let cfg = settings.source(source).clone();
            if !cfg.enabled || cfg.batch_size == 0 {
                continue;
            }

            self.set_phase(source, SourcePhase::Selecting);
            let batch = match self
                .store
                .select_for_source(
                    source,
                    cfg.batch_size,
                    cfg.min_score,
                    settings.retry_horizon_days,
                )
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    self.record_source_error(source, &e);
                    self.set_phase(source, SourcePhase::Idle);
                    return Err(e);
                }
            };

            if batch.is_empty() {
                self.set_phase(source, SourcePhase::CoolingDown);
                tracing::debug!(source = source.as_str(), "no work; cooling down");
                self.set_phase(source, SourcePhase::Idle);
                continue;
            }

            tracing::info!(
                source = source.as_str(),
                batch = batch.len(),
                "dispatching verification batch"
            );

            let result = self
                .run_batch(source, batch, &settings, cfg.timeout_secs)
                .await;
            self.set_phase(source, SourcePhase::Idle);
            if let Err(e) = result {
                self.record_source_error(source, &e);
                return Err(e);
            }

            if settings.pacing_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(settings.pacing_delay_ms)).await;
            }
        }
        Ok(())
    }

    /// Dispatch one batch through the adapter with bounded parallelism,
    /// classify and persist each outcome, then rescore the affected
    /// businesses. A persistence failure halts the batch; records already
    /// committed are retained.
    async fn run_batch(
        &self,
        source: VerificationSource,
        batch: Vec<Business>,
        settings: &PipelineSettings,
        timeout_secs: u64,
    ) -> Result<(), AppError> {
        self.set_phase(source, SourcePhase::Dispatching);

        let semaphore = Arc::new(Semaphore::new(settings.parallelism));
        let mut join_set: JoinSet<(Uuid, RawOutcome)> = JoinSet::new();

        for business in &batch {
            let key = (business.id, source);
            if self.in_flight.get(&key).await.is_some() {
                tracing::debug!(
                    business_id = %business.id,
                    source = source.as_str(),
                    "check already in flight; skipping"
                );
                continue;
            }
            self.in_flight.insert(key, ()).await;

            let registry = Arc::clone(&self.registry);
            let semaphore = Arc::clone(&semaphore);
            let snapshot = business.snapshot();
            let timeout = Duration::from_secs(timeout_secs);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let Some(adapter) = registry.get(source) else {
                    // Unreachable for sources listed as available.
                    return (
                        snapshot.id,
                        RawOutcome::code("adapter_missing"),
                    );
                };
                let outcome = match tokio::time::timeout(timeout, adapter.check(&snapshot)).await {
                    Ok(outcome) => outcome,
                    Err(_) => RawOutcome::code(TIMEOUT_OUTCOME).detail(serde_json::json!({
                        "timeout_secs": timeout.as_secs(),
                    })),
                };
                (snapshot.id, outcome)
            });
        }

        self.set_phase(source, SourcePhase::AwaitingResults);
        let mut results: Vec<(Uuid, RawOutcome)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(source = source.as_str(), error = %e, "adapter task panicked");
                }
            }
        }

        self.set_phase(source, SourcePhase::Classifying);
        for (business_id, raw) in &results {
            let verdict = classify(source, &raw.code);

            let append = self
                .store
                .append_record(*business_id, source, raw, verdict)
                .await;
            if let Err(e) = append {
                // A lost record would understate confidence; surface the
                // batch failure instead of dropping the result silently.
                self.in_flight.invalidate(&(*business_id, source)).await;
                return Err(e);
            }

            if verdict == Verdict::ConclusivePositive {
                if let Some(website) = &raw.website_url {
                    self.store.set_website(*business_id, website).await?;
                }
            }

            self.bump_stats(source, verdict);

            if settings.rescore_after_batch {
                self.rescore(*business_id).await?;
            }

            self.in_flight.invalidate(&(*business_id, source)).await;
        }

        tracing::info!(
            source = source.as_str(),
            processed = results.len(),
            "verification batch complete"
        );
        Ok(())
    }

    /// Re-fuse confidence from the full record history and recompute the
    /// lead score. Safe to call concurrently for different businesses.
    pub async fn rescore(&self, business_id: Uuid) -> Result<(f64, FusionOutcome), AppError> {
        let business = self
            .store
            .get_business(business_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("business {}", business_id)))?;

        let history = self.store.history(business_id).await?;
        let fused = self.fusion.fuse(&history);

        let contacts = self.store.contacts(business_id).await?;
        let domains = self.store.domains(business_id).await?;
        let features = ScoringFeatures::build(&contacts, &domains);

        let (score, reasons) = score_business(&business, fused.confidence, &features, &self.caps);
        self.store
            .save_score(business_id, score, fused.confidence, &reasons.to_json())
            .await?;

        tracing::debug!(
            business_id = %business_id,
            score,
            confidence = fused.confidence.as_str(),
            "rescored"
        );
        Ok((score, fused))
    }

    /// Current fused view of one business without writing anything.
    pub async fn verification_summary(
        &self,
        business_id: Uuid,
    ) -> Result<(Business, FusionOutcome), AppError> {
        let business = self
            .store
            .get_business(business_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("business {}", business_id)))?;
        let history = self.store.history(business_id).await?;
        Ok((business, self.fusion.fuse(&history)))
    }

    fn set_phase(&self, source: VerificationSource, phase: SourcePhase) {
        let mut map = self.source_state.lock().expect("source state lock poisoned");
        map.entry(source).or_default().phase = phase;
    }

    fn bump_stats(&self, source: VerificationSource, verdict: Verdict) {
        let mut map = self.source_state.lock().expect("source state lock poisoned");
        let stats = &mut map.entry(source).or_default().stats;
        stats.processed += 1;
        match verdict {
            Verdict::ConclusivePositive => stats.websites_found += 1,
            Verdict::ConclusiveNegative => stats.no_website_confirmed += 1,
            Verdict::Inconclusive => stats.inconclusive += 1,
        }
    }

    fn record_source_error(&self, source: VerificationSource, error: &AppError) {
        let mut map = self.source_state.lock().expect("source state lock poisoned");
        map.entry(source).or_default().stats.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_normalized() {
        let mut settings = PipelineSettings::default();
        settings.normalize();
        assert!(settings.parallelism >= 1);
        assert!(settings.domain_guess.batch_size > 0);
    }

    #[test]
    fn patch_applies_and_clamps() {
        let mut settings = PipelineSettings::default();
        let patch = SettingsPatch {
            parallelism: Some(0),
            idle_pause_secs: Some(0),
            search_engine: Some(SourcePatch {
                enabled: Some(false),
                batch_size: Some(-5),
                min_score: Some(55.0),
                timeout_secs: Some(0),
            }),
            ..Default::default()
        };
        patch.apply(&mut settings);
        assert_eq!(settings.parallelism, 1);
        assert!(settings.idle_pause_secs >= 5);
        assert!(!settings.search_engine.enabled);
        assert_eq!(settings.search_engine.batch_size, 0);
        assert_eq!(settings.search_engine.min_score, Some(55.0));
        assert!(settings.search_engine.timeout_secs >= 1);
    }

    #[test]
    fn patch_leaves_untouched_fields_alone() {
        let mut settings = PipelineSettings::default();
        let before = settings.pacing_delay_ms;
        SettingsPatch::default().apply(&mut settings);
        assert_eq!(settings.pacing_delay_ms, before);
    }
}
