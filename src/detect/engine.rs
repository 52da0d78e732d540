use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::baseline::generate_baseline;
use crate::analysis::features::{FeatureVector, FEATURE_COUNT};
use crate::analysis::model::{Autoencoder, TrainingParams, TrainingReport};
use crate::analysis::stats::normalize;
use crate::config::TrainingConfig;
use crate::detect::anomaly::{
    score_reconstruction, score_statistical, AnomalyResult, RECONSTRUCTION_THRESHOLD,
};
use crate::detect::DetectError;

/// Lifecycle of a detector's learned model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectorState {
    Untrained,
    Training,
    Ready,
}

/// Snapshot of the learned model's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub is_ready: bool,
    pub training_epochs: usize,
    pub training_samples: usize,
    pub threshold: f64,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub final_loss: Option<f64>,
    pub state: DetectorState,
}

impl ModelMetrics {
    fn untrained(state: DetectorState) -> Self {
        Self {
            is_ready: false,
            training_epochs: 0,
            training_samples: 0,
            threshold: RECONSTRUCTION_THRESHOLD,
            last_trained_at: None,
            final_loss: None,
            state,
        }
    }
}

/// A training run detached from its detector, so it can execute without
/// holding any lock on it.
#[derive(Debug)]
pub struct TrainingJob {
    generation: u64,
    samples: usize,
    params: TrainingParams,
    rng: StdRng,
}

impl TrainingJob {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Build a fresh model and fit it on a newly generated baseline.
    pub fn run(mut self) -> Result<(Autoencoder, TrainingReport), DetectError> {
        let started = Instant::now();
        info!(
            epochs = self.params.epochs,
            samples = self.samples,
            "training reconstruction model"
        );

        let data = generate_baseline(&mut self.rng, self.samples)?;
        let mut model = Autoencoder::new(&mut self.rng);
        let report = model.fit(&data, &self.params, &mut self.rng);

        info!(
            epochs = report.epochs,
            samples = report.samples,
            final_loss = ?report.final_loss,
            params = model.param_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "training complete"
        );
        Ok((model, report))
    }
}

/// Network-traffic anomaly detector.
///
/// Scores through the learned model once trained, and through the
/// statistical z-score test otherwise. The detector owns the model; it is
/// released on [`Detector::dispose`] or when the detector is dropped.
#[derive(Debug)]
pub struct Detector {
    config: TrainingConfig,
    model: Option<Autoencoder>,
    metrics: ModelMetrics,
    generation: u64,
    rng: StdRng,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl Detector {
    pub fn new(config: TrainingConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            model: None,
            metrics: ModelMetrics::untrained(DetectorState::Untrained),
            generation: 0,
            rng,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.metrics.state
    }

    pub fn is_ready(&self) -> bool {
        self.metrics.is_ready
    }

    /// Train from scratch using the configured epoch and sample counts.
    pub fn train_default(&mut self) -> Result<(), DetectError> {
        let (epochs, samples) = (self.config.epochs, self.config.samples);
        self.train(epochs, samples)
    }

    /// Discard any existing model, then build and fit a new one.
    ///
    /// On failure the detector is left untrained.
    pub fn train(&mut self, epochs: usize, samples: usize) -> Result<(), DetectError> {
        let job = self.begin_training(epochs, samples)?;
        let generation = job.generation();
        let outcome = job.run();
        self.finish_training(generation, outcome).map(|_| ())
    }

    /// Enter `Training` and hand back the work to perform.
    ///
    /// The previous model is released immediately; detection falls back to
    /// the statistical path until training finishes.
    pub fn begin_training(
        &mut self,
        epochs: usize,
        samples: usize,
    ) -> Result<TrainingJob, DetectError> {
        if self.metrics.state == DetectorState::Training {
            return Err(DetectError::TrainingInProgress);
        }

        self.model = None;
        self.generation += 1;
        self.metrics = ModelMetrics::untrained(DetectorState::Training);

        Ok(TrainingJob {
            generation: self.generation,
            samples,
            params: self.config.params(epochs),
            rng: StdRng::seed_from_u64(self.rng.gen()),
        })
    }

    /// Install the result of a [`TrainingJob`].
    ///
    /// A result from a superseded run (the detector was disposed while it
    /// was training) is dropped and the current state is left alone.
    pub fn finish_training(
        &mut self,
        generation: u64,
        outcome: Result<(Autoencoder, TrainingReport), DetectError>,
    ) -> Result<ModelMetrics, DetectError> {
        if generation != self.generation || self.metrics.state != DetectorState::Training {
            return match outcome {
                Ok(_) => {
                    warn!(
                        generation,
                        "detector disposed during training, discarding model"
                    );
                    Ok(self.get_metrics())
                }
                Err(e) => Err(e),
            };
        }

        match outcome {
            Ok((model, report)) => {
                self.model = Some(model);
                self.metrics = ModelMetrics {
                    is_ready: true,
                    training_epochs: report.epochs,
                    training_samples: report.samples,
                    threshold: RECONSTRUCTION_THRESHOLD,
                    last_trained_at: Some(Utc::now()),
                    final_loss: report.final_loss,
                    state: DetectorState::Ready,
                };
                Ok(self.get_metrics())
            }
            Err(e) => {
                warn!(error = %e, "training failed, detector left untrained");
                self.model = None;
                self.metrics = ModelMetrics::untrained(DetectorState::Untrained);
                Err(e)
            }
        }
    }

    /// Score one observation.
    pub fn detect(&self, features: &FeatureVector) -> AnomalyResult {
        match &self.model {
            Some(model) => {
                let normalized = normalize(features);
                let result = score_reconstruction(&normalized, &model.reconstruct(&normalized));
                debug!(
                    score = result.score,
                    error = result.reconstruction_error,
                    "scored via reconstruction"
                );
                result
            }
            None => {
                let result = score_statistical(features);
                debug!(
                    score = result.score,
                    state = ?self.metrics.state,
                    "scored via statistical fallback"
                );
                result
            }
        }
    }

    /// The model's reconstruction of the normalized observation, if trained.
    pub fn reconstruct(&self, features: &FeatureVector) -> Option<[f64; FEATURE_COUNT]> {
        self.model.as_ref().map(|m| m.reconstruct(&normalize(features)))
    }

    pub fn get_metrics(&self) -> ModelMetrics {
        self.metrics.clone()
    }

    /// Release the model and return to `Untrained`. Safe to repeat.
    ///
    /// Disposing while a [`TrainingJob`] is out makes its result stale.
    pub fn dispose(&mut self) {
        if self.metrics.state == DetectorState::Untrained && self.model.is_none() {
            return;
        }
        self.model = None;
        self.generation += 1;
        self.metrics = ModelMetrics::untrained(DetectorState::Untrained);
        info!("detector disposed, model released");
    }
}

/// Cloneable handle for sharing one detector across async tasks.
///
/// Training runs on the blocking pool; the lock is held only for state
/// transitions, so `detect` keeps answering (statistically) meanwhile.
#[derive(Debug, Clone)]
pub struct SharedDetector {
    inner: Arc<Mutex<Detector>>,
}

fn lock_detector(inner: &Mutex<Detector>) -> MutexGuard<'_, Detector> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedDetector {
    pub fn new(detector: Detector) -> Self {
        Self {
            inner: Arc::new(Mutex::new(detector)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Detector> {
        lock_detector(&self.inner)
    }

    /// Rejects with [`DetectError::TrainingInProgress`] if another call is
    /// still training.
    ///
    /// The result is installed by the blocking task itself, so dropping the
    /// returned future does not strand the detector in `Training`; the run
    /// completes in the background.
    pub async fn train(&self, epochs: usize, samples: usize) -> Result<(), DetectError> {
        let job = self.lock().begin_training(epochs, samples)?;
        let generation = job.generation();
        let inner = Arc::clone(&self.inner);

        let handle = tokio::task::spawn_blocking(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
                Ok(outcome) => outcome,
                Err(_) => Err(DetectError::TrainingAborted("training panicked".to_string())),
            };
            lock_detector(&inner).finish_training(generation, outcome)
        });

        match handle.await {
            Ok(finished) => finished.map(|_| ()),
            // The task never ran (runtime shutting down).
            Err(e) => {
                let aborted = DetectError::TrainingAborted(e.to_string());
                self.lock().finish_training(generation, Err(aborted)).map(|_| ())
            }
        }
    }

    pub async fn train_default(&self) -> Result<(), DetectError> {
        let (epochs, samples) = {
            let detector = self.lock();
            (detector.config.epochs, detector.config.samples)
        };
        self.train(epochs, samples).await
    }

    pub fn detect(&self, features: &FeatureVector) -> AnomalyResult {
        self.lock().detect(features)
    }

    pub fn get_metrics(&self) -> ModelMetrics {
        self.lock().get_metrics()
    }

    pub fn state(&self) -> DetectorState {
        self.lock().state()
    }

    pub fn dispose(&self) {
        self.lock().dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::analysis::stats::reference_means;
    use crate::detect::anomaly::ScoringPath;
    use crate::detect::Classification;

    fn seeded() -> Detector {
        Detector::new(TrainingConfig {
            seed: Some(17),
            ..Default::default()
        })
    }

    #[test]
    fn test_lifecycle() {
        let mut det = seeded();
        assert_eq!(det.state(), DetectorState::Untrained);
        assert!(!det.get_metrics().is_ready);

        det.train(10, 50).unwrap();
        let metrics = det.get_metrics();
        assert!(metrics.is_ready);
        assert_eq!(metrics.state, DetectorState::Ready);
        assert_eq!(metrics.training_epochs, 10);
        assert_eq!(metrics.training_samples, 50);
        assert_eq!(metrics.threshold, 0.35);
        assert!(metrics.last_trained_at.is_some());
        assert!(metrics.final_loss.is_some());
        assert_eq!(
            det.detect(&reference_means()).scoring_path,
            ScoringPath::Reconstruction
        );

        det.dispose();
        assert!(!det.get_metrics().is_ready);
        assert_eq!(det.get_metrics(), ModelMetrics::untrained(DetectorState::Untrained));
        assert_eq!(det.detect(&reference_means()).scoring_path, ScoringPath::Statistical);
    }

    #[test]
    fn test_metrics_are_a_snapshot() {
        let mut det = seeded();
        let mut snapshot = det.get_metrics();
        snapshot.is_ready = true;
        snapshot.training_epochs = 999;
        assert!(!det.get_metrics().is_ready);
        assert_eq!(det.get_metrics().training_epochs, 0);

        det.train(2, 10).unwrap();
        assert_ne!(snapshot, det.get_metrics());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut det = seeded();
        det.dispose();
        assert_eq!(det.state(), DetectorState::Untrained);

        det.train(2, 20).unwrap();
        det.dispose();
        let after_first = det.get_metrics();
        let generation = det.generation;
        det.dispose();
        assert_eq!(det.get_metrics(), after_first);
        assert_eq!(det.generation, generation);
    }

    #[test]
    fn test_retrain_rebuilds_from_scratch() {
        let mut det = seeded();
        det.train(5, 40).unwrap();
        det.train(3, 30).unwrap();
        let metrics = det.get_metrics();
        assert_eq!(metrics.training_epochs, 3);
        assert_eq!(metrics.training_samples, 30);
    }

    #[test]
    fn test_concurrent_training_is_rejected() {
        let mut det = seeded();
        let job = det.begin_training(2, 20).unwrap();
        assert_eq!(det.state(), DetectorState::Training);
        assert!(matches!(det.begin_training(2, 20), Err(DetectError::TrainingInProgress)));

        // Detection keeps working on the statistical path while training.
        let result = det.detect(&reference_means());
        assert_eq!(result.scoring_path, ScoringPath::Statistical);
        assert_eq!(result.classification, Classification::Normal);

        let generation = job.generation();
        det.finish_training(generation, job.run()).unwrap();
        assert!(det.is_ready());
    }

    #[test]
    fn test_dispose_during_training_discards_result() {
        let mut det = seeded();
        let job = det.begin_training(2, 20).unwrap();
        let generation = job.generation();
        det.dispose();
        assert_eq!(det.state(), DetectorState::Untrained);

        let metrics = det.finish_training(generation, job.run()).unwrap();
        assert!(!metrics.is_ready);
        assert!(det.reconstruct(&reference_means()).is_none());
    }

    #[test]
    fn test_failed_training_resets_state() {
        let mut det = seeded();
        det.train(2, 20).unwrap();
        let job = det.begin_training(2, 20).unwrap();
        let err = det
            .finish_training(
                job.generation(),
                Err(DetectError::ResourceExhausted {
                    what: "baseline samples",
                    requested: usize::MAX,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, DetectError::ResourceExhausted { .. }));
        assert_eq!(det.state(), DetectorState::Untrained);
        assert!(det.reconstruct(&reference_means()).is_none());
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let mut a = seeded();
        let mut b = seeded();
        a.train(3, 40).unwrap();
        b.train(3, 40).unwrap();

        let mut probe = reference_means();
        probe.unique_destinations = 60.0;
        assert_eq!(a.reconstruct(&probe), b.reconstruct(&probe));
        assert_eq!(a.detect(&probe).score, b.detect(&probe).score);
    }

    #[tokio::test]
    async fn test_shared_detector_trains_in_background() {
        let shared = SharedDetector::new(seeded());
        assert_eq!(shared.state(), DetectorState::Untrained);

        shared.train(3, 40).await.unwrap();
        let metrics = shared.get_metrics();
        assert!(metrics.is_ready);
        assert_eq!(metrics.training_epochs, 3);

        let handle = shared.clone();
        handle.dispose();
        assert_eq!(shared.state(), DetectorState::Untrained);
        assert_eq!(
            shared.detect(&reference_means()).scoring_path,
            ScoringPath::Statistical
        );
    }

    #[tokio::test]
    async fn test_cancelled_train_completes_in_background() {
        let shared = SharedDetector::new(seeded());

        let cancelled =
            tokio::time::timeout(Duration::from_millis(1), shared.train(20, 2_000)).await;
        assert!(cancelled.is_err());

        for _ in 0..1_200 {
            if shared.state() != DetectorState::Training {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(shared.state(), DetectorState::Ready);
        assert_eq!(shared.get_metrics().training_samples, 2_000);

        shared.train(2, 10).await.unwrap();
        assert_eq!(shared.get_metrics().training_samples, 10);
    }
}
