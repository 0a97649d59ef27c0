use crate::core::ensemble::{sigmoid, TreeEnsemble};
use crate::core::explainer::TreeExplainer;
use crate::core::metadata::ModelMetadata;
use crate::domain::model::{AttributionResult, FeatureVector};
use crate::domain::ports::ArtifactSource;
use crate::utils::error::{Result, RiskError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// `1` when the probability reaches the threshold.
pub fn label_for(probability: f64, threshold: f64) -> u8 {
    u8::from(probability >= threshold)
}

/// Read-only inference over one loaded ensemble.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    model: Arc<TreeEnsemble>,
}

impl RiskScorer {
    pub fn new(model: Arc<TreeEnsemble>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<TreeEnsemble> {
        &self.model
    }

    pub fn raw_margin(&self, x: &FeatureVector) -> Result<f64> {
        let margin = self.model.margin(x);
        if !margin.is_finite() {
            return Err(RiskError::computation(format!(
                "model margin is not finite ({}) for input {:?}",
                margin,
                x.as_slice()
            )));
        }
        Ok(margin)
    }

    /// Positive-class probability in `[0, 1]`.
    pub fn predict_proba(&self, x: &FeatureVector) -> Result<f64> {
        let probability = sigmoid(self.raw_margin(x)?);
        if !(0.0..=1.0).contains(&probability) {
            return Err(RiskError::computation(format!(
                "probability {} outside [0, 1]",
                probability
            )));
        }
        Ok(probability)
    }

    pub fn predict_label(&self, x: &FeatureVector, threshold: f64) -> Result<u8> {
        Ok(label_for(self.predict_proba(x)?, threshold))
    }
}

/// Whether attributions can be produced for the loaded model.
#[derive(Debug, Clone)]
pub enum ExplainerState {
    Available(TreeExplainer),
    Unavailable { reason: String },
}

impl ExplainerState {
    /// Never fails; an explainer that cannot be built is recorded and logged once.
    pub fn initialize(model: Arc<TreeEnsemble>) -> Self {
        match TreeExplainer::new(model) {
            Ok(explainer) => {
                tracing::debug!("🔎 Attribution explainer ready (baseline {:.4})", explainer.baseline());
                ExplainerState::Available(explainer)
            }
            Err(e) => {
                tracing::warn!("⚠️ {} - attributions will be empty", e);
                ExplainerState::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ExplainerState::Available(_))
    }

    pub fn explainer(&self) -> Option<&TreeExplainer> {
        match self {
            ExplainerState::Available(explainer) => Some(explainer),
            ExplainerState::Unavailable { .. } => None,
        }
    }

    pub fn explain(&self, x: &FeatureVector) -> AttributionResult {
        self.explainer()
            .map(|explainer| explainer.explain(x))
            .unwrap_or_else(AttributionResult::empty)
    }
}

#[derive(Debug)]
pub struct LoadedModel {
    scorer: RiskScorer,
    explainer: ExplainerState,
    metadata: Option<ModelMetadata>,
    origin: String,
}

impl LoadedModel {
    pub fn load(source: &dyn ArtifactSource) -> Result<Self> {
        let origin = source.describe();
        tracing::info!("📦 Loading risk model from {}", origin);

        let bytes = source
            .read_model()
            .map_err(|e| RiskError::model_unavailable(format!("cannot read {}: {}", origin, e)))?;
        let ensemble = TreeEnsemble::from_json_slice(&bytes).map_err(|e| match e {
            RiskError::ModelUnavailable { message } => {
                RiskError::model_unavailable(format!("{}: {}", origin, message))
            }
            other => other,
        })?;

        let metadata = match source.read_metadata() {
            Ok(Some(raw)) => match ModelMetadata::from_json_slice(&raw) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    tracing::warn!("⚠️ Ignoring unreadable model metadata: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unavailable model metadata: {}", e);
                None
            }
        };

        let mut loaded = Self::from_ensemble(ensemble, metadata);
        loaded.origin = origin;
        tracing::info!(
            "✅ Model {} loaded: {} trees, {} nodes, attributions {}",
            loaded.model_version(),
            loaded.scorer.model().trees().len(),
            loaded.scorer.model().node_count(),
            if loaded.explainer.is_available() { "on" } else { "off" }
        );
        Ok(loaded)
    }

    pub fn from_ensemble(ensemble: TreeEnsemble, metadata: Option<ModelMetadata>) -> Self {
        if let Some(version) = metadata.as_ref().and_then(|m| m.model_version.as_deref()) {
            if version != ensemble.model_version() {
                tracing::warn!(
                    "⚠️ Metadata describes model {} but the artifact is {}",
                    version,
                    ensemble.model_version()
                );
            }
        }
        let model = Arc::new(ensemble);
        Self {
            explainer: ExplainerState::initialize(Arc::clone(&model)),
            scorer: RiskScorer::new(model),
            metadata,
            origin: "in-memory".to_string(),
        }
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn explainer(&self) -> &ExplainerState {
        &self.explainer
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    pub fn model_version(&self) -> &str {
        self.scorer.model().model_version()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Owns the one-time load of the model artifact.
///
/// `acquire` is double-checked: the `OnceLock` is the lock-free fast path and
/// the mutex serialises the slow path, so concurrent first callers trigger a
/// single load and all observe the same fully constructed instance. A failed
/// load leaves the registry empty.
pub struct ModelRegistry<S: ArtifactSource> {
    source: S,
    loaded: OnceLock<Arc<LoadedModel>>,
    init: Mutex<()>,
    loads: AtomicUsize,
}

impl<S: ArtifactSource> ModelRegistry<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            loaded: OnceLock::new(),
            init: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Loads at construction so serving never starts without a model.
    pub fn eager(source: S) -> Result<Self> {
        let registry = Self::new(source);
        registry.acquire()?;
        Ok(registry)
    }

    pub fn acquire(&self) -> Result<Arc<LoadedModel>> {
        if let Some(model) = self.loaded.get() {
            return Ok(Arc::clone(model));
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = self.loaded.get() {
            return Ok(Arc::clone(model));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let model = Arc::new(LoadedModel::load(&self.source)?);
        // only this thread can set it while the guard is held
        let _ = self.loaded.set(Arc::clone(&model));
        Ok(model)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Number of load attempts made so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::ensemble::tests::FIXTURE;
    use std::thread;

    struct CountingSource {
        bytes: Vec<u8>,
        reads: Arc<AtomicUsize>,
    }

    impl ArtifactSource for CountingSource {
        fn describe(&self) -> String {
            "counting-source".to_string()
        }

        fn read_model(&self) -> Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            // widen the race window for concurrent first acquisitions
            thread::sleep(std::time::Duration::from_millis(20));
            Ok(self.bytes.clone())
        }
    }

    fn counting(bytes: &[u8]) -> (CountingSource, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            CountingSource {
                bytes: bytes.to_vec(),
                reads: Arc::clone(&reads),
            },
            reads,
        )
    }

    pub(crate) const OVERFLOW: &str =
        include_str!("../../tests/fixtures/cardio_model_overflow.json");

    fn vector(values: [f64; 9]) -> FeatureVector {
        FeatureVector(values)
    }

    #[test]
    fn test_sequential_acquisitions_share_instance() {
        let (source, reads) = counting(FIXTURE.as_bytes());
        let registry = ModelRegistry::new(source);
        let first = registry.acquire().unwrap();
        let second = registry.acquire().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.load_count(), 1);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_acquisitions_load_once() {
        let (source, reads) = counting(FIXTURE.as_bytes());
        let registry = ModelRegistry::new(source);

        let models: Vec<Arc<LoadedModel>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..16).map(|_| scope.spawn(|| registry.acquire().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.load_count(), 1);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_corrupt_artifact_is_model_unavailable() {
        let (source, _) = counting(b"{ not a model");
        let registry = ModelRegistry::new(source);
        let err = registry.acquire().unwrap_err();
        assert!(err.is_fatal());
        assert!(!registry.is_loaded());
    }

    #[test]
    fn test_proba_and_label_follow_threshold() {
        let (source, _) = counting(FIXTURE.as_bytes());
        let registry = ModelRegistry::eager(source).unwrap();
        let model = registry.acquire().unwrap();
        let scorer = model.scorer();

        let x = vector([50.0, 1.0, 32.0, 95.0, 3.0, 3.0, 1.0, 1.0, 0.0]);
        let p = scorer.predict_proba(&x).unwrap();
        assert!((p - sigmoid(0.9)).abs() < 1e-12);

        for t in [0.0, 0.25, p, 0.7109, 0.75, 1.0] {
            assert_eq!(scorer.predict_label(&x, t).unwrap() == 1, p >= t, "threshold {t}");
        }
        assert_eq!(scorer.predict_label(&x, DEFAULT_THRESHOLD).unwrap(), 1);
    }

    #[test]
    fn test_explainer_state_without_cover() {
        let json = include_str!("../../tests/fixtures/cardio_model_no_cover.json");
        let model = LoadedModel::from_ensemble(TreeEnsemble::from_json_slice(json.as_bytes()).unwrap(), None);
        assert!(!model.explainer().is_available());
        let x = vector([45.0, 2.0, 28.5, 110.0, 2.0, 1.0, 0.0, 0.0, 1.0]);
        assert!(model.explainer().explain(&x).is_empty());
        // scoring is unaffected
        assert!((model.scorer().predict_proba(&x).unwrap() - sigmoid(0.6)).abs() < 1e-12);
    }

    #[test]
    fn test_label_for_is_inclusive_at_threshold() {
        assert_eq!(label_for(0.5, 0.5), 1);
        assert_eq!(label_for(0.499_999, 0.5), 0);
        assert_eq!(label_for(0.0, 0.0), 1);
        assert_eq!(label_for(1.0, 1.0), 1);
        assert_eq!(label_for(f64::NAN, 0.5), 0);
    }

    #[test]
    fn test_overflowing_margin_is_computation_error() {
        let ensemble = TreeEnsemble::from_json_slice(OVERFLOW.as_bytes()).unwrap();
        let model = LoadedModel::from_ensemble(ensemble, None);
        let x = vector([45.0, 2.0, 28.5, 110.0, 2.0, 1.0, 0.0, 0.0, 1.0]);

        let err = model.scorer().raw_margin(&x).unwrap_err();
        assert!(matches!(err, RiskError::ComputationError { .. }), "{err:?}");
        assert!(err.to_string().contains("not finite"));
        assert!(!err.is_fatal());

        assert!(matches!(
            model.scorer().predict_proba(&x),
            Err(RiskError::ComputationError { .. })
        ));
        assert!(matches!(
            model.scorer().predict_label(&x, DEFAULT_THRESHOLD),
            Err(RiskError::ComputationError { .. })
        ));
    }
}
