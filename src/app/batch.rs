use crate::adapters::records::{
    self, parse_observations, record_id, AssessmentReport, RejectedRecord,
};
use crate::core::service::RiskService;
use crate::domain::model::{
    ClinicalAssessment, ClinicalObservation, InvalidRecordPolicy, OutputFormat, Record,
};
use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
use crate::utils::error::{Result, RiskError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const ASSESSMENTS_JSON: &str = "assessments.json";
pub const ASSESSMENTS_CSV: &str = "assessments.csv";
pub const REJECTED_JSON: &str = "rejected.json";

/// Reports in input order, plus the records the core refused.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub reports: Vec<AssessmentReport>,
    pub rejected: Vec<RejectedRecord>,
}

pub struct BatchPipeline<S: Storage, C: ConfigProvider> {
    pub(crate) storage: S,
    pub(crate) config: C,
    pub(crate) service: RiskService,
}

enum Pending {
    Scheduled {
        id: String,
        observation: ClinicalObservation,
        task: JoinHandle<Result<ClinicalAssessment>>,
    },
    Refused {
        id: String,
        error: RiskError,
    },
}

/// Cancels assessments that will never be read. Tasks still waiting for a
/// permit never start their blocking work.
fn abort_scheduled(rest: impl IntoIterator<Item = Pending>) -> usize {
    let mut aborted = 0;
    for item in rest {
        if let Pending::Scheduled { task, .. } = item {
            task.abort();
            aborted += 1;
        }
    }
    aborted
}

impl<S: Storage, C: ConfigProvider> BatchPipeline<S, C> {
    pub fn new(storage: S, config: C, service: RiskService) -> Self {
        Self {
            storage,
            config,
            service,
        }
    }

    pub fn service(&self) -> &RiskService {
        &self.service
    }

    /// Builds the typed observation and applies the caller's age rule.
    fn admit(&self, record: &Record) -> Result<ClinicalObservation> {
        let observation = ClinicalObservation::try_from(record)?;
        let min_age = self.config.min_age_years();
        if observation.age_years < min_age {
            return Err(RiskError::invalid_input(
                "age_years",
                format!("Pasien harus berusia minimal {} tahun untuk analisis risiko.", min_age),
            ));
        }
        Ok(observation)
    }

    /// Under `Skip` the error becomes a rejection; under `Fail` it aborts.
    fn reject(&self, id: String, error: RiskError, result: &mut BatchResult) -> Result<()> {
        let field = match &error {
            RiskError::InvalidInput { field, .. } => Some(field.clone()),
            RiskError::ComputationError { .. } => None,
            _ => return Err(error),
        };

        if self.config.on_invalid_record() == InvalidRecordPolicy::Fail {
            tracing::error!("❌ Record {} refused, aborting batch: {}", id, error);
            return Err(error);
        }

        tracing::warn!("⚠️ Skipping record {}: {}", id, error);
        let reason = match &error {
            RiskError::InvalidInput { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        result.rejected.push(RejectedRecord {
            record_id: id,
            field,
            reason,
        });
        Ok(())
    }

    fn schedule(
        &self,
        observation: ClinicalObservation,
        permits: &Arc<Semaphore>,
    ) -> JoinHandle<Result<ClinicalAssessment>> {
        let permits = Arc::clone(permits);
        let service = self.service.clone();
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| RiskError::ProcessingError {
                    message: format!("assessment pool closed: {}", e),
                })?;
            tokio::task::spawn_blocking(move || service.assess(&observation))
                .await
                .map_err(|e| RiskError::ProcessingError {
                    message: format!("assessment task failed: {}", e),
                })?
        })
    }

    async fn settle(&self, item: Pending, result: &mut BatchResult) -> Result<()> {
        match item {
            Pending::Scheduled {
                id,
                observation,
                task,
            } => {
                let outcome = task.await.map_err(|e| RiskError::ProcessingError {
                    message: format!("assessment task failed: {}", e),
                })?;
                match outcome {
                    Ok(assessment) => {
                        tracing::debug!(
                            "Assessed {}: p={:.4} ({})",
                            id,
                            assessment.risk.probability,
                            assessment.risk.category
                        );
                        result
                            .reports
                            .push(AssessmentReport::new(id, &observation, &assessment)?);
                        Ok(())
                    }
                    Err(error) => self.reject(id, error, result),
                }
            }
            Pending::Refused { id, error } => self.reject(id, error, result),
        }
    }

    fn output_file(&self, name: &str) -> String {
        Path::new(self.config.output_path())
            .join(name)
            .to_string_lossy()
            .into_owned()
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for BatchPipeline<S, C> {
    type Output = BatchResult;

    async fn extract(&self) -> Result<Vec<Record>> {
        let path = self.config.input_path();
        let format = self.config.input_format();
        tracing::debug!("Reading observations from {} as {:?}", path, format);

        let bytes = self.storage.read_file(path).await?;
        parse_observations(&bytes, format)
    }

    async fn transform(&self, data: Vec<Record>) -> Result<BatchResult> {
        let permits = Arc::new(Semaphore::new(self.config.concurrent_assessments().max(1)));
        let fail_fast = self.config.on_invalid_record() == InvalidRecordPolicy::Fail;
        let mut pending = Vec::with_capacity(data.len());

        for (i, record) in data.iter().enumerate() {
            let id = record_id(record, i + 1);
            match self.admit(record) {
                Ok(observation) => pending.push(Pending::Scheduled {
                    id,
                    observation,
                    task: self.schedule(observation, &permits),
                }),
                Err(error) => {
                    pending.push(Pending::Refused { id, error });
                    // nothing later can precede this refusal in input order
                    if fail_fast {
                        break;
                    }
                }
            }
        }

        // awaited in submission order so the output keeps the input order
        let mut result = BatchResult::default();
        let mut pending = pending.into_iter();
        while let Some(item) = pending.next() {
            if let Err(error) = self.settle(item, &mut result).await {
                let aborted = abort_scheduled(pending);
                if aborted > 0 {
                    tracing::debug!("Cancelled {} outstanding assessment(s)", aborted);
                }
                return Err(error);
            }
        }

        Ok(result)
    }

    async fn load(&self, result: BatchResult) -> Result<String> {
        for format in self.config.output_formats() {
            let (name, data) = match format {
                OutputFormat::Json => (ASSESSMENTS_JSON, records::render_json(&result.reports)?),
                OutputFormat::Csv => (ASSESSMENTS_CSV, records::render_csv(&result.reports)?),
            };
            let path = self.output_file(name);
            tracing::debug!("Writing {} ({} bytes)", path, data.len());
            self.storage.write_file(&path, &data).await?;
        }

        if !result.rejected.is_empty() {
            let path = self.output_file(REJECTED_JSON);
            let data = records::render_json(&result.rejected)?;
            self.storage.write_file(&path, &data).await?;
            tracing::info!("📝 {} rejected record(s) listed in {}", result.rejected.len(), path);
        }

        Ok(self.config.output_path().to_string())
    }
}
