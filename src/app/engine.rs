use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct AssessmentEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> AssessmentEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting assessment batch");

        let phase = Instant::now();
        let records = self.pipeline.extract().await?;
        tracing::info!(
            "📥 Extracted {} observation(s) in {:?}",
            records.len(),
            phase.elapsed()
        );

        let phase = Instant::now();
        let assessed = self.pipeline.transform(records).await?;
        tracing::info!("🧮 Assessment phase finished in {:?}", phase.elapsed());

        let phase = Instant::now();
        let output_path = self.pipeline.load(assessed).await?;
        tracing::info!("💾 Output written to {} in {:?}", output_path, phase.elapsed());

        tracing::info!("✅ Batch completed in {:?}", started.elapsed());
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Record;
    use crate::utils::error::RiskError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingPipeline {
        phases: AtomicUsize,
        fail_transform: bool,
    }

    #[async_trait::async_trait]
    impl Pipeline for RecordingPipeline {
        type Output = usize;

        async fn extract(&self) -> Result<Vec<Record>> {
            self.phases.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Record::default(), Record::default()])
        }

        async fn transform(&self, data: Vec<Record>) -> Result<usize> {
            self.phases.fetch_add(1, Ordering::SeqCst);
            if self.fail_transform {
                return Err(RiskError::ProcessingError {
                    message: "boom".to_string(),
                });
            }
            Ok(data.len())
        }

        async fn load(&self, result: usize) -> Result<String> {
            self.phases.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} written", result))
        }
    }

    #[test]
    fn test_engine_runs_all_phases() {
        let engine = AssessmentEngine::new(RecordingPipeline::default());
        let out = tokio_test::block_on(engine.run()).unwrap();
        assert_eq!(out, "2 written");
        assert_eq!(engine.pipeline().phases.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_engine_stops_at_failing_phase() {
        let engine = AssessmentEngine::new(RecordingPipeline {
            fail_transform: true,
            ..Default::default()
        });
        assert!(engine.run().await.is_err());
        assert_eq!(engine.pipeline().phases.load(Ordering::SeqCst), 2);
    }
}
