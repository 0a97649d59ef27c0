use crate::domain::model::{InputFormat, InvalidRecordPolicy, OutputFormat, Record};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Where the model artifact and its optional metadata side file come from.
/// Read once, at load time.
pub trait ArtifactSource: Send + Sync {
    /// Human-readable location, used in logs and error messages.
    fn describe(&self) -> String;

    fn read_model(&self) -> Result<Vec<u8>>;

    /// `Ok(None)` when no side file is configured.
    fn read_metadata(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn artifact_path(&self) -> &str;
    fn metadata_path(&self) -> Option<&str>;
    fn threshold(&self) -> f64;
    fn input_path(&self) -> &str;
    fn input_format(&self) -> InputFormat;
    fn output_path(&self) -> &str;
    fn output_formats(&self) -> &[OutputFormat];
    fn concurrent_assessments(&self) -> usize;
    fn min_age_years(&self) -> u32;
    fn on_invalid_record(&self) -> InvalidRecordPolicy;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    type Output: Send;

    async fn extract(&self) -> Result<Vec<Record>>;
    async fn transform(&self, data: Vec<Record>) -> Result<Self::Output>;
    async fn load(&self, result: Self::Output) -> Result<String>;
}
