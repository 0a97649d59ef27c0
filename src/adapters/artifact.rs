use crate::domain::ports::ArtifactSource;
use crate::utils::error::Result;
use std::path::PathBuf;

/// Artifact plus optional metadata side file on local disk.
#[derive(Debug, Clone)]
pub struct FileArtifactSource {
    model_path: PathBuf,
    metadata_path: Option<PathBuf>,
}

impl FileArtifactSource {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            metadata_path: None,
        }
    }

    pub fn with_metadata(mut self, metadata_path: impl Into<PathBuf>) -> Self {
        self.metadata_path = Some(metadata_path.into());
        self
    }
}

impl ArtifactSource for FileArtifactSource {
    fn describe(&self) -> String {
        self.model_path.display().to_string()
    }

    fn read_model(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.model_path)?)
    }

    fn read_metadata(&self) -> Result<Option<Vec<u8>>> {
        match &self.metadata_path {
            Some(path) => Ok(Some(std::fs::read(path)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryArtifactSource {
    model: Vec<u8>,
    metadata: Option<Vec<u8>>,
}

impl InMemoryArtifactSource {
    pub fn new(model: impl Into<Vec<u8>>) -> Self {
        Self {
            model: model.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

impl ArtifactSource for InMemoryArtifactSource {
    fn describe(&self) -> String {
        format!("in-memory artifact ({} bytes)", self.model.len())
    }

    fn read_model(&self) -> Result<Vec<u8>> {
        Ok(self.model.clone())
    }

    fn read_metadata(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scorer::ModelRegistry;

    #[test]
    fn test_missing_artifact_file_is_fatal() {
        let registry = ModelRegistry::new(FileArtifactSource::new("does/not/exist.json"));
        let err = registry.acquire().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("does/not/exist.json"));
    }

    #[test]
    fn test_missing_metadata_file_is_not_fatal() {
        let source = FileArtifactSource::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/cardio_model.json"
        ))
        .with_metadata("does/not/exist.json");
        let model = ModelRegistry::new(source).acquire().unwrap();
        assert!(model.metadata().is_none());
    }

    #[test]
    fn test_in_memory_source_carries_metadata() {
        let source = InMemoryArtifactSource::new(
            include_bytes!("../../tests/fixtures/cardio_model.json").to_vec(),
        )
        .with_metadata(include_bytes!("../../tests/fixtures/model_metadata.json").to_vec());
        let model = ModelRegistry::new(source).acquire().unwrap();
        assert_eq!(
            model.metadata().and_then(|m| m.accuracy),
            Some(0.7315)
        );
    }
}
