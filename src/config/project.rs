// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 bookflow contributors

//! Project loading
//!
//! A project is a bookflow.yaml plus the pipeline files its globs resolve to.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::ProjectConfig;
use crate::errors::BookflowError;
use crate::pipeline::{InMemoryRegistry, PipelineDefinition};

/// Default project file name
pub const PROJECT_FILE: &str = "bookflow.yaml";

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory holding the project file
    pub root: PathBuf,
    pub config: ProjectConfig,
    /// Pipeline definitions with the files they came from, in path order
    pub pipelines: Vec<(PathBuf, PipelineDefinition)>,
}

impl Project {
    /// Load `bookflow.yaml` from `dir`
    pub fn discover(dir: &Path) -> Result<Self, BookflowError> {
        Self::load(&dir.join(PROJECT_FILE))
    }

    /// Load a project file and every pipeline it points at.
    ///
    /// Settings overrides from the environment are applied here.
    pub fn load(path: &Path) -> Result<Self, BookflowError> {
        if !path.is_file() {
            return Err(BookflowError::ProjectNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BookflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut config = ProjectConfig::from_yaml(&content)?;
        config.settings = config.settings.with_env_overrides()?;

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut files = Vec::new();
        for pattern in &config.pipelines {
            let full = if Path::new(pattern).is_absolute() {
                pattern.clone()
            } else {
                root.join(pattern).to_string_lossy().to_string()
            };
            files.extend(glob::glob(&full)?.filter_map(Result::ok));
        }
        files.sort();
        files.dedup();

        let mut pipelines = Vec::new();
        for file in files {
            debug!(file = %file.display(), "Loading pipeline");
            let def = PipelineDefinition::from_file(&file).map_err(|e| match e {
                BookflowError::Yaml { message } => BookflowError::InvalidPipeline {
                    reason: format!("{}: {}", file.display(), message),
                    help: None,
                },
                other => other,
            })?;
            pipelines.push((file, def));
        }

        Ok(Self {
            root,
            config,
            pipelines,
        })
    }

    /// Registry of every pipeline in the project
    pub fn registry(&self) -> Result<InMemoryRegistry, BookflowError> {
        let mut registry = InMemoryRegistry::new();
        for (_, def) in &self.pipelines {
            registry.register(def.clone())?;
        }
        Ok(registry)
    }

    /// Pipeline ids in file order
    pub fn pipeline_ids(&self) -> Vec<String> {
        self.pipelines.iter().map(|(_, d)| d.name.clone()).collect()
    }

    pub fn pipeline(&self, name: &str) -> Result<&PipelineDefinition, BookflowError> {
        self.pipelines
            .iter()
            .map(|(_, d)| d)
            .find(|d| d.name == name)
            .ok_or_else(|| BookflowError::PipelineNotFound {
                pipeline: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineRegistry;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_project() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            PROJECT_FILE,
            "settings:\n  sources: [laguna]\npipelines: [\"pipelines/*.yaml\"]\n",
        );
        write(
            tmp.path(),
            "pipelines/b.yaml",
            "name: second\ntasks:\n  - id: t\n    kind: { type: work, command: \"true\" }\n",
        );
        write(
            tmp.path(),
            "pipelines/a.yaml",
            "name: first\ntasks:\n  - id: t\n    kind: { type: work, command: \"true\" }\n",
        );

        let project = Project::discover(tmp.path()).unwrap();
        assert_eq!(project.pipeline_ids(), vec!["first", "second"]);
        assert!(project.pipeline("second").is_ok());
        assert!(matches!(
            project.pipeline("third"),
            Err(BookflowError::PipelineNotFound { .. })
        ));
        assert_eq!(project.registry().unwrap().pipeline_ids().len(), 2);
    }

    #[test]
    fn test_missing_project() {
        let tmp = TempDir::new().unwrap();
        let err = Project::discover(tmp.path()).unwrap_err();
        assert!(matches!(err, BookflowError::ProjectNotFound { .. }));
    }
}
