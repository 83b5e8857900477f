//! Compilation of index configurations and the per-run build memo.

use async_trait::async_trait;
use bt_types::{BtResult, BuildError, ConfigDef, ConfigId, OptionSet};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Everything the build system needs to produce one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub config_id: ConfigId,
    pub index: String,
    pub options: BTreeMap<String, String>,
    pub dimension: u32,
}

impl BuildRequest {
    /// The catalog configuration as-is, specialized on `dimension`.
    pub fn for_config(config: &ConfigDef, dimension: u32) -> Self {
        Self {
            config_id: config.id,
            index: config.index.clone(),
            options: config.build_options(),
            dimension,
        }
    }

    /// Replace catalog options with values derived during a search.
    pub fn with_overrides(mut self, overrides: &OptionSet) -> Self {
        self.options.extend(overrides.to_build_options());
        self
    }

    pub fn key(&self) -> BuildKey {
        let options = self
            .options
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        BuildKey {
            config_id: self.config_id,
            fingerprint: format!("{};{};D={}", self.index, options, self.dimension),
        }
    }
}

/// Identity of a build: the configuration plus its effective options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildKey {
    pub config_id: ConfigId,
    fingerprint: String,
}

impl BuildKey {
    /// File stem unique to this build, e.g. `3-5f2c9a01d4e7b3aa`.
    pub fn artifact_stem(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.fingerprint.hash(&mut hasher);
        format!("{}-{:016x}", self.config_id, hasher.finish())
    }
}

/// The external build system.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Compile the request and return the path of the loadable artifact.
    async fn build(&self, request: &BuildRequest) -> BtResult<PathBuf>;
}

/// Settings for [`CmakeBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmakeBuilderConfig {
    /// Out-of-source build directory; all steps run here.
    pub build_dir: PathBuf,
    /// Source directory handed to cmake, relative to `build_dir` or absolute.
    pub source_dir: PathBuf,
    /// Definition name that receives the dataset dimension.
    pub dimension_option: String,
    /// Extra make target built before the index (the benchmark driver).
    pub bench_target: Option<String>,
    pub cmake_program: PathBuf,
    pub make_program: PathBuf,
}

impl Default for CmakeBuilderConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            source_dir: PathBuf::from(".."),
            dimension_option: "D".to_string(),
            bench_target: Some("bench".to_string()),
            cmake_program: PathBuf::from("cmake"),
            make_program: PathBuf::from("make"),
        }
    }
}

impl CmakeBuilderConfig {
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    pub fn with_programs(mut self, cmake: impl Into<PathBuf>, make: impl Into<PathBuf>) -> Self {
        self.cmake_program = cmake.into();
        self.make_program = make.into();
        self
    }
}

/// Builds through `cmake` + `make`, then renames `lib<index>.so` so that
/// the artifact name embeds the configuration and cannot be overwritten by
/// the next build while still loaded.
#[derive(Debug, Clone)]
pub struct CmakeBuilder {
    config: CmakeBuilderConfig,
}

impl CmakeBuilder {
    pub fn new(config: CmakeBuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CmakeBuilderConfig {
        &self.config
    }

    fn cmake_args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args: Vec<String> = request
            .options
            .iter()
            .filter(|(name, _)| **name != self.config.dimension_option)
            .map(|(name, value)| format!("-D{name}={value}"))
            .collect();
        args.push(format!(
            "-D{}={}",
            self.config.dimension_option, request.dimension
        ));
        args.push(self.config.source_dir.display().to_string());
        args
    }

    async fn run_step(&self, config_id: ConfigId, program: &Path, args: &[String]) -> BtResult<()> {
        let step = format!("{} {}", program.display(), args.join(" "));
        debug!(config_id, step = %step, "running build step");

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.config.build_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|e| BuildError::LaunchFailed {
                step: step.clone(),
                message: e.to_string(),
            })?;

        if !status.success() {
            return Err(BuildError::StepFailed {
                config_id,
                step,
                exit_code: status.code(),
            }
            .into());
        }
        Ok(())
    }

    fn library_path(&self, stem: &str) -> PathBuf {
        self.config.build_dir.join(format!("lib{stem}.so"))
    }
}

#[async_trait]
impl Builder for CmakeBuilder {
    async fn build(&self, request: &BuildRequest) -> BtResult<PathBuf> {
        tokio::fs::create_dir_all(&self.config.build_dir).await?;

        let config = &self.config;
        let id = request.config_id;
        self.run_step(id, &config.cmake_program, &self.cmake_args(request)).await?;
        if let Some(target) = &config.bench_target {
            self.run_step(id, &config.make_program, &[target.clone()]).await?;
        }
        self.run_step(id, &config.make_program, &[request.index.clone()]).await?;

        let built = self.library_path(&request.index);
        if !tokio::fs::try_exists(&built).await? {
            return Err(BuildError::ArtifactMissing {
                config_id: request.config_id,
                path: built.display().to_string(),
            }
            .into());
        }

        let artifact = self.library_path(&request.key().artifact_stem());
        tokio::fs::rename(&built, &artifact).await?;
        Ok(artifact)
    }
}

/// Counters kept by [`BuildCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub builds: u64,
    pub reused: u64,
    pub failures: u64,
}

/// Remembers which builds have been produced during this run so each is
/// compiled once.
///
/// The lock is held for the whole build: at most one build is in progress,
/// since every build shares the same build directory.
pub struct BuildCache {
    builder: Arc<dyn Builder>,
    built: tokio::sync::Mutex<HashMap<BuildKey, PathBuf>>,
    stats: parking_lot::Mutex<BuildStats>,
}

impl BuildCache {
    pub fn new(builder: Arc<dyn Builder>) -> Self {
        Self {
            builder,
            built: tokio::sync::Mutex::new(HashMap::new()),
            stats: parking_lot::Mutex::new(BuildStats::default()),
        }
    }

    /// Compile `request` unless an identical build already exists, and
    /// return the artifact path. Failed builds are not remembered.
    pub async fn ensure_compiled(&self, request: &BuildRequest) -> BtResult<PathBuf> {
        let key = request.key();
        let mut built = self.built.lock().await;

        if let Some(path) = built.get(&key) {
            debug!(config_id = request.config_id, "build already available");
            self.stats.lock().reused += 1;
            return Ok(path.clone());
        }

        info!(
            config_id = request.config_id,
            index = %request.index,
            dimension = request.dimension,
            "compiling configuration"
        );

        match self.builder.build(request).await {
            Ok(path) => {
                self.stats.lock().builds += 1;
                built.insert(key, path.clone());
                Ok(path)
            }
            Err(e) => {
                self.stats.lock().failures += 1;
                error!(config_id = request.config_id, error = %e, "build failed");
                Err(e)
            }
        }
    }

    pub async fn is_compiled(&self, request: &BuildRequest) -> bool {
        self.built.lock().await.contains_key(&request.key())
    }

    pub fn stats(&self) -> BuildStats {
        *self.stats.lock()
    }
}
