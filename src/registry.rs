// 该文件是 Biaozhu （标注） 项目的一部分。
// src/registry.rs - 项目模型注册表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Detector, DetectorError, DetectorLoader};

pub type ProjectId = u64;

#[derive(Error, Debug)]
pub enum RegistryError {
  #[error("Failed to read models config `{0}`: {1}")]
  Read(PathBuf, std::io::Error),
  #[error("Malformed models config: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Failed to load model `{0}`: {1}")]
  Load(PathBuf, DetectorError),
}

/// 配置文件中的一项：`{weights, model_version, projects}`
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
  pub weights: PathBuf,
  pub model_version: String,
  pub projects: Vec<ProjectId>,
}

#[derive(Clone)]
pub struct ModelEntry {
  pub detector: Arc<dyn Detector>,
  pub model_version: String,
}

/// 项目 ID 到模型的只读映射，启动时构建一次
#[derive(Default)]
pub struct ModelRegistry {
  entries: HashMap<ProjectId, ModelEntry>,
}

impl ModelRegistry {
  pub fn from_config_file<L: DetectorLoader>(path: &Path, loader: &L) -> Result<Self, RegistryError> {
    info!("读取模型配置: {}", path.display());
    let raw = std::fs::read_to_string(path).map_err(|e| RegistryError::Read(path.to_path_buf(), e))?;
    let configs: Vec<ModelConfig> = serde_json::from_str(&raw)?;
    Self::from_configs(&configs, loader)
  }

  pub fn from_configs<L: DetectorLoader>(configs: &[ModelConfig], loader: &L) -> Result<Self, RegistryError> {
    let mut entries = HashMap::new();

    for config in configs {
      let detector = loader
        .load(&config.weights)
        .map_err(|e| RegistryError::Load(config.weights.clone(), e))?;
      info!(
        "模型 {} (版本 {}) 服务项目: {:?}",
        config.weights.display(),
        config.model_version,
        config.projects
      );

      for &project in &config.projects {
        let entry = ModelEntry {
          detector: detector.clone(),
          model_version: config.model_version.clone(),
        };
        if entries.insert(project, entry).is_some() {
          debug!("项目 {} 的模型被后续配置覆盖", project);
        }
      }
    }

    Ok(ModelRegistry { entries })
  }

  pub fn get(&self, project: ProjectId) -> Option<&ModelEntry> {
    self.entries.get(&project)
  }

  pub fn contains(&self, project: ProjectId) -> bool {
    self.entries.contains_key(&project)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
