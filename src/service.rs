// 该文件是 Biaozhu （标注） 项目的一部分。
// src/service.rs - 预测服务
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

use std::{io::Write, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  annotation::PredictionResponse,
  fetch::{FetchError, ImageFetcher},
  model::DetectorError,
  registry::{ModelRegistry, ProjectId},
};

const TEMP_FILE_PREFIX: &str = "biaozhu-";

#[derive(Error, Debug)]
pub enum PredictError {
  #[error("Parameter `project` is required when the task does not contain a project id number!")]
  MissingProjectId,
  #[error("Project id `{0}` does not exist!")]
  ProjectNotFound(ProjectId),
  #[error("Task does not contain `data.image`")]
  MissingImage,
  #[error(transparent)]
  ImageFetch(#[from] FetchError),
  #[error("Temporary file error: {0}")]
  TempFile(#[from] std::io::Error),
  #[error("Inference failed: {0}")]
  Inference(#[from] DetectorError),
  #[error("Prediction worker failed: {0}")]
  Worker(String),
}

/// `POST /predict` 的请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
  pub task: Map<String, Value>,
  #[serde(default)]
  pub project: Option<ProjectId>,
}

pub struct PredictionService {
  registry: Arc<ModelRegistry>,
  fetcher: ImageFetcher,
  background_label: String,
}

impl PredictionService {
  pub fn new(registry: Arc<ModelRegistry>, fetcher: ImageFetcher, background_label: impl Into<String>) -> Self {
    PredictionService {
      registry,
      fetcher,
      background_label: background_label.into(),
    }
  }

  pub fn registry(&self) -> &ModelRegistry {
    &self.registry
  }

  pub fn predict(&self, request: &PredictRequest) -> Result<PredictionResponse, PredictError> {
    let project = self.resolve_project(request)?;
    let entry = self
      .registry
      .get(project)
      .ok_or(PredictError::ProjectNotFound(project))?;
    let locator = image_locator(&request.task).ok_or(PredictError::MissingImage)?;
    info!(
      "项目 {} (模型版本 {}) 开始预测: {}",
      project, entry.model_version, locator
    );

    let data = self.fetcher.fetch(locator)?;

    // 临时文件在离开作用域时删除
    let detections = {
      let mut file = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(&temp_suffix(locator))
        .tempfile()?;
      file.write_all(&data)?;
      file.flush()?;

      let now = std::time::Instant::now();
      let detections = entry.detector.infer(file.path())?;
      info!("推理完成，耗时: {:.2?}", now.elapsed());
      detections
    };
    debug!("检测结果: {:?}", detections);

    Ok(PredictionResponse::from_detections(
      &detections,
      entry.detector.as_ref(),
      &entry.model_version,
      &self.background_label,
    ))
  }

  /// 任务内的项目 ID 优先，其次使用请求顶层的项目 ID
  fn resolve_project(&self, request: &PredictRequest) -> Result<ProjectId, PredictError> {
    if let Some(project) = embedded_project(&request.task) {
      return Ok(project);
    }

    match request.project.filter(|&p| p != 0) {
      Some(project) if self.registry.contains(project) => Ok(project),
      Some(project) => Err(PredictError::ProjectNotFound(project)),
      None => Err(PredictError::MissingProjectId),
    }
  }
}

fn embedded_project(task: &Map<String, Value>) -> Option<ProjectId> {
  task
    .get("project")
    .and_then(Value::as_u64)
    .filter(|&p| p != 0)
}

fn image_locator(task: &Map<String, Value>) -> Option<&str> {
  task.get("data")?.get("image")?.as_str()
}

/// 保留图像地址中的扩展名，URL 只取路径部分
fn temp_suffix(locator: &str) -> String {
  let url = Url::parse(locator).ok();
  let path = url.as_ref().map(Url::path).unwrap_or(locator);
  Path::new(path)
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| format!(".{ext}"))
    .unwrap_or_default()
}
