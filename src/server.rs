// 该文件是 Biaozhu （标注） 项目的一部分。
// src/server.rs - 预测服务 HTTP 接口
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

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

use crate::{
  annotation::PredictionResponse,
  fetch::FetchError,
  service::{PredictError, PredictRequest, PredictionService},
};

impl IntoResponse for PredictError {
  fn into_response(self) -> Response {
    error!("预测失败: {}", self);
    let detail = |status: StatusCode, message: String| (status, Json(json!({ "detail": message }))).into_response();

    match self {
      // 上游图像服务的响应体原样返回
      PredictError::ImageFetch(FetchError::Upstream { body, .. }) => {
        (StatusCode::NOT_FOUND, Json(Value::String(body))).into_response()
      }
      err @ (PredictError::MissingProjectId
      | PredictError::ProjectNotFound(_)
      | PredictError::ImageFetch(_)) => detail(StatusCode::NOT_FOUND, err.to_string()),
      err @ PredictError::MissingImage => detail(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
      err @ (PredictError::TempFile(_) | PredictError::Inference(_) | PredictError::Worker(_)) => {
        detail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
      }
    }
  }
}

pub fn router(service: Arc<PredictionService>) -> Router {
  Router::new()
    .route("/predict", post(predict))
    .route("/health", get(health))
    .with_state(service)
}

pub async fn serve<A: ToSocketAddrs>(addr: A, service: Arc<PredictionService>) -> std::io::Result<()> {
  let listener = TcpListener::bind(addr).await?;
  info!("预测服务监听于 {}", listener.local_addr()?);
  axum::serve(listener, router(service)).await
}

async fn predict(
  State(service): State<Arc<PredictionService>>,
  Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionResponse>, PredictError> {
  // 图像下载与推理都是阻塞操作
  let response = tokio::task::spawn_blocking(move || service.predict(&request))
    .await
    .map_err(|e| PredictError::Worker(e.to_string()))??;
  Ok(Json(response))
}

async fn health(State(service): State<Arc<PredictionService>>) -> Json<Value> {
  Json(json!({
    "status": "UP",
    "projects": service.registry().len(),
  }))
}
