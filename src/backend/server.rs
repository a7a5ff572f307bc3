// 该文件是 Biaozhu （标注） 项目的一部分。
// src/backend/server.rs - ML 后端 HTTP 接口
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
  routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

use crate::backend::BackendAdapter;

const MODEL_CLASS: &str = "BiaozhuBackend";

#[derive(Clone)]
pub struct BackendState {
  adapter: Arc<BackendAdapter>,
  model_version: String,
}

impl BackendState {
  pub fn new(adapter: BackendAdapter, model_version: impl Into<String>) -> Self {
    BackendState {
      adapter: Arc::new(adapter),
      model_version: model_version.into(),
    }
  }
}

/// Label Studio 发送的预测请求，其余字段忽略
#[derive(Debug, Deserialize)]
struct PredictBatch {
  tasks: Vec<Value>,
}

pub fn router(state: BackendState) -> Router {
  Router::new()
    .route("/predict", post(predict))
    .route("/setup", post(setup))
    .route("/health", get(health))
    .with_state(state)
}

pub async fn serve<A: ToSocketAddrs>(addr: A, state: BackendState) -> std::io::Result<()> {
  let listener = TcpListener::bind(addr).await?;
  info!("ML 后端监听于 {}", listener.local_addr()?);
  axum::serve(listener, router(state)).await
}

async fn predict(State(state): State<BackendState>, Json(batch): Json<PredictBatch>) -> Json<Value> {
  info!("收到 {} 个任务", batch.tasks.len());
  let adapter = state.adapter.clone();
  let results = match tokio::task::spawn_blocking(move || adapter.predict(&batch.tasks)).await {
    Ok(results) => results,
    Err(e) => {
      error!("预测线程异常退出: {}", e);
      Vec::new()
    }
  };
  Json(json!({ "results": results }))
}

async fn setup(State(state): State<BackendState>) -> Json<Value> {
  Json(json!({ "model_version": state.model_version }))
}

async fn health() -> Json<Value> {
  Json(json!({ "status": "UP", "model_class": MODEL_CLASS }))
}
