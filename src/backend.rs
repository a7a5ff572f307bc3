// 该文件是 Biaozhu （标注） 项目的一部分。
// src/backend.rs - Label Studio ML 后端适配器
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

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error};

use crate::annotation::PredictionResponse;

pub const DEFAULT_PREDICT_ENDPOINT: &str = "http://0.0.0.0:8000/predict";

#[derive(Error, Debug)]
pub enum TransportError {
  #[error("Request failed: {0}")]
  Transport(String),
  #[error("Prediction service returned status {status}: {body}")]
  Status { status: u16, body: String },
  #[error("Malformed prediction: {0}")]
  Decode(String),
}

/// 将单个任务发送给预测服务
pub trait PredictTransport: Send + Sync {
  fn send(&self, payload: &Value) -> Result<PredictionResponse, TransportError>;
}

pub struct HttpTransport {
  agent: ureq::Agent,
  endpoint: String,
}

impl HttpTransport {
  pub fn new(endpoint: impl Into<String>) -> Self {
    HttpTransport {
      agent: ureq::Agent::new(),
      endpoint: endpoint.into(),
    }
  }
}

impl PredictTransport for HttpTransport {
  fn send(&self, payload: &Value) -> Result<PredictionResponse, TransportError> {
    match self.agent.post(&self.endpoint).send_json(payload) {
      Ok(response) if response.status() == 200 => response
        .into_json::<PredictionResponse>()
        .map_err(|e| TransportError::Decode(e.to_string())),
      Ok(response) => {
        let status = response.status();
        Err(TransportError::Status {
          status,
          body: response.into_string().unwrap_or_default(),
        })
      }
      Err(ureq::Error::Status(status, response)) => Err(TransportError::Status {
        status,
        body: response.into_string().unwrap_or_default(),
      }),
      Err(ureq::Error::Transport(transport)) => Err(TransportError::Transport(transport.to_string())),
    }
  }
}

pub struct BackendAdapter {
  transport: Box<dyn PredictTransport>,
}

impl BackendAdapter {
  pub fn new<T: PredictTransport + 'static>(transport: T) -> Self {
    BackendAdapter {
      transport: Box::new(transport),
    }
  }

  /// 逐个转发任务；失败的任务只记录日志并跳过，输出可能比输入短
  pub fn predict(&self, tasks: &[Value]) -> Vec<PredictionResponse> {
    let mut predictions = Vec::with_capacity(tasks.len());

    for task in tasks {
      let project = task.get("project").cloned().unwrap_or(Value::Null);
      let payload = json!({ "task": task, "project": project });

      match self.transport.send(&payload) {
        Ok(prediction) => predictions.push(prediction),
        Err(e) => {
          let id = task.get("id").unwrap_or(&Value::Null);
          error!("任务 {} 预测失败: {}", id, e);
        }
      }
    }

    debug!("预测完成: {}/{}", predictions.len(), tasks.len());
    predictions
  }
}

mod server;
pub use self::server::{BackendState, router, serve};
