// 该文件是 Biaozhu （标注） 项目的一部分。
// tests/common/mod.rs - 测试公共工具
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

#![allow(dead_code)]

use std::{net::SocketAddr, path::Path, path::PathBuf, sync::Arc};

use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

use biaozhu::{
  fetch::ImageFetcher,
  model::{Detection, Detector, DetectorError, DetectorLoader},
  registry::{ModelConfig, ModelRegistry},
  service::PredictionService,
  storage::{ObjectStore, StorageError},
};

pub const BACKGROUND_LABEL: &str = "background";

/// 对任意图像返回相同的检测结果
pub struct StubDetector(pub Vec<Detection>);

impl Detector for StubDetector {
  fn infer(&self, image: &Path) -> Result<Vec<Detection>, DetectorError> {
    assert!(image.exists());
    Ok(self.0.clone())
  }

  fn label(&self, class_id: usize) -> Option<String> {
    (class_id == 0).then(|| "car".to_string())
  }
}

pub struct StubLoader(pub Vec<Detection>);

impl DetectorLoader for StubLoader {
  fn load(&self, _weights: &Path) -> Result<Arc<dyn Detector>, DetectorError> {
    Ok(Arc::new(StubDetector(self.0.clone())))
  }
}

pub struct NoStore;

impl ObjectStore for NoStore {
  fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
    Err(StorageError::Backend(format!("no object `{bucket}/{key}`")))
  }
}

pub fn detection(score: f32, class_id: usize) -> Detection {
  Detection {
    x: 0.5,
    y: 0.5,
    width: 0.2,
    height: 0.4,
    score,
    class_id,
  }
}

/// 只注册项目 1 的预测服务
pub fn prediction_service(detections: Vec<Detection>) -> Arc<PredictionService> {
  let configs = [ModelConfig {
    weights: PathBuf::from("weights/best.onnx"),
    model_version: "yolov5-test".to_string(),
    projects: vec![1],
  }];
  let registry = ModelRegistry::from_configs(&configs, &StubLoader(detections)).unwrap();
  let fetcher = ImageFetcher::new(Arc::new(NoStore), None);
  Arc::new(PredictionService::new(Arc::new(registry), fetcher, BACKGROUND_LABEL))
}

pub async fn spawn(router: Router) -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, router).await.unwrap();
  });
  addr
}

pub async fn post_json(url: String, body: Value) -> (u16, Value) {
  tokio::task::spawn_blocking(move || match ureq::post(&url).send_json(body) {
    Ok(response) => (response.status(), response.into_json().unwrap()),
    Err(ureq::Error::Status(status, response)) => (status, response.into_json().unwrap()),
    Err(e) => panic!("request to {url} failed: {e}"),
  })
  .await
  .unwrap()
}

pub async fn get_json(url: String) -> (u16, Value) {
  tokio::task::spawn_blocking(move || match ureq::get(&url).call() {
    Ok(response) => (response.status(), response.into_json().unwrap()),
    Err(ureq::Error::Status(status, response)) => (status, response.into_json().unwrap()),
    Err(e) => panic!("request to {url} failed: {e}"),
  })
  .await
  .unwrap()
}
