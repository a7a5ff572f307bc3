// 该文件是 Biaozhu （标注） 项目的一部分。
// tests/backend_adapter.rs - ML 后端适配器测试
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

mod common;

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::post};
use serde_json::{Value, json};

use biaozhu::backend::{BackendAdapter, BackendState, HttpTransport};
use common::{get_json, post_json, spawn};

/// id 为 2 的任务返回 500，其余任务返回带 id 的选项
async fn fake_prediction_service() -> std::net::SocketAddr {
  async fn predict(Json(body): Json<Value>) -> impl IntoResponse {
    let id = body["task"]["id"].as_u64().unwrap_or_default();
    if id == 2 {
      return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": "boom" })));
    }
    (
      StatusCode::OK,
      Json(json!({
        "result": [{
          "type": "choices",
          "value": { "choices": [id.to_string()] },
          "to_name": "is_excluded",
          "from_name": "is_excluded"
        }]
      })),
    )
  }
  spawn(Router::new().route("/predict", post(predict))).await
}

fn tasks() -> Vec<Value> {
  (1..=3)
    .map(|id| json!({ "id": id, "project": 1, "data": { "image": "bucket/a.jpg" } }))
    .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn non_200_tasks_are_skipped_in_order() {
  let upstream = fake_prediction_service().await;
  let adapter = BackendAdapter::new(HttpTransport::new(format!("http://{upstream}/predict")));

  let predictions = tokio::task::spawn_blocking(move || adapter.predict(&tasks()))
    .await
    .unwrap();

  assert_eq!(predictions.len(), 2);
  let choices: Vec<Value> = predictions
    .iter()
    .map(|p| serde_json::to_value(&p.result[0]).unwrap()["value"]["choices"][0].clone())
    .collect();
  assert_eq!(choices, vec![json!("1"), json!("3")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_service_yields_empty_batch() {
  let adapter = BackendAdapter::new(HttpTransport::new("http://127.0.0.1:1/predict"));
  let predictions = tokio::task::spawn_blocking(move || adapter.predict(&tasks()))
    .await
    .unwrap();
  assert!(predictions.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn ml_backend_protocol_is_served() {
  let upstream = fake_prediction_service().await;
  let adapter = BackendAdapter::new(HttpTransport::new(format!("http://{upstream}/predict")));
  let addr = spawn(biaozhu::backend::router(BackendState::new(adapter, "yolov5-v2"))).await;

  let (status, body) = post_json(
    format!("http://{addr}/predict"),
    json!({ "tasks": tasks(), "project": "1.1700000000", "label_config": "<View/>" }),
  )
  .await;
  assert_eq!(status, 200);
  assert_eq!(body["results"].as_array().unwrap().len(), 2);

  let (status, body) = post_json(format!("http://{addr}/setup"), json!({ "project": "1" })).await;
  assert_eq!(status, 200);
  assert_eq!(body["model_version"], "yolov5-v2");

  let (status, body) = get_json(format!("http://{addr}/health")).await;
  assert_eq!(status, 200);
  assert_eq!(body["status"], "UP");
}
