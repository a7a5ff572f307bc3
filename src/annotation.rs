// 该文件是 Biaozhu （标注） 项目的一部分。
// src/annotation.rs - Label Studio 标注结果格式
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

use serde::{Deserialize, Serialize};

use crate::model::{Detection, Detector};

pub const IMAGE_TO_NAME: &str = "image";
pub const LABEL_FROM_NAME: &str = "label";
pub const EXCLUDED_NAME: &str = "is_excluded";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleValue {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
  pub rectanglelabels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoicesValue {
  pub choices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationResult {
  RectangleLabels {
    score: f64,
    value: RectangleValue,
    to_name: String,
    from_name: String,
    model_version: String,
  },
  Choices {
    value: ChoicesValue,
    to_name: String,
    from_name: String,
  },
}

impl AnnotationResult {
  /// 没有检测结果时使用的“排除”选项
  pub fn excluded(label: &str) -> Self {
    AnnotationResult::Choices {
      value: ChoicesValue {
        choices: vec![label.to_string()],
      },
      to_name: EXCLUDED_NAME.to_string(),
      from_name: EXCLUDED_NAME.to_string(),
    }
  }

  pub fn score(&self) -> Option<f64> {
    match self {
      AnnotationResult::RectangleLabels { score, .. } => Some(*score),
      AnnotationResult::Choices { .. } => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
  pub result: Vec<AnnotationResult>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub score: Option<f64>,
}

impl PredictionResponse {
  /// 汇总单张图片的检测结果，总分为各检测分数的平均值
  pub fn from_detections(
    detections: &[Detection],
    detector: &dyn Detector,
    model_version: &str,
    background_label: &str,
  ) -> Self {
    let result: Vec<AnnotationResult> = detections
      .iter()
      .map(|det| to_rectangle(det, detector, model_version))
      .collect();

    if result.is_empty() {
      return PredictionResponse {
        result: vec![AnnotationResult::excluded(background_label)],
        score: None,
      };
    }

    PredictionResponse {
      score: mean_score(&result),
      result,
    }
  }
}

/// 分数已保留两位小数，按百分位整数求和后再相除，结果为精确舍入的平均值
fn mean_score(result: &[AnnotationResult]) -> Option<f64> {
  let hundredths: Vec<i64> = result
    .iter()
    .filter_map(AnnotationResult::score)
    .map(|score| (score * 100.0).round() as i64)
    .collect();

  if hundredths.is_empty() {
    return None;
  }
  let total: i64 = hundredths.iter().sum();
  Some(total as f64 / (100.0 * hundredths.len() as f64))
}

/// 中心点归一化坐标 -> 左上角百分比坐标
pub fn to_percent_geometry(det: &Detection) -> (f64, f64, f64, f64) {
  let (x, y) = (det.x as f64, det.y as f64);
  let (width, height) = (det.width as f64, det.height as f64);
  (
    (x - width / 2.0) * 100.0,
    (y - height / 2.0) * 100.0,
    width * 100.0,
    height * 100.0,
  )
}

/// 保留两位小数，恰好一半时取偶数
pub fn round_score(score: f32) -> f64 {
  (score as f64 * 100.0).round_ties_even() / 100.0
}

pub fn to_rectangle(det: &Detection, detector: &dyn Detector, model_version: &str) -> AnnotationResult {
  let (x, y, width, height) = to_percent_geometry(det);
  let label = detector
    .label(det.class_id)
    .unwrap_or_else(|| det.class_id.to_string());

  AnnotationResult::RectangleLabels {
    score: round_score(det.score),
    value: RectangleValue {
      x,
      y,
      width,
      height,
      rectanglelabels: vec![label],
    },
    to_name: IMAGE_TO_NAME.to_string(),
    from_name: LABEL_FROM_NAME.to_string(),
    model_version: model_version.to_string(),
  }
}
