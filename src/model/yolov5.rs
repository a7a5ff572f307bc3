// 该文件是 Biaozhu （标注） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 ONNX 检测器
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

use std::{cmp::Ordering, collections::HashMap, path::Path, sync::Arc};

use image::{ImageReader, Rgb, RgbImage, imageops::FilterType};
use ndarray::{Array4, CowArray};
use ort::session::{
  Session,
  builder::{GraphOptimizationLevel, SessionBuilder},
};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{Detection, Detector, DetectorError, DetectorLoader};

const YOLOV5_INPUT_SIZE: u32 = 640;
const YOLOV5_PAD_VALUE: u8 = 114;
const YOLOV5_BOX_ATTRS: usize = 5;
const YOLOV5_CONF_THRESH: f32 = 0.25;
const YOLOV5_IOU_THRESH: f32 = 0.45;
const YOLOV5_MAX_DET: usize = 1000;

#[derive(Error, Debug)]
pub enum Yolov5Error {
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
  #[error("模型没有输出")]
  MissingOutput,
  #[error("输出形状无效: {0:?}")]
  InvalidShape(Vec<usize>),
}

impl From<Yolov5Error> for DetectorError {
  fn from(err: Yolov5Error) -> Self {
    DetectorError::Inference(err.to_string())
  }
}

pub struct Yolov5 {
  session: Session,
  names: HashMap<usize, String>,
  input_size: u32,
}

impl Yolov5 {
  pub fn load(weights: &Path) -> Result<Self, Yolov5Error> {
    info!("加载模型文件: {}", weights.display());
    let session = SessionBuilder::new()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_file(weights)?;

    let names = match session.metadata()?.custom("names")? {
      Some(raw) => parse_names(&raw),
      None => {
        warn!("模型元数据中没有类别名称，将使用类别索引作为标签");
        HashMap::new()
      }
    };
    debug!("模型类别数量: {}", names.len());
    info!("模型加载完成");

    Ok(Yolov5 {
      session,
      names,
      input_size: YOLOV5_INPUT_SIZE,
    })
  }

  fn forward(&self, input: &RgbImage, letterbox: &Letterbox) -> Result<Vec<Detection>, Yolov5Error> {
    let xs = CowArray::from(to_nchw(input).into_dyn());
    let inputs = ort::inputs![xs.view()]?;

    debug!("执行模型推理");
    let outputs = self.session.run(inputs)?;
    let (_, output) = outputs.iter().next().ok_or(Yolov5Error::MissingOutput)?;
    let tensor = output.try_extract_tensor::<f32>()?;

    // [1, N, 5 + 类别数]
    let shape = tensor.shape().to_vec();
    if shape.len() != 3 || shape[2] <= YOLOV5_BOX_ATTRS {
      return Err(Yolov5Error::InvalidShape(shape));
    }
    let data: Vec<f32> = tensor.iter().copied().collect();

    let candidates = decode(&data, shape[2], YOLOV5_CONF_THRESH);
    debug!("置信度过滤后候选框数量: {}", candidates.len());
    let kept = non_maximum_suppression(candidates, YOLOV5_IOU_THRESH, YOLOV5_MAX_DET);
    debug!("检测到 {} 个物体", kept.len());

    Ok(kept.iter().map(|c| letterbox.restore(c)).collect())
  }
}

impl Detector for Yolov5 {
  fn infer(&self, image: &Path) -> Result<Vec<Detection>, DetectorError> {
    let image = ImageReader::open(image)?
      .with_guessed_format()?
      .decode()?
      .to_rgb8();
    let (input, letterbox) = letterbox(&image, self.input_size);
    Ok(self.forward(&input, &letterbox)?)
  }

  fn label(&self, class_id: usize) -> Option<String> {
    self.names.get(&class_id).cloned()
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Yolov5Loader;

impl DetectorLoader for Yolov5Loader {
  fn load(&self, weights: &Path) -> Result<Arc<dyn Detector>, DetectorError> {
    let model = Yolov5::load(weights).map_err(|e| DetectorError::Load(e.to_string()))?;
    Ok(Arc::new(model))
  }
}

/// 导出的 ONNX 元数据形如 `{0: 'person', 1: 'bicycle'}`
fn parse_names(raw: &str) -> HashMap<usize, String> {
  let Ok(pattern) = Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#) else {
    return HashMap::new();
  };
  pattern
    .captures_iter(raw)
    .filter_map(|cap| {
      let id = cap[1].parse().ok()?;
      Some((id, cap[2].to_string()))
    })
    .collect()
}

/// 等比缩放并填充到正方形输入时的变换参数
#[derive(Debug, Clone, Copy)]
struct Letterbox {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
  width: f32,
  height: f32,
}

impl Letterbox {
  /// 将输入空间的 [x_min, y_min, x_max, y_max] 映射回原图，并归一化为中心点格式
  fn restore(&self, candidate: &Candidate) -> Detection {
    let [x0, y0, x1, y1] = candidate.bbox;
    let x0 = ((x0 - self.pad_x) / self.scale).clamp(0.0, self.width);
    let y0 = ((y0 - self.pad_y) / self.scale).clamp(0.0, self.height);
    let x1 = ((x1 - self.pad_x) / self.scale).clamp(0.0, self.width);
    let y1 = ((y1 - self.pad_y) / self.scale).clamp(0.0, self.height);

    Detection {
      x: (x0 + x1) / 2.0 / self.width,
      y: (y0 + y1) / 2.0 / self.height,
      width: (x1 - x0) / self.width,
      height: (y1 - y0) / self.height,
      score: candidate.score,
      class_id: candidate.class_id,
    }
  }
}

fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
  let (width, height) = image.dimensions();
  let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
  let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
  let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);
  let pad_x = (size - new_w) / 2;
  let pad_y = (size - new_h) / 2;

  let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
  let mut canvas = RgbImage::from_pixel(size, size, Rgb([YOLOV5_PAD_VALUE; 3]));
  image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

  (
    canvas,
    Letterbox {
      scale,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
      width: width as f32,
      height: height as f32,
    },
  )
}

fn to_nchw(image: &RgbImage) -> Array4<f32> {
  let (width, height) = image.dimensions();
  Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
    image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
  })
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
  bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  score: f32,
  class_id: usize,
}

fn decode(output: &[f32], num_attrs: usize, conf_thresh: f32) -> Vec<Candidate> {
  let mut candidates = Vec::new();

  for row in output.chunks_exact(num_attrs) {
    let objectness = row[4];
    if objectness <= conf_thresh {
      continue;
    }

    let (class_id, class_score) = row[YOLOV5_BOX_ATTRS..]
      .iter()
      .enumerate()
      .fold((0usize, f32::MIN), |(best_idx, best), (idx, &score)| {
        if score > best { (idx, score) } else { (best_idx, best) }
      });
    let score = objectness * class_score;
    if score <= conf_thresh {
      continue;
    }

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    candidates.push(Candidate {
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
      score,
      class_id,
    });
  }

  candidates
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = inter_w * inter_h;
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别分别做非极大值抑制，结果按置信度降序排列
fn non_maximum_suppression(
  candidates: Vec<Candidate>,
  iou_thresh: f32,
  max_det: usize,
) -> Vec<Candidate> {
  let by_score = |a: &Candidate, b: &Candidate| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal);

  let mut by_class: HashMap<usize, Vec<Candidate>> = HashMap::new();
  for candidate in candidates {
    by_class.entry(candidate.class_id).or_default().push(candidate);
  }

  let mut kept = Vec::new();
  for (_, mut group) in by_class {
    group.sort_by(by_score);
    let mut suppressed = vec![false; group.len()];
    for i in 0..group.len() {
      if suppressed[i] {
        continue;
      }
      kept.push(group[i]);
      for j in (i + 1)..group.len() {
        if !suppressed[j] && compute_iou(&group[i].bbox, &group[j].bbox) > iou_thresh {
          suppressed[j] = true;
        }
      }
    }
  }

  kept.sort_by(by_score);
  kept.truncate(max_det);
  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_metadata_is_parsed() {
    let names = parse_names("{0: 'person', 1: 'bicycle', 12: \"stop sign\"}");
    assert_eq!(names.len(), 3);
    assert_eq!(names[&0], "person");
    assert_eq!(names[&12], "stop sign");
  }

  #[test]
  fn decode_applies_objectness_and_class_score() {
    #[rustfmt::skip]
    let output = [
      100.0, 100.0, 20.0, 20.0, 0.9, 0.1, 0.8,
      50.0, 50.0, 10.0, 10.0, 0.1, 0.9, 0.9,
      10.0, 10.0, 4.0, 4.0, 0.5, 0.3, 0.2,
    ];
    let candidates = decode(&output, 7, YOLOV5_CONF_THRESH);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 1);
    assert!((candidates[0].score - 0.72).abs() < 1e-6);
    assert_eq!(candidates[0].bbox, [90.0, 90.0, 110.0, 110.0]);
  }

  #[test]
  fn nms_suppresses_only_within_class() {
    let candidates = vec![
      Candidate { bbox: [0.0, 0.0, 10.0, 10.0], score: 0.6, class_id: 0 },
      Candidate { bbox: [1.0, 1.0, 11.0, 11.0], score: 0.9, class_id: 0 },
      Candidate { bbox: [0.0, 0.0, 10.0, 10.0], score: 0.7, class_id: 1 },
    ];
    let kept = non_maximum_suppression(candidates, YOLOV5_IOU_THRESH, YOLOV5_MAX_DET);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[1].class_id, 1);
  }

  #[test]
  fn letterbox_restores_normalized_boxes() {
    let image = RgbImage::new(1280, 640);
    let (input, letterbox) = letterbox(&image, YOLOV5_INPUT_SIZE);
    assert_eq!(input.dimensions(), (640, 640));
    assert_eq!(letterbox.pad_y, 160.0);

    let candidate = Candidate {
      bbox: [288.0, 304.0, 352.0, 336.0],
      score: 0.5,
      class_id: 3,
    };
    let detection = letterbox.restore(&candidate);
    assert!((detection.x - 0.5).abs() < 1e-5);
    assert!((detection.y - 0.5).abs() < 1e-5);
    assert!((detection.width - 0.1).abs() < 1e-5);
    assert!((detection.height - 0.1).abs() < 1e-5);
    assert_eq!(detection.class_id, 3);
  }
}
