// 该文件是 Biaozhu （标注） 项目的一部分。
// src/model.rs - 检测模型
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

use std::{path::Path, sync::Arc};

use thiserror::Error;

/// 单个检测结果，坐标为检测器归一化后的中心点坐标系
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 中心点 x (0.0 - 1.0)
  pub x: f32,
  /// 中心点 y (0.0 - 1.0)
  pub y: f32,
  pub width: f32,
  pub height: f32,
  pub score: f32,
  pub class_id: usize,
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 目标检测能力：给定图像文件，返回归一化的检测框
pub trait Detector: Send + Sync {
  fn infer(&self, image: &Path) -> Result<Vec<Detection>, DetectorError>;

  /// 类别索引到名称的映射，未知类别返回 None
  fn label(&self, class_id: usize) -> Option<String>;
}

/// 从权重文件加载检测器
pub trait DetectorLoader {
  fn load(&self, weights: &Path) -> Result<Arc<dyn Detector>, DetectorError>;
}

#[cfg(feature = "model_yolov5")]
mod yolov5;
#[cfg(feature = "model_yolov5")]
pub use self::yolov5::{Yolov5, Yolov5Error, Yolov5Loader};
