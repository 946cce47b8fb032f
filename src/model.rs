// 该文件是 Xuetu （血涂） 项目的一部分。
// src/model.rs - 模型
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

use std::collections::BTreeMap;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

/// 检测器自带的类别表（class_id → 原始标签），可能为空
pub type LabelTable = BTreeMap<u32, String>;

/// 目标检测模型
///
/// 检测器对调用方而言是无状态的；实现内部如需串行化推理需自行加锁。
pub trait Model: Send + Sync {
  fn infer(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  pub labels: LabelTable,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>, labels: LabelTable) -> Self {
    Self {
      items: items.into_boxed_slice(),
      labels,
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  RuntimeError(String),
  #[error("模型输出形状无效: 期望 {expected}, 实际 {got}")]
  InvalidOutputShape { expected: String, got: String },
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for ModelError {
  fn from(err: ort::Error) -> Self {
    ModelError::RuntimeError(err.to_string())
  }
}

pub mod frame;
pub mod postprocess;

#[cfg(feature = "onnx")]
mod yolov8;
#[cfg(feature = "onnx")]
pub use self::yolov8::{Yolov8, Yolov8Builder};
