// 该文件是 Xuetu （血涂） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 模型
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

use std::path::PathBuf;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array4;
use ort::{session::Session, value::Tensor};
use tracing::{debug, info, warn};

use crate::model::{
  DetectResult, LabelTable, Model, ModelError,
  frame::{Letterbox, LetterboxFrame},
  postprocess::{decode_yolov8, parse_names},
};

const YOLOV8_INPUT_SIZE: u32 = 640;
const YOLOV8_IOU_THRESH: f32 = 0.45;
const YOLOV8_OUTPUT_NAMES: [&str; 2] = ["output0", "output"];

pub struct Yolov8 {
  session: Mutex<Session>,
  input_size: u32,
  iou_threshold: f32,
  labels: LabelTable,
  class_count: Option<usize>,
}

pub struct Yolov8Builder {
  model_path: PathBuf,
  input_size: u32,
  iou_threshold: f32,
  class_count: Option<usize>,
}

impl Yolov8Builder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: YOLOV8_INPUT_SIZE,
      iou_threshold: YOLOV8_IOU_THRESH,
      class_count: None,
    }
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  /// 模型未携带类别表时用于判断输出布局
  pub fn class_count(mut self, class_count: usize) -> Self {
    self.class_count = (class_count > 0).then_some(class_count);
    self
  }

  pub fn build(self) -> Result<Yolov8, ModelError> {
    if self.input_size == 0 {
      return Err(ModelError::ModelLoadError("模型输入尺寸必须大于 0".to_string()));
    }
    if !self.model_path.exists() {
      return Err(ModelError::ModelNotFound(
        self.model_path.display().to_string(),
      ));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let session = Session::builder()
      .and_then(|builder| builder.commit_from_file(&self.model_path))
      .map_err(|e| ModelError::ModelLoadError(e.to_string()))?;

    let labels = session
      .metadata()
      .ok()
      .and_then(|meta| meta.custom("names").ok().flatten())
      .map(|names| parse_names(&names))
      .unwrap_or_default();

    if labels.is_empty() {
      warn!("模型未携带类别表，将按类别编号对齐");
    } else {
      debug!("模型类别表: {:?}", labels);
    }
    info!("模型加载完成");

    let class_count = if labels.is_empty() {
      self.class_count
    } else {
      Some(labels.len())
    };

    Ok(Yolov8 {
      session: Mutex::new(session),
      input_size: self.input_size,
      iou_threshold: self.iou_threshold,
      class_count,
      labels,
    })
  }
}

impl Yolov8 {
  fn run(&self, frame: LetterboxFrame) -> Result<(Vec<usize>, Vec<f32>, Letterbox), ModelError> {
    let (c, h, w) = (frame.channels(), frame.height(), frame.width());
    let (data, letterbox) = frame.into_parts();
    let array = Array4::from_shape_vec((1, c, h, w), data)
      .map_err(|e| ModelError::RuntimeError(e.to_string()))?;
    let input = Tensor::from_array(array)?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| ModelError::RuntimeError("推理会话锁已损坏".to_string()))?;
    let outputs = session.run(ort::inputs![input])?;

    let output = YOLOV8_OUTPUT_NAMES
      .iter()
      .find_map(|name| outputs.get(*name))
      .ok_or_else(|| ModelError::RuntimeError("模型缺少输出节点".to_string()))?;
    let (shape, data) = output.try_extract_tensor::<f32>()?;
    let shape = shape.iter().map(|&d| d.max(0) as usize).collect();

    Ok((shape, data.to_vec(), letterbox))
  }
}

impl Model for Yolov8 {
  fn infer(&self, image: &RgbImage, confidence: f32) -> Result<DetectResult, ModelError> {
    let frame = LetterboxFrame::from_image(image, self.input_size, self.input_size);

    debug!("执行模型推理");
    let (shape, data, letterbox) = self.run(frame)?;
    debug!("模型输出形状: {:?}", shape);

    let items = decode_yolov8(
      &data,
      &shape,
      self.class_count,
      confidence,
      self.iou_threshold,
      &letterbox,
    )?;
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::new(items, self.labels.clone()))
  }
}
