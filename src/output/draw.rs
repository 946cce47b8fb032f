// 该文件是 Xuetu （血涂） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::info;

use super::OutputError;
use crate::counting::{ClassMapping, reconcile};
use crate::model::DetectResult;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

// 按类别编号循环取色
const PALETTE: [[u8; 3]; 8] = [
  [220, 20, 60],
  [30, 144, 255],
  [255, 165, 0],
  [50, 205, 50],
  [148, 0, 211],
  [0, 206, 209],
  [255, 20, 147],
  [139, 69, 19],
];

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: None,
    }
  }
}

impl Draw {
  /// 加载 TTF/OTF 字体后才绘制类别标签，否则只画检测框
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, OutputError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontVec::try_from_vec(data)
      .map_err(|e| OutputError::FontError(format!("{}: {}", path.display(), e)))?;
    info!("加载标注字体: {}", path.display());
    self.font = Some(font);
    Ok(self)
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn color_of(class_id: u32) -> [u8; 3] {
    PALETTE[class_id as usize % PALETTE.len()]
  }

  /// 在图像上绘制全部检测框，标签使用与计数一致的类别名
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult, mapping: &ClassMapping) {
    for item in result.items.iter() {
      let reconciled = reconcile(item.class_id, &result.labels, mapping);
      let label = format!("{} {:.2}", reconciled.name(), item.score);
      self.draw_bbox_with_label(image, &item.bbox, &label, Self::color_of(item.class_id));
    }
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &[f32; 4], label: &str, color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = ((bbox[0] * w as f32).floor() as i32).clamp(0, w - 1);
    let y_min = ((bbox[1] * h as f32).floor() as i32).clamp(0, h - 1);
    let x_max = ((bbox[2] * w as f32).ceil() as i32).clamp(0, w - 1);
    let y_max = ((bbox[3] * h as f32).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 由外向内逐层绘制，加粗边框
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }

    let Some(font) = &self.font else {
      return;
    };

    // 估算文本大小（粗略估计）
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签放在边框上方，空间不足时贴顶
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);
    let label_width = text_width.min(w - label_x);

    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width as u32, text_height as u32);
      draw_filled_rect_mut(image, rect, Rgb(color));
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
  }
}
