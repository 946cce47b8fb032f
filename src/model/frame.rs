// 该文件是 Xuetu （血涂） 项目的一部分。
// src/model/frame.rs - 模型输入帧（letterbox NCHW）
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;
const PAD_VALUE: f32 = 114.0 / 255.0;

/// letterbox 变换参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub orig_w: u32,
  pub orig_h: u32,
}

impl Letterbox {
  /// 将模型输入坐标系下的 xyxy 框映射回原图的归一化坐标
  pub fn to_original(&self, bbox: [f32; 4]) -> [f32; 4] {
    let w = self.orig_w.max(1) as f32;
    let h = self.orig_h.max(1) as f32;
    let map_x = |x: f32| ((x - self.pad_x) / self.scale).clamp(0.0, w) / w;
    let map_y = |y: f32| ((y - self.pad_y) / self.scale).clamp(0.0, h) / h;
    [map_x(bbox[0]), map_y(bbox[1]), map_x(bbox[2]), map_y(bbox[3])]
  }
}

/// 等比缩放并居中填充后的 NCHW 浮点帧
#[derive(Debug, Clone)]
pub struct LetterboxFrame {
  data: Box<[f32]>,
  width: u32,
  height: u32,
  pub letterbox: Letterbox,
}

impl LetterboxFrame {
  pub fn from_image(image: &RgbImage, width: u32, height: u32) -> Self {
    let (orig_w, orig_h) = image.dimensions();
    let scale = (width as f32 / orig_w.max(1) as f32).min(height as f32 / orig_h.max(1) as f32);

    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, width);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, height);
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let pad_x = (width - new_w) as f32 / 2.0;
    let pad_y = (height - new_h) as f32 / 2.0;
    let offset_x = pad_x.floor() as usize;
    let offset_y = pad_y.floor() as usize;

    let plane = (width * height) as usize;
    let mut data = vec![PAD_VALUE; RGB_CHANNELS * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (offset_y + y as usize) * width as usize + offset_x + x as usize;
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    Self {
      data: data.into_boxed_slice(),
      width,
      height,
      letterbox: Letterbox {
        scale,
        pad_x,
        pad_y,
        orig_w,
        orig_h,
      },
    }
  }

  pub fn width(&self) -> usize {
    self.width as usize
  }

  pub fn height(&self) -> usize {
    self.height as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  pub fn into_parts(self) -> (Vec<f32>, Letterbox) {
    (self.data.into_vec(), self.letterbox)
  }
}
