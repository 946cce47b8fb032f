// 该文件是 Xuetu （血涂） 项目的一部分。
// src/output.rs - 标注图像输出
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

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use thiserror::Error;

pub mod draw;
mod save_image_file;

pub use self::draw::Draw;
pub use self::save_image_file::{annotated_path, save_png};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体加载错误: {0}")]
  FontError(String),
}

/// 将标注后的图像编码为 PNG
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, OutputError> {
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png)?;
  Ok(buffer.into_inner())
}
