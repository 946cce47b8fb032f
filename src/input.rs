// 该文件是 Xuetu （血涂） 项目的一部分。
// src/input.rs - 图像输入
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

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

mod read_image_file;
pub use self::read_image_file::read_image_file;

#[derive(Error, Debug)]
pub enum ImageInputError {
  #[error("图像数据为空")]
  Empty,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 解码内存中的图像并转换为 RGB
///
/// 长边超过 `max_dimension` 时按比例缩小，`max_dimension` 为 0 表示不限制。
pub fn decode_image(bytes: &[u8], max_dimension: u32) -> Result<RgbImage, ImageInputError> {
  if bytes.is_empty() {
    return Err(ImageInputError::Empty);
  }

  let image = ImageReader::new(Cursor::new(bytes))
    .with_guessed_format()?
    .decode()?;

  let (width, height) = (image.width(), image.height());
  let image = if max_dimension > 0 && width.max(height) > max_dimension {
    let resized = image.resize(max_dimension, max_dimension, FilterType::Triangle);
    debug!(
      "图像 {}x{} 超过上限 {}，缩放为 {}x{}",
      width,
      height,
      max_dimension,
      resized.width(),
      resized.height()
    );
    resized
  } else {
    image
  };

  Ok(image.to_rgb8())
}
