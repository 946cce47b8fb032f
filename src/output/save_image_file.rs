// 该文件是 Xuetu （血涂） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像
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

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use super::OutputError;

/// 将已编码的 PNG 写入文件，必要时创建父目录
pub fn save_png(path: impl AsRef<Path>, png: &[u8]) -> Result<(), OutputError> {
  let path = path.as_ref();
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  std::fs::write(path, png)?;
  info!("保存标注图像到文件: {}", path.display());
  Ok(())
}

/// 标注图像文件名：原文件名 + 可选图像序号 + UTC 时间戳
///
/// 同一批次中的图像可能同名（来自不同目录），需传入序号区分。
pub fn annotated_path(dir: &Path, source: &Path, number: Option<usize>) -> PathBuf {
  let stem = source
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "image".to_string());
  let stem = match number {
    Some(n) => format!("{}_{}", stem, n),
    None => stem,
  };
  dir.join(format!(
    "{}_annotated_{}.png",
    stem,
    Utc::now().format("%Y%m%d%H%M%S")
  ))
}
