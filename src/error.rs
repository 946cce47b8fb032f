// 该文件是 Xuetu （血涂） 项目的一部分。
// src/error.rs - 处理流程错误
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

use thiserror::Error;

use crate::config::ConfigError;
use crate::input::ImageInputError;
use crate::model::ModelError;
use crate::output::OutputError;
use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("无效的检测模式 '{mode}'，可用模式: {available:?}")]
  InvalidMode { mode: String, available: Vec<String> },
  #[error("{name} 模型不可用，请确认模型文件存在")]
  ModelUnavailable { mode: String, name: String },
  #[error("图像解码失败: {0}")]
  DecodeFailure(#[from] ImageInputError),
  #[error("推理失败: {0}")]
  InferenceFailure(#[from] ModelError),
  #[error(transparent)]
  Session(#[from] SessionError),
  #[error("未知的放大倍数 '{preset}'，可用: {available:?}")]
  InvalidMagnification { preset: String, available: Vec<String> },
  #[error("配置错误: {0}")]
  Config(ConfigError),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
}

/// 只有未知放大倍数是请求问题，其余配置错误属于服务端
impl From<ConfigError> for PipelineError {
  fn from(err: ConfigError) -> Self {
    match err {
      ConfigError::UnknownMagnification { preset, available } => {
        PipelineError::InvalidMagnification { preset, available }
      }
      other => PipelineError::Config(other),
    }
  }
}

impl PipelineError {
  /// 调用方修正请求即可解决的错误
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      PipelineError::InvalidMode { .. }
        | PipelineError::DecodeFailure(_)
        | PipelineError::Session(_)
        | PipelineError::InvalidMagnification { .. }
    )
  }

  /// 对应的 HTTP 状态码，供传输层映射
  pub fn status_code(&self) -> u16 {
    match self {
      PipelineError::InvalidMode { .. } | PipelineError::InvalidMagnification { .. } => 400,
      PipelineError::DecodeFailure(_) => 422,
      PipelineError::Session(SessionError::NotFound(_)) => 404,
      PipelineError::Session(_) => 400,
      PipelineError::ModelUnavailable { .. } => 503,
      PipelineError::InferenceFailure(_) | PipelineError::Config(_) | PipelineError::Output(_) => 500,
    }
  }
}
