// 该文件是 Xuetu （血涂） 项目的一部分。
// src/config.rs - 配置
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
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregate::ParasitemiaThresholds;
use crate::counting::{ClassMapping, CountMode};

/// 内置默认配置
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// 覆盖模型目录的环境变量
pub const MODEL_DIR_ENV: &str = "XUETU_MODEL_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("模型 {model} 的类别编号无效: {id}")]
  InvalidClassId { model: String, id: String },
  #[error("置信度阈值必须在 0 到 1 之间: {0}")]
  InvalidConfidence(f32),
  #[error("必须且只能有一个默认放大倍数，当前为 {0} 个")]
  DefaultMagnification(usize),
  #[error("未知的放大倍数 '{preset}'，可用: {available:?}")]
  UnknownMagnification { preset: String, available: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
  pub file: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub count_mode: CountMode,
  /// TOML 的键只能是字符串，加载时再解析为编号
  pub classes: BTreeMap<String, String>,
}

impl ModelConfig {
  pub fn class_mapping(&self, model: &str) -> Result<ClassMapping, ConfigError> {
    self
      .classes
      .iter()
      .map(|(id, name)| {
        id.trim()
          .parse::<u32>()
          .map(|id| (id, name.clone()))
          .map_err(|_| ConfigError::InvalidClassId {
            model: model.to_string(),
            id: id.clone(),
          })
      })
      .collect()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagnificationPreset {
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub conversion_factor: u32,
  #[serde(default)]
  pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
  #[serde(default = "default_model_dir")]
  pub model_dir: PathBuf,
  #[serde(default = "default_confidence")]
  pub confidence_threshold: f32,
  #[serde(default = "default_max_image_size")]
  pub max_image_size: u32,
  #[serde(default)]
  pub font: Option<PathBuf>,
  #[serde(default)]
  pub visible_models: Vec<String>,
  #[serde(default)]
  pub models: BTreeMap<String, ModelConfig>,
  #[serde(default)]
  pub magnifications: BTreeMap<String, MagnificationPreset>,
  #[serde(default)]
  pub malaria: ParasitemiaThresholds,
}

fn default_model_dir() -> PathBuf {
  PathBuf::from(".")
}

fn default_confidence() -> f32 {
  0.3
}

fn default_max_image_size() -> u32 {
  2048
}

impl Default for AppConfig {
  fn default() -> Self {
    // 内置配置由测试保证可以解析
    Self::from_toml(DEFAULT_CONFIG).unwrap_or_else(|e| panic!("内置配置无效: {}", e))
  }
}

impl AppConfig {
  pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// 读取配置文件（未指定时使用内置配置），再应用环境变量覆盖
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => {
        info!("读取配置文件: {}", path.display());
        Self::from_toml(&std::fs::read_to_string(path)?)?
      }
      None => Self::from_toml(DEFAULT_CONFIG)?,
    };

    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV) {
      debug!("{} 覆盖模型目录: {:?}", MODEL_DIR_ENV, dir);
      config.model_dir = PathBuf::from(dir);
    }

    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::InvalidConfidence(self.confidence_threshold));
    }

    for (key, model) in &self.models {
      model.class_mapping(key)?;
    }

    if !self.magnifications.is_empty() {
      let defaults = self.magnifications.values().filter(|m| m.is_default).count();
      if defaults != 1 {
        return Err(ConfigError::DefaultMagnification(defaults));
      }
    }

    Ok(())
  }

  pub fn model_path(&self, model: &ModelConfig) -> PathBuf {
    self.model_dir.join(&model.file)
  }

  pub fn default_magnification(&self) -> Option<(&str, &MagnificationPreset)> {
    self
      .magnifications
      .iter()
      .find(|(_, preset)| preset.is_default)
      .map(|(key, preset)| (key.as_str(), preset))
  }

  /// 根据放大倍数取换算系数，未指定时使用默认倍数
  pub fn conversion_factor(&self, preset: Option<&str>) -> Result<u32, ConfigError> {
    let found = match preset {
      Some(key) => self.magnifications.get(key),
      None => self.default_magnification().map(|(_, preset)| preset),
    };

    match (found, preset) {
      (Some(preset), _) => Ok(preset.conversion_factor),
      (None, None) => Ok(crate::aggregate::DEFAULT_CONVERSION_FACTOR),
      (None, Some(key)) => Err(ConfigError::UnknownMagnification {
        preset: key.to_string(),
        available: self.magnifications.keys().cloned().collect(),
      }),
    }
  }
}
