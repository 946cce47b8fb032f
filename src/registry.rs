// 该文件是 Xuetu （血涂） 项目的一部分。
// src/registry.rs - 模型注册表
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
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigError};
use crate::counting::{ClassMapping, CountMode};
use crate::error::PipelineError;
use crate::model::{Model, ModelError};

pub type DynModel = Box<dyn Model>;

#[derive(Debug, Clone)]
pub struct ModelProfile {
  pub key: String,
  pub name: String,
  pub description: String,
  pub path: PathBuf,
  pub classes: ClassMapping,
  pub count_mode: CountMode,
}

struct ModelEntry {
  profile: ModelProfile,
  model: Option<DynModel>,
}

/// 对外展示的模型信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
  pub key: String,
  pub available: bool,
  pub name: String,
  pub description: String,
  pub classes: ClassMapping,
  pub count_mode: CountMode,
}

/// 检测模式到模型及其计数配置的映射
#[derive(Default)]
pub struct ModelRegistry {
  entries: BTreeMap<String, ModelEntry>,
  visible: Vec<String>,
}

impl ModelRegistry {
  pub fn new(profiles: impl IntoIterator<Item = ModelProfile>) -> Self {
    let entries = profiles
      .into_iter()
      .map(|profile| (profile.key.clone(), ModelEntry { profile, model: None }))
      .collect();
    Self {
      entries,
      visible: Vec::new(),
    }
  }

  pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
    let profiles = config
      .models
      .iter()
      .map(|(key, model)| {
        Ok(ModelProfile {
          key: key.clone(),
          name: model.name.clone(),
          description: model.description.clone(),
          path: config.model_path(model),
          classes: model.class_mapping(key)?,
          count_mode: model.count_mode,
        })
      })
      .collect::<Result<Vec<_>, ConfigError>>()?;

    Ok(Self::new(profiles).with_visible(config.visible_models.clone()))
  }

  /// 限定 `model_info` 列出的模型，为空时列出全部
  pub fn with_visible(mut self, visible: Vec<String>) -> Self {
    self.visible = visible;
    self
  }

  /// 逐个加载模型；加载失败只记录日志，对应模式标记为不可用
  pub fn load_all<F>(&mut self, mut loader: F) -> BTreeMap<String, bool>
  where
    F: FnMut(&ModelProfile) -> Result<DynModel, ModelError>,
  {
    let mut results = BTreeMap::new();
    for (key, entry) in self.entries.iter_mut() {
      match loader(&entry.profile) {
        Ok(model) => {
          info!("✓ {} 模型加载成功", key);
          entry.model = Some(model);
        }
        Err(e) => {
          warn!("✗ {} 模型加载失败或不存在: {}", key, e);
          entry.model = None;
        }
      }
      results.insert(key.clone(), entry.model.is_some());
    }
    results
  }

  pub fn insert_model(&mut self, key: &str, model: DynModel) -> bool {
    match self.entries.get_mut(key) {
      Some(entry) => {
        entry.model = Some(model);
        true
      }
      None => false,
    }
  }

  pub fn profile(&self, key: &str) -> Option<&ModelProfile> {
    self.entries.get(key).map(|entry| &entry.profile)
  }

  pub fn is_available(&self, key: &str) -> bool {
    self
      .entries
      .get(key)
      .is_some_and(|entry| entry.model.is_some())
  }

  pub fn keys(&self) -> Vec<String> {
    self.entries.keys().cloned().collect()
  }

  pub fn available_keys(&self) -> Vec<String> {
    self
      .entries
      .iter()
      .filter(|(_, entry)| entry.model.is_some())
      .map(|(key, _)| key.clone())
      .collect()
  }

  /// 未配置的模式为 `InvalidMode`，已配置但未加载的为 `ModelUnavailable`
  pub fn resolve(&self, key: &str) -> Result<(&ModelProfile, &dyn Model), PipelineError> {
    let entry = self
      .entries
      .get(key)
      .ok_or_else(|| PipelineError::InvalidMode {
        mode: key.to_string(),
        available: self.keys(),
      })?;

    match &entry.model {
      Some(model) => Ok((&entry.profile, model.as_ref())),
      None => Err(PipelineError::ModelUnavailable {
        mode: key.to_string(),
        name: entry.profile.name.clone(),
      }),
    }
  }

  /// 每个模式的可用状态
  pub fn health(&self) -> BTreeMap<String, bool> {
    self
      .entries
      .iter()
      .map(|(key, entry)| (key.clone(), entry.model.is_some()))
      .collect()
  }

  pub fn model_info(&self) -> Vec<ModelInfo> {
    self
      .entries
      .iter()
      .filter(|(key, _)| self.visible.is_empty() || self.visible.contains(key))
      .map(|(key, entry)| ModelInfo {
        key: key.clone(),
        available: entry.model.is_some(),
        name: entry.profile.name.clone(),
        description: entry.profile.description.clone(),
        classes: entry.profile.classes.clone(),
        count_mode: entry.profile.count_mode,
      })
      .collect()
  }
}
