// 该文件是 Xuetu （血涂） 项目的一部分。
// src/counting.rs - 类别对齐与检测计数
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

use serde::{Deserialize, Serialize};

use crate::model::{DetectResult, LabelTable};

/// 配置中的类别映射（class_id → 显示名称）
pub type ClassMapping = BTreeMap<u32, String>;

/// 总数模式下多类别模型使用的键
pub const TOTAL_KEY: &str = "Total";

/// 计数模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
  #[default]
  PerClass,
  Total,
  /// 未知模式按逐类计数处理
  #[serde(other)]
  Unrecognized,
}

/// 每张图像的计数结果（显示名称 → 数量）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counts(BTreeMap<String, usize>);

impl Counts {
  pub fn new() -> Self {
    Self::default()
  }

  /// 缺失的键视为 0
  pub fn get(&self, name: &str) -> usize {
    self.0.get(name).copied().unwrap_or(0)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  pub fn increment(&mut self, name: &str) {
    *self.0.entry(name.to_string()).or_insert(0) += 1;
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<K: Into<String>> FromIterator<(K, usize)> for Counts {
  fn from_iter<I: IntoIterator<Item = (K, usize)>>(iter: I) -> Self {
    Counts(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
  }
}

/// 单个检测框的类别对齐结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled<'a> {
  /// 原始标签与映射中的显示名称（忽略大小写）一致
  NameMatch(&'a str),
  /// 按类别编号直接命中映射
  IdMatch(&'a str),
  /// 映射中不存在，按原始标签生成新的显示名称
  Fallback(String),
}

impl Reconciled<'_> {
  pub fn name(&self) -> &str {
    match self {
      Reconciled::NameMatch(name) | Reconciled::IdMatch(name) => *name,
      Reconciled::Fallback(name) => name.as_str(),
    }
  }
}

/// 将检测器的原始类别对齐到配置的显示名称
///
/// 不同训练批次的同一模型可能使用不同的标签字符串，因此依次尝试：
/// 名称匹配、编号匹配，最后退回到原始标签的标题化形式。
pub fn reconcile<'a>(class_id: u32, labels: &LabelTable, mapping: &'a ClassMapping) -> Reconciled<'a> {
  let native = labels.get(&class_id);

  if let Some(native) = native {
    let normalized = native.to_lowercase().replace('_', " ");
    if let Some(name) = mapping.values().find(|name| name.to_lowercase() == normalized) {
      return Reconciled::NameMatch(name);
    }
  }

  if let Some(name) = mapping.get(&class_id) {
    return Reconciled::IdMatch(name);
  }

  match native {
    Some(native) => Reconciled::Fallback(title_case(&native.replace('_', " "))),
    None => Reconciled::Fallback(format!("Class {}", class_id)),
  }
}

/// 每段有大小写之分的字符首字母大写，其余小写；汉字等无大小写字符视为分隔
fn title_case(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut prev_cased = false;
  for c in text.chars() {
    if c.is_lowercase() || c.is_uppercase() {
      if prev_cased {
        out.extend(c.to_lowercase());
      } else {
        out.extend(c.to_uppercase());
      }
      prev_cased = true;
    } else {
      out.push(c);
      prev_cased = false;
    }
  }
  out
}

/// 按计数模式汇总一张图像的检测结果
pub fn count(result: &DetectResult, mapping: &ClassMapping, mode: CountMode) -> Counts {
  match mode {
    CountMode::Total => {
      let name = match mapping.values().next() {
        Some(name) if mapping.len() == 1 => name.as_str(),
        _ => TOTAL_KEY,
      };
      Counts::from_iter([(name, result.len())])
    }
    CountMode::PerClass | CountMode::Unrecognized => {
      let mut counts: Counts = mapping.values().map(|name| (name.as_str(), 0)).collect();
      for item in result.items.iter() {
        counts.increment(reconcile(item.class_id, &result.labels, mapping).name());
      }
      counts
    }
  }
}
