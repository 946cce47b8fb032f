// 该文件是 Xuetu （血涂） 项目的一部分。
// src/aggregate.rs - 多图像血小板汇总与临床分级
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

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::counting::Counts;

/// 100x 油镜（总放大 1000x）的临床标准换算系数
pub const DEFAULT_CONVERSION_FACTOR: u32 = 15000;

/// 参与汇总的类别
pub const PLATELET_CLASS: &str = "Platelet";

const NORMAL_MIN: f64 = 150_000.0;
const MILD_MIN: f64 = 50_000.0;
const MODERATE_MIN: f64 = 20_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
  pub total_detections: usize,
  pub images_count: usize,
  pub avg_platelets_per_image: f64,
  pub platelets_per_ul: f64,
}

/// 汇总多张图像的血小板检测数并换算为 血小板/µL
///
/// 没有任何计数时返回全零结果而非错误，“尚无图像”是会话的正常中间状态。
pub fn aggregate(
  individual_counts: &[Counts],
  image_count_override: Option<usize>,
  conversion_factor: u32,
) -> AggregationResult {
  if individual_counts.is_empty() {
    warn!("没有可汇总的检测计数");
    return AggregationResult::default();
  }

  let images_count = image_count_override.unwrap_or(individual_counts.len());
  let total_detections: usize = individual_counts
    .iter()
    .map(|counts| counts.get(PLATELET_CLASS))
    .sum();

  let avg = if images_count > 0 {
    total_detections as f64 / images_count as f64
  } else {
    0.0
  };
  let platelets_per_ul = avg * conversion_factor as f64;

  info!(
    "血小板汇总 - 图像数: {}, 检测总数: {}, 平均每图: {:.2}, 系数: {}, 血小板/µL: {:.0}",
    images_count, total_detections, avg, conversion_factor, platelets_per_ul
  );

  AggregationResult {
    total_detections,
    images_count,
    avg_platelets_per_image: round_to(avg, 2),
    platelets_per_ul: round_to(platelets_per_ul, 0),
  }
}

/// 按指定小数位四舍五入（银行家舍入）
fn round_to(value: f64, decimals: i32) -> f64 {
  let factor = 10f64.powi(decimals);
  (value * factor).round_ties_even() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Normal,
  Mild,
  Moderate,
  Severe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInterpretation {
  pub status: String,
  pub risk_level: String,
  pub range: String,
  pub interpretation: String,
  pub severity: Severity,
}

/// 按血小板浓度进行登革热风险分级，各区间下界闭合
pub fn classify(platelets_per_ul: f64) -> ClinicalInterpretation {
  let (severity, status, risk_level, range, interpretation) = if platelets_per_ul >= NORMAL_MIN {
    (
      Severity::Normal,
      "Normal",
      "No Risk",
      "≥150,000/µL",
      "Platelet count is within the normal range. No thrombocytopenia detected.",
    )
  } else if platelets_per_ul >= MILD_MIN {
    (
      Severity::Mild,
      "Mild Thrombocytopenia",
      "Low Risk",
      "50,000-149,999/µL",
      "Mildly reduced platelet count. Monitor platelet trend and clinical signs.",
    )
  } else if platelets_per_ul >= MODERATE_MIN {
    (
      Severity::Moderate,
      "Moderate Thrombocytopenia",
      "Medium Risk",
      "20,000-49,999/µL",
      "Moderately reduced platelet count. Close monitoring for bleeding and warning signs is advised.",
    )
  } else {
    (
      Severity::Severe,
      "Severe Thrombocytopenia",
      "High Risk",
      "<20,000/µL",
      "Severely reduced platelet count with high bleeding risk. Urgent clinical evaluation is required.",
    )
  };

  ClinicalInterpretation {
    status: status.to_string(),
    risk_level: risk_level.to_string(),
    range: range.to_string(),
    interpretation: interpretation.to_string(),
    severity,
  }
}

/// 疟原虫计数分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParasitemiaLevel {
  Negative,
  Low,
  Moderate,
  High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParasitemiaThresholds {
  pub parasite_classes: Vec<String>,
  /// 不超过该值为低度
  pub low_max: usize,
  /// 不超过该值为中度，超过为重度
  pub moderate_max: usize,
}

impl Default for ParasitemiaThresholds {
  fn default() -> Self {
    Self {
      parasite_classes: ["Trophozoite", "Ring", "Schizont", "Gametocyte"]
        .map(String::from)
        .to_vec(),
      low_max: 10,
      moderate_max: 50,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParasitemiaAssessment {
  pub parasite_count: usize,
  pub level: ParasitemiaLevel,
}

/// 统计单张图像中的疟原虫（不含红细胞、白细胞等血细胞类别）并分级
pub fn assess_parasitemia(counts: &Counts, thresholds: &ParasitemiaThresholds) -> ParasitemiaAssessment {
  let parasite_count = thresholds
    .parasite_classes
    .iter()
    .map(|name| counts.get(name))
    .sum();

  let level = match parasite_count {
    0 => ParasitemiaLevel::Negative,
    n if n <= thresholds.low_max => ParasitemiaLevel::Low,
    n if n <= thresholds.moderate_max => ParasitemiaLevel::Moderate,
    _ => ParasitemiaLevel::High,
  };

  ParasitemiaAssessment {
    parasite_count,
    level,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn platelets(values: &[usize]) -> Vec<Counts> {
    values
      .iter()
      .map(|&n| Counts::from_iter([(PLATELET_CLASS, n)]))
      .collect()
  }

  #[test]
  fn empty_input_yields_zero_result() {
    let result = aggregate(&[], None, DEFAULT_CONVERSION_FACTOR);
    assert_eq!(result, AggregationResult::default());
    assert_eq!(aggregate(&[], Some(4), 20000), AggregationResult::default());
  }

  #[test]
  fn three_images_normal_count() {
    let result = aggregate(&platelets(&[10, 20, 30]), None, DEFAULT_CONVERSION_FACTOR);
    assert_eq!(result.total_detections, 60);
    assert_eq!(result.images_count, 3);
    assert_eq!(result.avg_platelets_per_image, 20.0);
    assert_eq!(result.platelets_per_ul, 300000.0);
    assert_eq!(classify(result.platelets_per_ul).severity, Severity::Normal);
  }

  #[test]
  fn single_low_image_is_severe() {
    let result = aggregate(&platelets(&[1]), None, DEFAULT_CONVERSION_FACTOR);
    assert_eq!(result.avg_platelets_per_image, 1.0);
    assert_eq!(result.platelets_per_ul, 15000.0);
    assert_eq!(classify(result.platelets_per_ul).severity, Severity::Severe);
  }

  #[test]
  fn order_does_not_matter() {
    let forward = aggregate(&platelets(&[3, 8, 13, 1]), None, 20000);
    let backward = aggregate(&platelets(&[1, 13, 8, 3]), None, 20000);
    let shuffled = aggregate(&platelets(&[8, 1, 3, 13]), None, 20000);
    assert_eq!(forward, backward);
    assert_eq!(forward, shuffled);
  }

  #[test]
  fn missing_platelet_key_contributes_zero() {
    let counts = vec![
      Counts::from_iter([("Total", 40)]),
      Counts::from_iter([(PLATELET_CLASS, 6), ("RBC", 300)]),
    ];
    let result = aggregate(&counts, None, 3750);
    assert_eq!(result.total_detections, 6);
    assert_eq!(result.avg_platelets_per_image, 3.0);
    assert_eq!(result.platelets_per_ul, 11250.0);
  }

  #[test]
  fn override_changes_denominator() {
    let result = aggregate(&platelets(&[10, 10]), Some(3), DEFAULT_CONVERSION_FACTOR);
    assert_eq!(result.images_count, 3);
    assert_eq!(result.avg_platelets_per_image, 6.67);
    // 使用未舍入的平均值换算
    assert_eq!(result.platelets_per_ul, 100000.0);

    let zero = aggregate(&platelets(&[10]), Some(0), DEFAULT_CONVERSION_FACTOR);
    assert_eq!(zero.avg_platelets_per_image, 0.0);
    assert_eq!(zero.platelets_per_ul, 0.0);
  }

  #[test]
  fn repeated_calls_are_identical() {
    let counts = platelets(&[7, 9, 4]);
    assert_eq!(
      aggregate(&counts, None, DEFAULT_CONVERSION_FACTOR),
      aggregate(&counts, None, DEFAULT_CONVERSION_FACTOR)
    );
  }

  #[test]
  fn classification_boundaries_are_exact() {
    assert_eq!(classify(150000.0).severity, Severity::Normal);
    assert_eq!(classify(149999.99).severity, Severity::Mild);
    assert_eq!(classify(50000.0).severity, Severity::Mild);
    assert_eq!(classify(49999.99).severity, Severity::Moderate);
    assert_eq!(classify(20000.0).severity, Severity::Moderate);
    assert_eq!(classify(19999.99).severity, Severity::Severe);
    assert_eq!(classify(0.0).severity, Severity::Severe);
  }

  #[test]
  fn risk_levels_follow_severity() {
    assert_eq!(classify(200000.0).risk_level, "No Risk");
    assert_eq!(classify(100000.0).risk_level, "Low Risk");
    assert_eq!(classify(30000.0).risk_level, "Medium Risk");
    assert_eq!(classify(5000.0).risk_level, "High Risk");
  }

  #[test]
  fn parasitemia_levels() {
    let thresholds = ParasitemiaThresholds::default();
    let assess = |pairs: &[(&str, usize)]| {
      assess_parasitemia(&pairs.iter().copied().collect(), &thresholds)
    };

    assert_eq!(assess(&[("Red Blood Cell", 120)]).level, ParasitemiaLevel::Negative);
    let low = assess(&[("Ring", 4), ("Trophozoite", 6), ("Leukocyte", 3)]);
    assert_eq!(low.parasite_count, 10);
    assert_eq!(low.level, ParasitemiaLevel::Low);
    assert_eq!(assess(&[("Schizont", 11)]).level, ParasitemiaLevel::Moderate);
    assert_eq!(assess(&[("Gametocyte", 50)]).level, ParasitemiaLevel::Moderate);
    assert_eq!(assess(&[("Trophozoite", 51)]).level, ParasitemiaLevel::High);
  }
}
