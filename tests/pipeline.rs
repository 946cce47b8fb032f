// 该文件是 Xuetu （血涂） 项目的一部分。
// tests/pipeline.rs - 检测流程端到端
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

use image::{ImageFormat, Rgb, RgbImage};
use xuetu::PipelineError;
use xuetu::aggregate::{ParasitemiaLevel, Severity};
use xuetu::config::AppConfig;
use xuetu::model::{DetectItem, DetectResult, LabelTable, Model, ModelError};
use xuetu::registry::ModelRegistry;
use xuetu::session::SessionError;
use xuetu::task::{Pipeline, Processor};

/// 返回固定检测结果的模型
struct FixedModel {
  class_ids: Vec<u32>,
  labels: LabelTable,
}

impl Model for FixedModel {
  fn infer(&self, _image: &RgbImage, _confidence: f32) -> Result<DetectResult, ModelError> {
    let items = self
      .class_ids
      .iter()
      .map(|&class_id| DetectItem {
        class_id,
        score: 0.75,
        bbox: [0.25, 0.25, 0.75, 0.75],
      })
      .collect();
    Ok(DetectResult::new(items, self.labels.clone()))
  }
}

struct FailingModel;

impl Model for FailingModel {
  fn infer(&self, _image: &RgbImage, _confidence: f32) -> Result<DetectResult, ModelError> {
    Err(ModelError::RuntimeError("device lost".to_string()))
  }
}

fn png() -> Vec<u8> {
  let mut buffer = Cursor::new(Vec::new());
  RgbImage::from_pixel(64, 48, Rgb([230, 200, 210]))
    .write_to(&mut buffer, ImageFormat::Png)
    .unwrap();
  buffer.into_inner()
}

fn labels(pairs: &[(u32, &str)]) -> LabelTable {
  pairs.iter().map(|(id, name)| (*id, name.to_string())).collect()
}

fn pipeline() -> Pipeline {
  let config = AppConfig::default();
  let mut registry = ModelRegistry::from_config(&config).unwrap();

  // 检测器把血小板放在 0 号，与配置的编号不一致
  registry.insert_model(
    "dengue",
    Box::new(FixedModel {
      class_ids: vec![0, 0, 0, 1, 2],
      labels: labels(&[(0, "platelet"), (1, "rbc"), (2, "wbc")]),
    }),
  );
  registry.insert_model(
    "malaria",
    Box::new(FixedModel {
      class_ids: vec![0; 4],
      labels: labels(&[(0, "trophozoite")]),
    }),
  );
  registry.insert_model(
    "malaria_multi",
    Box::new(FixedModel {
      class_ids: vec![0, 0, 3, 3, 9],
      labels: LabelTable::new(),
    }),
  );
  registry.insert_model("malaria_advanced", Box::new(FailingModel));

  let processor = Processor::new(config.confidence_threshold, config.max_image_size);
  Pipeline::new(config, registry, processor)
}

#[test]
fn dengue_counts_follow_native_names() {
  let report = pipeline().detect("dengue", &png()).unwrap();
  assert_eq!(report.counts.get("Platelet"), 3);
  assert_eq!(report.counts.get("RBC"), 1);
  assert_eq!(report.counts.get("WBC"), 1);
  assert_eq!(report.total_detections, 5);
  assert!(!report.annotated_png.is_empty());
}

#[test]
fn single_class_total_mode_uses_class_name() {
  let report = pipeline().detect("malaria", &png()).unwrap();
  assert_eq!(report.counts.len(), 1);
  assert_eq!(report.counts.get("Trophozoite"), 4);

  let parasitemia = report.parasitemia.unwrap();
  assert_eq!(parasitemia.parasite_count, 4);
  assert_eq!(parasitemia.level, ParasitemiaLevel::Low);
}

#[test]
fn unmapped_class_without_label_gets_fallback_key() {
  let report = pipeline().detect("malaria_multi", &png()).unwrap();
  assert_eq!(report.counts.get("Red Blood Cell"), 2);
  assert_eq!(report.counts.get("Ring"), 2);
  assert_eq!(report.counts.get("Class 9"), 1);
  // 所有配置类别都有键
  assert_eq!(report.counts.get("Leukocyte"), 0);
  assert!(report.counts.contains("Leukocyte"));
  assert_eq!(report.parasitemia.unwrap().parasite_count, 2);
}

#[test]
fn errors_are_distinguishable() {
  let pipeline = pipeline();

  assert!(matches!(
    pipeline.detect("typhoid", &png()),
    Err(PipelineError::InvalidMode { .. })
  ));
  assert!(matches!(
    pipeline.detect("dengue", b"not an image"),
    Err(PipelineError::DecodeFailure(_))
  ));
  assert!(matches!(
    pipeline.detect("malaria_advanced", &png()),
    Err(PipelineError::InferenceFailure(_))
  ));

  let mut registry = ModelRegistry::from_config(&AppConfig::default()).unwrap();
  registry.insert_model("dengue", Box::new(FailingModel));
  let partial = Pipeline::new(AppConfig::default(), registry, Processor::new(0.3, 2048));
  assert!(matches!(
    partial.detect("malaria", &png()),
    Err(PipelineError::ModelUnavailable { .. })
  ));
}

#[test]
fn session_workflow_through_pipeline() {
  let pipeline = pipeline();
  let id = pipeline.create_session("dengue", Some("100x_oil_fn22")).unwrap();

  let (first, _) = pipeline.append_image(&id, &png()).unwrap();
  let (second, _) = pipeline.append_image(&id, &png()).unwrap();
  assert_eq!((first, second), (1, 2));

  let report = pipeline.finalize(&id).unwrap();
  assert_eq!(report.mode, "dengue");
  assert_eq!(report.conversion_factor, 20000);
  assert_eq!(report.result.total_detections, 6);
  assert_eq!(report.result.avg_platelets_per_image, 3.0);
  assert_eq!(report.result.platelets_per_ul, 60000.0);
  assert_eq!(report.interpretation.severity, Severity::Mild);

  // 重复结算返回同一结果
  assert_eq!(pipeline.finalize(&id).unwrap().result, report.result);
  assert!(matches!(
    pipeline.append_image(&id, &png()),
    Err(PipelineError::Session(SessionError::Completed(_)))
  ));
}

#[test]
fn session_creation_validates_inputs() {
  let pipeline = pipeline();
  assert!(matches!(
    pipeline.create_session("typhoid", None),
    Err(PipelineError::InvalidMode { .. })
  ));
  assert!(matches!(
    pipeline.create_session("dengue", Some("60x")),
    Err(PipelineError::InvalidMagnification { .. })
  ));
  assert!(matches!(
    pipeline.append_image("no-such-session", &png()),
    Err(PipelineError::Session(SessionError::NotFound(_)))
  ));
}
