// 该文件是 Xuetu （血涂） 项目的一部分。
// src/task.rs - 检测与汇总任务
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

use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::{
  AggregationResult, ClinicalInterpretation, ParasitemiaAssessment, assess_parasitemia, classify,
};
use crate::config::AppConfig;
use crate::counting::{Counts, count, reconcile};
use crate::error::PipelineError;
use crate::input::decode_image;
use crate::model::Model;
use crate::output::{Draw, OutputError, encode_png};
use crate::registry::{ModelProfile, ModelRegistry};
use crate::session::{SessionId, SessionStore};

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4],
}

/// 单张图像的处理结果，标注图像与计数同时存在
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
  pub counts: Counts,
  pub detections: Vec<Detection>,
  pub annotated_png: Vec<u8>,
}

/// 单张图像的处理流程：解码 → 推理 → 计数 → 标注 → 编码
pub struct Processor {
  confidence_threshold: f32,
  max_image_size: u32,
  draw: Draw,
}

impl Processor {
  pub fn new(confidence_threshold: f32, max_image_size: u32) -> Self {
    Self {
      confidence_threshold,
      max_image_size,
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn from_config(config: &AppConfig) -> Result<Self, OutputError> {
    let draw = match &config.font {
      Some(font) => Draw::default().with_font_file(font)?,
      None => Draw::default(),
    };
    Ok(Self::new(config.confidence_threshold, config.max_image_size).with_draw(draw))
  }

  pub fn process_detection(
    &self,
    bytes: &[u8],
    model: &dyn Model,
    profile: &ModelProfile,
  ) -> Result<DetectionOutcome, PipelineError> {
    let mut image = decode_image(bytes, self.max_image_size)?;
    debug!("图像解码完成: {}x{}", image.width(), image.height());

    let now = Instant::now();
    let result = model.infer(&image, self.confidence_threshold)?;
    info!(
      "{} 推理完成，耗时: {:.2?}，检测到 {} 个目标",
      profile.key,
      now.elapsed(),
      result.len()
    );

    let counts = count(&result, &profile.classes, profile.count_mode);
    let detections = result
      .items
      .iter()
      .map(|item| Detection {
        class_id: item.class_id,
        label: reconcile(item.class_id, &result.labels, &profile.classes)
          .name()
          .to_string(),
        score: item.score,
        bbox: item.bbox,
      })
      .collect();

    self.draw.draw_detections(&mut image, &result, &profile.classes);
    let annotated_png = encode_png(&image)?;

    Ok(DetectionOutcome {
      counts,
      detections,
      annotated_png,
    })
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
  pub mode: String,
  pub model_name: String,
  pub counts: Counts,
  pub total_detections: usize,
  pub detections: Vec<Detection>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parasitemia: Option<ParasitemiaAssessment>,
  #[serde(skip)]
  pub annotated_png: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
  pub session_id: SessionId,
  pub mode: String,
  pub conversion_factor: u32,
  pub result: AggregationResult,
  pub interpretation: ClinicalInterpretation,
}

/// 进程内共享的检测服务状态：模型注册表、处理流程与会话存储
pub struct Pipeline {
  config: AppConfig,
  registry: ModelRegistry,
  processor: Processor,
  sessions: SessionStore,
}

impl Pipeline {
  pub fn new(config: AppConfig, registry: ModelRegistry, processor: Processor) -> Self {
    Self {
      config,
      registry,
      processor,
      sessions: SessionStore::new(),
    }
  }

  pub fn config(&self) -> &AppConfig {
    &self.config
  }

  pub fn registry(&self) -> &ModelRegistry {
    &self.registry
  }

  pub fn sessions(&self) -> &SessionStore {
    &self.sessions
  }

  pub fn detect(&self, mode: &str, bytes: &[u8]) -> Result<DetectionReport, PipelineError> {
    let (profile, model) = self.registry.resolve(mode)?;
    let outcome = self.processor.process_detection(bytes, model, profile)?;

    // 仅对包含疟原虫类别的模型分级
    let parasitemia = profile
      .classes
      .values()
      .any(|name| self.config.malaria.parasite_classes.contains(name))
      .then(|| assess_parasitemia(&outcome.counts, &self.config.malaria));

    Ok(DetectionReport {
      mode: mode.to_string(),
      model_name: profile.name.clone(),
      total_detections: outcome.detections.len(),
      counts: outcome.counts,
      detections: outcome.detections,
      parasitemia,
      annotated_png: outcome.annotated_png,
    })
  }

  /// 创建汇总会话，放大倍数决定整个会话的换算系数
  pub fn create_session(
    &self,
    mode: &str,
    magnification: Option<&str>,
  ) -> Result<SessionId, PipelineError> {
    self.registry.resolve(mode)?;
    let conversion_factor = self.config.conversion_factor(magnification)?;
    Ok(
      self
        .sessions
        .create_with_conversion_factor(mode, conversion_factor),
    )
  }

  /// 按会话的模式检测一张图像并追加计数，返回图像序号
  pub fn append_image(
    &self,
    session_id: &str,
    bytes: &[u8],
  ) -> Result<(usize, DetectionReport), PipelineError> {
    let (mode, _) = self.sessions.settings(session_id)?;
    let report = self.detect(&mode, bytes)?;
    let image_number = self.sessions.append(session_id, report.counts.clone())?;
    Ok((image_number, report))
  }

  pub fn finalize(&self, session_id: &str) -> Result<SessionReport, PipelineError> {
    let result = self.sessions.finalize(session_id)?;
    let (mode, conversion_factor) = self.sessions.settings(session_id)?;
    let interpretation = classify(result.platelets_per_ul);
    info!(
      "会话 {} 分级: {} ({})",
      session_id, interpretation.status, interpretation.risk_level
    );

    Ok(SessionReport {
      session_id: session_id.to_string(),
      mode,
      conversion_factor,
      result,
      interpretation,
    })
  }
}

pub struct ImageInput {
  pub name: String,
  pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_number: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub counts: Option<Counts>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip)]
  pub annotated_png: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
  #[serde(flatten)]
  pub session: SessionReport,
  pub images: Vec<ImageReport>,
}

/// 多图像汇总任务
///
/// 创建会话后由若干工作线程并发处理图像，每张图像完成即追加到会话，
/// 全部处理完毕后结算并分级。单张图像失败只记录在报告中，不中断任务；
/// 没有任何图像成功时结算返回会话为空的错误。
#[derive(Debug)]
pub struct AggregateTask {
  workers: usize,
}

impl Default for AggregateTask {
  fn default() -> Self {
    let workers = thread::available_parallelism().map_or(1, |n| n.get());
    Self { workers }
  }
}

impl AggregateTask {
  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }

  pub fn run(
    &self,
    pipeline: &Pipeline,
    mode: &str,
    magnification: Option<&str>,
    images: Vec<ImageInput>,
  ) -> Result<AggregateReport, PipelineError> {
    let session_id = pipeline.create_session(mode, magnification)?;
    info!("开始汇总任务，会话 {}，共 {} 张图像", session_id, images.len());

    let workers = self.workers.min(images.len()).max(1);
    let (job_tx, job_rx) = mpsc::channel::<ImageInput>();
    for image in images {
      // 接收端此时一定存在
      let _ = job_tx.send(image);
    }
    drop(job_tx);

    let job_rx = Mutex::new(job_rx);
    let (report_tx, report_rx) = mpsc::channel::<ImageReport>();

    thread::scope(|scope| {
      for worker in 0..workers {
        let report_tx = report_tx.clone();
        let job_rx = &job_rx;
        let session_id = session_id.as_str();

        scope.spawn(move || {
          loop {
            let job = match job_rx.lock() {
              Ok(rx) => rx.recv(),
              Err(_) => break,
            };
            let Ok(ImageInput { name, bytes }) = job else {
              break;
            };

            debug!("工作线程 {} 处理图像 {}", worker, name);
            let report = match pipeline.append_image(session_id, &bytes) {
              Ok((image_number, detection)) => ImageReport {
                name,
                image_number: Some(image_number),
                counts: Some(detection.counts),
                error: None,
                annotated_png: Some(detection.annotated_png),
              },
              Err(e) => {
                warn!("图像 {} 处理失败: {}", name, e);
                ImageReport {
                  name,
                  image_number: None,
                  counts: None,
                  error: Some(e.to_string()),
                  annotated_png: None,
                }
              }
            };

            if report_tx.send(report).is_err() {
              break;
            }
          }
        });
      }
    });
    drop(report_tx);

    let mut reports: Vec<ImageReport> = report_rx.into_iter().collect();
    reports.sort_by_key(|report| report.image_number.unwrap_or(usize::MAX));

    let session = pipeline.finalize(&session_id)?;
    Ok(AggregateReport {
      session,
      images: reports,
    })
  }
}
