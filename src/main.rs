// 该文件是 Xuetu （血涂） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use args::{Args, Command};
use xuetu::{
  config::{AppConfig, MagnificationPreset},
  input::read_image_file,
  output::{annotated_path, save_png},
  registry::{ModelInfo, ModelRegistry},
  task::{AggregateTask, ImageInput, Pipeline, Processor},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let mut config = AppConfig::load(args.config.as_deref()).context("加载配置失败")?;
  if let Some(dir) = args.model_dir {
    config.model_dir = dir;
  }
  if let Some(confidence) = args.confidence {
    config.confidence_threshold = confidence;
  }
  if let Some(font) = args.font {
    config.font = Some(font);
  }
  config.validate().context("配置无效")?;

  info!("模型目录: {}", config.model_dir.display());
  info!("置信度阈值: {}", config.confidence_threshold);

  let mut registry = ModelRegistry::from_config(&config)?;
  load_models(&mut registry);
  let processor = Processor::from_config(&config)?;
  let pipeline = Pipeline::new(config, registry, processor);

  match args.command {
    Command::Models => {
      #[derive(Serialize)]
      struct ModelsReport<'a> {
        health: BTreeMap<String, bool>,
        models: Vec<ModelInfo>,
        magnifications: &'a BTreeMap<String, MagnificationPreset>,
      }

      print_json(&ModelsReport {
        health: pipeline.registry().health(),
        models: pipeline.registry().model_info(),
        magnifications: &pipeline.config().magnifications,
      })?;
    }
    Command::Detect {
      mode,
      image,
      output,
    } => {
      let bytes = read_image_file(&image)?;
      let report = pipeline
        .detect(&mode, &bytes)
        .with_context(|| format!("检测失败: {}", image.display()))?;

      let output = output.unwrap_or_else(|| annotated_path(Path::new("."), &image, None));
      save_png(&output, &report.annotated_png)?;
      print_json(&report)?;
    }
    Command::Aggregate {
      mode,
      magnification,
      workers,
      output_dir,
      images,
    } => {
      let inputs = images
        .iter()
        .map(|path| -> Result<ImageInput> {
          Ok(ImageInput {
            name: path.display().to_string(),
            bytes: read_image_file(path)?,
          })
        })
        .collect::<Result<Vec<_>>>()?;

      let task = match workers {
        0 => AggregateTask::default(),
        n => AggregateTask::default().with_workers(n),
      };
      let report = task
        .run(&pipeline, &mode, magnification.as_deref(), inputs)
        .context("汇总失败")?;

      if let Some(dir) = output_dir {
        for (index, image) in report.images.iter().enumerate() {
          if let Some(png) = &image.annotated_png {
            let number = image.image_number.unwrap_or(index + 1);
            save_png(annotated_path(&dir, Path::new(&image.name), Some(number)), png)?;
          }
        }
      }
      print_json(&report)?;
    }
  }

  Ok(())
}

#[cfg(feature = "onnx")]
fn load_models(registry: &mut ModelRegistry) {
  use xuetu::model::Yolov8Builder;
  use xuetu::registry::DynModel;

  let results = registry.load_all(|profile| {
    let model = Yolov8Builder::new(&profile.path)
      .class_count(profile.classes.len())
      .build()?;
    Ok(Box::new(model) as DynModel)
  });
  let loaded = results.values().filter(|ok| **ok).count();
  info!("模型加载完成: {}/{}", loaded, results.len());
}

#[cfg(not(feature = "onnx"))]
fn load_models(_registry: &mut ModelRegistry) {
  tracing::warn!("未启用 onnx 特性，所有检测模式均不可用");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
