// 该文件是 Xuetu （血涂） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Xuetu 血涂片检测计数与血小板汇总
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径（TOML），未指定时使用内置配置
  #[arg(long, global = true, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 模型目录，覆盖配置文件与环境变量
  #[arg(long, global = true, value_name = "DIR")]
  pub model_dir: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, global = true, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// 标注字体文件（TTF/OTF），未指定时只绘制检测框
  #[arg(long, global = true, value_name = "FILE")]
  pub font: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 列出可用模型及加载状态
  Models,

  /// 检测单张图像并输出计数
  Detect {
    /// 检测模式（模型键名，如 dengue、malaria）
    #[arg(long)]
    mode: String,

    /// 输入图像
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// 标注图像输出路径（PNG）
    #[arg(long, value_name = "OUTPUT")]
    output: Option<PathBuf>,
  },

  /// 多图像血小板汇总并给出临床分级
  Aggregate {
    /// 检测模式
    #[arg(long, default_value = "dengue")]
    mode: String,

    /// 放大倍数预设（如 100x_oil、100x_oil_fn22、40x），未指定时使用默认预设
    #[arg(long)]
    magnification: Option<String>,

    /// 并发处理的工作线程数，0 表示按 CPU 数量
    #[arg(long, default_value = "0", value_name = "COUNT")]
    workers: usize,

    /// 标注图像输出目录
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// 输入图像
    #[arg(value_name = "IMAGES", required = true)]
    images: Vec<PathBuf>,
  },
}
