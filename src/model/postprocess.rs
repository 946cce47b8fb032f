// 该文件是 Xuetu （血涂） 项目的一部分。
// src/model/postprocess.rs - YOLOv8 输出后处理
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

use std::cmp::Ordering;

use tracing::debug;

use crate::model::{DetectItem, LabelTable, ModelError, frame::Letterbox};

/// 进入 NMS 的候选框上限
const MAX_NMS_INPUTS: usize = 3000;

#[derive(Debug, Clone)]
struct Candidate {
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

/// 解码 YOLOv8 输出张量
///
/// 支持 `[1, 4 + nc, anchors]` 与 `[1, anchors, 4 + nc]` 两种布局，
/// 每个 anchor 为 `cx, cy, w, h` 加各类别分数（无 objectness）。
/// 已知类别数时据此判断布局，否则取较小的维度作为特征维度。
pub fn decode_yolov8(
  data: &[f32],
  shape: &[usize],
  num_classes: Option<usize>,
  confidence: f32,
  iou_threshold: f32,
  letterbox: &Letterbox,
) -> Result<Vec<DetectItem>, ModelError> {
  if shape.len() != 3 || shape[0] != 1 {
    return Err(ModelError::InvalidOutputShape {
      expected: "[1, features, anchors] 或 [1, anchors, features]".to_string(),
      got: format!("{:?}", shape),
    });
  }
  if data.len() != shape.iter().product::<usize>() {
    return Err(ModelError::InvalidOutputShape {
      expected: format!("{} 个元素", shape.iter().product::<usize>()),
      got: format!("{} 个元素", data.len()),
    });
  }

  let transposed = match num_classes {
    Some(nc) if shape[1] == nc + 4 => true,
    Some(nc) if shape[2] == nc + 4 => false,
    // anchor 数量远大于特征维度
    _ => shape[1] < shape[2],
  };
  let (features, anchors) = if transposed {
    (shape[1], shape[2])
  } else {
    (shape[2], shape[1])
  };
  if features < 5 {
    return Err(ModelError::InvalidOutputShape {
      expected: "特征维度 >= 5".to_string(),
      got: format!("{:?}", shape),
    });
  }

  let at = |anchor: usize, feature: usize| -> f32 {
    if transposed {
      data[feature * anchors + anchor]
    } else {
      data[anchor * features + feature]
    }
  };

  let mut candidates = Vec::new();
  for anchor in 0..anchors {
    let (class_id, score) = (4..features)
      .map(|f| (f - 4, at(anchor, f)))
      .fold((0usize, f32::NEG_INFINITY), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    if !score.is_finite() || score < confidence {
      continue;
    }

    let (cx, cy, w, h) = (at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
    if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0
    {
      continue;
    }

    candidates.push(Candidate {
      class_id: class_id as u32,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }

  debug!("NMS 前候选框数量: {}", candidates.len());
  candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
  candidates.truncate(MAX_NMS_INPUTS);

  let kept = nms(candidates, iou_threshold);
  Ok(
    kept
      .into_iter()
      .map(|c| DetectItem {
        class_id: c.class_id,
        score: c.score,
        bbox: letterbox.to_original(c.bbox),
      })
      .collect(),
  )
}

/// 非极大值抑制，仅在同类别之间抑制；输入需已按分数降序排列
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
  let mut result = Vec::new();

  while !candidates.is_empty() {
    let best = candidates.remove(0);
    candidates.retain(|c| c.class_id != best.class_id || iou(&best.bbox, &c.bbox) < iou_threshold);
    result.push(best);
  }

  result
}

/// 计算两个 xyxy 边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 解析 Ultralytics 导出模型元数据中的 `names` 字段
///
/// 形如 `{0: 'red_blood_cell', 1: 'ring'}`，无法识别的条目直接跳过。
pub fn parse_names(raw: &str) -> LabelTable {
  let mut labels = LabelTable::new();
  let body = raw.trim().trim_start_matches('{').trim_end_matches('}');
  let mut rest = body;

  while let Some(colon) = rest.find(':') {
    let key = rest[..colon].trim().trim_start_matches(',').trim();
    let after = rest[colon + 1..].trim_start();
    let Some(quote) = after.chars().next().filter(|c| *c == '\'' || *c == '"') else {
      break;
    };
    let Some(end) = after[1..].find(quote) else {
      break;
    };
    let value = &after[1..1 + end];
    if let Ok(id) = key.trim_matches(|c: char| c == '\'' || c == '"').parse::<u32>() {
      labels.insert(id, value.to_string());
    }
    rest = &after[end + 2..];
  }

  labels
}
