// 该文件是 Xuetu （血涂） 项目的一部分。
// src/session.rs - 多图像汇总会话
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

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregate::{AggregationResult, DEFAULT_CONVERSION_FACTOR, aggregate};
use crate::counting::Counts;

pub type SessionId = String;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
  #[error("会话不存在: {0}")]
  NotFound(SessionId),
  #[error("会话 {0} 尚未上传任何图像")]
  Empty(SessionId),
  #[error("会话 {0} 已完成，不能再追加图像")]
  Completed(SessionId),
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationSession {
  pub session_id: SessionId,
  pub mode: String,
  pub conversion_factor: u32,
  pub created_at: DateTime<Utc>,
  pub images: Vec<Counts>,
  pub completed: bool,
  pub result: Option<AggregationResult>,
}

impl AggregationSession {
  fn new(mode: &str, conversion_factor: u32) -> Self {
    Self {
      session_id: Uuid::new_v4().to_string(),
      mode: mode.to_string(),
      conversion_factor,
      created_at: Utc::now(),
      images: Vec::new(),
      completed: false,
      result: None,
    }
  }
}

/// 进程内的会话存储
///
/// 外层读写锁只用于查找和插入，单个会话的追加与结算各自持有该会话的互斥锁，
/// 不同会话之间互不阻塞。会话没有过期机制，由调用方在用完后 `remove`。
#[derive(Debug, Default)]
pub struct SessionStore {
  sessions: RwLock<HashMap<SessionId, Arc<Mutex<AggregationSession>>>>,
}

impl SessionStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn create(&self, mode: &str) -> SessionId {
    self.create_with_conversion_factor(mode, DEFAULT_CONVERSION_FACTOR)
  }

  /// 换算系数由采集方案决定，对会话内所有图像统一生效
  pub fn create_with_conversion_factor(&self, mode: &str, conversion_factor: u32) -> SessionId {
    let session = AggregationSession::new(mode, conversion_factor);
    let id = session.session_id.clone();

    write_lock(&self.sessions).insert(id.clone(), Arc::new(Mutex::new(session)));
    info!("创建会话 {} (模式: {}, 系数: {})", id, mode, conversion_factor);
    id
  }

  /// 追加一张图像的计数，返回从 1 开始的图像序号
  pub fn append(&self, session_id: &str, counts: Counts) -> Result<usize, SessionError> {
    let session = self.lookup(session_id)?;
    let mut session = lock(&session);

    if session.completed {
      return Err(SessionError::Completed(session_id.to_string()));
    }

    session.images.push(counts);
    let image_number = session.images.len();
    debug!("会话 {} 追加第 {} 张图像", session_id, image_number);
    Ok(image_number)
  }

  /// 结算会话；重复结算直接返回首次结果
  pub fn finalize(&self, session_id: &str) -> Result<AggregationResult, SessionError> {
    let session = self.lookup(session_id)?;
    let mut session = lock(&session);

    if let Some(result) = session.result {
      debug!("会话 {} 已结算，返回缓存结果", session_id);
      return Ok(result);
    }
    if session.images.is_empty() {
      return Err(SessionError::Empty(session_id.to_string()));
    }

    let result = aggregate(&session.images, None, session.conversion_factor);
    session.result = Some(result);
    session.completed = true;
    info!(
      "会话 {} 结算完成: {} 张图像, {} 血小板/µL",
      session_id, result.images_count, result.platelets_per_ul
    );
    Ok(result)
  }

  pub fn get(&self, session_id: &str) -> Result<AggregationSession, SessionError> {
    let session = self.lookup(session_id)?;
    let snapshot = lock(&session).clone();
    Ok(snapshot)
  }

  /// 会话的检测模式与换算系数，不复制已累计的计数
  pub fn settings(&self, session_id: &str) -> Result<(String, u32), SessionError> {
    let session = self.lookup(session_id)?;
    let session = lock(&session);
    Ok((session.mode.clone(), session.conversion_factor))
  }

  pub fn remove(&self, session_id: &str) -> Result<(), SessionError> {
    write_lock(&self.sessions)
      .remove(session_id)
      .map(|_| debug!("移除会话 {}", session_id))
      .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
  }

  pub fn len(&self) -> usize {
    self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn lookup(&self, session_id: &str) -> Result<Arc<Mutex<AggregationSession>>, SessionError> {
    self
      .sessions
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(session_id)
      .cloned()
      .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
  }
}

// 会话内的操作都不会在持锁期间留下半完成状态，锁中毒时继续使用内部数据
fn lock(session: &Mutex<AggregationSession>) -> MutexGuard<'_, AggregationSession> {
  session.lock().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
  lock.write().unwrap_or_else(|e| e.into_inner())
}
