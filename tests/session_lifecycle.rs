// 该文件是 Xuetu （血涂） 项目的一部分。
// tests/session_lifecycle.rs - 会话生命周期与并发追加
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

use std::sync::{Arc, Barrier};
use std::thread;

use xuetu::aggregate::{DEFAULT_CONVERSION_FACTOR, PLATELET_CLASS, aggregate};
use xuetu::counting::Counts;
use xuetu::session::{SessionError, SessionStore};

fn platelets(n: usize) -> Counts {
  Counts::from_iter([(PLATELET_CLASS, n)])
}

#[test]
fn create_append_finalize() {
  let store = SessionStore::new();
  let id = store.create("dengue");

  let c1 = platelets(12);
  let c2 = Counts::from_iter([(PLATELET_CLASS, 7), ("RBC", 230), ("WBC", 2)]);
  assert_eq!(store.append(&id, c1.clone()).unwrap(), 1);
  assert_eq!(store.append(&id, c2.clone()).unwrap(), 2);

  let result = store.finalize(&id).unwrap();
  assert_eq!(result, aggregate(&[c1, c2], None, DEFAULT_CONVERSION_FACTOR));
  assert_eq!(result.total_detections, 19);
  assert_eq!(result.avg_platelets_per_image, 9.5);
  assert_eq!(result.platelets_per_ul, 142500.0);
}

#[test]
fn unknown_session_is_not_found() {
  let store = SessionStore::new();
  let missing = "00000000-0000-0000-0000-000000000000";
  assert_eq!(
    store.append(missing, platelets(1)),
    Err(SessionError::NotFound(missing.to_string()))
  );
  assert_eq!(
    store.finalize(missing),
    Err(SessionError::NotFound(missing.to_string()))
  );
}

#[test]
fn finalize_without_images_is_empty() {
  let store = SessionStore::new();
  let id = store.create("dengue");
  assert_eq!(store.finalize(&id), Err(SessionError::Empty(id.clone())));

  // 失败的结算不改变会话状态
  store.append(&id, platelets(3)).unwrap();
  assert_eq!(store.finalize(&id).unwrap().total_detections, 3);
}

#[test]
fn concurrent_appends_lose_nothing() {
  const THREADS: usize = 8;
  const PER_THREAD: usize = 50;

  let store = Arc::new(SessionStore::new());
  let id = store.create("dengue");

  let handles: Vec<_> = (0..THREADS)
    .map(|_| {
      let store = Arc::clone(&store);
      let id = id.clone();
      thread::spawn(move || {
        (0..PER_THREAD)
          .map(|_| store.append(&id, platelets(1)).unwrap())
          .collect::<Vec<_>>()
      })
    })
    .collect();

  let mut numbers: Vec<usize> = handles
    .into_iter()
    .flat_map(|handle| handle.join().unwrap())
    .collect();
  numbers.sort_unstable();

  let expected: Vec<usize> = (1..=THREADS * PER_THREAD).collect();
  assert_eq!(numbers, expected);

  let result = store.finalize(&id).unwrap();
  assert_eq!(result.images_count, THREADS * PER_THREAD);
  assert_eq!(result.total_detections, THREADS * PER_THREAD);
}

#[test]
fn finalize_during_concurrent_appends_sees_every_accepted_image() {
  const THREADS: usize = 6;
  const MAX_PER_THREAD: usize = 10_000;

  let store = Arc::new(SessionStore::new());
  let id = store.create("dengue");
  store.append(&id, platelets(1)).unwrap();

  let barrier = Arc::new(Barrier::new(THREADS + 1));
  let handles: Vec<_> = (0..THREADS)
    .map(|_| {
      let store = Arc::clone(&store);
      let barrier = Arc::clone(&barrier);
      let id = id.clone();
      thread::spawn(move || {
        barrier.wait();
        let mut accepted = 0;
        for _ in 0..MAX_PER_THREAD {
          match store.append(&id, platelets(1)) {
            Ok(_) => accepted += 1,
            Err(SessionError::Completed(_)) => {
              // 结算之后不再接受任何图像
              assert_eq!(
                store.append(&id, platelets(1)),
                Err(SessionError::Completed(id.clone()))
              );
              break;
            }
            Err(e) => panic!("unexpected append error: {e}"),
          }
        }
        accepted
      })
    })
    .collect();

  barrier.wait();
  thread::yield_now();
  let result = store.finalize(&id).unwrap();

  let accepted: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
  assert_eq!(result.images_count, accepted + 1);
  assert_eq!(result.total_detections, accepted + 1);
  assert_eq!(store.get(&id).unwrap().images.len(), result.images_count);

  assert_eq!(
    store.append(&id, platelets(5)),
    Err(SessionError::Completed(id.clone()))
  );
  assert_eq!(store.finalize(&id).unwrap(), result);
}

#[test]
fn sessions_are_independent() {
  let store = Arc::new(SessionStore::new());
  let ids: Vec<_> = (0..4).map(|_| store.create("dengue")).collect();

  thread::scope(|scope| {
    for (i, id) in ids.iter().enumerate() {
      let store = &store;
      scope.spawn(move || {
        for _ in 0..=i {
          store.append(id, platelets(i + 1)).unwrap();
        }
      });
    }
  });

  for (i, id) in ids.iter().enumerate() {
    let result = store.finalize(id).unwrap();
    assert_eq!(result.images_count, i + 1);
    assert_eq!(result.avg_platelets_per_image, (i + 1) as f64);
  }
}
