// 该文件是 Guoxian （果鲜） 项目的一部分。
// src/policy.rs - 执行策略包装（计时、日志、重试）
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

use std::{fmt::Display, thread, time::Duration, time::Instant};

use tracing::{error, info, warn};

/// 计时：记录一次调用的耗时，结果原样返回
pub fn timed<T, E, F>(name: &str, op: F) -> Result<T, E>
where
  F: FnOnce() -> Result<T, E>,
{
  let now = Instant::now();
  let result = op();
  info!("{} 耗时: {:.2?}", name, now.elapsed());
  result
}

/// 日志：调用前后记录开始、成功或失败，错误原样向上传递
pub fn logged<T, E, F>(name: &str, op: F) -> Result<T, E>
where
  E: Display,
  F: FnOnce() -> Result<T, E>,
{
  info!("开始执行 {}", name);
  match op() {
    Ok(value) => {
      info!("{} 执行成功", name);
      Ok(value)
    }
    Err(e) => {
      error!("{} 执行失败: {}", name, e);
      Err(e)
    }
  }
}

/// 重试：整体失败时最多重新调用 `max_attempts` 次，两次之间等待 `delay`
///
/// 最后一次失败的错误原样返回。只适用于可能瞬时失败的外部调用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
  max_attempts: u32,
  delay: Duration,
}

impl Default for Retry {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      delay: Duration::from_secs(1),
    }
  }
}

impl Retry {
  /// `max_attempts` 为 0 时按 1 处理
  pub fn new(max_attempts: u32, delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      delay,
    }
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }

  pub fn run<T, E, F>(&self, name: &str, mut op: F) -> Result<T, E>
  where
    E: Display,
    F: FnMut() -> Result<T, E>,
  {
    let mut attempt = 1;
    loop {
      match op() {
        Ok(value) => return Ok(value),
        Err(e) if attempt >= self.max_attempts => return Err(e),
        Err(e) => {
          warn!(
            "{} 失败（第 {}/{} 次）: {}",
            name, attempt, self.max_attempts, e
          );
          thread::sleep(self.delay);
          attempt += 1;
        }
      }
    }
  }
}
