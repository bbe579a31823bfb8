// 该文件是 Lianpu（脸谱）项目的一部分。
// src/main.rs - 程序入口
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use lianpu::args::Args;
use lianpu::input;
use lianpu::model::{StubAnalyser, StubGaze, StubTracker};
use lianpu::session::{ControlInput, CtrlcControl, NoControl, Session, SessionEnd};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let config = Args::parse().resolve()?;
  info!("Lianpu 特征提取流水线启动，共 {} 个会话", config.plans.len());

  // 各能力跨会话复用，每个会话结束时显式重置
  let mut tracker = StubTracker::new();
  let gaze = StubGaze;
  let mut analyser = StubAnalyser::new();

  let mut control: Box<dyn ControlInput> = if config.quiet {
    Box::new(NoControl)
  } else {
    Box::new(CtrlcControl::install()?)
  };

  for plan in &config.plans {
    let mut source = input::open_source(&plan.source)
      .with_context(|| format!("无法打开输入源: {}", plan.source.display()))?;

    let mut session = Session {
      tracker: &mut tracker,
      gaze: &gaze,
      analyser: &mut analyser,
    };
    match session.run(&config, plan, source.as_mut(), control.as_mut())? {
      SessionEnd::Finished => {}
      SessionEnd::Quit => {
        warn!("收到终止请求，放弃剩余会话");
        break;
      }
    }
  }

  info!("全部会话处理完毕");
  Ok(())
}
