// 该文件是 Lianpu（脸谱）项目的一部分。
// src/output/mod.rs - 输出模块
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

mod aligned_output;
mod csv_output;
#[cfg(feature = "video-ffmpeg")]
pub mod draw;
mod hog_output;
#[cfg(feature = "video-ffmpeg")]
mod video_output;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::args::SessionPlan;
use crate::record::RecordSchema;

pub use aligned_output::AlignedImageOutput;
pub use csv_output::{CsvOutput, format_sig};
pub use hog_output::HogOutput;
#[cfg(feature = "video-ffmpeg")]
pub use video_output::VideoOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("对齐人脸写出失败: {0}")]
  AlignedWrite(PathBuf),
  #[cfg(feature = "video-ffmpeg")]
  #[error("FFmpeg 错误: {0}")]
  Ffmpeg(#[from] ffmpeg_next::Error),
}

/// 一个会话持有的全部输出句柄，会话结束时统一关闭
pub struct SessionOutputs {
  pub csv: Option<CsvOutput<BufWriter<File>>>,
  pub hog: Option<HogOutput<BufWriter<File>>>,
  pub aligned: Option<AlignedImageOutput>,
  #[cfg(feature = "video-ffmpeg")]
  pub video: Option<VideoOutput>,
}

impl SessionOutputs {
  /// 按会话计划打开各输出。
  /// 报表 / 描述子流 / 对齐目录打开失败是致命的；
  /// 跟踪视频打开失败只丢掉该输出，会话照常进行。
  pub fn open(
    plan: &SessionPlan,
    schema: RecordSchema,
    width: u32,
    height: u32,
    fps: f64,
    fourcc: &[u8; 4],
  ) -> Result<Self, OutputError> {
    let csv = plan
      .report
      .as_deref()
      .map(|path| CsvOutput::create(path, schema))
      .transpose()?;

    let hog = plan.hog.as_deref().map(HogOutput::create).transpose()?;

    let aligned = plan
      .aligned_dir
      .as_deref()
      .map(AlignedImageOutput::new)
      .transpose()?;

    #[cfg(feature = "video-ffmpeg")]
    let video = plan.tracked_video.as_deref().and_then(|path| {
      match VideoOutput::new(path, width, height, fps, fourcc) {
        Ok(video) => Some(video),
        Err(e) => {
          warn!("无法打开跟踪视频输出 {}（{}），本会话不产出跟踪视频", path.display(), e);
          None
        }
      }
    });
    #[cfg(not(feature = "video-ffmpeg"))]
    {
      let _ = (width, height, fps, fourcc);
      if plan.tracked_video.is_some() {
        warn!("本构建未启用 video-ffmpeg 特性，忽略跟踪视频输出");
      }
    }

    Ok(Self {
      csv,
      hog,
      aligned,
      #[cfg(feature = "video-ffmpeg")]
      video,
    })
  }

  /// 是否有消费者需要对齐人脸（相似对齐输出或描述子流）
  pub fn wants_aligned_face(&self) -> bool {
    self.aligned.is_some() || self.hog.is_some()
  }

  /// 关闭全部输出句柄
  pub fn finish(self) -> Result<(), OutputError> {
    if let Some(csv) = self.csv {
      csv.finish()?;
    }
    if let Some(hog) = self.hog {
      hog.finish()?;
    }
    #[cfg(feature = "video-ffmpeg")]
    if let Some(video) = self.video {
      video.finish()?;
    }
    Ok(())
  }
}
