// 该文件是 Lianpu（脸谱）项目的一部分。
// src/input/mod.rs - 输入源模块
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

mod image_dir_source;
#[cfg(feature = "camera-v4l2")]
mod v4l2_source;
#[cfg(feature = "video-ffmpeg")]
mod video_source;

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;
use tracing::info;

use crate::args::SourceDescriptor;

pub use image_dir_source::ImageDirSource;
#[cfg(feature = "camera-v4l2")]
pub use v4l2_source::V4l2Source;
#[cfg(feature = "video-ffmpeg")]
pub use video_source::VideoSource;

/// 无法从源本身得知帧率时假定的帧率
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无法打开视频源: {0}")]
  OpenVideo(String),
  #[error("目录中没有 .jpg / .png 图片: {0}")]
  EmptyImageDir(PathBuf),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("无法取得帧数据: {0}")]
  Capture(String),
  #[cfg(feature = "video-ffmpeg")]
  #[error("FFmpeg 错误: {0}")]
  Ffmpeg(#[from] ffmpeg_next::Error),
  #[error("本构建未启用 {0} 特性，无法打开该输入源")]
  FeatureDisabled(&'static str),
}

/// 帧数据：图像与会话内单调递增的帧索引。
/// 时间戳由会话根据帧索引与帧率推导，不在此处携带。
pub struct Frame {
  pub image: RgbImage,
  pub index: u64,
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  /// 视频文件
  Video,
  /// 摄像头
  Camera,
  /// 图片序列
  ImageSequence,
}

/// 输入源 trait：逐帧拉取，直至耗尽
pub trait FrameSource: Iterator<Item = Result<Frame, InputError>> {
  /// 获取输入源类型
  fn kind(&self) -> SourceKind;

  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;

  /// 源自带的帧率（未知时为 None）
  fn fps(&self) -> Option<f64>;

  /// 总帧数（摄像头等流式源为 None，进度汇报按尽力而为处理）
  fn frame_count(&self) -> Option<u64>;

  /// 跟踪器是否应按视频模式（帧间连续）检测本源
  fn video_mode(&self) -> bool {
    self.kind() != SourceKind::ImageSequence
  }
}

/// 解析会话实际使用的帧率：源报告的帧率非法（NaN 或非正）时退回 30
pub fn resolved_fps(fps: Option<f64>) -> f64 {
  match fps {
    Some(fps) if fps.is_finite() && fps > 0.0 => fps,
    _ => {
      info!("输入源帧率未知，假定 {}", DEFAULT_FPS);
      DEFAULT_FPS
    }
  }
}

/// 从源描述创建输入源；打开失败对整个运行是致命的
pub fn open_source(descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, InputError> {
  match descriptor {
    SourceDescriptor::Video(path) => {
      #[cfg(feature = "video-ffmpeg")]
      {
        Ok(Box::new(VideoSource::new(path)?))
      }
      #[cfg(not(feature = "video-ffmpeg"))]
      {
        let _ = path;
        Err(InputError::FeatureDisabled("video-ffmpeg"))
      }
    }
    SourceDescriptor::Camera(device) => {
      #[cfg(feature = "camera-v4l2")]
      {
        Ok(Box::new(V4l2Source::new(device)?))
      }
      #[cfg(not(feature = "camera-v4l2"))]
      {
        let _ = device;
        Err(InputError::FeatureDisabled("camera-v4l2"))
      }
    }
    SourceDescriptor::ImageDir { dir, as_video } => {
      Ok(Box::new(ImageDirSource::new(dir, *as_video)?))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolved_fps_accepts_positive_rates() {
    assert_eq!(resolved_fps(Some(25.0)), 25.0);
  }

  #[test]
  fn resolved_fps_falls_back_on_invalid_rates() {
    assert_eq!(resolved_fps(None), DEFAULT_FPS);
    assert_eq!(resolved_fps(Some(0.0)), DEFAULT_FPS);
    assert_eq!(resolved_fps(Some(-1.0)), DEFAULT_FPS);
    assert_eq!(resolved_fps(Some(f64::NAN)), DEFAULT_FPS);
  }
}
