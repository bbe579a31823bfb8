// 该文件是 Lianpu（脸谱）项目的一部分。
// src/input/image_dir_source.rs - 图片序列输入源
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};

use super::{Frame, FrameSource, InputError, SourceKind};

/// 图片序列输入源：按文件名字典序逐张读取目录内的 .jpg / .png 文件
pub struct ImageDirSource {
  /// 排序后的图片路径
  files: Vec<PathBuf>,
  /// 下一帧索引
  next_index: u64,
  /// 预解码的首张图片（打开时已读取以确定分辨率）
  pending_first: Option<RgbImage>,
  /// 图片宽度（以首张为准）
  width: u32,
  /// 图片高度（以首张为准）
  height: u32,
  /// 是否按视频模式跟踪
  as_video: bool,
}

impl ImageDirSource {
  /// 创建一个新的图片序列输入源；目录中没有可用图片时打开失败
  pub fn new(dir: &Path, as_video: bool) -> Result<Self, InputError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
      .filter_map(|entry| entry.ok())
      .map(|entry| entry.path())
      .filter(|path| is_supported_image(path))
      .collect();
    files.sort();

    if files.is_empty() {
      return Err(InputError::EmptyImageDir(dir.to_path_buf()));
    }

    // 预读首张以确定会话分辨率（相机内参推定依赖它）
    let first = load_image(&files[0])?;
    let width = first.width();
    let height = first.height();

    Ok(Self {
      files,
      next_index: 0,
      pending_first: Some(first),
      width,
      height,
      as_video,
    })
  }
}

/// 只接受 .jpg 与 .png（大小写不敏感）
fn is_supported_image(path: &Path) -> bool {
  path
    .extension()
    .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("png"))
    .unwrap_or(false)
}

/// 解码一张图片；16 位图会在转为 RGB8 时归一化
fn load_image(path: &Path) -> Result<RgbImage, InputError> {
  Ok(ImageReader::open(path)?.decode()?.to_rgb8())
}

impl Iterator for ImageDirSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next_index as usize >= self.files.len() {
      return None;
    }

    let index = self.next_index;
    self.next_index += 1;

    let image = match self.pending_first.take() {
      Some(first) => first,
      None => match load_image(&self.files[index as usize]) {
        Ok(image) => image,
        Err(e) => return Some(Err(e)),
      },
    };

    Some(Ok(Frame { image, index }))
  }
}

impl FrameSource for ImageDirSource {
  fn kind(&self) -> SourceKind {
    SourceKind::ImageSequence
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    // 图片序列不携带帧率，时间戳推导固定假定 30
    None
  }

  fn frame_count(&self) -> Option<u64> {
    Some(self.files.len() as u64)
  }

  fn video_mode(&self) -> bool {
    self.as_video
  }
}
