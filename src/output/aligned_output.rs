// 该文件是 Lianpu（脸谱）项目的一部分。
// src/output/aligned_output.rs - 对齐人脸逐帧图片输出
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

use image::RgbImage;

use super::OutputError;

/// 相似变换对齐人脸输出：每帧一个文件，文件名按 1 起帧号零填充
pub struct AlignedImageOutput {
  directory: PathBuf,
}

impl AlignedImageOutput {
  pub fn new(directory: &Path) -> Result<Self, OutputError> {
    if !directory.exists() {
      std::fs::create_dir_all(directory)?;
    }
    Ok(Self {
      directory: directory.to_path_buf(),
    })
  }

  /// 本帧文件路径
  pub fn frame_path(&self, frame_index: u64) -> PathBuf {
    self
      .directory
      .join(format!("frame_det_{:06}.bmp", frame_index + 1))
  }

  /// 写出一帧对齐人脸；写出失败对整个运行是致命的，由调用方向上传播
  pub fn write_frame(&self, image: &RgbImage, frame_index: u64) -> Result<(), OutputError> {
    let path = self.frame_path(frame_index);
    image
      .save(&path)
      .map_err(|_| OutputError::AlignedWrite(path))?;
    Ok(())
  }
}
