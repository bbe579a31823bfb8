// 该文件是 Lianpu（脸谱）项目的一部分。
// src/model/mod.rs - 外部能力契约（跟踪、视线、动作单元分析）
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;

mod stub;
pub use stub::{StubAnalyser, StubGaze, StubTracker};

/// FHOG 描述子通道数
pub const HOG_CHANNELS: usize = 31;

/// 视线方向缺省值：正对相机
pub const GAZE_FORWARD: [f64; 3] = [0.0, 0.0, -1.0];

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("推理引擎错误: {0}")]
  Engine(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 相机内参（像素单位）。一旦为会话解析完成，整个会话保持不变。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
  pub fx: f64,
  pub fy: f64,
  pub cx: f64,
  pub cy: f64,
}

impl CameraIntrinsics {
  /// 由配置与首帧分辨率解析内参。
  /// 光心未设置（任一为 0）时取图像中心；
  /// 焦距未设置时按图像宽高归一的经验值推定，fx 与 fy 取均值后相等。
  pub fn resolve(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
    let (cx, cy) = if cx == 0.0 || cy == 0.0 {
      (width as f64 / 2.0, height as f64 / 2.0)
    } else {
      (cx, cy)
    };

    let (fx, fy) = if fx == 0.0 || fy == 0.0 {
      let fx = 500.0 * (width as f64 / 640.0);
      let fy = 500.0 * (height as f64 / 480.0);
      let f = (fx + fy) / 2.0;
      (f, f)
    } else {
      (fx, fy)
    };

    Self { fx, fy, cx, cy }
  }
}

/// 跟踪成功时的人脸模型状态
#[derive(Debug, Clone)]
pub struct TrackedFace {
  /// 二维特征点
  pub landmarks_2d: Vec<[f64; 2]>,
  /// 三维特征点（相机坐标系，毫米）
  pub landmarks_3d: Vec<[f64; 3]>,
  /// 眼部特征点（二维）
  pub eye_landmarks: Vec<[f64; 2]>,
  /// 刚性模型参数：尺度、三维旋转、二维平移
  pub params_rigid: [f64; 6],
  /// 非刚性模型参数（模态数个）
  pub params_nonrigid: Vec<f64>,
}

/// 单帧检测结果。
/// `face` 为 Some 当且仅当跟踪已初始化；`success` 独立标记本帧检测是否成功，
/// 二者可以不一致（跟踪已初始化但本帧检测失败时仍有可用的模型状态）。
#[derive(Debug, Clone)]
pub struct Detection {
  pub success: bool,
  /// 检测确定度，取值 [-1, 1]，越小越可信
  pub certainty: f64,
  pub face: Option<TrackedFace>,
}

impl Detection {
  /// 由确定度导出的置信度，取值 [0, 1]
  pub fn confidence(&self) -> f64 {
    0.5 * (1.0 - self.certainty)
  }
}

/// 眼睛选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
  Left,
  Right,
}

/// 对齐人脸上计算的稠密 FHOG 描述子。
/// `data` 按写出顺序存放：外层列、内层行、最内层 31 个方向通道。
#[derive(Debug, Clone)]
pub struct HogDescriptor {
  pub rows: usize,
  pub cols: usize,
  pub data: Vec<f32>,
}

/// 分析器推进一帧后取回的对齐结果
#[derive(Debug, Clone)]
pub struct AlignedFrame {
  /// 相似变换对齐后的人脸图像
  pub aligned: Option<RgbImage>,
  /// FHOG 描述子
  pub hog: Option<HogDescriptor>,
}

/// 人脸特征点跟踪器契约
pub trait FaceTracker {
  /// 视频模式检测：利用前一帧状态做帧间跟踪
  fn detect_video(&mut self, image: &RgbImage) -> Result<Detection, ModelError>;

  /// 单图模式检测：每张图独立检测
  fn detect_image(&mut self, image: &RgbImage) -> Result<Detection, ModelError>;

  /// 由当前模型状态与相机内参计算头部姿态（平移×3 + 旋转×3）
  fn pose(&self, intrinsics: &CameraIntrinsics) -> [f64; 6];

  /// 是否带有眼部子模型（视线估计的前提）
  fn has_eye_model(&self) -> bool;

  /// 特征点数
  fn num_landmarks(&self) -> usize;

  /// 眼部特征点数
  fn num_eye_landmarks(&self) -> usize;

  /// 非刚性模态数
  fn num_modes(&self) -> usize;

  /// 重置为全新状态，供下一个会话复用
  fn reset(&mut self);
}

/// 视线估计器契约
pub trait GazeEstimator {
  /// 估计一只眼睛的三维视线方向
  fn estimate(&self, face: &TrackedFace, intrinsics: &CameraIntrinsics, eye: Eye) -> [f64; 3];

  /// 由双眼方向与头部姿态导出二维视线角
  fn angle(&self, dir0: [f64; 3], dir1: [f64; 3], pose: &[f64; 6]) -> [f64; 2];
}

/// 人脸对齐与动作单元分析器契约
pub trait FaceAnalyser {
  /// 推进内部状态一帧，取回对齐图像与描述子
  fn advance(
    &mut self,
    image: &RgbImage,
    detection: &Detection,
    timestamp: f64,
  ) -> Result<AlignedFrame, ModelError>;

  /// 当前帧的回归动作单元得分（名称 -> 分值）
  fn aus_reg(&self) -> Vec<(String, f64)>;

  /// 当前帧的二分类动作单元得分（名称 -> 分值）
  fn aus_class(&self) -> Vec<(String, f64)>;

  /// 回归动作单元名称表（会话开始即固定）
  fn au_reg_names(&self) -> Vec<String>;

  /// 二分类动作单元名称表（会话开始即固定）
  fn au_class_names(&self) -> Vec<String>;

  /// 对写完的报表做第二遍后处理（平滑 / 修正动作单元预测）
  fn post_process(&mut self, report: &Path) -> Result<(), ModelError>;

  /// 重置为全新状态，供下一个会话复用
  fn reset(&mut self);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intrinsics_derived_from_vga_frame() {
    let intrinsics = CameraIntrinsics::resolve(0.0, 0.0, 0.0, 0.0, 640, 480);
    assert_eq!(intrinsics.cx, 320.0);
    assert_eq!(intrinsics.cy, 240.0);
    assert_eq!(intrinsics.fx, 500.0);
    assert_eq!(intrinsics.fy, 500.0);
  }

  #[test]
  fn intrinsics_focal_lengths_are_averaged() {
    // 宽高比偏离 4:3 时 fx、fy 先各自按宽高推定，再取均值
    let intrinsics = CameraIntrinsics::resolve(0.0, 0.0, 0.0, 0.0, 1280, 480);
    assert_eq!(intrinsics.cx, 640.0);
    assert_eq!(intrinsics.cy, 240.0);
    assert_eq!(intrinsics.fx, 750.0);
    assert_eq!(intrinsics.fy, 750.0);
  }

  #[test]
  fn preset_intrinsics_are_kept() {
    let intrinsics = CameraIntrinsics::resolve(620.0, 610.0, 315.0, 245.0, 640, 480);
    assert_eq!(
      intrinsics,
      CameraIntrinsics {
        fx: 620.0,
        fy: 610.0,
        cx: 315.0,
        cy: 245.0
      }
    );
  }

  #[test]
  fn confidence_derived_from_certainty() {
    let detection = Detection {
      success: false,
      certainty: 0.6,
      face: None,
    };
    assert!((detection.confidence() - 0.2).abs() < 1e-12);
  }
}
