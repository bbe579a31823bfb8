// 该文件是 Lianpu（脸谱）项目的一部分。
// src/model/stub.rs - 确定性替身引擎
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

use std::collections::HashSet;
use std::path::Path;

use image::{Rgb, RgbImage};
use tracing::info;

use super::{
  AlignedFrame, CameraIntrinsics, Detection, Eye, FaceAnalyser, FaceTracker, GazeEstimator,
  HOG_CHANNELS, HogDescriptor, ModelError, TrackedFace,
};

/// 替身跟踪器：在没有真实拟合引擎时驱动整条流水线。
/// 输出完全由帧尺寸与帧序号决定，便于测试与演示。
pub struct StubTracker {
  num_landmarks: usize,
  num_eye_landmarks: usize,
  num_modes: usize,
  /// 指定哪些帧序号检测失败（按会话内 0 起帧计）
  fail_frames: HashSet<u64>,
  frames_seen: u64,
  tracked: bool,
}

impl Default for StubTracker {
  fn default() -> Self {
    Self::new()
  }
}

impl StubTracker {
  pub fn new() -> Self {
    Self {
      num_landmarks: 68,
      num_eye_landmarks: 56,
      num_modes: 34,
      fail_frames: HashSet::new(),
      frames_seen: 0,
      tracked: false,
    }
  }

  /// 令指定帧序号的检测失败（测试用）
  pub fn with_failures(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
    self.fail_frames = frames.into_iter().collect();
    self
  }

  fn detect(&mut self, image: &RgbImage) -> Detection {
    let index = self.frames_seen;
    self.frames_seen += 1;

    if self.fail_frames.contains(&index) {
      // 失败帧不推进跟踪状态；之前从未成功过则跟踪仍未初始化
      return Detection {
        success: false,
        certainty: 0.8,
        face: if self.tracked { Some(self.synthesise_face(image)) } else { None },
      };
    }

    self.tracked = true;
    Detection {
      success: true,
      certainty: -0.9,
      face: Some(self.synthesise_face(image)),
    }
  }

  /// 以图像中心为圆心合成一张稳定的"人脸"
  fn synthesise_face(&self, image: &RgbImage) -> TrackedFace {
    let cx = image.width() as f64 / 2.0;
    let cy = image.height() as f64 / 2.0;
    let rx = image.width() as f64 * 0.25;
    let ry = image.height() as f64 * 0.3;

    let landmarks_2d: Vec<[f64; 2]> = (0..self.num_landmarks)
      .map(|i| {
        let theta = i as f64 / self.num_landmarks as f64 * std::f64::consts::TAU;
        [cx + rx * theta.cos(), cy + ry * theta.sin()]
      })
      .collect();

    let landmarks_3d: Vec<[f64; 3]> = landmarks_2d
      .iter()
      .enumerate()
      .map(|(i, p)| [p[0] - cx, p[1] - cy, 400.0 + i as f64])
      .collect();

    let eye_landmarks: Vec<[f64; 2]> = (0..self.num_eye_landmarks)
      .map(|i| {
        let theta = i as f64 / self.num_eye_landmarks as f64 * std::f64::consts::TAU;
        let side = if i < self.num_eye_landmarks / 2 { -1.0 } else { 1.0 };
        [
          cx + side * rx * 0.4 + rx * 0.1 * theta.cos(),
          cy - ry * 0.2 + ry * 0.1 * theta.sin(),
        ]
      })
      .collect();

    let mut params_nonrigid = vec![0.0; self.num_modes];
    if let Some(first) = params_nonrigid.first_mut() {
      *first = 0.1;
    }

    TrackedFace {
      landmarks_2d,
      landmarks_3d,
      eye_landmarks,
      params_rigid: [1.0, 0.0, 0.0, 0.0, cx, cy],
      params_nonrigid,
    }
  }
}

impl FaceTracker for StubTracker {
  fn detect_video(&mut self, image: &RgbImage) -> Result<Detection, ModelError> {
    Ok(self.detect(image))
  }

  fn detect_image(&mut self, image: &RgbImage) -> Result<Detection, ModelError> {
    // 单图模式不依赖帧间状态，替身实现与视频模式同构
    Ok(self.detect(image))
  }

  fn pose(&self, _intrinsics: &CameraIntrinsics) -> [f64; 6] {
    if self.tracked {
      [0.0, 0.0, 500.0, 0.0, 0.0, 0.0]
    } else {
      [0.0; 6]
    }
  }

  fn has_eye_model(&self) -> bool {
    true
  }

  fn num_landmarks(&self) -> usize {
    self.num_landmarks
  }

  fn num_eye_landmarks(&self) -> usize {
    self.num_eye_landmarks
  }

  fn num_modes(&self) -> usize {
    self.num_modes
  }

  fn reset(&mut self) {
    self.frames_seen = 0;
    self.tracked = false;
  }
}

/// 替身视线估计器
pub struct StubGaze;

impl GazeEstimator for StubGaze {
  fn estimate(&self, _face: &TrackedFace, _intrinsics: &CameraIntrinsics, eye: Eye) -> [f64; 3] {
    let x = match eye {
      Eye::Left => 0.05,
      Eye::Right => -0.05,
    };
    normalise([x, -0.02, -1.0])
  }

  fn angle(&self, dir0: [f64; 3], dir1: [f64; 3], _pose: &[f64; 6]) -> [f64; 2] {
    let mean = [
      (dir0[0] + dir1[0]) / 2.0,
      (dir0[1] + dir1[1]) / 2.0,
      (dir0[2] + dir1[2]) / 2.0,
    ];
    [mean[0].atan2(-mean[2]), mean[1].atan2(-mean[2])]
  }
}

fn normalise(v: [f64; 3]) -> [f64; 3] {
  let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
  [v[0] / norm, v[1] / norm, v[2] / norm]
}

const AU_REG_NAMES: [&str; 14] = [
  "AU01", "AU02", "AU04", "AU05", "AU06", "AU09", "AU10", "AU12", "AU14", "AU15", "AU17", "AU20",
  "AU25", "AU26",
];

// 故意不按字典序排列，列序由编码端排序决定
const AU_CLASS_NAMES: [&str; 6] = ["AU12", "AU04", "AU15", "AU23", "AU28", "AU45"];

/// 替身分析器：固定尺寸的对齐人脸与确定性 FHOG / 动作单元得分
pub struct StubAnalyser {
  aligned_size: u32,
  hog_rows: usize,
  hog_cols: usize,
  current_reg: Vec<(String, f64)>,
  current_class: Vec<(String, f64)>,
}

impl Default for StubAnalyser {
  fn default() -> Self {
    Self::new()
  }
}

impl StubAnalyser {
  pub fn new() -> Self {
    Self {
      aligned_size: 112,
      hog_rows: 12,
      hog_cols: 12,
      current_reg: Vec::new(),
      current_class: Vec::new(),
    }
  }

  /// 调整描述子网格（测试用）
  pub fn with_hog_grid(mut self, rows: usize, cols: usize) -> Self {
    self.hog_rows = rows;
    self.hog_cols = cols;
    self
  }
}

impl FaceAnalyser for StubAnalyser {
  fn advance(
    &mut self,
    image: &RgbImage,
    detection: &Detection,
    timestamp: f64,
  ) -> Result<AlignedFrame, ModelError> {
    // 对齐图像：用帧均值亮度填充，保证逐帧确定
    let mean = image
      .pixels()
      .map(|p| p.0[0] as u64)
      .sum::<u64>()
      .checked_div(image.pixels().len() as u64)
      .unwrap_or(0) as u8;
    let aligned = RgbImage::from_pixel(self.aligned_size, self.aligned_size, Rgb([mean, mean, mean]));

    let len = self.hog_rows * self.hog_cols * HOG_CHANNELS;
    let data: Vec<f32> = (0..len).map(|i| (i % 17) as f32 / 16.0).collect();

    let phase = if detection.success { timestamp.fract() } else { 0.0 };
    self.current_reg = AU_REG_NAMES
      .iter()
      .enumerate()
      .map(|(i, name)| (name.to_string(), (phase * 5.0 + i as f64 * 0.1) % 5.0))
      .collect();
    self.current_class = AU_CLASS_NAMES
      .iter()
      .enumerate()
      .map(|(i, name)| (name.to_string(), f64::from((i as u32 + 1) % 2)))
      .collect();

    Ok(AlignedFrame {
      aligned: Some(aligned),
      hog: Some(HogDescriptor {
        rows: self.hog_rows,
        cols: self.hog_cols,
        data,
      }),
    })
  }

  fn aus_reg(&self) -> Vec<(String, f64)> {
    self.current_reg.clone()
  }

  fn aus_class(&self) -> Vec<(String, f64)> {
    self.current_class.clone()
  }

  fn au_reg_names(&self) -> Vec<String> {
    AU_REG_NAMES.iter().map(|name| name.to_string()).collect()
  }

  fn au_class_names(&self) -> Vec<String> {
    AU_CLASS_NAMES.iter().map(|name| name.to_string()).collect()
  }

  fn post_process(&mut self, report: &Path) -> Result<(), ModelError> {
    // 替身实现没有可修正的模型，保留报表原样
    info!("跳过动作单元后处理: {}", report.display());
    Ok(())
  }

  fn reset(&mut self) {
    self.current_reg.clear();
    self.current_class.clear();
  }
}
