// 该文件是 Lianpu（脸谱）项目的一部分。
// src/record.rs - 单帧特征记录及其组装
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

use crate::args::OutputToggles;
use crate::model::{Detection, GAZE_FORWARD};

/// 会话开始即固定的记录列结构：各块尺寸与排好序的动作单元名称表。
/// 整个会话的每一行都服从同一结构，与逐帧检测成败无关。
#[derive(Debug, Clone)]
pub struct RecordSchema {
  pub toggles: OutputToggles,
  pub num_landmarks: usize,
  pub num_eye_landmarks: usize,
  pub num_modes: usize,
  /// 回归动作单元名称，字典序
  pub au_reg_names: Vec<String>,
  /// 二分类动作单元名称，字典序
  pub au_class_names: Vec<String>,
}

impl RecordSchema {
  pub fn new(
    toggles: OutputToggles,
    num_landmarks: usize,
    num_eye_landmarks: usize,
    num_modes: usize,
    mut au_reg_names: Vec<String>,
    mut au_class_names: Vec<String>,
  ) -> Self {
    // 名称表只在这里排序一次，此后的表头与每一行都按该次序查找
    au_reg_names.sort();
    au_class_names.sort();
    Self {
      toggles,
      num_landmarks,
      num_eye_landmarks,
      num_modes,
      au_reg_names,
      au_class_names,
    }
  }

  /// 本结构下每行的总列数
  pub fn column_count(&self) -> usize {
    let mut count = 4;
    if self.toggles.gaze {
      count += 8 + 2 * self.num_eye_landmarks;
    }
    if self.toggles.pose {
      count += 6;
    }
    if self.toggles.landmarks_2d {
      count += 2 * self.num_landmarks;
    }
    if self.toggles.landmarks_3d {
      count += 3 * self.num_landmarks;
    }
    if self.toggles.model_params {
      count += 6 + self.num_modes;
    }
    if self.toggles.aus {
      count += self.au_reg_names.len() + self.au_class_names.len();
    }
    count
  }
}

/// 会话计算出的视线结果；缺省为正视前方、零视线角
#[derive(Debug, Clone)]
pub struct GazeResult {
  pub direction_0: [f64; 3],
  pub direction_1: [f64; 3],
  pub angle: [f64; 2],
}

impl Default for GazeResult {
  fn default() -> Self {
    Self {
      direction_0: GAZE_FORWARD,
      direction_1: GAZE_FORWARD,
      angle: [0.0, 0.0],
    }
  }
}

/// 单帧输出记录
#[derive(Debug, Clone)]
pub struct FeatureRecord {
  /// 帧号，1 起
  pub frame: u64,
  /// 时间戳（秒）
  pub timestamp: f64,
  /// 置信度 [0, 1]，即便跟踪未初始化也有定义
  pub confidence: f64,
  pub success: bool,
  pub gaze: GazeResult,
  pub eye_landmarks: Vec<[f64; 2]>,
  pub pose: [f64; 6],
  pub landmarks_2d: Vec<[f64; 2]>,
  pub landmarks_3d: Vec<[f64; 3]>,
  pub params_rigid: [f64; 6],
  pub params_nonrigid: Vec<f64>,
  /// 回归动作单元得分，与 schema.au_reg_names 对位
  pub au_reg: Vec<f64>,
  /// 二分类动作单元得分，与 schema.au_class_names 对位
  pub au_class: Vec<f64>,
}

/// 由帧上下文与各能力输出组装一条记录。
/// 跟踪未初始化（`detection.face` 为 None）时，所有随模型状态走的块
/// 一律填零；置信度与成功标记始终照实输出。
#[allow(clippy::too_many_arguments)]
pub fn build_record(
  schema: &RecordSchema,
  frame_index: u64,
  timestamp: f64,
  detection: &Detection,
  gaze: GazeResult,
  pose: &[f64; 6],
  aus_reg: &[(String, f64)],
  aus_class: &[(String, f64)],
) -> FeatureRecord {
  let (eye_landmarks, pose, landmarks_2d, landmarks_3d, params_rigid, params_nonrigid) =
    match &detection.face {
      Some(face) => (
        face.eye_landmarks.clone(),
        *pose,
        face.landmarks_2d.clone(),
        face.landmarks_3d.clone(),
        face.params_rigid,
        face.params_nonrigid.clone(),
      ),
      None => (
        vec![[0.0; 2]; schema.num_eye_landmarks],
        [0.0; 6],
        vec![[0.0; 2]; schema.num_landmarks],
        vec![[0.0; 3]; schema.num_landmarks],
        [0.0; 6],
        vec![0.0; schema.num_modes],
      ),
    };

  FeatureRecord {
    frame: frame_index + 1,
    timestamp,
    confidence: detection.confidence(),
    success: detection.success,
    gaze,
    eye_landmarks,
    pose,
    landmarks_2d,
    landmarks_3d,
    params_rigid,
    params_nonrigid,
    au_reg: lookup_scores(&schema.au_reg_names, aus_reg),
    au_class: lookup_scores(&schema.au_class_names, aus_class),
  }
}

/// 按名称查找得分；名称缺席的动作单元记零
fn lookup_scores(names: &[String], scores: &[(String, f64)]) -> Vec<f64> {
  names
    .iter()
    .map(|name| {
      scores
        .iter()
        .find(|(candidate, _)| candidate == name)
        .map(|(_, score)| *score)
        .unwrap_or(0.0)
    })
    .collect()
}
