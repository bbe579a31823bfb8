// 该文件是 Lianpu（脸谱）项目的一部分。
// src/output/draw.rs - 跟踪结果叠加绘制
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

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::model::Detection;
use crate::record::GazeResult;

/// 确定度高于该阈值的帧不绘制叠加（可信度太低，画了只会误导）
const VISUALISATION_BOUNDARY: f64 = 0.2;

/// 视线射线的绘制长度（像素）
const GAZE_RAY_LENGTH: f32 = 50.0;

/// 在帧图像上叠加跟踪结果：特征点、人脸包围框与视线射线。
/// 颜色随确定度渐变，可信时偏蓝，不可信时偏红。
pub fn draw_tracking(image: &mut RgbImage, detection: &Detection, gaze: &GazeResult) {
  if detection.certainty >= VISUALISATION_BOUNDARY {
    return;
  }
  let Some(face) = &detection.face else {
    return;
  };

  let vis = (detection.certainty.clamp(-1.0, 1.0) + 1.0) / (VISUALISATION_BOUNDARY + 1.0);
  let color = Rgb([(vis * 255.0) as u8, 0, ((1.0 - vis) * 255.0) as u8]);

  for lmk in &face.landmarks_2d {
    draw_filled_circle_mut(image, (lmk[0] as i32, lmk[1] as i32), 1, color);
  }

  if let Some(rect) = bounding_rect(&face.landmarks_2d) {
    draw_hollow_rect_mut(image, rect, color);
  }

  if detection.success {
    for (eye_lmks, direction) in [
      (
        &face.eye_landmarks[..face.eye_landmarks.len() / 2],
        gaze.direction_0,
      ),
      (
        &face.eye_landmarks[face.eye_landmarks.len() / 2..],
        gaze.direction_1,
      ),
    ] {
      if let Some(origin) = centroid(eye_lmks) {
        let end = (
          origin.0 + GAZE_RAY_LENGTH * direction[0] as f32,
          origin.1 + GAZE_RAY_LENGTH * direction[1] as f32,
        );
        draw_line_segment_mut(image, origin, end, Rgb([110, 220, 0]));
      }
    }
  }
}

fn bounding_rect(landmarks: &[[f64; 2]]) -> Option<Rect> {
  let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
  let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
  for lmk in landmarks {
    min_x = min_x.min(lmk[0]);
    min_y = min_y.min(lmk[1]);
    max_x = max_x.max(lmk[0]);
    max_y = max_y.max(lmk[1]);
  }
  let width = (max_x - min_x) as u32;
  let height = (max_y - min_y) as u32;
  if landmarks.is_empty() || width == 0 || height == 0 {
    return None;
  }
  Some(Rect::at(min_x as i32, min_y as i32).of_size(width, height))
}

fn centroid(points: &[[f64; 2]]) -> Option<(f32, f32)> {
  if points.is_empty() {
    return None;
  }
  let (sum_x, sum_y) = points
    .iter()
    .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
  Some((
    (sum_x / points.len() as f64) as f32,
    (sum_y / points.len() as f64) as f32,
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{FaceTracker, StubTracker};

  fn frame() -> RgbImage {
    RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]))
  }

  #[test]
  fn confident_detection_marks_pixels() {
    let mut tracker = StubTracker::new();
    let detection = tracker.detect_video(&frame()).unwrap();
    let mut image = frame();
    draw_tracking(&mut image, &detection, &GazeResult::default());
    assert!(image.pixels().any(|p| p.0 != [0, 0, 0]));
  }

  #[test]
  fn uncertain_detection_draws_nothing() {
    let mut tracker = StubTracker::new();
    let mut detection = tracker.detect_video(&frame()).unwrap();
    detection.certainty = 0.9;
    let mut image = frame();
    draw_tracking(&mut image, &detection, &GazeResult::default());
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }
}
