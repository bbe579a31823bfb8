// 该文件是 Lianpu（脸谱）项目的一部分。
// src/args.rs - 命令行参数与配置解析
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

/// Lianpu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入视频文件（可多次指定，每个文件一个会话）
  #[arg(short = 'f', long = "input", value_name = "FILE")]
  pub inputs: Vec<PathBuf>,

  /// 图片序列目录（可多次指定，每个目录一个会话，按文件名排序读取）
  #[arg(long = "fdir", value_name = "DIR")]
  pub image_dirs: Vec<PathBuf>,

  /// 图片序列按视频模式跟踪（帧间连续，而非逐张独立检测）
  #[arg(long = "asvid")]
  pub images_as_video: bool,

  /// 摄像头设备路径（未指定 -f 与 --fdir 时使用）
  #[arg(long = "device", value_name = "DEV", default_value = "/dev/video0")]
  pub device: String,

  /// 特征报表输出路径（与输入按序配对）
  #[arg(long = "of", value_name = "FILE")]
  pub output_files: Vec<PathBuf>,

  /// HOG 描述子二进制流输出路径（与输入按序配对）
  #[arg(long = "hogalign", value_name = "FILE")]
  pub hog_files: Vec<PathBuf>,

  /// 相似变换对齐人脸图片输出目录（与输入按序配对）
  #[arg(long = "simalign", value_name = "DIR")]
  pub aligned_dirs: Vec<PathBuf>,

  /// 跟踪叠加视频输出路径（与输入按序配对）
  #[arg(long = "ov", value_name = "FILE")]
  pub tracked_videos: Vec<PathBuf>,

  /// 跟踪视频编码器标识（四字符）
  #[arg(long = "oc", value_name = "CODEC", default_value = "DIVX")]
  pub codec: String,

  /// 相机焦距 fx（0 表示由首帧分辨率推定）
  #[arg(long, value_name = "PX", default_value = "0")]
  pub fx: f64,

  /// 相机焦距 fy（0 表示由首帧分辨率推定）
  #[arg(long, value_name = "PX", default_value = "0")]
  pub fy: f64,

  /// 光心横坐标 cx（0 表示取图像中心）
  #[arg(long, value_name = "PX", default_value = "0")]
  pub cx: f64,

  /// 光心纵坐标 cy（0 表示取图像中心）
  #[arg(long, value_name = "PX", default_value = "0")]
  pub cy: f64,

  /// 不输出二维特征点
  #[arg(long = "no-2dfp")]
  pub no_2d_landmarks: bool,

  /// 不输出三维特征点
  #[arg(long = "no-3dfp")]
  pub no_3d_landmarks: bool,

  /// 不输出模型参数
  #[arg(long = "no-mparams")]
  pub no_model_params: bool,

  /// 不输出头部姿态
  #[arg(long = "no-pose")]
  pub no_pose: bool,

  /// 不输出动作单元得分
  #[arg(long = "no-aus")]
  pub no_aus: bool,

  /// 不输出视线方向
  #[arg(long = "no-gaze")]
  pub no_gaze: bool,

  /// 安静模式（不处理交互按键）
  #[arg(short, long)]
  pub quiet: bool,
}

/// 输出块开关，默认全部开启
#[derive(Debug, Clone, Copy)]
pub struct OutputToggles {
  pub landmarks_2d: bool,
  pub landmarks_3d: bool,
  pub model_params: bool,
  pub pose: bool,
  pub aus: bool,
  pub gaze: bool,
}

impl Default for OutputToggles {
  fn default() -> Self {
    Self {
      landmarks_2d: true,
      landmarks_3d: true,
      model_params: true,
      pose: true,
      aus: true,
      gaze: true,
    }
  }
}

/// 输入源描述
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
  /// 视频文件
  Video(PathBuf),
  /// 摄像头设备
  Camera(String),
  /// 图片序列目录
  ImageDir { dir: PathBuf, as_video: bool },
}

impl SourceDescriptor {
  pub fn display(&self) -> String {
    match self {
      SourceDescriptor::Video(path) => path.display().to_string(),
      SourceDescriptor::Camera(device) => device.clone(),
      SourceDescriptor::ImageDir { dir, .. } => dir.display().to_string(),
    }
  }
}

/// 一个会话：一个输入源与其配对的各输出目的地
#[derive(Debug, Clone)]
pub struct SessionPlan {
  pub source: SourceDescriptor,
  pub report: Option<PathBuf>,
  pub hog: Option<PathBuf>,
  pub aligned_dir: Option<PathBuf>,
  pub tracked_video: Option<PathBuf>,
}

/// 解析完成的运行配置
#[derive(Debug, Clone)]
pub struct Config {
  pub plans: Vec<SessionPlan>,
  pub toggles: OutputToggles,
  pub fx: f64,
  pub fy: f64,
  pub cx: f64,
  pub cy: f64,
  pub codec: [u8; 4],
  pub quiet: bool,
}

impl Args {
  /// 将命令行参数解析为强类型配置，并预创建各输出目录
  pub fn resolve(self) -> Result<Config> {
    let toggles = OutputToggles {
      landmarks_2d: !self.no_2d_landmarks,
      landmarks_3d: !self.no_3d_landmarks,
      model_params: !self.no_model_params,
      pose: !self.no_pose,
      aus: !self.no_aus,
      gaze: !self.no_gaze,
    };

    let sources: Vec<SourceDescriptor> = if !self.inputs.is_empty() {
      self.inputs.into_iter().map(SourceDescriptor::Video).collect()
    } else if !self.image_dirs.is_empty() {
      self
        .image_dirs
        .into_iter()
        .map(|dir| SourceDescriptor::ImageDir {
          dir,
          as_video: self.images_as_video,
        })
        .collect()
    } else {
      vec![SourceDescriptor::Camera(self.device)]
    };

    let mut plans = Vec::with_capacity(sources.len());
    for (index, source) in sources.into_iter().enumerate() {
      let plan = SessionPlan {
        source,
        report: self.output_files.get(index).cloned(),
        hog: self.hog_files.get(index).cloned(),
        aligned_dir: self.aligned_dirs.get(index).cloned(),
        tracked_video: self.tracked_videos.get(index).cloned(),
      };

      for parent in [&plan.report, &plan.hog, &plan.tracked_video]
        .into_iter()
        .flatten()
        .filter_map(|path| path.parent())
      {
        create_directory(parent)?;
      }
      if let Some(dir) = &plan.aligned_dir {
        create_directory(dir)?;
      }

      plans.push(plan);
    }

    // 四字符编码器标识；不合法时退回默认，而不是中断运行
    let codec: [u8; 4] = match self.codec.as_bytes().try_into() {
      Ok(codec) => codec,
      Err(_) => {
        warn!("编码器标识 {:?} 不是四字符，改用 DIVX", self.codec);
        *b"DIVX"
      }
    };

    Ok(Config {
      plans,
      toggles,
      fx: self.fx,
      fy: self.fy,
      cx: self.cx,
      cy: self.cy,
      codec,
      quiet: self.quiet,
    })
  }
}

fn create_directory(path: &Path) -> Result<()> {
  if !path.as_os_str().is_empty() && !path.exists() {
    std::fs::create_dir_all(path).with_context(|| format!("无法创建输出目录: {}", path.display()))?;
  }
  Ok(())
}
