// 该文件是 Lianpu（脸谱）项目的一部分。
// src/session.rs - 会话编排
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

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::args::{Config, SessionPlan};
use crate::input::{self, FrameSource};
use crate::model::{CameraIntrinsics, Eye, FaceAnalyser, FaceTracker, GazeEstimator};
use crate::output::SessionOutputs;
use crate::record::{GazeResult, RecordSchema, build_record};

/// 协作式取消事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
  /// 会话内复位：清空跟踪状态后继续
  Reset,
  /// 立即终止整个运行，跳过会话收尾
  Quit,
}

/// 取消信号来源；每帧非阻塞轮询一次。
/// 自带的 [`CtrlcControl`] 只产生终止事件；复位事件由嵌入方
/// 自行实现本 trait 注入（比如接上别的信号或交互通道）。
pub trait ControlInput {
  fn poll(&mut self) -> Option<ControlEvent>;
}

/// 不接收任何控制事件
pub struct NoControl;

impl ControlInput for NoControl {
  fn poll(&mut self) -> Option<ControlEvent> {
    None
  }
}

/// 将 SIGINT 映射为终止事件；不产生复位事件
pub struct CtrlcControl {
  rx: std::sync::mpsc::Receiver<()>,
}

impl CtrlcControl {
  pub fn install() -> Result<Self> {
    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
      let _ = tx.send(());
    })
    .context("无法安装 Ctrl-C 处理器")?;
    Ok(Self { rx })
  }
}

impl ControlInput for CtrlcControl {
  fn poll(&mut self) -> Option<ControlEvent> {
    self.rx.try_recv().ok().map(|_| ControlEvent::Quit)
  }
}

/// 会话结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
  /// 输入耗尽，正常收尾
  Finished,
  /// 终止请求，整个运行结束
  Quit,
}

/// 会话编排器：独占持有各能力，逐会话复用，会话间显式重置
pub struct Session<'a, T, G, A>
where
  T: FaceTracker,
  G: GazeEstimator,
  A: FaceAnalyser,
{
  pub tracker: &'a mut T,
  pub gaze: &'a G,
  pub analyser: &'a mut A,
}

impl<T, G, A> Session<'_, T, G, A>
where
  T: FaceTracker,
  G: GazeEstimator,
  A: FaceAnalyser,
{
  /// 运行一个会话：一个输入源与其配对的输出，直至输入耗尽或被终止
  pub fn run(
    &mut self,
    config: &Config,
    plan: &SessionPlan,
    source: &mut dyn FrameSource,
    control: &mut dyn ControlInput,
  ) -> Result<SessionEnd> {
    // 会话打开：解析内参（此后整个会话不变）、固定列结构、打开输出句柄
    let intrinsics = CameraIntrinsics::resolve(
      config.fx,
      config.fy,
      config.cx,
      config.cy,
      source.width(),
      source.height(),
    );
    let fps = input::resolved_fps(source.fps());
    let schema = RecordSchema::new(
      config.toggles,
      self.tracker.num_landmarks(),
      self.tracker.num_eye_landmarks(),
      self.tracker.num_modes(),
      self.analyser.au_reg_names(),
      self.analyser.au_class_names(),
    );
    let mut outputs = SessionOutputs::open(
      plan,
      schema.clone(),
      source.width(),
      source.height(),
      fps,
      &config.codec,
    )?;

    // 对齐 / 描述子 / 动作单元任一在用时才推进分析器
    let wants_analysis = outputs.wants_aligned_face() || config.toggles.aus;
    let video_mode = source.video_mode();
    let total_frames = source.frame_count();
    let mut reported_completion = 0u64;

    info!(
      "开始跟踪: {} ({}x{} @ {} fps)",
      plan.source.display(),
      source.width(),
      source.height(),
      fps
    );

    while let Some(frame_result) = source.next() {
      let frame = frame_result.with_context(|| format!("读取帧失败: {}", plan.source.display()))?;
      let timestamp = frame.index as f64 / fps;

      // 检测 / 跟踪
      let detection = if video_mode {
        self.tracker.detect_video(&frame.image)?
      } else {
        self.tracker.detect_image(&frame.image)?
      };

      // 头部姿态
      let pose = self.tracker.pose(&intrinsics);

      // 视线：仅在启用、检测成功且有眼部子模型时估计，否则取缺省
      let gaze = match &detection.face {
        Some(face)
          if config.toggles.gaze && detection.success && self.tracker.has_eye_model() =>
        {
          let direction_0 = self.gaze.estimate(face, &intrinsics, Eye::Left);
          let direction_1 = self.gaze.estimate(face, &intrinsics, Eye::Right);
          let angle = self.gaze.angle(direction_0, direction_1, &pose);
          GazeResult {
            direction_0,
            direction_1,
            angle,
          }
        }
        _ => GazeResult::default(),
      };

      // 人脸对齐与动作单元分析
      let analysis = if wants_analysis {
        Some(self.analyser.advance(&frame.image, &detection, timestamp)?)
      } else {
        None
      };

      // 描述子流：失败帧也写出，失败以标记编码而非丢帧
      if let Some(hog_output) = outputs.hog.as_mut() {
        let hog = analysis.as_ref().and_then(|a| a.hog.as_ref());
        hog_output.write_frame(detection.success, hog)?;
      }

      // 对齐人脸图片：写出失败对整个运行是致命的
      if let Some(aligned_output) = outputs.aligned.as_ref() {
        let aligned = analysis
          .as_ref()
          .and_then(|a| a.aligned.as_ref())
          .ok_or_else(|| anyhow!("分析器未产出对齐人脸"))?;
        aligned_output.write_frame(aligned, frame.index)?;
      }

      // 跟踪叠加视频
      #[cfg(feature = "video-ffmpeg")]
      if let Some(video) = outputs.video.as_mut() {
        let mut canvas = frame.image.clone();
        crate::output::draw::draw_tracking(&mut canvas, &detection, &gaze);
        video.write_frame(&canvas)?;
      }

      // 报表行：无论检测成败，每帧恰好一行
      if let Some(csv) = outputs.csv.as_mut() {
        let record = build_record(
          &schema,
          frame.index,
          timestamp,
          &detection,
          gaze,
          &pose,
          &self.analyser.aus_reg(),
          &self.analyser.aus_class(),
        );
        csv.write_record(&record)?;
      }

      // 进度汇报：总帧数未知时不做
      if let Some(total) = total_frames {
        if total > 0 {
          let percent_steps = (frame.index + 1) * 10 / total;
          while reported_completion < percent_steps {
            reported_completion += 1;
            info!("进度 {}%", reported_completion * 10);
          }
        }
      }

      // 协作式取消：安静模式不查
      if !config.quiet {
        match control.poll() {
          Some(ControlEvent::Reset) => {
            warn!("收到复位请求，重置跟踪器");
            self.tracker.reset();
          }
          Some(ControlEvent::Quit) => {
            warn!("收到终止请求，跳过会话收尾");
            return Ok(SessionEnd::Quit);
          }
          None => {}
        }
      }
    }

    // 会话收尾：先关句柄，再做报表后处理，最后重置能力供下一会话复用
    outputs.finish()?;

    if config.toggles.aus {
      if let Some(report) = &plan.report {
        info!("对动作单元预测做后处理");
        self.analyser.post_process(report)?;
      }
    }

    self.tracker.reset();
    self.analyser.reset();

    info!("会话完成: {}", plan.source.display());
    Ok(SessionEnd::Finished)
  }
}
