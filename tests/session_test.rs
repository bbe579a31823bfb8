// 该文件是 Lianpu（脸谱）项目的一部分。
// tests/session_test.rs - 会话级集成测试
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

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use lianpu::args::{Config, OutputToggles, SessionPlan, SourceDescriptor};
use lianpu::input::{Frame, FrameSource, InputError, SourceKind, open_source};
use lianpu::model::{
  AlignedFrame, Detection, FaceAnalyser, ModelError, StubAnalyser, StubGaze, StubTracker,
};
use lianpu::session::{ControlEvent, ControlInput, NoControl, Session, SessionEnd};

fn write_image_sequence(dir: &Path, count: usize) {
  for i in 0..count {
    let shade = (40 + i * 30) as u8;
    let image = RgbImage::from_pixel(64, 48, Rgb([shade, shade, shade]));
    image.save(dir.join(format!("{:03}.png", i))).unwrap();
  }
}

fn image_dir_plan(dir: &Path, as_video: bool) -> SessionPlan {
  SessionPlan {
    source: SourceDescriptor::ImageDir {
      dir: dir.to_path_buf(),
      as_video,
    },
    report: None,
    hog: None,
    aligned_dir: None,
    tracked_video: None,
  }
}

fn config_for(plan: SessionPlan, quiet: bool) -> Config {
  Config {
    plans: vec![plan],
    toggles: OutputToggles::default(),
    fx: 0.0,
    fy: 0.0,
    cx: 0.0,
    cy: 0.0,
    codec: *b"DIVX",
    quiet,
  }
}

fn run_plan(
  config: &Config,
  tracker: &mut StubTracker,
  control: &mut dyn ControlInput,
) -> SessionEnd {
  let plan = &config.plans[0];
  let mut source = open_source(&plan.source).unwrap();
  let gaze = StubGaze;
  let mut analyser = StubAnalyser::new();
  let mut session = Session {
    tracker,
    gaze: &gaze,
    analyser: &mut analyser,
  };
  session
    .run(config, plan, source.as_mut(), control)
    .unwrap()
}

fn csv_lines(path: &Path) -> Vec<String> {
  fs::read_to_string(path)
    .unwrap()
    .lines()
    .map(str::to_owned)
    .collect()
}

fn fields(line: &str) -> Vec<String> {
  line.split(", ").map(str::to_owned).collect()
}

#[test]
fn image_sequence_produces_report_descriptors_and_aligned_faces() {
  let workspace = TempDir::new().unwrap();
  let frames_dir = workspace.path().join("frames");
  fs::create_dir(&frames_dir).unwrap();
  write_image_sequence(&frames_dir, 3);

  let aligned_dir = workspace.path().join("aligned");
  let report = workspace.path().join("out.csv");
  let hog = workspace.path().join("out.hog");
  let mut plan = image_dir_plan(&frames_dir, false);
  plan.report = Some(report.clone());
  plan.hog = Some(hog.clone());
  plan.aligned_dir = Some(aligned_dir.clone());

  let config = config_for(plan, true);
  let mut tracker = StubTracker::new();
  let end = run_plan(&config, &mut tracker, &mut NoControl);
  assert_eq!(end, SessionEnd::Finished);

  // 报表：表头加每帧恰好一行
  let lines = csv_lines(&report);
  assert_eq!(lines.len(), 4);
  assert!(lines[0].starts_with("frame, timestamp, confidence, success, gaze_0_x"));
  // 二分类动作单元列按字典序，AU45 收尾
  assert!(lines[0].ends_with(", AU28_c, AU45_c"));
  let header_columns = fields(&lines[0]).len();
  for (i, line) in lines[1..].iter().enumerate() {
    let row = fields(line);
    assert_eq!(row.len(), header_columns);
    assert_eq!(row[0], (i + 1).to_string());
  }

  // 描述子流：每帧 16 字节头部加 12x12x31 个 f32
  let hog_bytes = fs::read(&hog).unwrap();
  assert_eq!(hog_bytes.len(), 3 * (16 + 12 * 12 * 31 * 4));

  // 对齐人脸：1 起、零填充到六位的文件名
  for name in ["frame_det_000001.bmp", "frame_det_000002.bmp", "frame_det_000003.bmp"] {
    assert!(aligned_dir.join(name).is_file(), "缺少 {}", name);
  }
}

#[test]
fn initial_failure_rows_are_zero_filled_but_confidence_stays_real() {
  let workspace = TempDir::new().unwrap();
  let frames_dir = workspace.path().join("frames");
  fs::create_dir(&frames_dir).unwrap();
  write_image_sequence(&frames_dir, 3);

  let report = workspace.path().join("out.csv");
  let mut plan = image_dir_plan(&frames_dir, true);
  plan.report = Some(report.clone());

  let config = config_for(plan, true);
  let mut tracker = StubTracker::new().with_failures([0]);
  run_plan(&config, &mut tracker, &mut NoControl);

  let lines = csv_lines(&report);
  let first = fields(&lines[1]);
  let second = fields(&lines[2]);

  // 首帧失败且跟踪尚未初始化：成功为 0，置信度照实，姿态块全零
  assert_eq!(first[3], "0");
  assert_eq!(first[2], "0.1");
  let pose_offset = 4 + 8 + 2 * 56;
  for value in &first[pose_offset..pose_offset + 6] {
    assert_eq!(value, "0");
  }
  // 失败帧的视线取缺省朝向
  assert_eq!(first[4], "0");
  assert_eq!(first[6], "-1");

  // 次帧成功：置信度与平移分量为真实值
  assert_eq!(second[3], "1");
  assert_eq!(second[2], "0.95");
  assert_eq!(second[pose_offset + 2], "500");
}

#[test]
fn descriptor_stream_flags_failed_frames() {
  let workspace = TempDir::new().unwrap();
  let frames_dir = workspace.path().join("frames");
  fs::create_dir(&frames_dir).unwrap();
  write_image_sequence(&frames_dir, 2);

  let hog = workspace.path().join("out.hog");
  let mut plan = image_dir_plan(&frames_dir, true);
  plan.hog = Some(hog.clone());

  let config = config_for(plan, true);
  let mut tracker = StubTracker::new().with_failures([0]);
  run_plan(&config, &mut tracker, &mut NoControl);

  let bytes = fs::read(&hog).unwrap();
  let frame_len = 16 + 12 * 12 * 31 * 4;
  assert_eq!(bytes.len(), 2 * frame_len);

  let read_i32 = |offset: usize| i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
  let read_f32 = |offset: usize| f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());

  assert_eq!(read_i32(0), 12);
  assert_eq!(read_i32(4), 12);
  assert_eq!(read_i32(8), 31);
  assert_eq!(read_f32(12), -1.0);
  assert_eq!(read_f32(frame_len + 12), 1.0);
}

/// 固定帧率的替身输入源，用来验证时间戳推导
struct ScriptedSource {
  frames: Vec<RgbImage>,
  next: u64,
  fps: f64,
}

impl ScriptedSource {
  fn new(count: usize, fps: f64) -> Self {
    Self {
      frames: (0..count)
        .map(|_| RgbImage::from_pixel(32, 24, Rgb([128, 128, 128])))
        .collect(),
      next: 0,
      fps,
    }
  }
}

impl Iterator for ScriptedSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let index = self.next;
    let image = self.frames.get(index as usize)?.clone();
    self.next += 1;
    Some(Ok(Frame { image, index }))
  }
}

impl FrameSource for ScriptedSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Video
  }

  fn width(&self) -> u32 {
    32
  }

  fn height(&self) -> u32 {
    24
  }

  fn fps(&self) -> Option<f64> {
    Some(self.fps)
  }

  fn frame_count(&self) -> Option<u64> {
    Some(self.frames.len() as u64)
  }
}

#[test]
fn timestamps_follow_source_frame_rate() {
  let workspace = TempDir::new().unwrap();
  let report = workspace.path().join("out.csv");
  let plan = SessionPlan {
    source: SourceDescriptor::Video(PathBuf::from("scripted")),
    report: Some(report.clone()),
    hog: None,
    aligned_dir: None,
    tracked_video: None,
  };
  let config = config_for(plan, true);

  let mut tracker = StubTracker::new();
  let gaze = StubGaze;
  let mut analyser = StubAnalyser::new();
  let mut session = Session {
    tracker: &mut tracker,
    gaze: &gaze,
    analyser: &mut analyser,
  };
  let mut source = ScriptedSource::new(10, 25.0);
  let end = session
    .run(&config, &config.plans[0], &mut source, &mut NoControl)
    .unwrap();
  assert_eq!(end, SessionEnd::Finished);

  let lines = csv_lines(&report);
  assert_eq!(lines.len(), 11);
  let timestamps: Vec<String> = lines[1..].iter().map(|line| fields(line)[1].clone()).collect();
  assert_eq!(
    timestamps,
    ["0", "0.04", "0.08", "0.12", "0.16", "0.2", "0.24", "0.28", "0.32", "0.36"]
  );
}

/// 按帧序喂事件的替身控制输入
struct ScriptedControl {
  events: VecDeque<Option<ControlEvent>>,
}

impl ScriptedControl {
  fn new(events: impl IntoIterator<Item = Option<ControlEvent>>) -> Self {
    Self {
      events: events.into_iter().collect(),
    }
  }
}

impl ControlInput for ScriptedControl {
  fn poll(&mut self) -> Option<ControlEvent> {
    self.events.pop_front().flatten()
  }
}

#[test]
fn quit_event_ends_session_without_remaining_frames() {
  let workspace = TempDir::new().unwrap();
  let frames_dir = workspace.path().join("frames");
  fs::create_dir(&frames_dir).unwrap();
  write_image_sequence(&frames_dir, 5);

  let report = workspace.path().join("out.csv");
  let mut plan = image_dir_plan(&frames_dir, true);
  plan.report = Some(report.clone());

  let config = config_for(plan, false);
  let mut tracker = StubTracker::new();
  let mut control = ScriptedControl::new([Some(ControlEvent::Quit)]);
  let end = run_plan(&config, &mut tracker, &mut control);
  assert_eq!(end, SessionEnd::Quit);

  // 终止前已写出的首行保留，其余帧不再处理
  let lines = csv_lines(&report);
  assert_eq!(lines.len(), 2);
}

#[test]
fn reset_event_keeps_frame_numbering_monotonic() {
  let workspace = TempDir::new().unwrap();
  let frames_dir = workspace.path().join("frames");
  fs::create_dir(&frames_dir).unwrap();
  write_image_sequence(&frames_dir, 4);

  let report = workspace.path().join("out.csv");
  let mut plan = image_dir_plan(&frames_dir, true);
  plan.report = Some(report.clone());

  let config = config_for(plan, false);
  let mut tracker = StubTracker::new();
  let mut control = ScriptedControl::new([None, Some(ControlEvent::Reset)]);
  let end = run_plan(&config, &mut tracker, &mut control);
  assert_eq!(end, SessionEnd::Finished);

  let lines = csv_lines(&report);
  assert_eq!(lines.len(), 5);
  let frames: Vec<String> = lines[1..].iter().map(|line| fields(line)[0].clone()).collect();
  assert_eq!(frames, ["1", "2", "3", "4"]);
}

/// 记录收尾调用次数的分析器包装
struct RecordingAnalyser {
  inner: StubAnalyser,
  post_process_calls: usize,
  reset_calls: usize,
}

impl RecordingAnalyser {
  fn new() -> Self {
    Self {
      inner: StubAnalyser::new(),
      post_process_calls: 0,
      reset_calls: 0,
    }
  }
}

impl FaceAnalyser for RecordingAnalyser {
  fn advance(
    &mut self,
    image: &RgbImage,
    detection: &Detection,
    timestamp: f64,
  ) -> Result<AlignedFrame, ModelError> {
    self.inner.advance(image, detection, timestamp)
  }

  fn aus_reg(&self) -> Vec<(String, f64)> {
    self.inner.aus_reg()
  }

  fn aus_class(&self) -> Vec<(String, f64)> {
    self.inner.aus_class()
  }

  fn au_reg_names(&self) -> Vec<String> {
    self.inner.au_reg_names()
  }

  fn au_class_names(&self) -> Vec<String> {
    self.inner.au_class_names()
  }

  fn post_process(&mut self, report: &Path) -> Result<(), ModelError> {
    self.post_process_calls += 1;
    self.inner.post_process(report)
  }

  fn reset(&mut self) {
    self.reset_calls += 1;
    self.inner.reset();
  }
}

fn run_with(
  config: &Config,
  plan: &SessionPlan,
  tracker: &mut StubTracker,
  analyser: &mut RecordingAnalyser,
) -> SessionEnd {
  let mut source = open_source(&plan.source).unwrap();
  let gaze = StubGaze;
  let mut session = Session {
    tracker,
    gaze: &gaze,
    analyser,
  };
  session
    .run(config, plan, source.as_mut(), &mut NoControl)
    .unwrap()
}

#[test]
fn teardown_post_processes_reports_and_resets_capabilities() {
  let workspace = TempDir::new().unwrap();
  let mut plans = Vec::new();
  for name in ["a", "b"] {
    let dir = workspace.path().join(name);
    fs::create_dir(&dir).unwrap();
    write_image_sequence(&dir, 2);
    let mut plan = image_dir_plan(&dir, true);
    plan.report = Some(workspace.path().join(format!("{}.csv", name)));
    plans.push(plan);
  }
  let config = Config {
    plans,
    toggles: OutputToggles::default(),
    fx: 0.0,
    fy: 0.0,
    cx: 0.0,
    cy: 0.0,
    codec: *b"DIVX",
    quiet: true,
  };

  let mut tracker = StubTracker::new().with_failures([0]);
  let mut analyser = RecordingAnalyser::new();
  for plan in &config.plans {
    let end = run_with(&config, plan, &mut tracker, &mut analyser);
    assert_eq!(end, SessionEnd::Finished);
  }

  // 每个会话收尾各做一次报表后处理和分析器重置
  assert_eq!(analyser.post_process_calls, 2);
  assert_eq!(analyser.reset_calls, 2);

  // 第二个会话从未初始化的跟踪状态起步：首帧再次落入失败帧集合，
  // 且没有可用的模型状态，整块填零
  let lines = csv_lines(config.plans[1].report.as_deref().unwrap());
  let first_row = fields(&lines[1]);
  assert_eq!(first_row[3], "0");
  let pose_offset = 4 + 8 + 2 * 56;
  for value in &first_row[pose_offset..pose_offset + 6] {
    assert_eq!(value, "0");
  }
  let second_row = fields(&lines[2]);
  assert_eq!(second_row[3], "1");
}

#[test]
fn post_processing_requires_au_output_and_a_report() {
  let workspace = TempDir::new().unwrap();
  let frames_dir = workspace.path().join("frames");
  fs::create_dir(&frames_dir).unwrap();
  write_image_sequence(&frames_dir, 2);

  let mut tracker = StubTracker::new();
  let mut analyser = RecordingAnalyser::new();

  // 有报表但关闭动作单元输出
  let mut plan = image_dir_plan(&frames_dir, true);
  plan.report = Some(workspace.path().join("no_aus.csv"));
  let mut config = config_for(plan, true);
  config.toggles.aus = false;
  run_with(&config, &config.plans[0], &mut tracker, &mut analyser);

  // 开动作单元但没有报表
  let config = config_for(image_dir_plan(&frames_dir, true), true);
  run_with(&config, &config.plans[0], &mut tracker, &mut analyser);

  assert_eq!(analyser.post_process_calls, 0);
  assert_eq!(analyser.reset_calls, 2);
}

#[test]
fn disabling_blocks_shrinks_report_to_core_columns() {
  let workspace = TempDir::new().unwrap();
  let frames_dir = workspace.path().join("frames");
  fs::create_dir(&frames_dir).unwrap();
  write_image_sequence(&frames_dir, 1);

  let report = workspace.path().join("out.csv");
  let mut plan = image_dir_plan(&frames_dir, true);
  plan.report = Some(report.clone());

  let mut config = config_for(plan, true);
  config.toggles = OutputToggles {
    landmarks_2d: false,
    landmarks_3d: false,
    model_params: false,
    pose: false,
    aus: false,
    gaze: false,
  };
  let mut tracker = StubTracker::new();
  run_plan(&config, &mut tracker, &mut NoControl);

  let lines = csv_lines(&report);
  assert_eq!(lines[0], "frame, timestamp, confidence, success");
  assert_eq!(fields(&lines[1]).len(), 4);
}
