// 该文件是 Lianpu（脸谱）项目的一部分。
// src/input/video_source.rs - 视频文件输入源
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

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{Pixel, input};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use image::RgbImage;

use super::{Frame, FrameSource, InputError, SourceKind};

/// 视频文件输入源
pub struct VideoSource {
  /// FFmpeg 输入上下文
  input_context: ffmpeg::format::context::Input,
  /// 视频流索引
  video_stream_index: usize,
  /// 视频解码器
  decoder: ffmpeg::decoder::Video,
  /// 缩放上下文（源格式 -> RGB24）
  scaler: ScalingContext,
  /// 帧索引
  frame_index: u64,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
  /// 元数据中的帧率（可能是 NaN，由会话统一归一）
  fps: f64,
  /// 元数据中的总帧数
  frame_count: Option<u64>,
  /// 是否已向解码器发送 EOF
  eof_sent: bool,
  /// 是否结束
  finished: bool,
}

impl VideoSource {
  /// 创建一个新的视频输入源
  pub fn new(path: &Path) -> Result<Self, InputError> {
    ffmpeg::init()?;

    let input_context =
      input(&path).map_err(|e| InputError::OpenVideo(format!("{}: {}", path.display(), e)))?;

    let video_stream = input_context
      .streams()
      .best(Type::Video)
      .ok_or_else(|| InputError::OpenVideo(format!("{}: 找不到视频流", path.display())))?;

    let video_stream_index = video_stream.index();
    let fps = video_stream.avg_frame_rate();
    let fps = fps.numerator() as f64 / fps.denominator() as f64;
    let frame_count = u64::try_from(video_stream.frames()).ok().filter(|n| *n > 0);

    let context_decoder =
      ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())?;
    let decoder = context_decoder.decoder().video()?;

    let width = decoder.width();
    let height = decoder.height();

    let scaler = ScalingContext::get(
      decoder.format(),
      width,
      height,
      Pixel::RGB24,
      width,
      height,
      Flags::BILINEAR,
    )?;

    Ok(Self {
      input_context,
      video_stream_index,
      decoder,
      scaler,
      frame_index: 0,
      width,
      height,
      fps,
      frame_count,
      eof_sent: false,
      finished: false,
    })
  }

  /// 解码下一帧
  fn decode_next_frame(&mut self) -> Result<Option<Video>, InputError> {
    loop {
      // 首先尝试从解码器获取已解码的帧
      let mut decoded = Video::empty();
      if self.decoder.receive_frame(&mut decoded).is_ok() {
        return Ok(Some(decoded));
      }

      // 读取下一个数据包
      let mut packet_iter = self.input_context.packets();
      loop {
        match packet_iter.next() {
          Some((stream, packet)) => {
            if stream.index() == self.video_stream_index {
              self.decoder.send_packet(&packet)?;
              break;
            }
          }
          None => {
            // 发送 EOF（只发一次）后取出解码器中剩余的帧
            if !self.eof_sent {
              self.decoder.send_eof()?;
              self.eof_sent = true;
            }
            if self.decoder.receive_frame(&mut decoded).is_ok() {
              return Ok(Some(decoded));
            }
            return Ok(None);
          }
        }
      }
    }
  }
}

impl Iterator for VideoSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.decode_next_frame() {
      Ok(Some(decoded)) => {
        let mut rgb_frame = Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
          return Some(Err(e.into()));
        }

        let data = rgb_frame.data(0);
        let stride = rgb_frame.stride(0);
        let width = self.width as usize;
        let height = self.height as usize;

        // 处理步长对齐的数据
        let mut image_data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
          let row_start = y * stride;
          let row_end = row_start + width * 3;
          image_data.extend_from_slice(&data[row_start..row_end]);
        }

        let image = match RgbImage::from_raw(self.width, self.height, image_data) {
          Some(img) => img,
          None => {
            return Some(Err(InputError::Capture("无法创建 RGB 图像".into())));
          }
        };

        let frame = Frame {
          image,
          index: self.frame_index,
        };

        self.frame_index += 1;
        Some(Ok(frame))
      }
      Ok(None) => {
        self.finished = true;
        None
      }
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}

impl FrameSource for VideoSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Video
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(self.fps)
  }

  fn frame_count(&self) -> Option<u64> {
    self.frame_count
  }
}
