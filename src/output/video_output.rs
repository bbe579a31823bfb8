// 该文件是 Lianpu（脸谱）项目的一部分。
// src/output/video_output.rs - 跟踪叠加视频输出
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
use ffmpeg_next::format::{Pixel, output};
use ffmpeg_next::software::scaling::{context::Context as ScalingContext, flag::Flags};
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{Rational, codec};
use image::RgbImage;
use tracing::warn;

use super::OutputError;

/// 跟踪叠加视频输出：接收已叠加绘制的帧并编码写出
pub struct VideoOutput {
  /// FFmpeg 输出上下文
  output_context: ffmpeg::format::context::Output,
  /// 视频编码器
  encoder: ffmpeg::encoder::Video,
  /// 缩放上下文（RGB -> YUV）
  scaler: ScalingContext,
  /// 视频宽度
  width: u32,
  /// 视频高度
  height: u32,
  /// 整数化的帧率
  fps: i32,
  /// 帧索引
  frame_index: u64,
  /// 视频流索引
  stream_index: usize,
  /// 时间基准
  time_base: Rational,
}

/// 将四字符编码器标识映射到 FFmpeg 编码器
fn codec_id(fourcc: &[u8; 4]) -> codec::Id {
  match fourcc {
    b"H264" | b"X264" | b"AVC1" => codec::Id::H264,
    b"MJPG" => codec::Id::MJPEG,
    b"DIVX" | b"XVID" | b"MPG4" => codec::Id::MPEG4,
    other => {
      warn!(
        "未知的编码器标识 {:?}，改用 MPEG4",
        String::from_utf8_lossy(other)
      );
      codec::Id::MPEG4
    }
  }
}

impl VideoOutput {
  /// 创建一个新的视频输出；打开失败只作警告处理，由调用方决定继续与否
  pub fn new(
    path: &Path,
    width: u32,
    height: u32,
    fps: f64,
    fourcc: &[u8; 4],
  ) -> Result<Self, OutputError> {
    ffmpeg::init()?;

    let mut output_context = output(&path)?;

    let codec = ffmpeg::encoder::find(codec_id(fourcc))
      .or_else(|| ffmpeg::encoder::find(codec::Id::MPEG4))
      .ok_or(ffmpeg::Error::EncoderNotFound)?;

    let mut stream = output_context.add_stream(codec)?;
    let stream_index = stream.index();

    let fps = fps.round().max(1.0) as i32;

    let context_encoder = ffmpeg::codec::context::Context::new_with_codec(codec);
    let mut encoder = context_encoder.encoder().video()?;

    encoder.set_width(width);
    encoder.set_height(height);
    encoder.set_format(Pixel::YUV420P);
    encoder.set_frame_rate(Some(Rational::new(fps, 1)));
    encoder.set_time_base(Rational::new(1, fps));

    let encoder = encoder.open()?;
    stream.set_parameters(&encoder);

    let time_base = stream.time_base();

    // 写入文件头
    output_context.write_header()?;

    // 创建缩放上下文（RGB24 -> YUV420P）
    let scaler = ScalingContext::get(
      Pixel::RGB24,
      width,
      height,
      Pixel::YUV420P,
      width,
      height,
      Flags::BILINEAR,
    )?;

    Ok(Self {
      output_context,
      encoder,
      scaler,
      width,
      height,
      fps,
      frame_index: 0,
      stream_index,
      time_base,
    })
  }

  /// 编码并写入帧
  fn encode_frame(&mut self, frame: Option<&Video>) -> Result<(), OutputError> {
    if let Some(f) = frame {
      self.encoder.send_frame(f)?;
    } else {
      self.encoder.send_eof()?;
    }

    let mut packet = ffmpeg::Packet::empty();
    while self.encoder.receive_packet(&mut packet).is_ok() {
      packet.set_stream(self.stream_index);
      packet.rescale_ts(Rational::new(1, self.fps), self.time_base);
      packet.write_interleaved(&mut self.output_context)?;
    }

    Ok(())
  }

  /// 追加一帧（已绘制好叠加层的图像）
  pub fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    // 创建 RGB 帧
    let mut rgb_frame = Video::new(Pixel::RGB24, self.width, self.height);
    let data = image.as_raw();
    let stride = rgb_frame.stride(0);
    let width = self.width as usize;
    let height = self.height as usize;

    // 复制数据，处理步长对齐
    let frame_data = rgb_frame.data_mut(0);
    for y in 0..height {
      let src_start = y * width * 3;
      let src_end = src_start + width * 3;
      let dst_start = y * stride;
      frame_data[dst_start..dst_start + width * 3].copy_from_slice(&data[src_start..src_end]);
    }

    // 转换为 YUV
    let mut yuv_frame = Video::empty();
    self.scaler.run(&rgb_frame, &mut yuv_frame)?;

    // 设置 PTS
    yuv_frame.set_pts(Some(self.frame_index as i64));
    self.frame_index += 1;

    // 编码并写入
    self.encode_frame(Some(&yuv_frame))?;

    Ok(())
  }

  /// 刷新编码器并写入文件尾
  pub fn finish(mut self) -> Result<(), OutputError> {
    self.encode_frame(None)?;
    self.output_context.write_trailer()?;
    Ok(())
  }
}
