// 该文件是 Lianpu（脸谱）项目的一部分。
// src/output/hog_output.rs - FHOG 描述子二进制流编码器
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

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::model::{HOG_CHANNELS, HogDescriptor};

/// FHOG 二进制流输出。
///
/// 每帧一条自描述记录，全部为小端 4 字节字段：
/// 列数 (i32)、行数 (i32)、通道数 (i32, 恒为 31)、好坏标记 (f32, 成功 1.0 / 失败 -1.0)，
/// 随后仅当描述子存在时写出 列×行×31 个 f32 负载（外层列、内层行、最内层通道）。
/// 读取方只凭四个头字段即可恢复帧边界，无需索引。
pub struct HogOutput<W: Write> {
  writer: W,
}

impl HogOutput<BufWriter<File>> {
  pub fn create(path: &Path) -> io::Result<Self> {
    Ok(Self::from_writer(BufWriter::new(File::create(path)?)))
  }
}

impl<W: Write> HogOutput<W> {
  pub fn from_writer(writer: W) -> Self {
    Self { writer }
  }

  /// 写出一帧；描述子未计算时只写 16 字节帧头（列数与行数记零）
  pub fn write_frame(&mut self, good_frame: bool, hog: Option<&HogDescriptor>) -> io::Result<()> {
    let (cols, rows) = hog.map(|h| (h.cols as i32, h.rows as i32)).unwrap_or((0, 0));

    self.writer.write_all(&cols.to_le_bytes())?;
    self.writer.write_all(&rows.to_le_bytes())?;
    self.writer.write_all(&(HOG_CHANNELS as i32).to_le_bytes())?;

    let flag: f32 = if good_frame { 1.0 } else { -1.0 };
    self.writer.write_all(&flag.to_le_bytes())?;

    if let Some(hog) = hog {
      // data 已按写出顺序（列 -> 行 -> 通道）存放
      for value in &hog.data {
        self.writer.write_all(&value.to_le_bytes())?;
      }
    }

    Ok(())
  }

  pub fn finish(mut self) -> io::Result<()> {
    self.writer.flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Read;

  /// 仅凭帧头恢复一帧（自描述性的验证用读取端）
  struct HogFrame {
    cols: i32,
    rows: i32,
    channels: i32,
    good: f32,
    payload: Vec<f32>,
  }

  fn read_frame(reader: &mut impl Read) -> Option<HogFrame> {
    let mut word = [0u8; 4];
    if reader.read_exact(&mut word).is_err() {
      return None;
    }
    let cols = i32::from_le_bytes(word);
    reader.read_exact(&mut word).unwrap();
    let rows = i32::from_le_bytes(word);
    reader.read_exact(&mut word).unwrap();
    let channels = i32::from_le_bytes(word);
    reader.read_exact(&mut word).unwrap();
    let good = f32::from_le_bytes(word);

    let len = (cols * rows * channels) as usize;
    let mut payload = Vec::with_capacity(len);
    for _ in 0..len {
      reader.read_exact(&mut word).unwrap();
      payload.push(f32::from_le_bytes(word));
    }

    Some(HogFrame {
      cols,
      rows,
      channels,
      good,
      payload,
    })
  }

  fn descriptor(rows: usize, cols: usize) -> HogDescriptor {
    let data = (0..rows * cols * HOG_CHANNELS)
      .map(|i| i as f32 * 0.5)
      .collect();
    HogDescriptor { rows, cols, data }
  }

  #[test]
  fn stream_is_self_framing() {
    let mut buffer = Vec::new();
    let mut output = HogOutput::from_writer(&mut buffer);
    output.write_frame(true, Some(&descriptor(5, 5))).unwrap();
    output.write_frame(false, Some(&descriptor(5, 5))).unwrap();
    output.write_frame(false, None).unwrap();
    output.write_frame(true, Some(&descriptor(2, 3))).unwrap();
    output.finish().unwrap();

    let expected = 16 + 3100 + 16 + 3100 + 16 + 16 + 2 * 3 * 31 * 4;
    assert_eq!(buffer.len(), expected);

    let mut cursor = std::io::Cursor::new(buffer);
    let first = read_frame(&mut cursor).unwrap();
    assert_eq!((first.cols, first.rows, first.channels), (5, 5, 31));
    assert_eq!(first.good, 1.0);
    assert_eq!(first.payload.len(), 775);
    assert_eq!(first.payload[1], 0.5);

    let second = read_frame(&mut cursor).unwrap();
    assert_eq!(second.good, -1.0);

    let empty = read_frame(&mut cursor).unwrap();
    assert_eq!((empty.cols, empty.rows, empty.channels), (0, 0, 31));
    assert_eq!(empty.good, -1.0);
    assert!(empty.payload.is_empty());

    let last = read_frame(&mut cursor).unwrap();
    assert_eq!((last.cols, last.rows), (3, 2));

    assert!(read_frame(&mut cursor).is_none());
  }

  #[test]
  fn failed_frame_keeps_negative_flag_with_payload() {
    let mut buffer = Vec::new();
    let mut output = HogOutput::from_writer(&mut buffer);
    output.write_frame(false, Some(&descriptor(1, 1))).unwrap();
    output.finish().unwrap();

    // 失败以标记编码，而不是丢帧
    assert_eq!(buffer.len(), 16 + 31 * 4);
    assert_eq!(f32::from_le_bytes(buffer[12..16].try_into().unwrap()), -1.0);
  }
}
