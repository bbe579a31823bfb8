// 该文件是 Lianpu（脸谱）项目的一部分。
// src/output/csv_output.rs - 特征报表（表格）编码器
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

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::record::{FeatureRecord, RecordSchema};

/// 各块的显示精度（有效数字位数），为保持与既有下游消费者的兼容而固定
const PREC_TIMESTAMP: usize = 9;
const PREC_CONFIDENCE: usize = 2;
const PREC_GAZE: usize = 5;
const PREC_DEFAULT: usize = 4;

/// 特征报表输出：每会话一个表头，之后逐帧追加一行。
/// 列布局由 RecordSchema 固定，整个会话恒定。
pub struct CsvOutput<W: Write> {
  writer: W,
  schema: RecordSchema,
}

impl CsvOutput<BufWriter<File>> {
  /// 在指定路径创建报表并写入表头
  pub fn create(path: &Path, schema: RecordSchema) -> io::Result<Self> {
    Self::from_writer(BufWriter::new(File::create(path)?), schema)
  }
}

impl<W: Write> CsvOutput<W> {
  pub fn from_writer(writer: W, schema: RecordSchema) -> io::Result<Self> {
    let mut output = Self { writer, schema };
    output.write_header()?;
    Ok(output)
  }

  fn write_header(&mut self) -> io::Result<()> {
    let mut header = String::from("frame, timestamp, confidence, success");

    if self.schema.toggles.gaze {
      header.push_str(
        ", gaze_0_x, gaze_0_y, gaze_0_z, gaze_1_x, gaze_1_y, gaze_1_z, gaze_angle_x, gaze_angle_y",
      );
      for i in 0..self.schema.num_eye_landmarks {
        let _ = write!(header, ", eye_lmk_x_{}", i);
      }
      for i in 0..self.schema.num_eye_landmarks {
        let _ = write!(header, ", eye_lmk_y_{}", i);
      }
    }

    if self.schema.toggles.pose {
      header.push_str(", pose_Tx, pose_Ty, pose_Tz, pose_Rx, pose_Ry, pose_Rz");
    }

    if self.schema.toggles.landmarks_2d {
      for i in 0..self.schema.num_landmarks {
        let _ = write!(header, ", x_{}", i);
      }
      for i in 0..self.schema.num_landmarks {
        let _ = write!(header, ", y_{}", i);
      }
    }

    if self.schema.toggles.landmarks_3d {
      for i in 0..self.schema.num_landmarks {
        let _ = write!(header, ", X_{}", i);
      }
      for i in 0..self.schema.num_landmarks {
        let _ = write!(header, ", Y_{}", i);
      }
      for i in 0..self.schema.num_landmarks {
        let _ = write!(header, ", Z_{}", i);
      }
    }

    if self.schema.toggles.model_params {
      header.push_str(", p_scale, p_rx, p_ry, p_rz, p_tx, p_ty");
      for i in 0..self.schema.num_modes {
        let _ = write!(header, ", p_{}", i);
      }
    }

    if self.schema.toggles.aus {
      for name in &self.schema.au_reg_names {
        let _ = write!(header, ", {}_r", name);
      }
      for name in &self.schema.au_class_names {
        let _ = write!(header, ", {}_c", name);
      }
    }

    writeln!(self.writer, "{}", header)
  }

  /// 追加一行数据；列序与表头严格一致
  pub fn write_record(&mut self, record: &FeatureRecord) -> io::Result<()> {
    let mut row = record.frame.to_string();
    let _ = write!(row, ", {}", format_sig(record.timestamp, PREC_TIMESTAMP));
    let _ = write!(row, ", {}", format_sig(record.confidence, PREC_CONFIDENCE));
    let _ = write!(row, ", {}", if record.success { "1" } else { "0" });

    if self.schema.toggles.gaze {
      for value in record
        .gaze
        .direction_0
        .iter()
        .chain(record.gaze.direction_1.iter())
        .chain(record.gaze.angle.iter())
      {
        let _ = write!(row, ", {}", format_sig(*value, PREC_GAZE));
      }
      for lmk in &record.eye_landmarks {
        let _ = write!(row, ", {}", format_sig(lmk[0], PREC_GAZE));
      }
      for lmk in &record.eye_landmarks {
        let _ = write!(row, ", {}", format_sig(lmk[1], PREC_GAZE));
      }
    }

    if self.schema.toggles.pose {
      for value in &record.pose {
        let _ = write!(row, ", {}", format_sig(*value, PREC_DEFAULT));
      }
    }

    if self.schema.toggles.landmarks_2d {
      for axis in 0..2 {
        for lmk in &record.landmarks_2d {
          let _ = write!(row, ", {}", format_sig(lmk[axis], PREC_DEFAULT));
        }
      }
    }

    if self.schema.toggles.landmarks_3d {
      for axis in 0..3 {
        for lmk in &record.landmarks_3d {
          let _ = write!(row, ", {}", format_sig(lmk[axis], PREC_DEFAULT));
        }
      }
    }

    if self.schema.toggles.model_params {
      for value in record.params_rigid.iter().chain(record.params_nonrigid.iter()) {
        let _ = write!(row, ", {}", format_sig(*value, PREC_DEFAULT));
      }
    }

    if self.schema.toggles.aus {
      for value in record.au_reg.iter().chain(record.au_class.iter()) {
        let _ = write!(row, ", {}", format_sig(*value, PREC_DEFAULT));
      }
    }

    writeln!(self.writer, "{}", row)
  }

  /// 刷新并关闭报表
  pub fn finish(mut self) -> io::Result<()> {
    self.writer.flush()
  }
}

/// 按有效数字位数格式化，复现 C++ 流式输出 setprecision 的缺省浮点格式：
/// 指数落在 [-4, 位数) 内用定点并去尾零，否则用科学计数法。
pub fn format_sig(value: f64, digits: usize) -> String {
  if value == 0.0 {
    return "0".to_string();
  }
  if !value.is_finite() {
    return value.to_string();
  }

  let scientific = format!("{:.*e}", digits - 1, value);
  let (mantissa, exponent) = scientific
    .split_once('e')
    .unwrap_or((scientific.as_str(), "0"));
  let exponent: i32 = exponent.parse().unwrap_or(0);

  if exponent < -4 || exponent >= digits as i32 {
    let mantissa = if mantissa.contains('.') {
      mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
      mantissa
    };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exponent.abs())
  } else {
    let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
    let fixed = format!("{:.*}", decimals, value);
    if fixed.contains('.') {
      fixed
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
    } else {
      fixed
    }
  }
}
