//! 关节状态/指令记录
//!
//! 指令与反馈共用同一个普通记录类型；字段为 `None` 表示
//! "未知"。哪些字段有意义由通道的运行模式决定。

use std::fmt;

/// 关节记录的通用字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointField {
    Position,
    Speed,
    Effort,
    Raw,
    Acceleration,
}

impl fmt::Display for JointField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JointField::Position => "position",
            JointField::Speed => "speed",
            JointField::Effort => "effort",
            JointField::Raw => "raw",
            JointField::Acceleration => "acceleration",
        };
        f.write_str(name)
    }
}

/// 关节状态/指令记录
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointState {
    /// 位置，单位 rad 或 m
    pub position: Option<f64>,
    /// 速度，单位 rad/s 或 m/s
    pub speed: Option<f64>,
    /// 力矩，单位 Nm 或 N
    pub effort: Option<f64>,
    /// 无量纲原始值（功率等级、斜率等）
    pub raw: Option<f64>,
    /// 加速度，单位 rad/s² 或 m/s²
    pub acceleration: Option<f64>,
}

impl JointState {
    /// 按字段读取
    pub fn field(&self, field: JointField) -> Option<f64> {
        match field {
            JointField::Position => self.position,
            JointField::Speed => self.speed,
            JointField::Effort => self.effort,
            JointField::Raw => self.raw,
            JointField::Acceleration => self.acceleration,
        }
    }

    /// 按字段写入
    pub fn set_field(&mut self, field: JointField, value: f64) {
        let slot = match field {
            JointField::Position => &mut self.position,
            JointField::Speed => &mut self.speed,
            JointField::Effort => &mut self.effort,
            JointField::Raw => &mut self.raw,
            JointField::Acceleration => &mut self.acceleration,
        };
        *slot = Some(value);
    }

    /// 是否所有字段都未知
    pub fn is_unknown(&self) -> bool {
        self.position.is_none()
            && self.speed.is_none()
            && self.effort.is_none()
            && self.raw.is_none()
            && self.acceleration.is_none()
    }
}
