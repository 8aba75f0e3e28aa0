//! # Roboteq Protocol
//!
//! Roboteq 多通道电机控制器的 CANopen 对象字典协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `objects`: 对象字典坐标常量（厂商寄存器 + DS402 标准寄存器）
//! - `ds402`: DS402 (CiA-402) 控制字/状态字编解码
//! - `factors`: 设备原始整数与 SI 单位之间的换算
//! - `mode`: 运行模式枚举及其模式寄存器编码
//! - `status`: 控制器状态记录与状态/故障标志位域
//!
//! ## 数值约定
//!
//! 对象字典中的多字节整数使用小端字节序（CANopen 约定）。
//! 相对量寄存器使用 [-1000, 1000] 的定点比例表示。

pub mod ds402;
pub mod factors;
pub mod mode;
pub mod objects;
pub mod status;

// 重新导出常用类型
pub use ds402::{ControlWord, DriveState, StatusWord, Transition};
pub use factors::{Factors, PositionSource};
pub use mode::OperationMode;
pub use objects::{DataKind, Object, ObjectAddr};
pub use status::{ControllerStatus, FaultFlags, StatusFlags};

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// 状态字的低 7 位不属于任何已知驱动状态
    #[error("Unknown drive state in status word: 0x{raw:04X}")]
    UnknownDriveState { raw: u16 },
}
