//! 驱动层错误类型定义

use crate::joint::JointField;
use crate::table::ProtocolVariant;
use roboteq_protocol::{OperationMode, ProtocolError};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 指令缺少当前运行模式必需的字段
    ///
    /// 校验失败时不修改任何已暂存的状态。
    #[error("Missing {field} field in joint command for channel {channel}")]
    InvalidJointCommand { channel: usize, field: JointField },

    /// 请求的 (协议变体, 运行模式) 组合没有映射表
    #[error("Operation mode {mode:?} is not supported by the {variant:?} protocol variant")]
    UnsupportedMode {
        variant: ProtocolVariant,
        mode: OperationMode,
    },

    /// 构造时请求的通道数超过硬件上限
    #[error("Requested {requested} channels, controller supports at most {max}")]
    TooManyChannels { requested: usize, max: usize },

    /// 聚合指令的元素个数与非忽略通道数不一致（过多或过少）
    #[error("Joint command has {actual} elements, expected {expected}")]
    CommandCountMismatch { expected: usize, actual: usize },

    /// 对象字典镜像中还没有该寄存器的值
    #[error("No value received yet for object 0x{index:04X}:{sub}")]
    ValueUnavailable { index: u16, sub: u8 },

    /// 该操作只在 DS402 协议变体下有意义
    #[error("Operation requires the DS402 protocol variant")]
    RequiresDs402,
}
