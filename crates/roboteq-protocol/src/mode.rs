//! 运行模式枚举
//!
//! 每个通道独立配置运行模式；模式决定驱动层使用的反馈/指令
//! 寄存器映射表。模式在一次反馈/指令周期内不可变，只能通过
//! 显式的重新配置调用更换。

/// 通道运行模式
///
/// - `Ignored`：通道完全不参与（不出现在聚合指令/反馈中）
/// - `None`：只上报状态，不接受指令（开环）
/// - 其余模式见各变体文档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperationMode {
    /// 通道被忽略
    Ignored,
    /// 只上报状态，不控制
    #[default]
    None,
    /// 速度闭环，无轮廓
    Velocity,
    /// 速度闭环，带加速度轮廓
    VelocityProfile,
    /// 速度-位置闭环（由速度指令积分出位置轨迹），无轮廓
    VelocityPosition,
    /// 速度-位置闭环，带轮廓
    VelocityPositionProfile,
    /// 相对位置闭环（指令/反馈为 [-1000, 1000] 比例），无轮廓
    RelativePosition,
    /// 相对位置闭环，带速度轮廓
    RelativePositionProfile,
    /// 绝对位置闭环（编码器计数），带速度轮廓
    PositionProfile,
    /// 转矩闭环，带斜率
    TorqueProfile,
    /// 基于模拟输入反馈的位置闭环
    AnalogPosition,
    /// 基于模拟输入反馈的速度闭环
    AnalogVelocity,
}

impl OperationMode {
    /// 写入驱动模式寄存器 (0x6060) 的值
    ///
    /// 模拟反馈模式在驱动侧以普通速度模式运行，写寄存器时
    /// 映射为速度模式的编码。
    pub fn register_value(self) -> i8 {
        match self {
            OperationMode::Ignored | OperationMode::None => 0,
            OperationMode::Velocity => 2,
            OperationMode::VelocityProfile => 3,
            OperationMode::VelocityPosition => -4,
            OperationMode::VelocityPositionProfile => -3,
            OperationMode::RelativePosition => -1,
            OperationMode::RelativePositionProfile => -2,
            OperationMode::PositionProfile => 1,
            OperationMode::TorqueProfile => 4,
            OperationMode::AnalogPosition | OperationMode::AnalogVelocity => 2,
        }
    }
}
