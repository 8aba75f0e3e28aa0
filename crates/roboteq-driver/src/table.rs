//! 按 (协议变体, 运行模式) 的静态映射表
//!
//! 每个模式的反馈对象、指令对象、换算函数和跟踪位都由
//! [`ModeTable::build`] 一次性给出；反馈查询、指令校验、PDO
//! 分组等所有操作都查同一张表，枚举不会在多处重复展开。
//!
//! 两个协议变体共用同一个通道类型，由 [`ProtocolVariant`]
//! 选择表集：
//!
//! - `Direct`：闭环模式共用每通道一个 `SetCommand` int32，
//!   反馈来自厂商 `Feedback` 寄存器
//! - `Ds402`：CiA-402 标准寄存器集，每通道一个 0x800 区块

use crate::error::DriverError;
use crate::joint::JointField;
use roboteq_protocol::{Factors, Object, OperationMode, PositionSource, objects};
use smallvec::SmallVec;

/// 控制器协议变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVariant {
    /// 厂商直连对象（通用指令寄存器）
    Direct,
    /// DS402 标准寄存器
    #[default]
    Ds402,
}

/// 反馈寄存器值 → SI 字段的换算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedbackConv {
    /// 0.1 A 电流读数 → 转矩
    CurrentToTorque,
    /// [-1000, 1000] 功率等级 → 比例
    PwmRatio,
    /// RPM → rad/s
    RpmSpeed,
    /// 相对速度比例 → SI
    RatioSpeed,
    /// 相对位置比例 → SI（带位置来源分派）
    RatioPosition,
    /// 编码器计数 → SI
    EncoderPosition,
}

impl FeedbackConv {
    pub(crate) fn apply(self, raw: i64, factors: &Factors, source: PositionSource) -> f64 {
        match self {
            FeedbackConv::CurrentToTorque => factors.current_to_torque_si(raw as i32),
            FeedbackConv::PwmRatio => factors.pwm_to_float(raw as i32),
            FeedbackConv::RpmSpeed => factors.rpm_to_si(raw as f64),
            FeedbackConv::RatioSpeed => factors.relative_speed_to_si(raw as i32),
            FeedbackConv::RatioPosition => factors.position_to_si(raw as i32, source),
            FeedbackConv::EncoderPosition => factors.absolute_encoder_position_to_si(raw as i32),
        }
    }
}

/// SI 指令字段 → 寄存器值的换算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandConv {
    /// rad/s → RPM
    RpmSpeed,
    /// rad/s² → 0.1 RPM/s 斜率
    RpmAcceleration,
    /// SI → 相对速度比例
    RatioSpeed,
    /// SI → 相对位置比例
    RatioPosition,
    /// 转矩 → 相对转矩比例（受电流上限饱和）
    RatioTorque,
    /// 转矩 → 0.01 A 电流指令
    CurrentFromTorque,
    /// 转矩斜率 → 1e-4 A/s 电流斜率
    TorqueSlope,
    /// SI → 编码器计数
    EncoderPosition,
}

impl CommandConv {
    pub(crate) fn apply(self, value: f64, factors: &Factors) -> i64 {
        match self {
            CommandConv::RpmSpeed => factors.rpm_from_si(value).round() as i64,
            CommandConv::RpmAcceleration => (factors.rpm_from_si(value) * 10.0).round() as i64,
            CommandConv::RatioSpeed => factors.relative_speed_from_si(value) as i64,
            CommandConv::RatioPosition => factors.relative_position_from_si(value) as i64,
            CommandConv::RatioTorque => factors.relative_torque_from_si(value) as i64,
            CommandConv::CurrentFromTorque => factors.current_from_torque_si(value) as i64,
            CommandConv::TorqueSlope => factors.current_slope_from_torque_slope_si(value) as i64,
            CommandConv::EncoderPosition => factors.encoder_position_from_si(value) as i64,
        }
    }
}

/// 一个反馈寄存器及其落点字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FeedbackEntry {
    pub object: Object,
    pub field: JointField,
    pub conv: FeedbackConv,
}

/// 一个指令寄存器及其必需的来源字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommandEntry {
    pub object: Object,
    pub field: JointField,
    pub conv: CommandConv,
}

/// 一个 (变体, 模式, 通道) 组合的完整映射表
///
/// 跟踪位按反馈条目的位置分配：条目 i 对应掩码位 `1 << i`。
#[derive(Debug, Clone, Default)]
pub(crate) struct ModeTable {
    pub feedback: SmallVec<[FeedbackEntry; 4]>,
    pub commands: SmallVec<[CommandEntry; 4]>,
}

impl ModeTable {
    /// 构造映射表
    ///
    /// `Ignored`/`None` 得到空表；变体不支持的模式是硬错误，
    /// 绝不静默回落。
    pub fn build(
        variant: ProtocolVariant,
        mode: OperationMode,
        channel: usize,
    ) -> Result<Self, DriverError> {
        if matches!(mode, OperationMode::Ignored | OperationMode::None) {
            return Ok(Self::default());
        }
        match variant {
            ProtocolVariant::Ds402 => Self::build_ds402(mode, channel),
            ProtocolVariant::Direct => Self::build_direct(mode, channel),
        }
        .ok_or(DriverError::UnsupportedMode { variant, mode })
    }

    /// 全部反馈条目收齐时的掩码值
    pub fn required_mask(&self) -> u32 {
        (1u32 << self.feedback.len()) - 1
    }

    fn build_ds402(mode: OperationMode, channel: usize) -> Option<Self> {
        use OperationMode::*;

        let ch = channel as u8;
        let block = |o: Object| o.at_channel_block(channel);
        let mut table = Self::default();

        // 所有模式都读电机电流和输出功率
        table.feedback.push(FeedbackEntry {
            object: objects::MOTOR_AMPS.at_sub_offset(ch),
            field: JointField::Effort,
            conv: FeedbackConv::CurrentToTorque,
        });
        table.feedback.push(FeedbackEntry {
            object: objects::APPLIED_POWER_LEVEL.at_sub_offset(ch),
            field: JointField::Raw,
            conv: FeedbackConv::PwmRatio,
        });

        let mut feedback = |object, field, conv| {
            table.feedback.push(FeedbackEntry {
                object,
                field,
                conv,
            });
        };

        match mode {
            Velocity | VelocityPosition => feedback(
                block(objects::ACTUAL_VELOCITY),
                JointField::Speed,
                FeedbackConv::RpmSpeed,
            ),
            VelocityProfile | VelocityPositionProfile => feedback(
                block(objects::ACTUAL_PROFILE_VELOCITY),
                JointField::Speed,
                FeedbackConv::RpmSpeed,
            ),
            RelativePosition | RelativePositionProfile => feedback(
                block(objects::POSITION),
                JointField::Position,
                FeedbackConv::RatioPosition,
            ),
            PositionProfile => feedback(
                block(objects::POSITION),
                JointField::Position,
                FeedbackConv::EncoderPosition,
            ),
            AnalogVelocity => feedback(
                block(objects::ACTUAL_VELOCITY),
                JointField::Speed,
                FeedbackConv::RatioSpeed,
            ),
            AnalogPosition => feedback(
                block(objects::ACTUAL_VELOCITY),
                JointField::Position,
                FeedbackConv::RatioPosition,
            ),
            // 转矩模式的 effort 已经从电流读出
            TorqueProfile => {}
            Ignored | None => unreachable!("handled by build"),
        }

        let command = |object, field, conv| CommandEntry {
            object,
            field,
            conv,
        };

        match mode {
            Velocity | VelocityPosition => table.commands.push(command(
                block(objects::TARGET_VELOCITY),
                JointField::Speed,
                CommandConv::RpmSpeed,
            )),
            AnalogVelocity => table.commands.push(command(
                block(objects::TARGET_VELOCITY),
                JointField::Speed,
                CommandConv::RatioSpeed,
            )),
            AnalogPosition => table.commands.push(command(
                block(objects::TARGET_VELOCITY),
                JointField::Position,
                CommandConv::RatioPosition,
            )),
            VelocityProfile | VelocityPositionProfile => {
                table.commands.push(command(
                    block(objects::TARGET_TORQUE),
                    JointField::Effort,
                    CommandConv::CurrentFromTorque,
                ));
                table.commands.push(command(
                    block(objects::TARGET_PROFILE_VELOCITY),
                    JointField::Speed,
                    CommandConv::RpmSpeed,
                ));
                table.commands.push(command(
                    block(objects::PROFILE_ACCELERATION),
                    JointField::Acceleration,
                    CommandConv::RpmAcceleration,
                ));
                table.commands.push(command(
                    block(objects::PROFILE_DECELERATION),
                    JointField::Acceleration,
                    CommandConv::RpmAcceleration,
                ));
            }
            RelativePositionProfile | PositionProfile => {
                let position_conv = if mode == PositionProfile {
                    CommandConv::EncoderPosition
                } else {
                    CommandConv::RatioPosition
                };
                table.commands.push(command(
                    block(objects::TARGET_POSITION),
                    JointField::Position,
                    position_conv,
                ));
                table.commands.push(command(
                    block(objects::PROFILE_VELOCITY),
                    JointField::Speed,
                    CommandConv::RpmSpeed,
                ));
                table.commands.push(command(
                    block(objects::PROFILE_ACCELERATION),
                    JointField::Acceleration,
                    CommandConv::RpmAcceleration,
                ));
                table.commands.push(command(
                    block(objects::PROFILE_DECELERATION),
                    JointField::Acceleration,
                    CommandConv::RpmAcceleration,
                ));
            }
            RelativePosition => table.commands.push(command(
                block(objects::TARGET_POSITION),
                JointField::Position,
                CommandConv::RatioPosition,
            )),
            TorqueProfile => {
                table.commands.push(command(
                    block(objects::TARGET_TORQUE),
                    JointField::Effort,
                    CommandConv::CurrentFromTorque,
                ));
                table.commands.push(command(
                    block(objects::TORQUE_SLOPE),
                    JointField::Raw,
                    CommandConv::TorqueSlope,
                ));
            }
            Ignored | None => unreachable!("handled by build"),
        }

        Some(table)
    }

    fn build_direct(mode: OperationMode, channel: usize) -> Option<Self> {
        use OperationMode::*;

        let ch = channel as u8;
        let mut table = Self::default();

        // 转矩模式直接从 Feedback 读 effort，不再读电流
        if mode != TorqueProfile {
            table.feedback.push(FeedbackEntry {
                object: objects::MOTOR_AMPS.at_sub_offset(ch),
                field: JointField::Effort,
                conv: FeedbackConv::CurrentToTorque,
            });
        }
        table.feedback.push(FeedbackEntry {
            object: objects::APPLIED_POWER_LEVEL.at_sub_offset(ch),
            field: JointField::Raw,
            conv: FeedbackConv::PwmRatio,
        });

        let feedback_object = objects::FEEDBACK.at_sub_offset(ch);
        let (feedback_field, feedback_conv, command_field, command_conv) = match mode {
            Velocity | VelocityPosition => (
                JointField::Speed,
                FeedbackConv::RatioSpeed,
                JointField::Speed,
                CommandConv::RatioSpeed,
            ),
            RelativePosition | PositionProfile => (
                JointField::Position,
                FeedbackConv::RatioPosition,
                JointField::Position,
                CommandConv::RatioPosition,
            ),
            TorqueProfile => (
                JointField::Effort,
                FeedbackConv::CurrentToTorque,
                JointField::Effort,
                CommandConv::RatioTorque,
            ),
            // 速度轮廓、相对位置轮廓与模拟反馈模式只存在于 DS402 变体
            _ => return Option::None,
        };

        table.feedback.push(FeedbackEntry {
            object: feedback_object,
            field: feedback_field,
            conv: feedback_conv,
        });
        table.commands.push(CommandEntry {
            object: objects::SET_COMMAND.at_sub_offset(ch),
            field: command_field,
            conv: command_conv,
        });

        Some(table)
    }
}
