//! DS402 (CiA-402) 控制字/状态字编解码
//!
//! 控制字 (0x6040) 驱动状态机迁移，状态字 (0x6041) 上报当前
//! 驱动状态。位布局与 CiA-402 规范逐位一致。
//!
//! ## 状态分类
//!
//! 状态字低 7 位分两遍掩码匹配：先按 0x4F 匹配四个与
//! quick-stop 位无关的状态，再按 0x6F 匹配其余四个；两遍都
//! 不中视为解码失败，绝不回落到默认状态。

use crate::ProtocolError;
use crate::mode::OperationMode;
use bilge::prelude::*;

/// 控制字请求的状态机迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Shutdown,
    SwitchOn,
    EnableOperation,
    DisableVoltage,
    QuickStop,
    DisableOperation,
    FaultReset,
}

impl Transition {
    /// 迁移对应的 7 位基码
    fn base_code(self) -> u16 {
        match self {
            Transition::Shutdown => 0x06,
            Transition::SwitchOn => 0x07,
            Transition::EnableOperation => 0x0F,
            Transition::DisableVoltage => 0x00,
            Transition::QuickStop => 0x02,
            Transition::DisableOperation => 0x07,
            Transition::FaultReset => 0x80,
        }
    }
}

/// 控制字
///
/// 由 (运行模式, 迁移, halt 标志) 构造；运行模式决定随迁移
/// 一并置位的斜坡使能位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord {
    pub operation_mode: OperationMode,
    pub transition: Transition,
    pub enable_halt: bool,
}

impl ControlWord {
    pub fn new(operation_mode: OperationMode, transition: Transition, enable_halt: bool) -> Self {
        Self {
            operation_mode,
            transition,
            enable_halt,
        }
    }

    /// 编码为 16 位寄存器值
    pub fn to_raw(self) -> u16 {
        let mut word = self.transition.base_code();

        match self.operation_mode {
            // 位置轮廓族：bit 5（立即更换设定点）
            OperationMode::PositionProfile | OperationMode::RelativePositionProfile => {
                word |= 1 << 5;
            }
            // 速度/模拟族：bit 4-6 全部斜坡使能
            OperationMode::AnalogVelocity
            | OperationMode::AnalogPosition
            | OperationMode::Velocity
            | OperationMode::VelocityPosition => {
                word |= 0x70;
            }
            _ => {}
        }

        if self.enable_halt {
            word |= 0x100;
        }

        word
    }
}

/// 驱动状态机的命名状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchOn,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActive,
    Fault,
}

/// 状态字的独立标志位视图
///
/// 状态位（bit 0-3, 5, 6）经掩码分类得到 [`DriveState`]，
/// 这里只取与状态无关的辅助标志。
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy)]
struct StatusWordBits {
    ready_to_switch_on: bool,
    switched_on: bool,
    operation_enabled: bool,
    fault: bool,
    voltage_enabled: bool,
    quick_stop: bool,
    switch_on_disabled: bool,
    warning: bool,
    reserved: u2,
    target_reached: bool,
    internal_limit_active: bool,
    vendor: u4,
}

/// 解码后的状态字
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord {
    pub raw: u16,
    pub state: DriveState,
    pub voltage_enabled: bool,
    pub warning: bool,
    pub target_reached: bool,
    pub internal_limit_active: bool,
}

impl StatusWord {
    /// 从 16 位寄存器值解码
    ///
    /// 低 7 位不匹配任何已知状态时返回
    /// [`ProtocolError::UnknownDriveState`]。
    pub fn from_raw(raw: u16) -> Result<Self, ProtocolError> {
        let state = Self::parse_state(raw)?;
        let bits = StatusWordBits::from(u16::new(raw));
        Ok(Self {
            raw,
            state,
            voltage_enabled: bits.voltage_enabled(),
            warning: bits.warning(),
            target_reached: bits.target_reached(),
            internal_limit_active: bits.internal_limit_active(),
        })
    }

    fn parse_state(raw: u16) -> Result<DriveState, ProtocolError> {
        match raw & 0x4F {
            0x00 => return Ok(DriveState::NotReadyToSwitchOn),
            0x40 => return Ok(DriveState::SwitchOnDisabled),
            0x0F => return Ok(DriveState::FaultReactionActive),
            0x08 => return Ok(DriveState::Fault),
            _ => {}
        }

        match raw & 0x6F {
            0x21 => Ok(DriveState::ReadyToSwitchOn),
            0x23 => Ok(DriveState::SwitchOn),
            0x27 => Ok(DriveState::OperationEnabled),
            0x07 => Ok(DriveState::QuickStopActive),
            _ => Err(ProtocolError::UnknownDriveState { raw }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_operation_with_halt() {
        // 基码 0x0F 与 bit 8 与模式无关
        let word = ControlWord::new(OperationMode::TorqueProfile, Transition::EnableOperation, true);
        assert_eq!(word.to_raw(), 0x10F);

        let word = ControlWord::new(
            OperationMode::RelativePosition,
            Transition::EnableOperation,
            true,
        );
        assert_eq!(word.to_raw() & 0x10F, 0x10F);
    }

    #[test]
    fn test_transition_base_codes() {
        let raw = |t| ControlWord::new(OperationMode::TorqueProfile, t, false).to_raw();
        assert_eq!(raw(Transition::Shutdown), 0x06);
        assert_eq!(raw(Transition::SwitchOn), 0x07);
        assert_eq!(raw(Transition::EnableOperation), 0x0F);
        assert_eq!(raw(Transition::DisableVoltage), 0x00);
        assert_eq!(raw(Transition::QuickStop), 0x02);
        assert_eq!(raw(Transition::DisableOperation), 0x07);
        assert_eq!(raw(Transition::FaultReset), 0x80);
    }

    #[test]
    fn test_position_profile_family_sets_bit_5() {
        let word = ControlWord::new(
            OperationMode::RelativePositionProfile,
            Transition::Shutdown,
            false,
        );
        assert_eq!(word.to_raw(), 0x06 | 1 << 5);

        let word = ControlWord::new(OperationMode::PositionProfile, Transition::SwitchOn, false);
        assert_eq!(word.to_raw(), 0x07 | 1 << 5);
    }

    #[test]
    fn test_velocity_family_enables_all_ramps() {
        for mode in [
            OperationMode::Velocity,
            OperationMode::VelocityPosition,
            OperationMode::AnalogPosition,
            OperationMode::AnalogVelocity,
        ] {
            let word = ControlWord::new(mode, Transition::EnableOperation, false);
            assert_eq!(word.to_raw(), 0x0F | 0x70, "mode {mode:?}");
        }
    }

    #[test]
    fn test_profiled_velocity_adds_no_ramp_bits() {
        let word = ControlWord::new(
            OperationMode::VelocityProfile,
            Transition::EnableOperation,
            false,
        );
        assert_eq!(word.to_raw(), 0x0F);
    }

    #[test]
    fn test_decode_operation_enabled() {
        let status = StatusWord::from_raw(0x27).unwrap();
        assert_eq!(status.state, DriveState::OperationEnabled);
        assert!(!status.warning);
        assert!(!status.target_reached);
    }

    #[test]
    fn test_decode_first_pass_states() {
        assert_eq!(
            StatusWord::from_raw(0x00).unwrap().state,
            DriveState::NotReadyToSwitchOn
        );
        assert_eq!(
            StatusWord::from_raw(0x40).unwrap().state,
            DriveState::SwitchOnDisabled
        );
        assert_eq!(
            StatusWord::from_raw(0x0F).unwrap().state,
            DriveState::FaultReactionActive
        );
        assert_eq!(StatusWord::from_raw(0x08).unwrap().state, DriveState::Fault);
    }

    #[test]
    fn test_decode_second_pass_states() {
        assert_eq!(
            StatusWord::from_raw(0x21).unwrap().state,
            DriveState::ReadyToSwitchOn
        );
        assert_eq!(
            StatusWord::from_raw(0x23).unwrap().state,
            DriveState::SwitchOn
        );
        assert_eq!(
            StatusWord::from_raw(0x07).unwrap().state,
            DriveState::QuickStopActive
        );
    }

    #[test]
    fn test_decode_auxiliary_flags() {
        let status = StatusWord::from_raw(1 << 11 | 1 << 10 | 1 << 7 | 1 << 4 | 0x27).unwrap();
        assert_eq!(status.state, DriveState::OperationEnabled);
        assert!(status.voltage_enabled);
        assert!(status.warning);
        assert!(status.target_reached);
        assert!(status.internal_limit_active);
    }

    #[test]
    fn test_decode_unknown_state_fails() {
        // 低 7 位 0x01 两遍掩码都不匹配
        let err = StatusWord::from_raw(0x01).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownDriveState { raw: 0x01 });
        assert!(StatusWord::from_raw(0x25).is_err());
    }
}
