//! 单通道控制
//!
//! 每个物理轴由一个 [`Channel`] 管理：运行模式、单位换算参数、
//! 最近一次接受的指令，以及反馈更新的位掩码跟踪。
//!
//! ## 更新跟踪
//!
//! 反馈字段以独立、无序的帧到达，没有原子性保证。通道为当前
//! 模式的每个反馈对象分配一个跟踪位；[`Channel::note_update`]
//! 把收到的对象按位累积，累积值等于必需掩码时说明一份完整的
//! 反馈快照已经就绪。更换模式会原子地重置累积值和必需掩码。

use crate::dict::{ObjectDictionary, SdoRequest, Update};
use crate::error::DriverError;
use crate::joint::JointState;
use crate::pdo::{self, PdoMapping};
use crate::table::{ModeTable, ProtocolVariant};
use roboteq_protocol::{
    ControlWord, Factors, OperationMode, PositionSource, StatusWord, Transition, objects,
};
use smallvec::SmallVec;

/// 单个控制器通道
#[derive(Debug, Clone)]
pub struct Channel {
    index: usize,
    variant: ProtocolVariant,
    mode: OperationMode,
    factors: Factors,
    position_source: PositionSource,
    table: ModeTable,
    tracking: u32,
    required_mask: u32,
    last_command: JointState,
}

impl Channel {
    pub(crate) fn new(index: usize, variant: ProtocolVariant) -> Self {
        Self {
            index,
            variant,
            mode: OperationMode::None,
            factors: Factors::default(),
            position_source: PositionSource::default(),
            table: ModeTable::default(),
            tracking: 0,
            required_mask: 0,
            last_command: JointState::default(),
        }
    }

    /// 通道号（0 起）
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    /// 该通道是否完全不参与聚合指令/反馈
    pub fn is_ignored(&self) -> bool {
        self.mode == OperationMode::Ignored
    }

    /// 设置单位换算参数
    pub fn set_factors(&mut self, factors: Factors) {
        self.factors = factors;
    }

    pub fn factors(&self) -> &Factors {
        &self.factors
    }

    /// 设置位置反馈来源
    pub fn set_position_source(&mut self, source: PositionSource) {
        self.position_source = source;
    }

    /// 更换运行模式
    ///
    /// 映射表、累积掩码和必需掩码原子地一起更换；不支持的
    /// (变体, 模式) 组合立即失败且不改动任何状态。
    ///
    /// 模式在一次反馈/指令周期内不可变：调用方必须在没有
    /// 进行中的周期交换时更换模式。
    pub fn set_mode(&mut self, mode: OperationMode) -> Result<(), DriverError> {
        let table = ModeTable::build(self.variant, mode, self.index)?;
        self.required_mask = table.required_mask();
        self.table = table;
        self.mode = mode;
        self.tracking = 0;
        Ok(())
    }

    // ------------------------------------------------------------------
    // 反馈
    // ------------------------------------------------------------------

    /// 由当前模式的反馈对象组装关节状态
    ///
    /// 镜像中还没有值的字段保持未知；`None`/`Ignored` 模式
    /// 返回全未知记录。
    pub fn joint_state(&self, dict: &ObjectDictionary) -> JointState {
        let mut state = JointState::default();
        for entry in &self.table.feedback {
            if let Some(raw) = dict.get(entry.object) {
                let value = entry.conv.apply(raw, &self.factors, self.position_source);
                state.set_field(entry.field, value);
            }
        }
        state
    }

    /// 显式轮询反馈所需的 SDO 读请求
    pub fn query_joint_state(&self) -> Vec<SdoRequest> {
        self.table
            .feedback
            .iter()
            .map(|e| SdoRequest::upload(e.object))
            .collect()
    }

    /// 当前模式反馈对象的周期帧分组
    pub fn joint_state_tpdo_mappings(&self) -> Vec<PdoMapping> {
        pdo::pack(self.table.feedback.iter().map(|e| e.object))
    }

    /// 记录一次变更通知
    ///
    /// 返回累积值此刻是否已覆盖全部必需对象。
    pub fn note_update(&mut self, update: &Update) -> bool {
        for (i, entry) in self.table.feedback.iter().enumerate() {
            if update.contains(entry.object.addr()) {
                self.tracking |= 1 << i;
            }
        }
        self.has_full_update()
    }

    /// 自上次重置以来是否收齐了一份完整的反馈快照
    pub fn has_full_update(&self) -> bool {
        self.tracking & self.required_mask == self.required_mask
    }

    /// 清空累积值（必需掩码不变）
    pub fn reset_tracking(&mut self) {
        self.tracking = 0;
    }

    // ------------------------------------------------------------------
    // 指令
    // ------------------------------------------------------------------

    /// 校验指令并把换算后的寄存器值暂存进字典镜像
    ///
    /// 先对当前模式的全部必需字段完成校验和换算，然后才写入
    /// 任何寄存器、替换 `last_command`；任一字段缺失时整个调用
    /// 失败且不产生任何改动。
    pub fn stage_command(
        &mut self,
        cmd: &JointState,
        dict: &mut ObjectDictionary,
    ) -> Result<(), DriverError> {
        if self.table.commands.is_empty() {
            return Err(DriverError::UnsupportedMode {
                variant: self.variant,
                mode: self.mode,
            });
        }

        let mut staged: SmallVec<[(roboteq_protocol::Object, i64); 4]> = SmallVec::new();
        for entry in &self.table.commands {
            let value = cmd
                .field(entry.field)
                .ok_or(DriverError::InvalidJointCommand {
                    channel: self.index,
                    field: entry.field,
                })?;
            staged.push((entry.object, entry.conv.apply(value, &self.factors)));
        }

        for (object, value) in staged {
            dict.set(object, value);
        }
        self.last_command = *cmd;
        Ok(())
    }

    /// 最近一次被接受的指令
    pub fn joint_command(&self) -> JointState {
        self.last_command
    }

    /// 把当前暂存的指令值下发到设备的 SDO 写请求
    pub fn query_joint_command_download(&self, dict: &ObjectDictionary) -> Vec<SdoRequest> {
        self.table
            .commands
            .iter()
            .map(|e| SdoRequest::download(e.object, dict.get(e.object).unwrap_or(0)))
            .collect()
    }

    /// 当前模式指令对象的周期帧分组
    pub fn joint_command_rpdo_mappings(&self) -> Vec<PdoMapping> {
        pdo::pack(self.table.commands.iter().map(|e| e.object))
    }

    // ------------------------------------------------------------------
    // DS402 状态机
    // ------------------------------------------------------------------

    fn require_ds402(&self) -> Result<(), DriverError> {
        if self.variant == ProtocolVariant::Ds402 {
            Ok(())
        } else {
            Err(DriverError::RequiresDs402)
        }
    }

    /// 请求一次 DS402 状态机迁移的控制字写请求
    pub fn ds402_transition(
        &self,
        transition: Transition,
        enable_halt: bool,
    ) -> Result<SdoRequest, DriverError> {
        self.require_ds402()?;
        let word = ControlWord::new(self.mode, transition, enable_halt);
        Ok(SdoRequest::download(
            objects::CONTROL_WORD.at_channel_block(self.index),
            word.to_raw() as i64,
        ))
    }

    /// 读取状态字的 SDO 请求
    pub fn query_ds402_status(&self) -> Result<SdoRequest, DriverError> {
        self.require_ds402()?;
        Ok(SdoRequest::upload(
            objects::STATUS_WORD.at_channel_block(self.index),
        ))
    }

    /// 解码镜像中的状态字
    pub fn ds402_status(&self, dict: &ObjectDictionary) -> Result<StatusWord, DriverError> {
        self.require_ds402()?;
        let object = objects::STATUS_WORD.at_channel_block(self.index);
        let raw = dict.get(object).ok_or(DriverError::ValueUnavailable {
            index: object.index,
            sub: object.sub,
        })?;
        Ok(StatusWord::from_raw(raw as u16)?)
    }

    /// 把运行模式写入驱动模式寄存器的 SDO 请求
    ///
    /// 注意：CANopen 侧只是通告；通道自身的模式仍通过
    /// [`Channel::set_mode`] 更换。
    pub fn query_operation_mode_download(
        &self,
        mode: OperationMode,
    ) -> Result<SdoRequest, DriverError> {
        self.require_ds402()?;
        Ok(SdoRequest::download(
            objects::OPERATION_MODE.at_channel_block(self.index),
            mode.register_value() as i64,
        ))
    }

    /// 停转本通道电机的 SDO 写请求
    pub fn query_motor_stop(&self) -> SdoRequest {
        SdoRequest::download(objects::MOTOR_STOP.at_sub_offset(self.index as u8 + 1), 1)
    }
}
