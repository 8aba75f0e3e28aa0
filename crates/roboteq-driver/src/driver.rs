//! 驱动聚合
//!
//! [`Driver`] 持有一个控制器的全部通道、对象字典镜像，以及
//! 模拟输入/编码器等控制器级的更新跟踪。它把传输层的变更
//! 通知分发给各通道，把扁平的关节指令序列映射到非忽略通道，
//! 并负责 PDO 的规划与配置请求生成。
//!
//! 所有操作都是同步的纯数据变换；串行化访问由调用方保证
//! （通常在拥有 CAN 接收循环的那个线程上运行）。

use crate::channel::Channel;
use crate::dict::{ObjectDictionary, SdoRequest, Update};
use crate::error::DriverError;
use crate::joint::JointState;
use crate::pdo::{self, PdoMapping, PdoTransmission};
use crate::table::ProtocolVariant;
use bilge::prelude::*;
use roboteq_protocol::{ControllerStatus, FaultFlags, StatusFlags, objects};
use tracing::{debug, info};

/// 控制器支持的最大通道数
pub const MAX_CHANNEL_COUNT: usize = 4;

/// 控制器级按索引跟踪组的索引槽数
const INDEX_SLOTS: u8 = 32;

/// 一次 PDO 配置调用的结果
///
/// 调用方必须用 `next_index` 链接下一次 `setup_*_pdos` 调用，
/// 避免 PDO 编号冲突。
#[derive(Debug, Clone)]
pub struct PdoSetup {
    /// 要经传输层下发的 SDO 配置请求
    pub requests: Vec<SdoRequest>,
    /// 下一个可用的 PDO 编号
    pub next_index: usize,
}

/// (expected, received) 掩码对，按索引位跟踪控制器级更新
#[derive(Debug, Clone, Copy, Default)]
struct IndexTracker {
    expected: u32,
    received: u32,
}

impl IndexTracker {
    fn set_enabled(&mut self, index: usize, enable: bool) {
        debug_assert!(index < INDEX_SLOTS as usize);
        let bit = 1u32 << (index as u32 & 31);
        if enable {
            self.expected |= bit;
        } else {
            self.expected &= !bit;
        }
    }

    fn note(&mut self, sub: u8) {
        // sub id 从 1 起编号
        if (1..=INDEX_SLOTS).contains(&sub) {
            self.received |= 1 << (sub - 1);
        }
    }

    fn has_update(&self) -> bool {
        self.expected == self.received
    }

    fn reset(&mut self) {
        self.received = 0;
    }

    /// 已启用索引对应的对象序列
    fn objects(&self, base: roboteq_protocol::Object) -> Vec<roboteq_protocol::Object> {
        (0..INDEX_SLOTS)
            .filter(|i| self.expected & (1 << i) != 0)
            .map(|i| base.at_sub_offset(i))
            .collect()
    }
}

/// 多通道控制器的驱动聚合
#[derive(Debug, Clone)]
pub struct Driver {
    node_id: u8,
    channels: Vec<Channel>,
    dict: ObjectDictionary,
    analog_inputs: IndexTracker,
    converted_analog_inputs: IndexTracker,
    encoder_counters: IndexTracker,
    rpdo_begin: usize,
    rpdo_mappings: Vec<PdoMapping>,
}

impl Driver {
    /// 构造驱动
    ///
    /// `channel_count` 超过 [`MAX_CHANNEL_COUNT`] 是致命的
    /// 配置错误。
    pub fn new(
        node_id: u8,
        channel_count: usize,
        variant: ProtocolVariant,
    ) -> Result<Self, DriverError> {
        if channel_count > MAX_CHANNEL_COUNT {
            return Err(DriverError::TooManyChannels {
                requested: channel_count,
                max: MAX_CHANNEL_COUNT,
            });
        }
        Ok(Self {
            node_id,
            channels: (0..channel_count)
                .map(|i| Channel::new(i, variant))
                .collect(),
            dict: ObjectDictionary::new(),
            analog_inputs: IndexTracker::default(),
            converted_analog_inputs: IndexTracker::default(),
            encoder_counters: IndexTracker::default(),
            rpdo_begin: 0,
            rpdo_mappings: Vec::new(),
        })
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &Channel {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut Channel {
        &mut self.channels[index]
    }

    /// 对象字典镜像（只读）
    pub fn dictionary(&self) -> &ObjectDictionary {
        &self.dict
    }

    // ------------------------------------------------------------------
    // 变更通知分发
    // ------------------------------------------------------------------

    /// 处理传输层的变更通知
    ///
    /// 新值进入字典镜像，每个通道累积自己的跟踪位，控制器级
    /// 的模拟输入/换算模拟输入/编码器跟踪组按 sub id 置位。
    pub fn process(&mut self, update: &Update) {
        for (addr, value) in update.iter() {
            self.dict.insert(addr, value);
        }
        for channel in &mut self.channels {
            channel.note_update(update);
        }
        for (addr, _) in update.iter() {
            if addr.index == objects::ANALOG_INPUT.index {
                self.analog_inputs.note(addr.sub);
            } else if addr.index == objects::CONVERTED_ANALOG_INPUT.index {
                self.converted_analog_inputs.note(addr.sub);
            } else if addr.index == objects::ENCODER_COUNTER.index {
                self.encoder_counters.note(addr.sub);
            }
        }
    }

    // ------------------------------------------------------------------
    // 聚合指令
    // ------------------------------------------------------------------

    /// 把扁平指令序列映射到非忽略通道（按通道顺序）
    ///
    /// 序列长度必须恰好等于非忽略通道数，过多或过少都是
    /// 参数错误；个数校验先于任何通道的暂存。
    pub fn set_joint_command(&mut self, commands: &[JointState]) -> Result<(), DriverError> {
        let expected = self.channels.iter().filter(|c| !c.is_ignored()).count();
        if commands.len() != expected {
            return Err(DriverError::CommandCountMismatch {
                expected,
                actual: commands.len(),
            });
        }

        let mut remaining = commands.iter();
        for channel in self.channels.iter_mut().filter(|c| !c.is_ignored()) {
            // 个数已校验，迭代器不会提前耗尽
            if let Some(cmd) = remaining.next() {
                channel.stage_command(cmd, &mut self.dict)?;
            }
        }
        debug!(count = commands.len(), "joint command staged");
        Ok(())
    }

    /// 非忽略通道最近一次被接受的指令（按通道顺序）
    pub fn joint_command(&self) -> Vec<JointState> {
        self.channels
            .iter()
            .filter(|c| !c.is_ignored())
            .map(|c| c.joint_command())
            .collect()
    }

    /// 通道的关节状态快照
    pub fn joint_state(&self, channel: usize) -> JointState {
        self.channels[channel].joint_state(&self.dict)
    }

    /// 所有通道把暂存指令下发到设备的 SDO 写请求
    pub fn query_joint_command_download(&self) -> Vec<SdoRequest> {
        self.channels
            .iter()
            .flat_map(|c| c.query_joint_command_download(&self.dict))
            .collect()
    }

    /// 从已配置的接收 PDO 编号区间再生当前指令帧
    ///
    /// `set_joint_command` 暂存的寄存器值由此进入下一个周期
    /// 广播，无需显式写请求。
    pub fn periodic_command_frames(&self) -> Vec<pdo::PdoFrame> {
        self.rpdo_mappings
            .iter()
            .enumerate()
            .map(|(k, mapping)| {
                mapping.frame(pdo::rpdo_cob_id(self.node_id, self.rpdo_begin + k), &self.dict)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // PDO 配置
    // ------------------------------------------------------------------

    /// 为每个通道的反馈对象配置发送 PDO
    pub fn setup_joint_state_tpdos(
        &mut self,
        start_index: usize,
        transmission: PdoTransmission,
    ) -> PdoSetup {
        let mut requests = Vec::new();
        let mut index = start_index;
        for channel in &self.channels {
            for mapping in channel.joint_state_tpdo_mappings() {
                requests.extend(pdo::configure_tpdo(
                    self.node_id,
                    index,
                    transmission,
                    &mapping,
                ));
                index += 1;
            }
        }
        info!(
            first = start_index,
            count = index - start_index,
            "joint state TPDOs configured"
        );
        PdoSetup {
            requests,
            next_index: index,
        }
    }

    /// 为每个通道的指令对象配置接收 PDO
    ///
    /// 记录占用的 `[start_index, next_index)` 区间，供
    /// [`Driver::periodic_command_frames`] 再生帧内容。
    pub fn setup_joint_command_rpdos(
        &mut self,
        start_index: usize,
        transmission: PdoTransmission,
    ) -> PdoSetup {
        let mut requests = Vec::new();
        let mut mappings = Vec::new();
        let mut index = start_index;
        for channel in &self.channels {
            for mapping in channel.joint_command_rpdo_mappings() {
                requests.extend(pdo::configure_rpdo(
                    self.node_id,
                    index,
                    transmission,
                    &mapping,
                ));
                mappings.push(mapping);
                index += 1;
            }
        }
        self.rpdo_begin = start_index;
        self.rpdo_mappings = mappings;
        info!(
            first = start_index,
            count = index - start_index,
            "joint command RPDOs configured"
        );
        PdoSetup {
            requests,
            next_index: index,
        }
    }

    /// 配置控制器级状态的发送 PDO（两帧：标志+电压，温度）
    pub fn setup_status_tpdos(
        &mut self,
        start_index: usize,
        transmission: PdoTransmission,
    ) -> PdoSetup {
        let mut flags = PdoMapping::new();
        flags.try_push(objects::STATUS_FLAGS);
        flags.try_push(objects::FAULT_FLAGS);
        flags.try_push(objects::VOLTAGE_INTERNAL);
        flags.try_push(objects::VOLTAGE_BATTERY);

        let mut temperatures = PdoMapping::new();
        temperatures.try_push(objects::VOLTAGE_5V);
        temperatures.try_push(objects::TEMPERATURE_MCU);
        for channel in 0..self.channels.len() {
            temperatures.try_push(objects::TEMPERATURE_SENSOR.at_sub_offset(channel as u8));
        }

        let mut requests = pdo::configure_tpdo(self.node_id, start_index, transmission, &flags);
        requests.extend(pdo::configure_tpdo(
            self.node_id,
            start_index + 1,
            transmission,
            &temperatures,
        ));
        PdoSetup {
            requests,
            next_index: start_index + 2,
        }
    }

    /// 为已启用的模拟输入（原始值和换算值）配置发送 PDO
    pub fn setup_analog_tpdos(
        &mut self,
        start_index: usize,
        transmission: PdoTransmission,
    ) -> PdoSetup {
        let mut objects_list = self.analog_inputs.objects(objects::ANALOG_INPUT);
        objects_list.extend(
            self.converted_analog_inputs
                .objects(objects::CONVERTED_ANALOG_INPUT),
        );
        self.setup_packed_tpdos(start_index, transmission, objects_list)
    }

    /// 为已启用的编码器计数配置发送 PDO
    pub fn setup_encoder_tpdos(
        &mut self,
        start_index: usize,
        transmission: PdoTransmission,
    ) -> PdoSetup {
        let objects_list = self.encoder_counters.objects(objects::ENCODER_COUNTER);
        self.setup_packed_tpdos(start_index, transmission, objects_list)
    }

    fn setup_packed_tpdos(
        &self,
        start_index: usize,
        transmission: PdoTransmission,
        objects_list: Vec<roboteq_protocol::Object>,
    ) -> PdoSetup {
        let mut requests = Vec::new();
        let mut index = start_index;
        for mapping in pdo::pack(objects_list) {
            requests.extend(pdo::configure_tpdo(
                self.node_id,
                index,
                transmission,
                &mapping,
            ));
            index += 1;
        }
        PdoSetup {
            requests,
            next_index: index,
        }
    }

    // ------------------------------------------------------------------
    // 控制器级状态
    // ------------------------------------------------------------------

    /// 刷新控制器状态所需的 SDO 读请求
    pub fn query_controller_status(&self) -> Vec<SdoRequest> {
        let mut queries = vec![
            SdoRequest::upload(objects::VOLTAGE_INTERNAL),
            SdoRequest::upload(objects::VOLTAGE_BATTERY),
            SdoRequest::upload(objects::VOLTAGE_5V),
            SdoRequest::upload(objects::STATUS_FLAGS),
            SdoRequest::upload(objects::FAULT_FLAGS),
            SdoRequest::upload(objects::TEMPERATURE_MCU),
        ];
        for channel in 0..self.channels.len() {
            let ch = channel as u8;
            queries.push(SdoRequest::upload(
                objects::TEMPERATURE_SENSOR.at_sub_offset(ch),
            ));
            queries.push(SdoRequest::upload(
                objects::CHANNEL_STATUS_FLAGS.at_sub_offset(ch),
            ));
        }
        queries
    }

    /// 由字典镜像组装控制器状态
    ///
    /// 只读取镜像，不触发任何总线交换；信息的存在与新鲜度由
    /// 调用方保证。
    pub fn controller_status(&self) -> ControllerStatus {
        ControllerStatus {
            voltage_internal: self
                .dict
                .get(objects::VOLTAGE_INTERNAL)
                .map(|v| v as f64 / 10.0),
            voltage_battery: self
                .dict
                .get(objects::VOLTAGE_BATTERY)
                .map(|v| v as f64 / 10.0),
            voltage_5v: self.dict.get(objects::VOLTAGE_5V).map(|v| v as f64 / 1000.0),
            temperature_mcu: self.dict.get(objects::TEMPERATURE_MCU).map(|v| v as f64),
            temperature_sensors: (0..self.channels.len())
                .map(|ch| {
                    self.dict
                        .get(objects::TEMPERATURE_SENSOR.at_sub_offset(ch as u8))
                        .map(|v| v as f64)
                })
                .collect(),
            status_flags: self
                .dict
                .get(objects::STATUS_FLAGS)
                .map(|v| StatusFlags::from(u16::new(v as u16))),
            fault_flags: self
                .dict
                .get(objects::FAULT_FLAGS)
                .map(|v| FaultFlags::from(u16::new(v as u16))),
            channel_status_flags: (0..self.channels.len())
                .map(|ch| {
                    self.dict
                        .get(objects::CHANNEL_STATUS_FLAGS.at_sub_offset(ch as u8))
                        .map(|v| v as u16)
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // 模拟输入 / 编码器跟踪
    // ------------------------------------------------------------------

    /// 启用/停用某路模拟输入的 PDO 接收与跟踪
    pub fn set_analog_input_enable(&mut self, index: usize, enable: bool) {
        self.analog_inputs.set_enabled(index, enable);
    }

    /// 启用/停用某路换算模拟输入的 PDO 接收与跟踪
    pub fn set_converted_analog_input_enable(&mut self, index: usize, enable: bool) {
        self.converted_analog_inputs.set_enabled(index, enable);
    }

    /// 启用/停用某路编码器计数的 PDO 接收与跟踪
    pub fn set_encoder_counter_enable(&mut self, index: usize, enable: bool) {
        self.encoder_counters.set_enabled(index, enable);
    }

    /// 期望的模拟输入是否已全部收到
    pub fn has_analog_input_update(&self) -> bool {
        self.analog_inputs.has_update()
    }

    pub fn has_converted_analog_input_update(&self) -> bool {
        self.converted_analog_inputs.has_update()
    }

    /// 期望的编码器计数是否已全部收到
    pub fn has_encoder_counter_update(&self) -> bool {
        self.encoder_counters.has_update()
    }

    pub fn reset_analog_input_tracking(&mut self) {
        self.analog_inputs.reset();
    }

    pub fn reset_converted_analog_input_tracking(&mut self) {
        self.converted_analog_inputs.reset();
    }

    pub fn reset_encoder_counter_tracking(&mut self) {
        self.encoder_counters.reset();
    }

    /// 读取某路模拟输入的 SDO 请求（半双工，需等待应答）
    pub fn query_analog_input(&self, index: usize) -> SdoRequest {
        SdoRequest::upload(objects::ANALOG_INPUT.at_sub_offset(index as u8))
    }

    pub fn query_converted_analog_input(&self, index: usize) -> SdoRequest {
        SdoRequest::upload(objects::CONVERTED_ANALOG_INPUT.at_sub_offset(index as u8))
    }

    /// 读取某路编码器计数的 SDO 请求（半双工，需等待应答）
    pub fn query_encoder_counter(&self, index: usize) -> SdoRequest {
        SdoRequest::upload(objects::ENCODER_COUNTER.at_sub_offset(index as u8))
    }

    // ------------------------------------------------------------------
    // 停机
    // ------------------------------------------------------------------

    /// 紧急停机写请求
    pub fn emergency_shutdown(&self) -> SdoRequest {
        SdoRequest::download(objects::EMERGENCY_SHUTDOWN, 1)
    }

    /// 解除紧急停机写请求
    pub fn release_shutdown(&self) -> SdoRequest {
        SdoRequest::download(objects::RELEASE_SHUTDOWN, 1)
    }

    /// 停转所有通道电机的写请求
    pub fn query_motor_stop(&self) -> Vec<SdoRequest> {
        self.channels.iter().map(|c| c.query_motor_stop()).collect()
    }
}
