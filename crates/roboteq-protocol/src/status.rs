//! 控制器级状态
//!
//! 电压、温度与状态/故障标志字与通道运行模式无关，由驱动
//! 聚合层统一读取。标志字的位分配是厂商固定的。

use bilge::prelude::*;

/// 控制器状态标志字 (0x2111) 位域
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct StatusFlags {
    pub serial_mode: bool,
    pub pulse_mode: bool,
    pub analog_mode: bool,
    pub power_stage_off: bool,
    pub stall: bool,
    pub at_limit: bool,
    pub unused: bool,
    pub script_running: bool,
    pub tuning_mode: bool,
    reserved: u7,
}

/// 控制器故障标志字 (0x2112) 位域
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct FaultFlags {
    pub overheat: bool,
    pub overvoltage: bool,
    pub undervoltage: bool,
    pub short_circuit: bool,
    pub emergency_stop: bool,
    pub setup_fault: bool,
    pub mosfet_failure: bool,
    pub unconfigured: bool,
    reserved: u8,
}

impl FaultFlags {
    /// 是否有任一故障位置位
    pub fn any(self) -> bool {
        u16::from(self) & 0x00FF != 0
    }
}

/// 控制器级状态快照
///
/// 字段为 `None` 表示该寄存器还没有收到过任何值。
#[derive(Debug, Clone, Default)]
pub struct ControllerStatus {
    /// 内部电压，单位 V
    pub voltage_internal: Option<f64>,
    /// 电池电压，单位 V
    pub voltage_battery: Option<f64>,
    /// 5V 输出电压，单位 V
    pub voltage_5v: Option<f64>,
    /// MCU 温度，单位 °C
    pub temperature_mcu: Option<f64>,
    /// 各通道温度传感器，单位 °C
    pub temperature_sensors: Vec<Option<f64>>,
    pub status_flags: Option<StatusFlags>,
    pub fault_flags: Option<FaultFlags>,
    /// 各通道状态标志字
    pub channel_status_flags: Vec<Option<u16>>,
}
