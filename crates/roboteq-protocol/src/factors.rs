//! 单位换算
//!
//! 控制器内部以定点比例、RPM、0.1 A 等设备单位工作；本模块在
//! 设备单位与 SI 单位（rad/s、Nm、V）之间换算。换算参数按通道
//! 配置，换算本身是无状态的纯函数。
//!
//! ## 比例寄存器
//!
//! 相对量寄存器的取值范围是 [-1000, 1000]。换算采用以
//! `zero` 为中心的非对称线性公式：`zero` 是 SI 值为 0 时的
//! 寄存器读数，寄存器 ±1000 分别对应 SI 的 `max` / `min`。
//! `zero = 0` 不是特例，走同一条代码路径。
//! 所有写往比例寄存器的换算结果四舍五入后饱和截断到
//! [-1000, 1000]，绝不回绕。

use std::f64::consts::PI;

/// 位置反馈的来源选择
///
/// 配置文件中以原始整数出现，未知值回落到 `None`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PositionSource {
    /// 未指定，使用相对比例换算
    #[default]
    None = 0,
    /// 自动（与 None 等价）
    Auto = 1,
    /// 绝对编码器计数
    Encoder = 2,
}

/// 单通道的单位换算参数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Factors {
    /// SI 速度为 0 时的相对速度读数
    pub speed_zero: i32,
    /// 相对速度 -1000 对应的 SI 速度
    pub speed_min: f64,
    /// 相对速度 +1000 对应的 SI 速度
    pub speed_max: f64,

    /// SI 位置为 0 时的相对位置读数
    pub position_zero: i32,
    /// 相对位置 -1000 对应的 SI 位置
    pub position_min: f64,
    /// 相对位置 +1000 对应的 SI 位置
    pub position_max: f64,

    /// 转矩常数，单位 A/Nm
    pub torque_constant: f64,
    /// 电流上限，单位 A（相对转矩指令的饱和边界）
    pub max_current: f64,
    /// 编码器一个计数对应的 SI 位置
    pub encoder_position_factor: f64,
}

impl Default for Factors {
    fn default() -> Self {
        Self {
            speed_zero: 0,
            speed_min: -1.0,
            speed_max: 1.0,
            position_zero: 0,
            position_min: -1.0,
            position_max: 1.0,
            torque_constant: 1.0,
            max_current: 1.0,
            encoder_position_factor: 1.0,
        }
    }
}

/// 以 zero 为中心的比例 → SI 换算
fn ratio_to_si(raw: i32, zero: i32, min: f64, max: f64) -> f64 {
    if raw > zero {
        (raw - zero) as f64 / (1000 - zero) as f64 * max
    } else {
        (zero - raw) as f64 / (1000 + zero) as f64 * min
    }
}

/// SI → 比例换算，四舍五入并饱和到 [-1000, 1000]
fn ratio_from_si(si: f64, zero: i32, min: f64, max: f64) -> i32 {
    let value = if si > 0.0 {
        si / max * (1000 - zero) as f64 + zero as f64
    } else {
        si / min * (-1000 - zero) as f64 + zero as f64
    };
    Factors::clamp1000(value)
}

impl Factors {
    /// 四舍五入并饱和截断到 [-1000, 1000]
    pub fn clamp1000(value: f64) -> i32 {
        let v = value.round();
        if v > 1000.0 {
            1000
        } else if v < -1000.0 {
            -1000
        } else {
            v as i32
        }
    }

    pub fn relative_speed_to_si(&self, raw: i32) -> f64 {
        ratio_to_si(raw, self.speed_zero, self.speed_min, self.speed_max)
    }

    pub fn relative_speed_from_si(&self, speed: f64) -> i32 {
        ratio_from_si(speed, self.speed_zero, self.speed_min, self.speed_max)
    }

    pub fn relative_position_to_si(&self, raw: i32) -> f64 {
        ratio_to_si(
            raw,
            self.position_zero,
            self.position_min,
            self.position_max,
        )
    }

    pub fn relative_position_from_si(&self, position: f64) -> i32 {
        ratio_from_si(
            position,
            self.position_zero,
            self.position_min,
            self.position_max,
        )
    }

    /// 按反馈来源换算位置读数
    pub fn position_to_si(&self, raw: i32, source: PositionSource) -> f64 {
        match source {
            PositionSource::None | PositionSource::Auto => self.relative_position_to_si(raw),
            PositionSource::Encoder => self.absolute_encoder_position_to_si(raw),
        }
    }

    /// 编码器计数 → SI 位置
    pub fn absolute_encoder_position_to_si(&self, counts: i32) -> f64 {
        counts as f64 * self.encoder_position_factor
    }

    /// SI 位置 → 编码器计数
    pub fn encoder_position_from_si(&self, position: f64) -> i32 {
        (position / self.encoder_position_factor).round() as i32
    }

    /// SI 转矩 → 相对转矩指令，电流受 `max_current` 饱和
    pub fn relative_torque_from_si(&self, torque: f64) -> i32 {
        let current = torque * self.torque_constant;
        ratio_from_si(current, 0, -self.max_current, self.max_current)
    }

    /// RPM → rad/s
    pub fn rpm_to_si(&self, rpm: f64) -> f64 {
        rpm * 2.0 * PI / 60.0
    }

    /// rad/s → RPM
    pub fn rpm_from_si(&self, speed: f64) -> f64 {
        speed / (2.0 * PI) * 60.0
    }

    /// 功率等级读数 ([-1000, 1000]) → 比例
    pub fn pwm_to_float(&self, raw: i32) -> f64 {
        raw as f64 / 1000.0
    }

    /// 电流读数 (0.1 A) → SI 转矩
    pub fn current_to_torque_si(&self, deci_amps: i32) -> f64 {
        deci_amps as f64 / 10.0 / self.torque_constant
    }

    /// SI 转矩 → 电流指令 (0.01 A)
    pub fn current_from_torque_si(&self, torque: f64) -> i32 {
        (torque * self.torque_constant * 100.0).round() as i32
    }

    /// SI 转矩斜率 → 电流斜率指令 (1e-4 A/s)
    pub fn current_slope_from_torque_slope_si(&self, slope: f64) -> i32 {
        (slope * self.torque_constant * 10000.0).round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn factors() -> Factors {
        Factors {
            speed_min: -10.0,
            speed_max: 42.0,
            position_min: -100.0,
            position_max: 84.0,
            torque_constant: 0.3,
            max_current: 10.0,
            encoder_position_factor: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_speed_to_si_at_bounds() {
        let f = factors();
        assert_eq!(f.relative_speed_to_si(-1000), -10.0);
        assert_eq!(f.relative_speed_to_si(1000), 42.0);
        assert_eq!(f.relative_speed_to_si(0), 0.0);
    }

    #[test]
    fn test_speed_from_si_at_bounds() {
        let f = factors();
        assert_eq!(f.relative_speed_from_si(-10.0), -1000);
        assert_eq!(f.relative_speed_from_si(42.0), 1000);
        assert_eq!(f.relative_speed_from_si(0.0), 0);
    }

    #[test]
    fn test_speed_from_si_saturates() {
        let f = factors();
        assert_eq!(f.relative_speed_from_si(-20.0), -1000);
        assert_eq!(f.relative_speed_from_si(50.0), 1000);
    }

    #[test]
    fn test_position_bounds_with_nonzero_center() {
        let f = Factors {
            position_zero: 200,
            position_min: -3.0,
            position_max: 4.0,
            ..Default::default()
        };
        assert_eq!(f.relative_position_to_si(200), 0.0);
        assert_eq!(f.relative_position_to_si(-1000), -3.0);
        assert_eq!(f.relative_position_to_si(1000), 4.0);
        assert_eq!(f.relative_position_from_si(0.0), 200);
        assert_eq!(f.relative_position_from_si(-3.0), -1000);
        assert_eq!(f.relative_position_from_si(4.0), 1000);
    }

    #[test]
    fn test_position_source_dispatch() {
        let f = factors();
        assert_eq!(f.position_to_si(1000, PositionSource::None), 84.0);
        assert_eq!(f.position_to_si(1000, PositionSource::Auto), 84.0);
        assert_eq!(f.position_to_si(1000, PositionSource::Encoder), 500.0);
    }

    #[test]
    fn test_position_source_from_raw_config_value() {
        assert_eq!(PositionSource::from(2u8), PositionSource::Encoder);
        // 未知值回落到 None
        assert_eq!(PositionSource::from(7u8), PositionSource::None);
    }

    #[test]
    fn test_encoder_position_round_trip() {
        let f = factors();
        assert_eq!(f.absolute_encoder_position_to_si(-1000), -500.0);
        assert_eq!(f.encoder_position_from_si(-500.0), -1000);
    }

    #[test]
    fn test_rpm_conversions() {
        let f = factors();
        assert!((f.rpm_to_si(60.0) - 2.0 * PI).abs() < 1e-9);
        assert!((f.rpm_from_si(2.0 * PI) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_pwm_to_float() {
        let f = factors();
        assert_eq!(f.pwm_to_float(500), 0.5);
        assert_eq!(f.pwm_to_float(-1000), -1.0);
    }

    #[test]
    fn test_current_torque_conversions() {
        let f = factors();
        // 150 * 0.1 A / 0.3 A/Nm = 50 Nm
        assert_eq!(f.current_to_torque_si(150), 50.0);
        // 0.42 Nm * 0.3 A/Nm * 100 = 12.6 → 13
        assert_eq!(f.current_from_torque_si(0.42), 13);
        assert_eq!(f.current_slope_from_torque_slope_si(0.5), 1500);
    }

    #[test]
    fn test_relative_torque_saturates_at_current_limit() {
        let f = Factors {
            torque_constant: 2.0,
            max_current: 10.0,
            ..Default::default()
        };
        // 2.5 Nm * 2 A/Nm = 5 A，半量程
        assert_eq!(f.relative_torque_from_si(2.5), 500);
        // 10 Nm * 2 A/Nm = 20 A，超出上限
        assert_eq!(f.relative_torque_from_si(10.0), 1000);
        assert_eq!(f.relative_torque_from_si(-10.0), -1000);
    }

    #[test]
    fn test_clamp1000_rounds_to_nearest() {
        assert_eq!(Factors::clamp1000(499.4), 499);
        assert_eq!(Factors::clamp1000(499.6), 500);
        assert_eq!(Factors::clamp1000(-499.6), -500);
        assert_eq!(Factors::clamp1000(1000.4), 1000);
        assert_eq!(Factors::clamp1000(-3000.0), -1000);
    }

    proptest! {
        /// 比例换算的往返律：from_si(to_si(r)) 在取整后与 r 相差不超过 1
        #[test]
        fn prop_ratio_round_trip(
            raw in -1000i32..=1000,
            zero in -500i32..=500,
            min in -100.0f64..-0.1,
            max in 0.1f64..100.0,
        ) {
            let f = Factors {
                speed_zero: zero,
                speed_min: min,
                speed_max: max,
                ..Default::default()
            };
            let back = f.relative_speed_from_si(f.relative_speed_to_si(raw));
            prop_assert!((back - raw).abs() <= 1, "raw={raw} back={back}");
        }

        /// to_si 的边界律
        #[test]
        fn prop_ratio_bounds(
            zero in -500i32..=500,
            min in -100.0f64..-0.1,
            max in 0.1f64..100.0,
        ) {
            let f = Factors {
                speed_zero: zero,
                speed_min: min,
                speed_max: max,
                ..Default::default()
            };
            prop_assert_eq!(f.relative_speed_to_si(-1000), min);
            prop_assert_eq!(f.relative_speed_to_si(1000), max);
            prop_assert_eq!(f.relative_speed_to_si(zero), 0.0);
        }
    }
}
