//! PDO 映射与配置
//!
//! 周期帧 (PDO) 预先把若干对象字典条目映射进一个帧载荷。
//! 本模块提供：
//!
//! - [`PdoMapping`]：受载荷预算约束的条目分组
//! - [`pack`]：把一串条目切成若干组的分配器
//! - [`configure_tpdo`] / [`configure_rpdo`]：生成标准 CANopen
//!   PDO 配置寄存器 (0x1400/0x1600/0x1800/0x1A00) 的 SDO 写请求
//!
//! 分组只看字节预算：4 字节条目自然两个一组（模拟输入对、
//! 编码器对、轮廓参数对都由同一条规则得出），没有按对
//! 特判的逻辑。

use crate::dict::{ObjectDictionary, SdoRequest};
use bilge::prelude::*;
use roboteq_protocol::{DataKind, Object};
use smallvec::SmallVec;

/// 经典 CAN 的 PDO 载荷预算（字节）
pub const PDO_PAYLOAD_BYTES: usize = 8;

/// PDO 传输类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdoTransmission {
    /// 事件驱动异步传输
    #[default]
    Async,
    /// 每 n 个 SYNC 传输一次
    Sync(u8),
}

impl PdoTransmission {
    /// 通信参数寄存器 sub 2 的编码
    pub fn type_byte(self) -> u8 {
        match self {
            PdoTransmission::Async => 0xFF,
            PdoTransmission::Sync(n) => n,
        }
    }
}

/// 32 位 PDO 映射条目：bit 0-7 位宽，bit 8-15 sub id，bit 16-31 object id
#[bitsize(32)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq)]
struct PdoMapEntry {
    bit_length: u8,
    sub_index: u8,
    index: u16,
}

/// 一个周期帧的条目分组，总字节数不超过 [`PDO_PAYLOAD_BYTES`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdoMapping {
    entries: SmallVec<[Object; 4]>,
}

impl PdoMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试追加一个条目；超出载荷预算时返回 `false` 且不追加
    pub fn try_push(&mut self, object: Object) -> bool {
        if self.byte_len() + object.kind.size() > PDO_PAYLOAD_BYTES {
            return false;
        }
        self.entries.push(object);
        true
    }

    pub fn byte_len(&self) -> usize {
        self.entries.iter().map(|o| o.kind.size()).sum()
    }

    pub fn entries(&self) -> &[Object] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 用字典镜像的当前值生成帧载荷
    ///
    /// 还没有值的条目编码为 0（寄存器的上电默认值）。
    pub fn frame(&self, cob_id: u32, dict: &ObjectDictionary) -> PdoFrame {
        let mut data = [0u8; PDO_PAYLOAD_BYTES];
        let mut offset = 0;
        for object in &self.entries {
            let value = dict.get(*object).unwrap_or(0);
            object.kind.encode_le(value, &mut data[offset..]);
            offset += object.kind.size();
        }
        PdoFrame {
            cob_id,
            data,
            len: offset as u8,
        }
    }
}

/// 再生出的周期帧内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoFrame {
    pub cob_id: u32,
    pub data: [u8; PDO_PAYLOAD_BYTES],
    pub len: u8,
}

/// 槽分配器：把有序条目序列切成若干载荷受限的映射组
///
/// 组内字节累计一旦放不下下一个条目就另起新组；空输入得到
/// 空输出。单个条目不超过 4 字节，必然能放进空组。
pub fn pack(objects: impl IntoIterator<Item = Object>) -> Vec<PdoMapping> {
    let mut mappings = Vec::new();
    let mut current = PdoMapping::new();

    for object in objects {
        if !current.try_push(object) {
            mappings.push(current);
            current = PdoMapping::new();
            let pushed = current.try_push(object);
            debug_assert!(pushed, "dictionary object exceeds PDO payload");
        }
    }

    if !current.is_empty() {
        mappings.push(current);
    }
    mappings
}

/// 发送方向 (TPDO) 的 COB-ID
pub fn tpdo_cob_id(node_id: u8, pdo_index: usize) -> u32 {
    0x180 + 0x100 * pdo_index as u32 + node_id as u32
}

/// 接收方向 (RPDO) 的 COB-ID
pub fn rpdo_cob_id(node_id: u8, pdo_index: usize) -> u32 {
    0x200 + 0x100 * pdo_index as u32 + node_id as u32
}

/// 生成配置一个 TPDO 的 SDO 写请求序列
pub fn configure_tpdo(
    node_id: u8,
    pdo_index: usize,
    transmission: PdoTransmission,
    mapping: &PdoMapping,
) -> Vec<SdoRequest> {
    configure_pdo(
        0x1800,
        0x1A00,
        tpdo_cob_id(node_id, pdo_index),
        pdo_index,
        transmission,
        mapping,
    )
}

/// 生成配置一个 RPDO 的 SDO 写请求序列
pub fn configure_rpdo(
    node_id: u8,
    pdo_index: usize,
    transmission: PdoTransmission,
    mapping: &PdoMapping,
) -> Vec<SdoRequest> {
    configure_pdo(
        0x1400,
        0x1600,
        rpdo_cob_id(node_id, pdo_index),
        pdo_index,
        transmission,
        mapping,
    )
}

fn configure_pdo(
    comm_base: u16,
    map_base: u16,
    cob_id: u32,
    pdo_index: usize,
    transmission: PdoTransmission,
    mapping: &PdoMapping,
) -> Vec<SdoRequest> {
    let comm = comm_base + pdo_index as u16;
    let map = map_base + pdo_index as u16;
    let mut requests = Vec::with_capacity(mapping.len() + 4);

    requests.push(SdoRequest::download(
        Object::new(comm, 1, DataKind::U32),
        cob_id as i64,
    ));
    requests.push(SdoRequest::download(
        Object::new(comm, 2, DataKind::U8),
        transmission.type_byte() as i64,
    ));

    // 映射表：先清零条目数，写完条目再写回真实个数
    requests.push(SdoRequest::download(Object::new(map, 0, DataKind::U8), 0));
    for (k, object) in mapping.entries().iter().enumerate() {
        let entry = PdoMapEntry::new(object.kind.bits(), object.sub, object.index);
        requests.push(SdoRequest::download(
            Object::new(map, k as u8 + 1, DataKind::U32),
            u32::from(entry) as i64,
        ));
    }
    requests.push(SdoRequest::download(
        Object::new(map, 0, DataKind::U8),
        mapping.len() as i64,
    ));

    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use roboteq_protocol::objects::*;

    #[test]
    fn test_pack_pairs_four_byte_entries() {
        // 4 字节条目在 8 字节预算下自然两个一组
        let inputs: Vec<Object> = (0..5).map(|i| ANALOG_INPUT.at_sub_offset(i)).collect();
        let mappings = pack(inputs);
        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[0].len(), 2);
        assert_eq!(mappings[1].len(), 2);
        assert_eq!(mappings[2].len(), 1);
    }

    #[test]
    fn test_pack_mixed_sizes() {
        // 2 + 4 放得下，再来 4 就放不下了
        let mappings = pack([
            TARGET_TORQUE,
            TARGET_PROFILE_VELOCITY,
            PROFILE_ACCELERATION,
            PROFILE_DECELERATION,
        ]);
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].entries(), &[TARGET_TORQUE, TARGET_PROFILE_VELOCITY]);
        assert_eq!(
            mappings[1].entries(),
            &[PROFILE_ACCELERATION, PROFILE_DECELERATION]
        );
    }

    #[test]
    fn test_pack_empty() {
        assert!(pack([]).is_empty());
    }

    #[test]
    fn test_mapping_rejects_overflow() {
        let mut mapping = PdoMapping::new();
        assert!(mapping.try_push(POSITION));
        assert!(mapping.try_push(TARGET_POSITION));
        assert_eq!(mapping.byte_len(), 8);
        assert!(!mapping.try_push(MOTOR_AMPS));
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn test_map_entry_encoding() {
        let entry = PdoMapEntry::new(16, 0, 0x6844);
        assert_eq!(u32::from(entry), 0x6844_0010);

        let entry = PdoMapEntry::new(32, 2, 0x2140);
        assert_eq!(u32::from(entry), 0x2140_0220);
    }

    #[test]
    fn test_configure_tpdo_request_sequence() {
        let mut mapping = PdoMapping::new();
        mapping.try_push(MOTOR_AMPS.at_sub_offset(1));
        mapping.try_push(ACTUAL_VELOCITY.at_channel_block(1));

        let requests = configure_tpdo(2, 3, PdoTransmission::Async, &mapping);
        assert_eq!(
            requests,
            vec![
                SdoRequest::download(Object::new(0x1803, 1, DataKind::U32), 0x482),
                SdoRequest::download(Object::new(0x1803, 2, DataKind::U8), 0xFF),
                SdoRequest::download(Object::new(0x1A03, 0, DataKind::U8), 0),
                SdoRequest::download(Object::new(0x1A03, 1, DataKind::U32), 0x2100_0210),
                SdoRequest::download(Object::new(0x1A03, 2, DataKind::U32), 0x6844_0010),
                SdoRequest::download(Object::new(0x1A03, 0, DataKind::U8), 2),
            ]
        );
    }

    #[test]
    fn test_frame_regeneration_from_dictionary() {
        let mut mapping = PdoMapping::new();
        mapping.try_push(TARGET_TORQUE);
        mapping.try_push(TARGET_PROFILE_VELOCITY);

        let mut dict = ObjectDictionary::new();
        dict.set(TARGET_TORQUE, -2);
        dict.set(TARGET_PROFILE_VELOCITY, 0x01020304);

        let frame = mapping.frame(0x302, &dict);
        assert_eq!(frame.cob_id, 0x302);
        assert_eq!(frame.len, 6);
        assert_eq!(&frame.data[..6], &[0xFE, 0xFF, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_cob_ids() {
        assert_eq!(tpdo_cob_id(2, 0), 0x182);
        assert_eq!(tpdo_cob_id(2, 3), 0x482);
        assert_eq!(rpdo_cob_id(5, 1), 0x305);
    }
}
