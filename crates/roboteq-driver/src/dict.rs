//! 对象字典镜像与变更通知
//!
//! 对象字典本体属于传输层；驱动核心只维护一个按
//! (object id, sub id) 寻址的本地镜像：传输层解析出的新值
//! 通过 [`Update`] 进入镜像，暂存的指令值由通道写入镜像，
//! 周期指令帧从镜像再生。
//!
//! 显式的 SDO 读写以抽象请求 [`SdoRequest`] 表达，由外部的
//! SDO 引擎翻译成总线帧；核心自身不做任何 I/O。

use roboteq_protocol::{Object, ObjectAddr};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// 传输层的变更通知：一批 (地址, 新值)
///
/// 一条 PDO 或一条 SDO 应答解析出的所有条目放在同一个
/// `Update` 里；条目之间没有顺序或原子性保证。
#[derive(Debug, Clone, Default)]
pub struct Update {
    entries: SmallVec<[(ObjectAddr, i64); 8]>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单条目通知
    pub fn single(object: Object, value: i64) -> Self {
        let mut update = Self::new();
        update.push(object.addr(), value);
        update
    }

    pub fn push(&mut self, addr: ObjectAddr, value: i64) {
        self.entries.push((addr, value));
    }

    /// 该地址是否出现在本次通知中
    pub fn contains(&self, addr: ObjectAddr) -> bool {
        self.entries.iter().any(|(a, _)| *a == addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectAddr, i64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 对象字典的本地镜像
#[derive(Debug, Clone, Default)]
pub struct ObjectDictionary {
    values: BTreeMap<ObjectAddr, i64>,
}

impl ObjectDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取寄存器值；从未收到过该寄存器时返回 `None`
    pub fn get(&self, object: Object) -> Option<i64> {
        self.values.get(&object.addr()).copied()
    }

    /// 写入寄存器值
    pub fn set(&mut self, object: Object, value: i64) {
        self.insert(object.addr(), value);
    }

    pub fn insert(&mut self, addr: ObjectAddr, value: i64) {
        self.values.insert(addr, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 抽象 SDO 请求，由外部 SDO 引擎翻译成总线帧
///
/// SDO 交换是严格半双工的：同一节点上一个请求得到应答前
/// 不得发出下一个请求，这一约束由调用方保证。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoRequest {
    /// 读取一个对象字典条目
    Upload { object: Object },
    /// 写入一个对象字典条目
    Download { object: Object, value: i64 },
}

impl SdoRequest {
    pub fn upload(object: Object) -> Self {
        Self::Upload { object }
    }

    pub fn download(object: Object, value: i64) -> Self {
        Self::Download { object, value }
    }

    /// 请求目标的对象字典地址
    pub fn addr(&self) -> ObjectAddr {
        match self {
            Self::Upload { object } | Self::Download { object, .. } => object.addr(),
        }
    }
}
