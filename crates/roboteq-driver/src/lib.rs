//! # Roboteq Driver
//!
//! Roboteq 多通道电机控制器的驱动核心：把通用的多轴电机控制
//! 抽象（位置/速度/转矩的指令与反馈）映射到控制器的二进制
//! 对象字典上。
//!
//! ## 模块
//!
//! - `channel`: 单通道的模式配置、指令校验与更新跟踪
//! - `driver`: 多通道聚合、控制器级跟踪与 PDO 规划
//! - `dict`: 对象字典镜像、变更通知与抽象 SDO 请求
//! - `pdo`: 载荷受限的周期帧分组与配置请求生成
//! - `joint`: 通用关节状态/指令记录
//!
//! ## 边界
//!
//! 本 crate 不做任何总线 I/O，也不处理 SDO 分段或重试：
//! 它生成抽象请求、消费传输层的变更通知，其余都交给外部的
//! CANopen 传输。所有操作都是单线程的同步数据变换。
//!
//! ## 典型流程
//!
//! 1. 配置每个通道的运行模式与换算参数
//! 2. 链式调用 `setup_*_pdos` 得到 SDO 配置请求并下发
//! 3. 把收到的帧解析成 [`Update`] 喂给 [`Driver::process`]
//! 4. 轮询 [`Channel::has_full_update`]，读取反馈快照
//! 5. 通过 [`Driver::set_joint_command`] 下指令，由
//!    [`Driver::periodic_command_frames`] 或显式写请求生效

pub mod channel;
pub mod dict;
mod driver;
mod error;
pub mod joint;
pub mod pdo;
pub(crate) mod table;

pub use channel::Channel;
pub use dict::{ObjectDictionary, SdoRequest, Update};
pub use driver::{Driver, MAX_CHANNEL_COUNT, PdoSetup};
pub use error::DriverError;
pub use joint::{JointField, JointState};
pub use pdo::{PDO_PAYLOAD_BYTES, PdoFrame, PdoMapping, PdoTransmission};
pub use table::ProtocolVariant;
