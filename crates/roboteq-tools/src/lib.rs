//! # Roboteq Tools
//!
//! 控制器的串口行协议配套工具：向设备下发文本配置命令并校验
//! 应答。不管理串口本身（波特率、超时都是调用方的事），只在
//! 任意 `Read + Write` 通道上说这套行协议。

mod command_writer;

pub use command_writer::{CommandWriter, ToolError};
