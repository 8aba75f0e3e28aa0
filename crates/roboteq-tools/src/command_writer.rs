//! 串口行协议的命令写入器
//!
//! 控制器的配置命令是文本行：`^`（写配置）、`%`（系统命令）、
//! `!`（运行时命令）三种前缀，行以 `\r\n` 结束。设备把命令
//! 原样回显，跟一个 `\r`，再跟 `+`（接受）或 `-`（拒绝）。
//!
//! 配置脚本按行书写，`#` 开头的行是注释，行内 `#` 之后的
//! 内容在发送前剥掉。

use std::io::{BufRead, Read, Write};
use thiserror::Error;
use tracing::debug;

/// 工具层错误类型
#[derive(Error, Debug)]
pub enum ToolError {
    /// 底层通道 I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 设备以 `-` 拒绝了命令
    #[error("Command rejected by controller: {line}")]
    CommandRejected { line: String },

    /// 应答不是回显 + `\r` + 判定字节的形式
    #[error("Malformed reply to command: {line}")]
    MalformedReply { line: String },

    /// 脚本行不以 `^`、`%` 或 `!` 开头
    #[error("Unexpected script line (expected '^', '%' or '!' prefix): {line}")]
    InvalidScriptLine { line: String },
}

/// 向控制器发送配置命令并校验应答
///
/// `P` 通常是一个打开的串口设备；测试里用内存通道代替。
#[derive(Debug)]
pub struct CommandWriter<P> {
    port: P,
}

impl<P: Read + Write> CommandWriter<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// 取回底层通道
    pub fn into_inner(self) -> P {
        self.port
    }

    /// 发送一条命令行，不等应答
    pub fn send_command(&mut self, line: &str) -> Result<(), ToolError> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\r\n")?;
        self.port.flush()?;
        Ok(())
    }

    /// 发送一条命令行并等待设备判定
    ///
    /// 设备 NAK（`-`）时返回 [`ToolError::CommandRejected`]。
    pub fn execute_command(&mut self, line: &str) -> Result<(), ToolError> {
        debug!(command = line, "sending");
        self.send_command(line)?;

        match self.read_ack(line)? {
            b'+' => Ok(()),
            b'-' => Err(ToolError::CommandRejected { line: line.into() }),
            _ => Err(ToolError::MalformedReply { line: line.into() }),
        }
    }

    /// 应答 = 回显的命令 + `\r` + 判定字节
    fn read_ack(&mut self, line: &str) -> Result<u8, ToolError> {
        let mut reply = vec![0u8; line.len() + 2];
        self.port.read_exact(&mut reply)?;

        let (echo, tail) = reply.split_at(line.len());
        if echo != line.as_bytes() || tail[0] != b'\r' {
            return Err(ToolError::MalformedReply { line: line.into() });
        }
        Ok(tail[1])
    }

    /// 逐行执行一个配置脚本
    ///
    /// 注释行与行内注释在发送前剥掉；任何命令被拒绝时立即
    /// 停止。返回成功执行的命令数。
    pub fn execute_script(&mut self, reader: impl BufRead) -> Result<usize, ToolError> {
        let mut executed = 0;
        for line in reader.lines() {
            let line = line?;
            if let Some(command) = script_command(&line)? {
                self.execute_command(command)?;
                executed += 1;
            }
        }
        Ok(executed)
    }
}

/// 从脚本行提取要发送的命令
///
/// 空行和 `#` 开头的注释行返回 `None`；其余行必须以合法前缀
/// 开头，随后剥掉行内注释和尾随空白。
fn script_command(line: &str) -> Result<Option<&str>, ToolError> {
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    if !matches!(line.as_bytes()[0], b'^' | b'%' | b'!') {
        return Err(ToolError::InvalidScriptLine { line: line.into() });
    }

    let without_comment = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    Ok(Some(without_comment.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};

    /// 内存通道：预置应答字节，记录发送字节
    struct MockPort {
        replies: VecDeque<u8>,
        sent: Vec<u8>,
    }

    impl MockPort {
        fn new(replies: &[u8]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                sent: Vec::new(),
            }
        }

        /// 命令的标准应答：回显 + '\r' + 判定
        fn ack(line: &str, verdict: u8) -> Vec<u8> {
            let mut reply = line.as_bytes().to_vec();
            reply.push(b'\r');
            reply.push(verdict);
            reply
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.replies.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.replies.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_command_appends_line_ending() {
        let mut writer = CommandWriter::new(MockPort::new(&[]));
        writer.send_command("^ECHOF 1").unwrap();
        assert_eq!(writer.into_inner().sent, b"^ECHOF 1\r\n");
    }

    #[test]
    fn test_execute_command_accepts_plus() {
        let port = MockPort::new(&MockPort::ack("^MMOD 1 1", b'+'));
        let mut writer = CommandWriter::new(port);
        writer.execute_command("^MMOD 1 1").unwrap();
    }

    #[test]
    fn test_execute_command_rejection() {
        let port = MockPort::new(&MockPort::ack("^MMOD 1 9", b'-'));
        let mut writer = CommandWriter::new(port);
        let err = writer.execute_command("^MMOD 1 9").unwrap_err();
        assert!(matches!(err, ToolError::CommandRejected { .. }));
    }

    #[test]
    fn test_execute_command_malformed_echo() {
        // 回显与命令不一致
        let port = MockPort::new(&MockPort::ack("^WRONG 0 0", b'+'));
        let mut writer = CommandWriter::new(port);
        let err = writer.execute_command("^MMOD 1 1").unwrap_err();
        assert!(matches!(err, ToolError::MalformedReply { .. }));
    }

    #[test]
    fn test_script_command_extraction() {
        assert_eq!(script_command("").unwrap(), None);
        assert_eq!(script_command("# full line comment").unwrap(), None);
        assert_eq!(script_command("^KP 1 20").unwrap(), Some("^KP 1 20"));
        assert_eq!(
            script_command("!G 1 500   # inline comment").unwrap(),
            Some("!G 1 500")
        );
        assert_eq!(script_command("%EESAV").unwrap(), Some("%EESAV"));
        assert!(matches!(
            script_command("G 1 500"),
            Err(ToolError::InvalidScriptLine { .. })
        ));
    }

    #[test]
    fn test_execute_script() {
        let script = "# motor setup\n^MMOD 1 1\n\n!G 1 500 # half throttle\n";
        let mut replies = MockPort::ack("^MMOD 1 1", b'+');
        replies.extend(MockPort::ack("!G 1 500", b'+'));

        let mut writer = CommandWriter::new(MockPort::new(&replies));
        let executed = writer.execute_script(Cursor::new(script)).unwrap();
        assert_eq!(executed, 2);

        let sent = writer.into_inner().sent;
        assert_eq!(sent, b"^MMOD 1 1\r\n!G 1 500\r\n");
    }

    #[test]
    fn test_execute_script_stops_on_rejection() {
        let script = "^MMOD 1 1\n^MMOD 2 1\n";
        let mut writer = CommandWriter::new(MockPort::new(&MockPort::ack("^MMOD 1 1", b'-')));
        assert!(writer.execute_script(Cursor::new(script)).is_err());
    }

    #[test]
    fn test_execute_script_invalid_prefix() {
        let mut writer = CommandWriter::new(MockPort::new(&[]));
        let err = writer
            .execute_script(Cursor::new("bogus line\n"))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidScriptLine { .. }));
    }
}
