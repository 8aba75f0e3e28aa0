//! # Roboteq CLI
//!
//! 通过串口行协议向控制器上传配置脚本。
//!
//! ```bash
//! roboteq-cli upload --port /dev/ttyUSB0 motor-setup.cfg
//! ```
//!
//! 串口本身（波特率等）需要事先配置好，例如用 `stty`。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roboteq_tools::CommandWriter;
use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Roboteq 控制器配置工具
#[derive(Parser, Debug)]
#[command(name = "roboteq-cli")]
#[command(about = "Configuration uploader for Roboteq motor controllers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 上传配置脚本并逐条校验设备应答
    Upload {
        /// 串口设备路径
        #[arg(long)]
        port: PathBuf,

        /// 配置脚本文件（`^`/`%`/`!` 命令行，`#` 注释）
        script: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Upload { port, script } => upload(&port, &script),
    }
}

fn upload(port: &PathBuf, script: &PathBuf) -> Result<()> {
    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(port)
        .with_context(|| format!("opening serial device {}", port.display()))?;
    let reader = BufReader::new(
        File::open(script).with_context(|| format!("opening script {}", script.display()))?,
    );

    let mut writer = CommandWriter::new(device);
    let executed = writer
        .execute_script(reader)
        .context("uploading configuration")?;

    println!("{executed} commands accepted");
    Ok(())
}
