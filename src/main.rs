//! Hive - 终端多智能体工作台
//!
//! 入口：初始化日志（写入文件，避免污染 TUI）、创建编排器并运行主循环。

use std::sync::Arc;

use anyhow::Context;
use hive::{core::create_orchestrator, ui::run_app};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志写入 hive.log：默认 info，可通过 RUST_LOG 覆盖
    let log_file = std::fs::File::create("hive.log").context("Failed to create log file")?;
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
        .init();

    // 创建编排器：返回命令发送端、状态接收端、事件接收端与工作目录
    let handles = create_orchestrator(None).context("Failed to create orchestrator")?;

    // 启动 TUI 主循环
    run_app(handles).await.context("App run failed")?;

    Ok(())
}
