//! # 工作进程入口
//!
//! 按命令行选择的类型组合并运行一个工作进程。管理命令进程执行一条命令后退出。

use anyhow::Context;
use clap::Parser;
use config_impl::LayeredConfigProvider;
use infrastructure_common::WorkerKind;
use infrastructure_composition::{WorkerHost, WorkerHostBuilder};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "worker-host")]
#[command(about = "运行 API、后台任务或管理命令工作进程")]
struct Args {
    /// 工作进程类型（api、microservices、admin），未指定时使用配置文件中的值
    #[arg(short, long)]
    worker: Option<WorkerKind>,

    /// 配置文件路径，不存在时使用默认配置与环境变量
    #[arg(short, long, default_value = "config/worker.toml")]
    config: PathBuf,

    /// 要执行的管理命令，仅 admin 进程使用
    #[arg(long)]
    command: Option<String>,

    /// 管理命令参数
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("工作进程异常退出: {:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let host = build_host(&args).await?;
    info!(worker = %host.kind(), "工作进程宿主就绪");

    if host.kind() == WorkerKind::Admin {
        return run_admin(&host, &args).await;
    }

    host.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听退出信号: {}", e);
        }
    })
    .await?;

    if let Some(e) = host.last_shutdown_error() {
        info!("关闭过程中出现错误: {}", e);
    }
    Ok(())
}

async fn build_host(args: &Args) -> anyhow::Result<WorkerHost> {
    let provider = LayeredConfigProvider::new().with_optional_file(&args.config);

    let mut builder = WorkerHostBuilder::new()
        .load_config(&provider)
        .context("加载配置失败")?
        .with_logging();
    if let Some(kind) = args.worker {
        builder = builder.worker(kind);
    }

    builder.build().await.context("构建工作进程宿主失败")
}

async fn run_admin(host: &WorkerHost, args: &Args) -> anyhow::Result<()> {
    let command = args
        .command
        .as_deref()
        .context("admin 进程需要通过 --command 指定要执行的命令")?;

    host.start().await?;
    let outcome = host.run_command(command, &args.args).await;
    host.stop().await;

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
