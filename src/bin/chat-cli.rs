//! IM CLI 客户端（演示版）
//!
//! 非交互式 CLI，用于演示 SDK 的登录、收发消息与会话变化。
//! 不指定 `--api` 时在进程内启动内存服务端，alice 给 bob 发一条消息；
//! 指定 `--api` / `--ws` 时以 `--user` 连接真实服务端，只展示接收到的信息。

use anyhow::{Context, Result};
use chat_sdk_core_rust::im::client::ImClient;
use chat_sdk_core_rust::im::clock::{Clock, SystemClock};
use chat_sdk_core_rust::im::context::ClientConfig;
use chat_sdk_core_rust::im::conversation::{Conversation, ConversationListener};
use chat_sdk_core_rust::im::message::{AdvancedMsgListener, Message, SendOptions};
use chat_sdk_core_rust::im::remote::{HttpRemote, HttpRemoteConfig, MemoryServer, RemoteService};
use chat_sdk_core_rust::im::session::SdkListener;
use clap::Parser;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(about = "IM CLI 客户端 - 用于演示 SDK 功能", long_about = None)]
struct Args {
    /// HTTP API 地址，不指定时使用进程内内存服务端
    #[arg(long)]
    api: Option<String>,

    /// WebSocket 推送地址
    #[arg(long, default_value = "ws://127.0.0.1:10001")]
    ws: String,

    /// 登录用户 ID（连接真实服务端时使用）
    #[arg(short, long, default_value = "alice")]
    user: String,

    /// 登录票据（连接真实服务端时使用）
    #[arg(short, long, default_value = "")]
    ticket: String,

    /// 本地数据库地址
    #[arg(long, default_value = "sqlite::memory:")]
    db: String,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "5")]
    duration: u64,

    /// 日志级别（默认: info,chat_sdk_core_rust=debug）
    #[arg(long, default_value = "info,chat_sdk_core_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和 debug.log）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // RUST_LOG 优先于命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

struct CliListener {
    name: String,
}

#[async_trait::async_trait]
impl SdkListener for CliListener {
    async fn on_connect_success(&self) {
        info!("[CLI/{}] 🔗 已连接", self.name);
    }

    async fn on_connect_failed(&self, code: i32, msg: String) {
        error!("[CLI/{}] 🔗 连接失败: {} {}", self.name, code, msg);
    }

    async fn on_kicked_offline(&self) {
        error!("[CLI/{}] ⚠️ 被踢下线", self.name);
    }

    async fn on_user_sig_expired(&self) {
        error!("[CLI/{}] ⚠️ 票据过期", self.name);
    }
}

#[async_trait::async_trait]
impl AdvancedMsgListener for CliListener {
    async fn on_recv_new_message(&self, message: Message) {
        info!(
            "[CLI/{}] 📨 收到新消息: from={} conv={} content={:?}",
            self.name, message.sender, message.conversation_id, message.content
        );
    }
}

#[async_trait::async_trait]
impl ConversationListener for CliListener {
    async fn on_new_conversation(&self, conversations: Vec<Conversation>) {
        for conv in conversations {
            info!(
                "[CLI/{}] 🆕 新会话: {} 未读: {}",
                self.name, conv.conversation_id, conv.unread_count
            );
        }
    }

    async fn on_conversation_changed(&self, conversations: Vec<Conversation>) {
        for conv in conversations {
            info!(
                "[CLI/{}] 🔄 会话变更: {} 未读: {}",
                self.name, conv.conversation_id, conv.unread_count
            );
        }
    }

    async fn on_total_unread_message_count_changed(&self, total: u64) {
        info!("[CLI/{}] 📬 总未读数: {}", self.name, total);
    }
}

async fn new_client(
    name: &str,
    db: &str,
    remote: Arc<dyn RemoteService>,
    clock: Arc<dyn Clock>,
) -> Result<ImClient> {
    let client = ImClient::init_with_clock(ClientConfig::new(1_400_000_000, db), remote, clock)
        .await
        .map_err(|e| anyhow::anyhow!("初始化失败: {}", e))?;
    let listener = Arc::new(CliListener {
        name: name.to_string(),
    });
    client.add_sdk_listener(listener.clone());
    client.add_advanced_msg_listener(listener.clone());
    client.add_conversation_listener(listener);
    Ok(client)
}

async fn run_demo() -> Result<()> {
    info!("[CLI] 🧪 使用进程内内存服务端");
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let server = Arc::new(MemoryServer::new(clock.clone()));

    let alice = new_client("alice", "sqlite::memory:", server.clone(), clock.clone()).await?;
    let bob = new_client("bob", "sqlite::memory:", server.clone(), clock).await?;
    for (client, user) in [(&alice, "alice"), (&bob, "bob")] {
        let ticket = server.issue_ticket(user, Duration::from_secs(3600));
        client
            .login(user, &ticket)
            .await
            .map_err(|e| anyhow::anyhow!("{} 登录失败: {}", user, e))?;
    }

    let message = alice
        .message()
        .create_text_message("hello from chat-cli")
        .map_err(|e| anyhow::anyhow!("创建消息失败: {}", e))?;
    let sent = alice
        .message()
        .send_message(message, "bob", "", SendOptions::default())
        .await
        .map_err(|e| anyhow::anyhow!("发送失败: {}", e))?;
    info!("[CLI] ✅ 发送成功: msgID={}", sent.msg_id);

    // 推送循环异步处理，稍等让 bob 收到消息
    sleep(Duration::from_millis(500)).await;
    if let Ok(total) = bob.conversation().get_total_unread_message_count() {
        info!("[CLI] 📬 bob 总未读数: {}", total);
    }

    alice.uninit().await;
    bob.uninit().await;
    Ok(())
}

async fn run_remote(args: &Args, api: &str) -> Result<()> {
    info!("[CLI] 🌐 连接服务端: api={} ws={}", api, args.ws);
    let remote = Arc::new(HttpRemote::new(HttpRemoteConfig::new(api, &args.ws))?);
    let client = new_client(&args.user, &args.db, remote, Arc::new(SystemClock)).await?;

    info!("[CLI] 🔐 正在登录: {}", args.user);
    client
        .login(&args.user, &args.ticket)
        .await
        .map_err(|e| anyhow::anyhow!("登录失败: {}", e))?;
    info!("[CLI] ✅ 登录成功！用户ID: {}", args.user);

    if let Ok(list) = client.conversation().get_conversation_list(0, 5) {
        info!("[CLI] 📋 会话列表（前 {} 个）:", list.conversation_list.len());
        for conv in &list.conversation_list {
            info!("[CLI]   - {} | 未读: {}", conv.conversation_id, conv.unread_count);
        }
    }

    info!("[CLI] 📥 开始监听消息...");
    wait(args.duration).await;
    client.uninit().await;
    Ok(())
}

async fn wait(duration: u64) {
    if duration > 0 {
        info!("[CLI] ⏰ {} 秒后自动退出", duration);
        sleep(Duration::from_secs(duration)).await;
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[CLI] 等待退出信号失败: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;
    info!("[CLI] 🚀 IM CLI 客户端");

    match args.api.clone() {
        Some(api) => run_remote(&args, &api).await?,
        None => run_demo().await?,
    }
    info!("[CLI] 👋 程序退出");
    Ok(())
}
