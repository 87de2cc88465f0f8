//! 测试辅助：内存服务端 + 手动时钟 + 已登录的客户端

use crate::im::client::ImClient;
use crate::im::clock::{Clock, ManualClock};
use crate::im::context::ClientConfig;
use crate::im::message::{Message, SendOptions};
use crate::im::remote::{MemoryServer, RemoteService};
use async_trait::async_trait;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

static INIT_LOGGER: Once = Once::new();

/// 测试日志，`RUST_LOG` 控制级别
pub(crate) fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub(crate) struct TestEnv {
    pub server: Arc<MemoryServer>,
    pub clock: Arc<ManualClock>,
}

impl TestEnv {
    pub fn new() -> Self {
        init_test_logger();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let server = Arc::new(MemoryServer::new(clock.clone() as Arc<dyn Clock>));
        Self { server, clock }
    }

    /// 未登录的客户端（独立的内存库）
    pub async fn client(&self) -> ImClient {
        self.client_with_db("sqlite::memory:").await
    }

    /// 使用指定本地库的未登录客户端
    pub async fn client_with_db(&self, db_url: &str) -> ImClient {
        let config = ClientConfig::new(1_400_000_000, db_url);
        ImClient::init_with_clock(
            config,
            self.server.clone() as Arc<dyn RemoteService>,
            self.clock.clone() as Arc<dyn Clock>,
        )
        .await
        .unwrap()
    }

    /// 新建客户端并以 `user_id` 登录；同一用户多次调用相当于多终端登录
    pub async fn login(&self, user_id: &str) -> ImClient {
        let client = self.client().await;
        let ticket = self
            .server
            .issue_ticket(user_id, Duration::from_secs(24 * 3600));
        client.login(user_id, &ticket).await.unwrap();
        client
    }
}

/// 等待监听器通道上的下一个事件
pub(crate) async fn recv_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("等待事件超时")
        .expect("事件通道已关闭")
}

/// 轮询直到条件成立（推送循环是异步处理的）
pub(crate) async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "条件未在超时内成立");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[async_trait]
pub(crate) trait ClientExt {
    /// 发送一条单聊文本消息并返回服务端确认后的消息
    async fn send_text(&self, to: &str, text: &str) -> Message;
}

#[async_trait]
impl ClientExt for ImClient {
    async fn send_text(&self, to: &str, text: &str) -> Message {
        let message = self.message().create_text_message(text).unwrap();
        self.message()
            .send_message(message, to, "", SendOptions::default())
            .await
            .unwrap()
    }
}
