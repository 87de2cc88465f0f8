//! SDK 连接状态监听器

use async_trait::async_trait;

/// 连接与登录态回调
#[async_trait]
pub trait SdkListener: Send + Sync {
    /// 正在连接服务端
    async fn on_connecting(&self) {}

    /// 连接并登录成功
    async fn on_connect_success(&self) {}

    async fn on_connect_failed(&self, _code: i32, _msg: String) {}

    /// 同一账号在其他终端登录，当前终端被踢下线
    async fn on_kicked_offline(&self) {}

    /// 登录票据过期，需要换新票据重新登录
    async fn on_user_sig_expired(&self) {}
}
