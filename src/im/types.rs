use serde::{Deserialize, Serialize};

/// 单聊会话 ID 前缀
pub const C2C_CONVERSATION_PREFIX: &str = "c2c_";
/// 群聊会话 ID 前缀
pub const GROUP_CONVERSATION_PREFIX: &str = "group_";

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg", default)]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：检查 HTTP 状态并反序列化为统一的响应结构体
///
/// 业务错误码（errCode != 0）原样保留在返回值中，由调用方转换为 `ImError`。
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use anyhow::Context;
    use tracing::{debug, error};

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    if api_resp.err_code != 0 {
        debug!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
    }
    Ok(api_resp)
}

/// 会话类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationType {
    C2C,
    Group,
}

/// 构造单聊会话 ID：`c2c_<userID>`
pub fn c2c_conversation_id(user_id: &str) -> String {
    format!("{C2C_CONVERSATION_PREFIX}{user_id}")
}

/// 构造群聊会话 ID：`group_<groupID>`
pub fn group_conversation_id(group_id: &str) -> String {
    format!("{GROUP_CONVERSATION_PREFIX}{group_id}")
}

/// 解析会话 ID，返回会话类型和对端 ID（用户 ID 或群 ID）
pub fn parse_conversation_id(conversation_id: &str) -> Option<(ConversationType, &str)> {
    if let Some(user_id) = conversation_id.strip_prefix(C2C_CONVERSATION_PREFIX) {
        if !user_id.is_empty() {
            return Some((ConversationType::C2C, user_id));
        }
    } else if let Some(group_id) = conversation_id.strip_prefix(GROUP_CONVERSATION_PREFIX) {
        if !group_id.is_empty() {
            return Some((ConversationType::Group, group_id));
        }
    }
    None
}

/// 消息接收选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReceiveMessageOpt {
    /// 在线正常接收，离线推送
    #[default]
    Receive,
    /// 不接收消息
    NotReceive,
    /// 接收消息但不提醒（不计入总未读）
    NotNotify,
}

impl ReceiveMessageOpt {
    /// 是否为免打扰（未读数不计入总数）
    pub fn is_muted(self) -> bool {
        !matches!(self, ReceiveMessageOpt::Receive)
    }
}
