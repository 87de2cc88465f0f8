//! 错误码与错误类型
//!
//! 所有异步接口的失败都通过 `ImError` 返回（错误码 + 描述），错误种类由错误码推导，
//! 因此错误码经过 HTTP/WebSocket 传输后可以还原出相同的种类。

use serde::{Deserialize, Serialize};

/// 错误码表
pub mod err_code {
    pub const SUCC: i32 = 0;

    // ---------- 通用 / 本地 ----------
    pub const ERR_SDK_INTERNAL: i32 = 6001;
    pub const ERR_SDK_NET_DISCONNECT: i32 = 6002;
    pub const ERR_SDK_NOT_INITIALIZED: i32 = 6013;
    pub const ERR_SDK_NOT_LOGGED_IN: i32 = 6014;
    pub const ERR_INVALID_PARAMETERS: i32 = 6017;
    pub const ERR_LOGIN_IN_PROGRESS: i32 = 6023;
    pub const ERR_LOGOUT_IN_PROGRESS: i32 = 6024;
    pub const ERR_ALREADY_LOGGED_IN_OTHER_USER: i32 = 6025;
    pub const ERR_USER_SIG_EXPIRED: i32 = 6206;
    pub const ERR_USER_SIG_INVALID: i32 = 70003;
    pub const ERR_SDK_COMM_API_CALL_FREQUENCY_LIMIT: i32 = 7008;

    // ---------- 消息 ----------
    pub const ERR_MSG_NOT_FOUND: i32 = 6004;
    pub const ERR_MSG_STATUS_INVALID: i32 = 6016;
    pub const ERR_MSG_BODY_SIZE_LIMIT: i32 = 80002;
    pub const ERR_MSG_FILE_SIZE_LIMIT: i32 = 6008;
    pub const ERR_MSG_MODIFY_CONFLICT: i32 = 8006;
    pub const ERR_MSG_REVOKE_TIME_LIMIT: i32 = 20016;
    pub const ERR_MSG_PERMISSION_DENY: i32 = 20018;
    pub const ERR_MSG_EXTENSION_CONFLICT: i32 = 23001;
    pub const ERR_MSG_EXTENSION_NOT_SUPPORTED: i32 = 23002;
    pub const ERR_MSG_EXTENSION_SIZE_LIMIT: i32 = 23003;

    // ---------- 会话 ----------
    pub const ERR_CONVERSATION_NOT_FOUND: i32 = 6030;
    pub const ERR_CONVERSATION_CUSTOM_DATA_SIZE_LIMIT: i32 = 6031;
    pub const ERR_CONVERSATION_GROUP_NOT_FOUND: i32 = 6032;
    pub const ERR_CONVERSATION_GROUP_EXISTS: i32 = 6033;

    // ---------- 群组 ----------
    pub const ERR_GROUP_PERMISSION_DENY: i32 = 10007;
    pub const ERR_GROUP_TYPE_NOT_SUPPORTED: i32 = 10008;
    pub const ERR_GROUP_NOT_MEMBER: i32 = 10009;
    pub const ERR_GROUP_NOT_FOUND: i32 = 10010;
    pub const ERR_GROUP_ALREADY_MEMBER: i32 = 10013;
    pub const ERR_GROUP_FULL: i32 = 10014;
    pub const ERR_GROUP_APPLICATION_NOT_FOUND: i32 = 10015;
    pub const ERR_GROUP_MEMBER_MUTED: i32 = 10017;
    pub const ERR_GROUP_ID_INVALID: i32 = 10021;
    pub const ERR_GROUP_ID_IN_USE: i32 = 10025;
    pub const ERR_GROUP_ATTRIBUTE_SIZE_LIMIT: i32 = 10048;
    pub const ERR_GROUP_ATTRIBUTE_CONFLICT: i32 = 10056;
    pub const ERR_GROUP_COUNTER_CONFLICT: i32 = 10058;
    pub const ERR_GROUP_ATTRIBUTE_FREQUENCY_LIMIT: i32 = 8511;

    // ---------- 关系链 ----------
    pub const ERR_FRIEND_NOT_FOUND: i32 = 30001;
    pub const ERR_FRIEND_ALREADY_EXISTS: i32 = 30002;
    pub const ERR_FRIEND_APPLICATION_NOT_FOUND: i32 = 30003;
    pub const ERR_FRIEND_GROUP_NOT_FOUND: i32 = 30004;
    pub const ERR_FRIEND_GROUP_EXISTS: i32 = 30005;
    pub const ERR_IN_SELF_BLACKLIST: i32 = 30525;
    pub const ERR_IN_PEER_BLACKLIST: i32 = 30515;
    pub const ERR_PEER_DENY_ANY: i32 = 30516;
    /// 添加好友结果码：已发出申请，等待对方处理（不是错误）
    pub const FRIEND_APPLICATION_PENDING: i32 = 30539;

    // ---------- 信令 ----------
    pub const ERR_SIGNALING_INVALID_INVITE_ID: i32 = 8010;
    pub const ERR_SIGNALING_NO_PERMISSION: i32 = 8011;
    pub const ERR_SIGNALING_ALREADY_EXISTS: i32 = 8012;
    pub const ERR_SIGNALING_INVITATION_RESOLVED: i32 = 8013;
}

/// 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 票据过期或无效
    Auth,
    /// 调用频率超限
    RateLimit,
    /// 乐观并发冲突（消息修改、群属性、消息扩展）
    Conflict,
    /// 角色或群类型不允许该操作
    Permission,
    /// 引用的实体不存在（本地缓存过期）
    NotFound,
    /// 载荷超出限制
    Oversize,
    /// 当前状态不允许该操作
    State,
    InvalidParam,
    Network,
    Internal,
}

impl ErrorKind {
    /// 根据错误码推导错误种类
    pub fn of_code(code: i32) -> Self {
        use err_code::*;
        match code {
            ERR_USER_SIG_EXPIRED | ERR_USER_SIG_INVALID => ErrorKind::Auth,
            ERR_SDK_COMM_API_CALL_FREQUENCY_LIMIT | ERR_GROUP_ATTRIBUTE_FREQUENCY_LIMIT => {
                ErrorKind::RateLimit
            }
            ERR_MSG_MODIFY_CONFLICT
            | ERR_MSG_EXTENSION_CONFLICT
            | ERR_GROUP_ATTRIBUTE_CONFLICT
            | ERR_GROUP_COUNTER_CONFLICT => ErrorKind::Conflict,
            ERR_MSG_PERMISSION_DENY
            | ERR_MSG_EXTENSION_NOT_SUPPORTED
            | ERR_GROUP_PERMISSION_DENY
            | ERR_GROUP_TYPE_NOT_SUPPORTED
            | ERR_GROUP_NOT_MEMBER
            | ERR_GROUP_MEMBER_MUTED
            | ERR_IN_SELF_BLACKLIST
            | ERR_IN_PEER_BLACKLIST
            | ERR_PEER_DENY_ANY
            | ERR_SIGNALING_NO_PERMISSION => ErrorKind::Permission,
            ERR_MSG_NOT_FOUND
            | ERR_CONVERSATION_NOT_FOUND
            | ERR_CONVERSATION_GROUP_NOT_FOUND
            | ERR_GROUP_NOT_FOUND
            | ERR_GROUP_APPLICATION_NOT_FOUND
            | ERR_FRIEND_NOT_FOUND
            | ERR_FRIEND_APPLICATION_NOT_FOUND
            | ERR_FRIEND_GROUP_NOT_FOUND
            | ERR_SIGNALING_INVALID_INVITE_ID => ErrorKind::NotFound,
            ERR_MSG_BODY_SIZE_LIMIT
            | ERR_MSG_FILE_SIZE_LIMIT
            | ERR_MSG_EXTENSION_SIZE_LIMIT
            | ERR_CONVERSATION_CUSTOM_DATA_SIZE_LIMIT
            | ERR_GROUP_ATTRIBUTE_SIZE_LIMIT => ErrorKind::Oversize,
            ERR_SDK_NOT_INITIALIZED
            | ERR_SDK_NOT_LOGGED_IN
            | ERR_LOGIN_IN_PROGRESS
            | ERR_LOGOUT_IN_PROGRESS
            | ERR_ALREADY_LOGGED_IN_OTHER_USER
            | ERR_MSG_STATUS_INVALID
            | ERR_MSG_REVOKE_TIME_LIMIT
            | ERR_CONVERSATION_GROUP_EXISTS
            | ERR_GROUP_ALREADY_MEMBER
            | ERR_GROUP_FULL
            | ERR_GROUP_ID_IN_USE
            | ERR_FRIEND_ALREADY_EXISTS
            | ERR_FRIEND_GROUP_EXISTS
            | ERR_SIGNALING_ALREADY_EXISTS
            | ERR_SIGNALING_INVITATION_RESOLVED => ErrorKind::State,
            ERR_INVALID_PARAMETERS | ERR_GROUP_ID_INVALID => ErrorKind::InvalidParam,
            ERR_SDK_NET_DISCONNECT => ErrorKind::Network,
            _ => ErrorKind::Internal,
        }
    }
}

/// SDK 统一错误：错误码 + 可读描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {msg}")]
pub struct ImError {
    pub kind: ErrorKind,
    pub code: i32,
    pub msg: String,
}

pub type ImResult<T> = Result<T, ImError>;

impl ImError {
    pub fn new(code: i32, msg: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::of_code(code),
            code,
            msg: msg.into(),
        }
    }

    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::new(err_code::ERR_INVALID_PARAMETERS, msg)
    }

    pub fn not_logged_in() -> Self {
        Self::new(err_code::ERR_SDK_NOT_LOGGED_IN, "未登录")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(err_code::ERR_SDK_INTERNAL, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(err_code::ERR_SDK_NET_DISCONNECT, msg)
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::new(err_code::ERR_GROUP_PERMISSION_DENY, msg)
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// 本地存储 / 编解码等基础设施错误统一归为 Internal
impl From<anyhow::Error> for ImError {
    fn from(e: anyhow::Error) -> Self {
        ImError::internal(format!("{e:#}"))
    }
}

impl From<sqlx::Error> for ImError {
    fn from(e: sqlx::Error) -> Self {
        ImError::internal(format!("数据库错误: {e}"))
    }
}

impl From<serde_json::Error> for ImError {
    fn from(e: serde_json::Error) -> Self {
        ImError::internal(format!("JSON 编解码失败: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_code() {
        let e = ImError::new(err_code::ERR_MSG_EXTENSION_CONFLICT, "conflict");
        assert_eq!(e.kind, ErrorKind::Conflict);
        assert_eq!(e.to_string(), "[23001] conflict");

        assert_eq!(
            ErrorKind::of_code(err_code::ERR_GROUP_ATTRIBUTE_FREQUENCY_LIMIT),
            ErrorKind::RateLimit
        );
        assert_eq!(
            ErrorKind::of_code(err_code::ERR_SIGNALING_INVITATION_RESOLVED),
            ErrorKind::State
        );
        assert_eq!(ErrorKind::of_code(424242), ErrorKind::Internal);
    }

    #[test]
    fn survives_json_round_trip_through_code() {
        let e = ImError::new(err_code::ERR_USER_SIG_EXPIRED, "票据过期");
        let rebuilt = ImError::new(e.code, e.msg.clone());
        assert_eq!(rebuilt, e);
        assert!(rebuilt.is_kind(ErrorKind::Auth));
    }
}
