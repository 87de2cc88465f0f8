use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serializer};
use std::io::{Read, Write};

/// Base64 序列化函数（自定义消息的二进制数据以 base64 字符串形式出现在 JSON 中）
pub fn serialize_base64<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use base64::Engine;
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
}

/// Base64 反序列化函数（支持 null 值）
pub fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use base64::Engine;
    // 先尝试反序列化为 Option<String>，以支持 null 值
    let opt_s: Option<String> = Deserialize::deserialize(deserializer)?;
    let s = match opt_s {
        Some(s) => s,
        None => return Ok(Vec::new()), // null 或缺失时返回空 Vec
    };
    if s.is_empty() {
        return Ok(Vec::new());
    }
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(serde::de::Error::custom)
}

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 解压 gzip 数据
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// 压缩数据为 gzip 格式
pub fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// 判断数据是否为 gzip 帧（魔数 0x1f 0x8b）
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// 生成客户端消息 ID：发送者 + 毫秒时间 + 随机后缀
pub fn generate_msg_id(user_id: &str, now_ms: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", user_id, now_ms, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Blob {
        #[serde(
            serialize_with = "serialize_base64",
            deserialize_with = "deserialize_base64",
            default
        )]
        data: Vec<u8>,
    }

    #[test]
    fn base64_field_accepts_null() {
        let blob: Blob = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(blob.data.is_empty());

        let json = serde_json::to_string(&Blob { data: vec![0, 1, 2, 255] }).unwrap();
        assert_eq!(json, r#"{"data":"AAEC/w=="}"#);
    }

    #[test]
    fn gzip_frames_are_detected() {
        let packed = compress_gzip(b"{\"type\":\"KickedOffline\"}").unwrap();
        assert!(is_gzip(&packed));
        assert!(!is_gzip(b"{}"));
        assert_eq!(decompress_gzip(&packed).unwrap(), b"{\"type\":\"KickedOffline\"}");
    }

    #[test]
    fn msg_ids_are_unique_for_same_instant() {
        let a = generate_msg_id("alice", 1000);
        let b = generate_msg_id("alice", 1000);
        assert_ne!(a, b);
        assert!(a.starts_with("alice-1000-"));
    }
}
