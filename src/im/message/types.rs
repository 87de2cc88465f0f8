//! 消息元素类型定义
//!
//! 消息内容是一个带标签的联合体：文本、自定义二进制、图片、语音、视频、文件、
//! 位置、表情、合并转发。

use crate::im::error::{err_code, ImError, ImResult};
use crate::im::message::models::Message;
use serde::{Deserialize, Serialize};

/// 文本 / 自定义 / 位置 / 表情 / 合并消息体上限（12KB）
pub const MAX_BODY_SIZE: usize = 12 * 1024;
/// 图片、语音文件上限（28MB）
pub const MAX_IMAGE_SOUND_SIZE: u64 = 28 * 1024 * 1024;
/// 视频、文件上限（100MB）
pub const MAX_VIDEO_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// 文本元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElem {
    pub text: String,
    /// @ 的用户列表（仅群消息有效）
    #[serde(default)]
    pub at_user_list: Vec<String>,
}

/// 自定义消息元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomElem {
    #[serde(
        serialize_with = "crate::im::serialization::serialize_base64",
        deserialize_with = "crate::im::serialization::deserialize_base64",
        default
    )]
    pub data: Vec<u8>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extension: String,
}

/// 图片元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElem {
    pub source_path: String,
    #[serde(default)]
    pub url: String,
    pub size: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// 语音元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundElem {
    pub sound_path: String,
    #[serde(default)]
    pub url: String,
    pub data_size: u64,
    /// 时长（秒）
    pub duration: u32,
}

/// 视频元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoElem {
    pub video_path: String,
    #[serde(default)]
    pub url: String,
    pub video_size: u64,
    pub duration: u32,
    #[serde(default)]
    pub snapshot_path: String,
}

/// 文件元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileElem {
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub url: String,
    pub file_size: u64,
}

/// 位置元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationElem {
    pub description: String,
    pub longitude: f64,
    pub latitude: f64,
}

/// 表情元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceElem {
    pub index: i32,
    #[serde(
        serialize_with = "crate::im::serialization::serialize_base64",
        deserialize_with = "crate::im::serialization::deserialize_base64",
        default
    )]
    pub data: Vec<u8>,
}

/// 合并转发元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergerElem {
    pub title: String,
    #[serde(default)]
    pub abstract_list: Vec<String>,
    /// 不支持合并消息的旧版本展示的兼容文本
    #[serde(default)]
    pub compatible_text: String,
    #[serde(default)]
    pub message_list: Vec<Message>,
}

/// 消息内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "elemType", content = "elem")]
pub enum MessageContent {
    Text(TextElem),
    Custom(CustomElem),
    Image(ImageElem),
    Sound(SoundElem),
    Video(VideoElem),
    File(FileElem),
    Location(LocationElem),
    Face(FaceElem),
    Merger(MergerElem),
}

impl MessageContent {
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageContent::Text(_) => "Text",
            MessageContent::Custom(_) => "Custom",
            MessageContent::Image(_) => "Image",
            MessageContent::Sound(_) => "Sound",
            MessageContent::Video(_) => "Video",
            MessageContent::File(_) => "File",
            MessageContent::Location(_) => "Location",
            MessageContent::Face(_) => "Face",
            MessageContent::Merger(_) => "Merger",
        }
    }

    /// 可本地检索的文本（用于关键字搜索）
    pub fn searchable_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.text.clone(),
            MessageContent::Custom(c) => c.description.clone(),
            MessageContent::File(f) => f.file_name.clone(),
            MessageContent::Location(l) => l.description.clone(),
            MessageContent::Merger(m) => m.title.clone(),
            _ => String::new(),
        }
    }

    /// 校验内容大小：媒体类按文件大小，其余按编码后的消息体大小
    pub fn check_size(&self) -> Result<(), String> {
        match self {
            MessageContent::Image(e) if e.size > MAX_IMAGE_SOUND_SIZE => {
                Err(format!("图片大小 {} 超过上限 {}", e.size, MAX_IMAGE_SOUND_SIZE))
            }
            MessageContent::Sound(e) if e.data_size > MAX_IMAGE_SOUND_SIZE => Err(format!(
                "语音大小 {} 超过上限 {}",
                e.data_size, MAX_IMAGE_SOUND_SIZE
            )),
            MessageContent::Video(e) if e.video_size > MAX_VIDEO_FILE_SIZE => Err(format!(
                "视频大小 {} 超过上限 {}",
                e.video_size, MAX_VIDEO_FILE_SIZE
            )),
            MessageContent::File(e) if e.file_size > MAX_VIDEO_FILE_SIZE => Err(format!(
                "文件大小 {} 超过上限 {}",
                e.file_size, MAX_VIDEO_FILE_SIZE
            )),
            MessageContent::Image(_)
            | MessageContent::Sound(_)
            | MessageContent::Video(_)
            | MessageContent::File(_) => Ok(()),
            _ => {
                let body_len = self.body_len();
                if body_len > MAX_BODY_SIZE {
                    Err(format!("消息体大小 {} 超过上限 {}", body_len, MAX_BODY_SIZE))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// 与 [`check_size`](Self::check_size) 相同，超限时返回带错误码的 [`ImError`]
    pub fn validate_size(&self) -> ImResult<()> {
        self.check_size().map_err(|msg| {
            let code = if self.is_media() {
                err_code::ERR_MSG_FILE_SIZE_LIMIT
            } else {
                err_code::ERR_MSG_BODY_SIZE_LIMIT
            };
            ImError::new(code, msg)
        })
    }

    fn body_len(&self) -> usize {
        match self {
            MessageContent::Text(t) => {
                t.text.len() + t.at_user_list.iter().map(|u| u.len()).sum::<usize>()
            }
            MessageContent::Custom(c) => c.data.len() + c.description.len() + c.extension.len(),
            MessageContent::Face(f) => f.data.len() + 4,
            _ => serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX),
        }
    }

    /// 是否为媒体类（大小由文件本身决定）
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            MessageContent::Image(_)
                | MessageContent::Sound(_)
                | MessageContent::Video(_)
                | MessageContent::File(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_limit_is_12kb() {
        let ok = MessageContent::Text(TextElem {
            text: "a".repeat(MAX_BODY_SIZE),
            at_user_list: vec![],
        });
        assert!(ok.check_size().is_ok());

        let too_big = MessageContent::Text(TextElem {
            text: "a".repeat(MAX_BODY_SIZE + 1),
            at_user_list: vec![],
        });
        assert!(too_big.check_size().is_err());
    }

    #[test]
    fn media_limits_follow_content_type() {
        let image = MessageContent::Image(ImageElem {
            source_path: "/tmp/a.png".into(),
            url: String::new(),
            size: MAX_IMAGE_SOUND_SIZE + 1,
            width: 1,
            height: 1,
        });
        assert!(image.check_size().is_err());

        // 同样大小的视频在 100MB 限制内
        let video = MessageContent::Video(VideoElem {
            video_path: "/tmp/a.mp4".into(),
            url: String::new(),
            video_size: MAX_IMAGE_SOUND_SIZE + 1,
            duration: 3,
            snapshot_path: String::new(),
        });
        assert!(video.check_size().is_ok());

        let file = MessageContent::File(FileElem {
            file_path: "/tmp/a.bin".into(),
            file_name: "a.bin".into(),
            url: String::new(),
            file_size: MAX_VIDEO_FILE_SIZE + 1,
        });
        assert!(file.check_size().is_err());
        assert_eq!(
            file.validate_size().unwrap_err().code,
            err_code::ERR_MSG_FILE_SIZE_LIMIT
        );
    }

    #[test]
    fn content_is_tagged_in_json() {
        let content = MessageContent::Custom(CustomElem {
            data: b"{}".to_vec(),
            description: "d".into(),
            extension: String::new(),
        });
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["elemType"], "Custom");
        assert_eq!(json["elem"]["data"], "e30=");
    }
}
