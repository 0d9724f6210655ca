use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PushError;

/// 推送平台
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PushVendor {
    /// Apple Push Notification service（token 认证）
    Apns,
    /// Firebase Cloud Messaging legacy HTTP（server key 认证）
    Fcm,
}

impl PushVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushVendor::Apns => "apns",
            PushVendor::Fcm => "fcm",
        }
    }
}

impl fmt::Display for PushVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushVendor {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apns" | "ios" => Ok(PushVendor::Apns),
            "fcm" | "android" => Ok(PushVendor::Fcm),
            other => Err(PushError::Configuration(format!(
                "unknown push platform: {}",
                other
            ))),
        }
    }
}

/// APNs 环境
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApnsEnvironment {
    #[default]
    Production,
    Sandbox,
}

impl ApnsEnvironment {
    pub fn host(&self) -> &'static str {
        match self {
            ApnsEnvironment::Production => "api.push.apple.com",
            ApnsEnvironment::Sandbox => "api.sandbox.push.apple.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApnsEnvironment::Production => "production",
            ApnsEnvironment::Sandbox => "sandbox",
        }
    }
}

impl FromStr for ApnsEnvironment {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(ApnsEnvironment::Production),
            "sandbox" | "development" | "dev" => Ok(ApnsEnvironment::Sandbox),
            other => Err(PushError::Configuration(format!(
                "unknown APNs environment: {}",
                other
            ))),
        }
    }
}

/// 消息优先级
///
/// iOS 上 `normal` / `high` 分别对应 APNs 优先级 5 和 10
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    #[default]
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// `apns-priority` 请求头的值
    pub fn apns_priority(&self) -> &'static str {
        match self {
            Priority::Normal => "5",
            Priority::High => "10",
        }
    }
}

impl FromStr for Priority {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(PushError::Configuration(format!(
                "unknown priority: {}",
                other
            ))),
        }
    }
}

/// 推送目标（互斥，只能选一种）
///
/// 多 topic 推送使用 `Condition` 代替 `to`；所有形式都原样透传，不做本地校验
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// 单个设备 token
    Device(String),
    /// 多个设备 token（原始字符串）
    Multicast(String),
    /// Topic，例如 `/topics/news`
    Topic(String),
    /// Topic 条件表达式，例如 `'news' in topics && 'sports' in topics`
    Condition(String),
}

impl Target {
    pub fn as_str(&self) -> &str {
        match self {
            Target::Device(v) | Target::Multicast(v) | Target::Topic(v) | Target::Condition(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Device(_) => "device",
            Target::Multicast(_) => "multicast",
            Target::Topic(_) => "topic",
            Target::Condition(_) => "condition",
        }
    }
}

/// 本地化字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localization {
    pub title_loc_key: Option<String>,
    pub title_loc_args: Option<String>,
    pub body_loc_key: Option<String>,
    pub body_loc_args: Option<String>,
}

/// 调用方的推送意图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub target: Target,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub click_action: Option<String>,
    pub sound: Option<String>,
    pub badge: i32,
    pub icon: Option<String>,
    pub color: Option<String>,
    /// 自定义数据，有序存储以保证输出确定
    pub custom_data: BTreeMap<String, String>,
    pub collapse_key: Option<String>,
    pub localization: Localization,
}

impl NotificationIntent {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            title: String::new(),
            body: String::new(),
            priority: Priority::default(),
            click_action: None,
            sound: None,
            badge: 0,
            icon: None,
            color: None,
            custom_data: BTreeMap::new(),
            collapse_key: None,
            localization: Localization::default(),
        }
    }

    pub fn to_device(token: impl Into<String>) -> Self {
        Self::new(Target::Device(token.into()))
    }

    pub fn to_topic(topic: impl Into<String>) -> Self {
        Self::new(Target::Topic(topic.into()))
    }

    pub fn to_condition(condition: impl Into<String>) -> Self {
        Self::new(Target::Condition(condition.into()))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_badge(mut self, badge: i32) -> Self {
        self.badge = badge;
        self
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_click_action(mut self, action: impl Into<String>) -> Self {
        self.click_action = Some(action.into());
        self
    }

    pub fn with_collapse_key(mut self, key: impl Into<String>) -> Self {
        self.collapse_key = Some(key.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_data.insert(key.into(), value.into());
        self
    }

    pub fn with_localization(mut self, localization: Localization) -> Self {
        self.localization = localization;
        self
    }
}

/// 单次推送的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub success: bool,
    pub detail: String,
}

impl DispatchResult {
    pub fn success() -> Self {
        Self {
            success: true,
            detail: "success".to_string(),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}
