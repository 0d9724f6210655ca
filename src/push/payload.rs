//! 推送 payload 构建
//!
//! FCM legacy 与 APNs 共享同一个 payload 结构：接收者、投递选项、
//! `notification` 展示块和 `data` 数据块。两个平台只有展示块字段不同。

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::push::types::{NotificationIntent, Priority, PushVendor, Target};

/// `data` 中始终回显的字段，自定义数据不能覆盖
const ECHO_KEYS: [&str; 3] = ["title", "message", "badge"];

/// 接收者（互斥）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// 设备 token、notification key 或 topic
    To(String),
    /// 多个设备 token
    RegistrationIds(String),
    /// topic 条件表达式，多 topic 推送时代替 `to`
    Condition(String),
}

impl From<&Target> for Recipient {
    fn from(target: &Target) -> Self {
        match target {
            Target::Device(token) => Recipient::To(token.clone()),
            Target::Topic(topic) => Recipient::To(topic.clone()),
            Target::Multicast(ids) => Recipient::RegistrationIds(ids.clone()),
            Target::Condition(condition) => Recipient::Condition(condition.clone()),
        }
    }
}

/// Android 展示字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AndroidNotification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// 相同 tag 的通知会替换通知栏中已有的通知
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// `#rrggbb`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_args: Option<String>,
}

/// iOS 展示字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IosNotification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// iOS 展示块中 badge 为字符串
    pub badge: String,
    /// 对应 APNs payload 中的 `category`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_args: Option<String>,
}

/// 按平台区分的展示块
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DisplayBlock {
    Android(AndroidNotification),
    Ios(IosNotification),
}

/// 数据块，由 App 自行渲染
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataBlock {
    pub badge: i32,
    pub title: String,
    pub message: String,
    #[serde(flatten)]
    pub custom: BTreeMap<String, String>,
}

/// 发送给 Provider 的 JSON 结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WirePayload {
    #[serde(flatten)]
    pub recipient: Recipient,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    pub priority: Priority,
    pub notification: DisplayBlock,
    pub data: DataBlock,
}

impl WirePayload {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Provider 级默认值（不来自 intent）
#[derive(Debug, Clone, Default)]
pub struct PayloadDefaults {
    /// Android 通知 tag
    pub alarm_tag: Option<String>,
}

/// 构建 payload，纯函数
pub fn build(vendor: PushVendor, intent: &NotificationIntent, defaults: &PayloadDefaults) -> WirePayload {
    let notification = match vendor {
        PushVendor::Fcm => DisplayBlock::Android(android_notification(intent, defaults)),
        PushVendor::Apns => DisplayBlock::Ios(ios_notification(intent)),
    };

    WirePayload {
        recipient: Recipient::from(&intent.target),
        collapse_key: intent.collapse_key.clone(),
        priority: intent.priority,
        notification,
        data: data_block(intent),
    }
}

fn data_block(intent: &NotificationIntent) -> DataBlock {
    let mut custom = intent.custom_data.clone();
    custom.retain(|key, _| {
        let echoed = ECHO_KEYS.contains(&key.as_str());
        if echoed {
            debug!("[PAYLOAD] Custom data key '{}' shadowed by echoed field", key);
        }
        !echoed
    });

    DataBlock {
        badge: intent.badge,
        title: intent.title.clone(),
        message: intent.body.clone(),
        custom,
    }
}

fn android_notification(intent: &NotificationIntent, defaults: &PayloadDefaults) -> AndroidNotification {
    let loc = &intent.localization;
    AndroidNotification {
        title: intent.title.clone(),
        body: intent.body.clone(),
        icon: intent.icon.clone(),
        sound: intent.sound.clone(),
        tag: defaults.alarm_tag.clone(),
        color: intent.color.clone(),
        click_action: intent.click_action.clone(),
        body_loc_key: loc.body_loc_key.clone(),
        body_loc_args: loc.body_loc_args.clone(),
        title_loc_key: loc.title_loc_key.clone(),
        title_loc_args: loc.title_loc_args.clone(),
    }
}

fn ios_notification(intent: &NotificationIntent) -> IosNotification {
    let loc = &intent.localization;
    IosNotification {
        title: intent.title.clone(),
        body: intent.body.clone(),
        sound: intent.sound.clone(),
        badge: intent.badge.to_string(),
        click_action: intent.click_action.clone(),
        body_loc_key: loc.body_loc_key.clone(),
        body_loc_args: loc.body_loc_args.clone(),
        title_loc_key: loc.title_loc_key.clone(),
        title_loc_args: loc.title_loc_args.clone(),
    }
}
