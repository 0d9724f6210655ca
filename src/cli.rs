use clap::{Args, Parser, Subcommand};

use crate::push::types::{ApnsEnvironment, Priority, PushVendor};

// 确保 Parser trait 被使用
impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// push-dispatch - FCM / APNs 推送发送工具
#[derive(Parser, Debug)]
#[command(name = "push-dispatch")]
#[command(version)]
#[command(about = "向 FCM (legacy HTTP) 和 APNs 发送推送通知", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// APNs 环境
    #[arg(long, global = true, value_name = "ENV", help = "APNs 环境: production, sandbox")]
    pub apns_environment: Option<ApnsEnvironment>,

    /// 请求超时（秒）
    #[arg(long, global = true, value_name = "SECS", help = "单次 HTTP 请求超时（秒）")]
    pub request_timeout: Option<u64>,

    /// 日志级别
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, global = true, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, global = true, value_name = "PATH", help = "日志输出文件路径")]
    pub log_file: Option<String>,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, global = true, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', global = true, help = "静默模式（只输出错误日志）")]
    pub quiet: bool,

    /// 开发模式（等同于 --log-level debug --log-format pretty）
    #[arg(long, global = true, help = "启用开发模式")]
    pub dev: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 发送一条推送
    Send(SendArgs),
    /// 签发一个 APNs provider token 并输出
    Token,
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "push.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "push.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置，敏感字段已隐藏）
    ShowConfig,
}

/// `send` 子命令参数
#[derive(Args, Debug)]
pub struct SendArgs {
    /// 推送平台
    #[arg(long, value_name = "PLATFORM", help = "推送平台: fcm, apns")]
    pub platform: PushVendor,

    /// 设备 token
    #[arg(long, value_name = "TOKEN", group = "target", help = "单个设备 token")]
    pub to: Option<String>,

    /// Topic
    #[arg(long, value_name = "TOPIC", group = "target", help = "Topic，例如 /topics/news")]
    pub topic: Option<String>,

    /// Topic 条件表达式
    #[arg(long, value_name = "EXPR", group = "target", help = "Topic 条件，例如 \"'a' in topics && 'b' in topics\"")]
    pub condition: Option<String>,

    /// 多个设备 token
    #[arg(long, value_name = "IDS", group = "target", help = "多个设备 token（原样透传）")]
    pub registration_ids: Option<String>,

    #[arg(long, default_value = "")]
    pub title: String,

    #[arg(long, default_value = "")]
    pub body: String,

    #[arg(long, value_name = "PRIORITY", default_value = "high", help = "优先级: normal, high")]
    pub priority: Priority,

    #[arg(long, default_value_t = 0)]
    pub badge: i32,

    #[arg(long)]
    pub sound: Option<String>,

    #[arg(long)]
    pub icon: Option<String>,

    #[arg(long, help = "图标颜色，#rrggbb")]
    pub color: Option<String>,

    #[arg(long)]
    pub click_action: Option<String>,

    #[arg(long)]
    pub collapse_key: Option<String>,

    /// 自定义数据（可重复：--data key=value）
    #[arg(long = "data", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub data: Vec<(String, String)>,

    /// 只打印 payload，不发送
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if self.dev {
            return Some("debug".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        // 根据 verbose 级别设置
        match self.verbose {
            0 => None, // 使用默认或配置文件
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        if self.dev {
            return Some("pretty".to_string());
        }
        self.log_format.clone()
    }
}
