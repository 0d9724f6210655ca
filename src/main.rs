use anyhow::{bail, Context, Result};
use push_dispatch::{
    cli::{Cli, Commands, SendArgs},
    config::{self, PushConfig, SectionStatus},
    logging, Dispatcher, NotificationIntent, Target, TokenProvider,
};
use std::fs;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 不需要日志的子命令
    match &cli.command {
        Commands::GenerateConfig { path } => return generate_config(path),
        Commands::ValidateConfig { path } => return exit_unless(validate_config(path)?),
        _ => {}
    }

    // 快速读取配置文件的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > 配置文件 > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.as_deref().or(early_log.file.as_deref());

    let log_guard = logging::init_logging(&log_level, log_format.as_deref(), log_file, cli.quiet)?;

    let outcome = run(&cli).await;

    // process::exit 不执行析构，先落盘缓冲中的日志
    drop(log_guard);
    exit_unless(outcome?)
}

/// 执行需要完整配置的子命令，返回是否成功
async fn run(cli: &Cli) -> Result<bool> {
    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = PushConfig::load(cli).context("加载配置失败")?;

    match &cli.command {
        Commands::Send(args) => send(&config, args).await,
        Commands::Token => mint_token(&config).await.map(|_| true),
        Commands::ShowConfig => show_config(&config).map(|_| true),
        Commands::GenerateConfig { .. } | Commands::ValidateConfig { .. } => Ok(true),
    }
}

fn exit_unless(success: bool) -> Result<()> {
    if !success {
        process::exit(1);
    }
    Ok(())
}

/// 发送一条推送，输出 DispatchResult（JSON）
async fn send(config: &PushConfig, args: &SendArgs) -> Result<bool> {
    let dispatcher = if args.dry_run {
        tracing::info!("Dry run: payload is logged, nothing is sent");
        Dispatcher::dry_run(config)
    } else {
        Dispatcher::from_config(config).context("初始化推送 Provider 失败")?
    };

    let intent = intent_from_args(args)?;
    let result = dispatcher.send(args.platform, &intent).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}

fn intent_from_args(args: &SendArgs) -> Result<NotificationIntent> {
    let target = match (&args.to, &args.topic, &args.condition, &args.registration_ids) {
        (Some(token), _, _, _) => Target::Device(token.clone()),
        (_, Some(topic), _, _) => Target::Topic(topic.clone()),
        (_, _, Some(condition), _) => Target::Condition(condition.clone()),
        (_, _, _, Some(ids)) => Target::Multicast(ids.clone()),
        _ => bail!("one of --to, --topic, --condition or --registration-ids is required"),
    };

    let mut intent = NotificationIntent::new(target)
        .with_title(args.title.clone())
        .with_body(args.body.clone())
        .with_priority(args.priority)
        .with_badge(args.badge);
    intent.sound = args.sound.clone();
    intent.icon = args.icon.clone();
    intent.color = args.color.clone();
    intent.click_action = args.click_action.clone();
    intent.collapse_key = args.collapse_key.clone();
    intent.custom_data.extend(args.data.iter().cloned());

    Ok(intent)
}

/// 签发一个 APNs provider token
async fn mint_token(config: &PushConfig) -> Result<()> {
    let credential = match config.apns.status()? {
        SectionStatus::Ready(credential) => credential,
        SectionStatus::Missing => bail!("APNs is not configured"),
        SectionStatus::Incomplete(missing) => {
            bail!("incomplete [apns] configuration, missing: {}", missing.join(", "))
        }
    };

    let tokens = TokenProvider::new(credential);
    let token = tokens.get_token().await?;
    println!("{}", token);
    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        bail!("配置文件已存在: {}", path);
    }
    fs::write(path, config::DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("无法写入配置文件: {}", path))?;
    println!("✅ 已生成配置文件: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<bool> {
    let mut config = PushConfig::from_toml_file(path)?;
    config.merge_from_env()?;
    let report = config.validate();

    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }
    for error in &report.errors {
        println!("❌ {}", error);
    }

    if !report.is_ok() {
        return Ok(false);
    }
    println!("✅ 配置文件有效: {}", path);
    Ok(true)
}

/// 显示最终配置
fn show_config(config: &PushConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(&config.masked()).context("序列化配置失败")?;
    println!("{}", rendered);
    Ok(())
}
