//! page-translator 命令行入口
//!
//! 读取一个 HTML 文件，按配置的翻译服务流式翻译页面文本，输出翻译后的文档。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use page_translator::env::{core::LogLevel, generate_env_docs, EnvVar};
use page_translator::translation::{
    ConfigManager, PageTranslator, RenderMode, TracingObserver, TranslationError,
};
use page_translator::html_to_dom;

#[derive(Parser, Debug)]
#[command(
    name = "page-translator",
    version,
    about = "流式翻译 HTML 页面，保留原始结构",
    after_help = "环境变量见 --env-help"
)]
struct Cli {
    /// 输入的 HTML 文件
    #[arg(required_unless_present = "env_help")]
    input: Option<PathBuf>,

    /// 目标语言
    #[arg(short, long, default_value = "zh")]
    lang: String,

    /// 渲染模式：compare（对照）或 replace（替换）
    #[arg(short, long, default_value = "compare")]
    mode: RenderMode,

    /// 页面地址，用作缓存键（默认为输入文件的 file:// 地址）
    #[arg(short, long)]
    url: Option<String>,

    /// 输出文件（默认写到标准输出）
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 配置文件（TOML 或 JSON）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 超过该秒数后停止所有翻译并输出当前结果
    #[arg(short, long)]
    timeout: Option<u64>,

    /// 输入文件的字符编码
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// 打印支持的环境变量
    #[arg(long)]
    env_help: bool,
}

fn init_logging() {
    let level = LogLevel::get_or_default("info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("page_translator={}", level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn page_url_for(input: &Path) -> String {
    let absolute = fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf());
    url::Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("file://{}", absolute.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.env_help {
        print!("{}", generate_env_docs());
        return Ok(());
    }

    init_logging();

    let Some(input) = cli.input.as_deref() else {
        return Err(TranslationError::InvalidInput("缺少输入文件".to_string()).into());
    };

    if encoding_rs::Encoding::for_label(cli.encoding.as_bytes()).is_none() {
        return Err(
            TranslationError::InvalidInput(format!("未知的字符编码: {}", cli.encoding)).into(),
        );
    }

    let config = match &cli.config {
        Some(path) => ConfigManager::from_file(path)
            .map_err(|e| e.with_context(path.display()))?
            .into_config(),
        None => ConfigManager::new()?.into_config(),
    };

    let data = fs::read(input)?;
    let dom = html_to_dom(&data, &cli.encoding)?;
    let page_url = cli.url.clone().unwrap_or_else(|| page_url_for(input));

    let mut translator = PageTranslator::from_config(dom, page_url, config)
        .await?
        .with_observer(Rc::new(TracingObserver));

    let report = {
        let session = translator.begin_session(cli.mode, &cli.lang);
        let stop = session.stop_handle();
        let run = session.run();
        tokio::pin!(run);

        match cli.timeout {
            Some(secs) => {
                tokio::select! {
                    report = &mut run => report?,
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                        tracing::warn!("翻译超时（{} 秒），停止剩余任务", secs);
                        stop.stop_all();
                        (&mut run).await?
                    }
                }
            }
            None => run.await?,
        }
    };

    tracing::info!(
        "翻译结果: {}/{} 完成，缓存 {}，失败 {}，取消 {}",
        report.completed,
        report.total,
        report.cached,
        report.failed,
        report.cancelled
    );

    let html = translator.serialize(&cli.encoding)?;
    match &cli.output {
        Some(path) => fs::write(path, html)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&html)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
