//! 翻译模块
//!
//! 采用清晰的模块化架构：
//! - **config**: 服务、提示词、调度与缓存配置
//! - **error**: 统一的错误类型
//! - **pipeline**: 文本收集、过滤、分组与翻译单元生成
//! - **render**: 对照/替换两种渲染方式及原文恢复
//! - **storage**: 带过期时间的翻译缓存
//! - **core**: 流式解码、服务客户端、任务调度与会话控制
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use page_translator::translation::{PageTranslator, RenderMode, TranslationConfig};
//! use page_translator::html_to_dom;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dom = html_to_dom(b"<html><body><p>Bonjour</p></body></html>", "utf-8")?;
//! let config = TranslationConfig::with_service("https://api.example.com/v1/chat/completions", "sk-xxx", "gpt-4o-mini");
//!
//! let mut translator = PageTranslator::from_config(dom, "https://example.com/", config).await?;
//! let report = translator.translate_page(RenderMode::Replace, "en").await?;
//! println!("完成 {}/{}", report.completed, report.total);
//!
//! translator.restore_original();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod storage;

// 重新导出主要类型
pub use config::{ConfigManager, PromptKind, PromptTemplates, TranslationConfig};
pub use self::core::{
    CacheAvailability, HttpProvider, NoopObserver, PageTranslator, Session, SessionObserver,
    SessionReport, StopHandle, TracingObserver, TranslationClient, TranslationProvider,
};
pub use error::{TranslationError, TranslationResult};
pub use pipeline::{RenderMode, Segment, Segmenter};
pub use render::{Renderer, RestoreReport};
pub use storage::{CacheStore, ClearOutcome};
