//! # Page Translator Library
//!
//! 网页内容的流式翻译引擎：在保留原始结构的前提下分段、并发翻译并可无损还原。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 文档解析、DOM 操作与内联样式解析
//! - `translation` - 分段、缓存、流式解码、调度与会话控制
//! - `env` - 类型安全的环境变量

pub mod env;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use parsers::html::{html_to_dom, serialize_document};
pub use translation::{
    CacheStore, PageTranslator, RenderMode, SessionObserver, SessionReport, TranslationConfig,
    TranslationError, TranslationResult,
};
