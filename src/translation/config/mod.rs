//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, PromptKind, PromptTemplates, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 请求参数
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
    pub const DEFAULT_TARGET_LANG: &str = "zh";

    // 默认提示词，`{LANG}` 会被目标语言替换
    pub const LANG_PLACEHOLDER: &str = "{LANG}";
    pub const DEFAULT_SELECTION_PROMPT: &str =
        "你是一个翻译助手。请将用户输入的文本翻译成{LANG}，只返回翻译结果，不需要解释。";
    pub const DEFAULT_WINDOW_PROMPT: &str =
        "你是一个翻译助手。请将用户输入的文本翻译成{LANG}，保持原文的格式和风格。只返回翻译结果，不需要解释。";
    pub const DEFAULT_PAGE_PROMPT: &str =
        "你是一个翻译助手。请将用户输入的文本翻译成{LANG}，保持原文的格式和风格。翻译时要考虑上下文的连贯性。只返回翻译结果，不需要解释。";

    // 缓存设置
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600); // 1小时
    pub const DEFAULT_CACHE_CAPACITY: usize = 5000;
    pub const CACHE_HASH_HEX_LEN: usize = 16;

    // 文本提取
    pub const MIN_TEXT_CHARS: usize = 2;

    // 跳过的元素（连同子树）
    pub const SKIP_ELEMENTS: &[&str] = &[
        "script", "style", "noscript", "svg", "path", "meta", "link", "br", "hr", "iframe",
        "img", "video", "audio", "canvas", "embed", "object", "template",
    ];

    // 行内强调元素，各自成为独立的翻译单元
    pub const INLINE_ELEMENTS: &[&str] = &[
        "strong", "em", "b", "i", "span", "a", "code", "mark", "sub", "sup",
    ];

    // 对照模式中复制结构的根元素
    pub const ROOT_PARENT_TAGS: &[&str] = &[
        "p", "div", "article", "section", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    ];

    // 翻译标记
    pub const CONTAINER_CLASS: &str = "ai-translation-container";
    pub const INLINE_MARKER_CLASS: &str = "ai-translation-inline";
    pub const CLONE_CLASS: &str = "translation-content";
    pub const CONTAINER_ACCENT_STYLE: &str =
        "border-left: 2px solid #4a8af4; padding-left: 10px; margin-top: 10px; margin-bottom: 10px;";
    pub const COPIED_STYLE_PROPERTIES: &[&str] = &["font-family", "font-size", "line-height", "color"];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "page-translator.toml",
        ".page-translator.toml",
        "page-translator.json",
        "~/.config/page-translator/config.toml",
        "/etc/page-translator/config.toml",
    ];
}
