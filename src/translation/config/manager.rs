//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{helpers::config_error, TranslationError, TranslationResult};

/// 提示词模板，`{LANG}` 为目标语言占位符
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub selection: String,
    pub window: String,
    pub page: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            selection: constants::DEFAULT_SELECTION_PROMPT.to_string(),
            window: constants::DEFAULT_WINDOW_PROMPT.to_string(),
            page: constants::DEFAULT_PAGE_PROMPT.to_string(),
        }
    }
}

/// 请求使用的提示词类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// 划词翻译
    Selection,
    /// 小窗翻译
    Window,
    /// 整页翻译
    Page,
}

impl PromptTemplates {
    /// 取模板，未配置的类别回退到 selection 模板
    pub fn template(&self, kind: PromptKind) -> Option<&str> {
        let chosen = match kind {
            PromptKind::Selection => &self.selection,
            PromptKind::Window => &self.window,
            PromptKind::Page => &self.page,
        };
        [chosen.as_str(), self.selection.as_str()]
            .into_iter()
            .find(|t| !t.trim().is_empty())
    }

    /// 生成系统提示词
    pub fn render(&self, kind: PromptKind, target_lang: &str) -> TranslationResult<String> {
        let template = self
            .template(kind)
            .ok_or_else(|| TranslationError::ConfigError("未配置翻译提示词".to_string()))?;
        Ok(template.replace(constants::LANG_PLACEHOLDER, target_lang))
    }
}

/// 翻译配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 服务配置
    #[serde(alias = "apiEndpoint")]
    pub api_endpoint: String,
    #[serde(alias = "apiKey")]
    pub api_key: String,
    pub model: String,
    pub prompts: PromptTemplates,
    pub temperature: f32,

    // 调度配置
    pub max_concurrent_requests: usize,
    pub request_timeout_secs: Option<u64>,

    // 缓存配置
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            api_key: String::new(),
            model: String::new(),
            prompts: PromptTemplates::default(),
            temperature: constants::DEFAULT_TEMPERATURE,
            max_concurrent_requests: constants::DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout_secs: None,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
            cache_capacity: constants::DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl TranslationConfig {
    /// 创建指向指定服务的配置
    pub fn with_service(api_endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_endpoint: api_endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..Self::default()
        }
    }

    /// 验证结构性参数（加载时调用）
    pub fn validate(&self) -> TranslationResult<()> {
        if self.max_concurrent_requests == 0 {
            return Err(TranslationError::ConfigError("最大并发数不能为0".to_string()));
        }

        if self.cache_capacity == 0 {
            return Err(TranslationError::ConfigError("缓存容量不能为0".to_string()));
        }

        if self.cache_ttl_secs == 0 {
            return Err(TranslationError::ConfigError("缓存有效期不能为0".to_string()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TranslationError::ConfigError(format!(
                "temperature 超出范围: {}",
                self.temperature
            )));
        }

        Ok(())
    }

    /// 验证发起请求所需的服务参数（端点、密钥、模型、提示词）
    pub fn validate_for_request(&self, kind: PromptKind) -> TranslationResult<()> {
        if self.api_endpoint.trim().is_empty()
            || self.api_key.trim().is_empty()
            || self.model.trim().is_empty()
        {
            return Err(TranslationError::ConfigError(
                "请先配置API信息（端点、密钥和模型）".to_string(),
            ));
        }

        let endpoint = url::Url::parse(self.api_endpoint.trim())?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TranslationError::ConfigError(format!(
                "API 端点必须使用 http 或 https: {}",
                self.api_endpoint
            )));
        }

        if self.prompts.template(kind).is_none() {
            return Err(TranslationError::ConfigError("未配置翻译提示词".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖（使用类型安全环境变量系统）
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{cache, translation, EnvVar};

        match translation::ApiEndpoint::get_set() {
            Some(Ok(endpoint)) => {
                self.api_endpoint = endpoint;
                tracing::info!("环境变量覆盖 API 端点: {}", self.api_endpoint);
            }
            Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
            None => {}
        }

        match translation::ApiKey::get_set() {
            Some(Ok(key)) => self.api_key = key,
            Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
            None => {}
        }

        match translation::Model::get_set() {
            Some(Ok(model)) => self.model = model,
            Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
            None => {}
        }

        match translation::MaxConcurrentRequests::get_set() {
            Some(Ok(max_concurrent)) => self.max_concurrent_requests = max_concurrent,
            Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
            None => {}
        }

        match translation::RequestTimeout::get_set() {
            Some(Ok(timeout)) => self.request_timeout_secs = Some(timeout.as_secs()),
            Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
            None => {}
        }

        match cache::Capacity::get_set() {
            Some(Ok(capacity)) => self.cache_capacity = capacity,
            Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
            None => {}
        }

        match cache::Ttl::get_set() {
            Some(Ok(ttl)) => self.cache_ttl_secs = ttl.as_secs(),
            Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
            None => {}
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
}

impl ConfigManager {
    /// 按搜索路径加载配置，再应用环境变量覆盖
    pub fn new() -> TranslationResult<Self> {
        let config = Self::load_config()?;
        Self::finish(config)
    }

    /// 从指定文件加载配置，再应用环境变量覆盖
    pub fn from_file<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        Self::load_dotenv();
        let config = Self::load_from_file(path.as_ref())?;
        Self::finish(config)
    }

    fn finish(mut config: TranslationConfig) -> TranslationResult<Self> {
        config.apply_env_overrides();
        config.validate()?;
        Ok(Self { config })
    }

    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    fn load_config() -> TranslationResult<TranslationConfig> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        // 查找配置文件
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(TranslationConfig::default())
    }

    fn load_from_file(path: &Path) -> TranslationResult<TranslationConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_error(format!("读取配置文件失败: {}", e)))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content)
                .map_err(|e| config_error(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| config_error(format!("解析TOML配置失败: {}", e)))
        }
    }

    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }
}
