//! 翻译服务客户端
//!
//! [`TranslationProvider`] 负责打开一条流式请求，[`HttpProvider`] 是基于 reqwest 的实现。
//! [`TranslationClient`] 负责组装提示词、校验配置并解码结果。

use std::rc::Rc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::stream::{decode_stream, ByteStream, DecodedStream, StreamStatus};
use crate::translation::config::{PromptKind, TranslationConfig};
use crate::translation::error::{TranslationError, TranslationResult};

/// 对话消息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(config: &TranslationConfig, system_prompt: String, text: &str) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            temperature: config.temperature,
            stream: true,
        }
    }

    /// 待翻译的原文
    pub fn user_text(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// 流式翻译服务
#[async_trait(?Send)]
pub trait TranslationProvider {
    /// 发送请求并返回响应体字节流
    async fn open_stream(
        &self,
        config: &TranslationConfig,
        request: &ChatRequest,
    ) -> TranslationResult<ByteStream>;
}

/// 基于 HTTP 的 OpenAI 兼容服务
pub struct HttpProvider {
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: &TranslationConfig) -> TranslationResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait(?Send)]
impl TranslationProvider for HttpProvider {
    async fn open_stream(
        &self,
        config: &TranslationConfig,
        request: &ChatRequest,
    ) -> TranslationResult<ByteStream> {
        let response = self
            .client
            .post(config.api_endpoint.trim())
            .bearer_auth(&config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("翻译服务返回错误状态 {}: {}", status, body);
            return Err(TranslationError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TranslationError::from))
            .boxed_local())
    }
}

/// 翻译客户端
#[derive(Clone)]
pub struct TranslationClient {
    provider: Rc<dyn TranslationProvider>,
    config: Rc<TranslationConfig>,
}

impl TranslationClient {
    pub fn new(provider: Rc<dyn TranslationProvider>, config: Rc<TranslationConfig>) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    /// 流式翻译一段文本
    ///
    /// 每收到一段增量都以累计文本调用 `on_update`；返回的文本已去掉首尾空白。
    /// 配置不完整时在发出任何请求之前返回 `ConfigError`。
    pub async fn translate_streaming<F>(
        &self,
        text: &str,
        target_lang: &str,
        kind: PromptKind,
        cancel: &CancellationToken,
        on_update: F,
    ) -> TranslationResult<DecodedStream>
    where
        F: FnMut(&str),
    {
        self.config.validate_for_request(kind)?;
        let system_prompt = self.config.prompts.render(kind, target_lang)?;
        let request = ChatRequest::new(&self.config, system_prompt, text);

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(DecodedStream {
                    text: String::new(),
                    status: StreamStatus::Cancelled,
                });
            }
            opened = self.provider.open_stream(&self.config, &request) => opened?,
        };

        let mut decoded = decode_stream(stream, cancel, on_update).await?;
        decoded.text = decoded.text.trim().to_string();
        Ok(decoded)
    }

    /// 非流式便捷接口
    pub async fn translate_text(
        &self,
        text: &str,
        target_lang: &str,
        kind: PromptKind,
    ) -> TranslationResult<String> {
        let never = CancellationToken::new();
        let decoded = self
            .translate_streaming(text, target_lang, kind, &never, |_| {})
            .await?;
        Ok(decoded.text)
    }
}
