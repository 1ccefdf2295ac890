//! 会话控制
//!
//! [`PageTranslator`] 持有一个已解析的页面及其渲染器、缓存和翻译客户端。
//! 每次翻译通过 [`PageTranslator::begin_session`] 得到一个 [`Session`]：
//! 它先恢复上一次的修改，再分段；`Session` 独占借用翻译器并在 `run` 时被消耗，
//! 因此同一页面上不会有两个会话同时存在。

use std::rc::Rc;
use std::sync::Arc;

use markup5ever_rcdom::{Handle, RcDom};
use tokio_util::sync::CancellationToken;

use super::client::{HttpProvider, TranslationClient, TranslationProvider};
use super::observer::{NoopObserver, SessionObserver};
use super::scheduler::{Scheduler, SessionReport, StopHandle};
use crate::parsers::html::{find_body, serialize_document};
use crate::translation::config::{constants, PromptKind, TranslationConfig};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::{RenderMode, Segment, Segmenter};
use crate::translation::render::{Renderer, RestoreReport};
use crate::translation::storage::{CacheStore, ClearOutcome};

/// 当前页面在两种模式下是否有可用缓存
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheAvailability {
    pub compare: bool,
    pub replace: bool,
}

/// 页面翻译器
pub struct PageTranslator {
    // 文档树的所有者，必须与渲染器同生命周期
    dom: RcDom,
    renderer: Renderer,
    segmenter: Segmenter,
    cache: Arc<CacheStore>,
    client: TranslationClient,
    observer: Rc<dyn SessionObserver>,
    page_url: String,
    target_lang: String,
}

impl PageTranslator {
    pub fn new(
        dom: RcDom,
        page_url: impl Into<String>,
        config: TranslationConfig,
        cache: Arc<CacheStore>,
        provider: Rc<dyn TranslationProvider>,
    ) -> Self {
        let root = content_root(&dom);
        Self {
            dom,
            renderer: Renderer::new(root),
            segmenter: Segmenter::default(),
            cache,
            client: TranslationClient::new(provider, Rc::new(config)),
            observer: Rc::new(NoopObserver),
            page_url: page_url.into(),
            target_lang: constants::DEFAULT_TARGET_LANG.to_string(),
        }
    }

    /// 使用 HTTP 服务和按配置创建的内存缓存
    pub async fn from_config(
        dom: RcDom,
        page_url: impl Into<String>,
        config: TranslationConfig,
    ) -> TranslationResult<Self> {
        let cache = Arc::new(CacheStore::from_config(&config).await?);
        let provider = Rc::new(HttpProvider::new(&config)?);
        Ok(Self::new(dom, page_url, config, cache, provider))
    }

    pub fn with_observer(mut self, observer: Rc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn document(&self) -> &RcDom {
        &self.dom
    }

    pub fn root(&self) -> &Handle {
        self.renderer.root()
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn client(&self) -> &TranslationClient {
        &self.client
    }

    /// 序列化当前文档
    pub fn serialize(&self, document_encoding: &str) -> TranslationResult<Vec<u8>> {
        Ok(serialize_document(&self.dom, document_encoding)?)
    }

    pub fn into_dom(self) -> RcDom {
        self.dom
    }

    /// 开始一个新会话：恢复原文，然后分段
    pub fn begin_session<'t>(&'t mut self, mode: RenderMode, target_lang: &str) -> Session<'t> {
        let restored = self.renderer.restore();
        if !restored.is_noop() {
            tracing::debug!("新会话开始前已恢复 {} 处修改", restored.restored);
        }
        self.observer.restore_original();

        self.target_lang = target_lang.to_string();
        let segments = self.segmenter.segment(self.renderer.root(), mode);

        let this: &'t PageTranslator = self;
        let scheduler = Scheduler::new(
            &this.renderer,
            &this.cache,
            &this.client,
            &*this.observer,
            &this.page_url,
        );

        Session {
            scheduler,
            segments,
            mode,
            target_lang: &this.target_lang,
        }
    }

    /// 翻译整个页面
    pub async fn translate_page(
        &mut self,
        mode: RenderMode,
        target_lang: &str,
    ) -> TranslationResult<SessionReport> {
        self.begin_session(mode, target_lang).run().await
    }

    /// 恢复原文并把进度归零
    pub fn restore_original(&mut self) -> RestoreReport {
        let report = self.renderer.restore();
        self.observer.restoration_complete();
        self.observer.update_progress(0);
        report
    }

    /// 当前页面和目标语言下两种模式是否有缓存
    pub async fn check_cache(&self) -> TranslationResult<CacheAvailability> {
        let compare = self
            .cache
            .has_any(&self.page_url, &self.target_lang, RenderMode::Compare)
            .await?;
        let replace = self
            .cache
            .has_any(&self.page_url, &self.target_lang, RenderMode::Replace)
            .await?;
        Ok(CacheAvailability { compare, replace })
    }

    /// 清除当前页面、目标语言和模式下的缓存
    pub async fn clear_cache(&self, mode: RenderMode) -> TranslationResult<ClearOutcome> {
        self.cache
            .clear(&self.page_url, &self.target_lang, mode)
            .await
    }

    /// 翻译单段文本（划词或小窗），每收到增量调用一次 `on_update`
    ///
    /// `cancel` 被触发时返回 [`TranslationError::Cancelled`]，调用方已收到的增量保持不变。
    pub async fn translate_text_streaming<F>(
        &self,
        text: &str,
        kind: PromptKind,
        cancel: &CancellationToken,
        on_update: F,
    ) -> TranslationResult<String>
    where
        F: FnMut(&str),
    {
        let decoded = self
            .client
            .translate_streaming(text, &self.target_lang, kind, cancel, on_update)
            .await?;
        if decoded.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }
        Ok(decoded.text)
    }

    pub async fn translate_text(&self, text: &str, kind: PromptKind) -> TranslationResult<String> {
        self.client
            .translate_text(text, &self.target_lang, kind)
            .await
    }
}

/// 一次翻译会话
pub struct Session<'t> {
    scheduler: Scheduler<'t>,
    segments: Vec<Segment>,
    mode: RenderMode,
    target_lang: &'t str,
}

impl<'t> Session<'t> {
    /// 本次会话的翻译单元（去重前）
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// 执行会话直至所有任务结束或被停止
    pub async fn run(self) -> TranslationResult<SessionReport> {
        let Session {
            scheduler,
            segments,
            mode,
            target_lang,
        } = self;
        scheduler
            .streaming_page_translate(segments, mode, target_lang)
            .await
    }
}

/// 文档的内容根：优先 body
fn content_root(dom: &RcDom) -> Handle {
    find_body(&dom.document).unwrap_or_else(|| dom.document.clone())
}
