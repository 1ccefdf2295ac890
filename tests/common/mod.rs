// 集成测试公共模块
//
// 提供模拟翻译服务、记录通知的观察者以及 HTML 辅助函数

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use markup5ever_rcdom::{Handle, RcDom};

use page_translator::html_to_dom;
use page_translator::parsers::html::{find_body, get_node_name, text_content};
use page_translator::translation::core::{ByteStream, ChatRequest};
use page_translator::translation::{
    CacheStore, PageTranslator, SessionObserver, TranslationConfig, TranslationError,
    TranslationProvider, TranslationResult,
};

pub const PAGE_URL: &str = "https://example.com/articles/42";

/// 指向可用服务的测试配置
pub fn service_config() -> TranslationConfig {
    TranslationConfig::with_service(
        "https://api.example.com/v1/chat/completions",
        "sk-test",
        "test-model",
    )
}

// ============================================================================
// 模拟翻译服务
// ============================================================================

/// 进行中请求计数，流被丢弃时自动减一
struct InFlightGuard {
    current: Rc<Cell<usize>>,
}

impl InFlightGuard {
    fn new(current: Rc<Cell<usize>>, peak: &Cell<usize>) -> Self {
        current.set(current.get() + 1);
        peak.set(peak.get().max(current.get()));
        Self { current }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.current.set(self.current.get() - 1);
    }
}

/// 按脚本返回流式结果的翻译服务
///
/// 默认译文为 `[原文]`，按 `chunk_chars` 个字符切成多个 `data:` 行依次返回。
pub struct MockProvider {
    translations: HashMap<String, String>,
    failures: HashSet<String>,
    chunk_chars: usize,
    chunk_delay: Duration,
    hang_after_first_chunk: bool,
    calls: Cell<usize>,
    in_flight: Rc<Cell<usize>>,
    peak_in_flight: Rc<Cell<usize>>,
    requests: RefCell<Vec<String>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            translations: HashMap::new(),
            failures: HashSet::new(),
            chunk_chars: 3,
            chunk_delay: Duration::ZERO,
            hang_after_first_chunk: false,
            calls: Cell::new(0),
            in_flight: Rc::new(Cell::new(0)),
            peak_in_flight: Rc::new(Cell::new(0)),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, text: &str, translation: &str) -> Self {
        self.translations
            .insert(text.to_string(), translation.to_string());
        self
    }

    /// 对该原文返回 500
    pub fn with_failure(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// 返回第一段后不再结束，直到被取消
    pub fn hanging(mut self) -> Self {
        self.hang_after_first_chunk = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.get()
    }

    pub fn requested_texts(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn translation_for(&self, text: &str) -> String {
        self.translations
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[{}]", text))
    }

    fn chunk_lines(&self, translation: &str) -> Vec<Vec<u8>> {
        let chars: Vec<char> = translation.chars().collect();
        let mut lines: Vec<Vec<u8>> = chars
            .chunks(self.chunk_chars)
            .map(|piece| {
                let content: String = piece.iter().collect();
                format!(
                    "data: {}\n\n",
                    serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
                )
                .into_bytes()
            })
            .collect();
        if !self.hang_after_first_chunk {
            lines.push(b"data: [DONE]\n\n".to_vec());
        }
        lines
    }
}

#[async_trait(?Send)]
impl TranslationProvider for MockProvider {
    async fn open_stream(
        &self,
        _config: &TranslationConfig,
        request: &ChatRequest,
    ) -> TranslationResult<ByteStream> {
        self.calls.set(self.calls.get() + 1);
        let text = request.user_text().to_string();
        self.requests.borrow_mut().push(text.clone());

        if self.failures.contains(&text) {
            return Err(TranslationError::HttpStatus {
                status: 500,
                body: "internal error".to_string(),
            });
        }

        let mut lines = self.chunk_lines(&self.translation_for(&text));
        if self.hang_after_first_chunk {
            lines.truncate(1);
        }

        let guard = InFlightGuard::new(self.in_flight.clone(), &self.peak_in_flight);
        let delay = self.chunk_delay;
        let hang = self.hang_after_first_chunk;

        let body = stream::unfold(
            (lines.into_iter(), guard),
            move |(mut lines, guard)| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match lines.next() {
                    Some(line) => Some((Ok::<_, TranslationError>(line), (lines, guard))),
                    None if hang => {
                        futures::future::pending::<()>().await;
                        None
                    }
                    None => None,
                }
            },
        );

        Ok(body.boxed_local())
    }
}

// ============================================================================
// 记录通知的观察者
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    RestoreOriginal,
    Progress(u8),
    ShowStopButton,
    HideStopButton(bool),
    TranslationComplete,
    RestorationComplete,
}

#[derive(Default)]
pub struct RecordingObserver {
    events: RefCell<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Progress(percent) => Some(*percent),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: Event) -> usize {
        self.events.borrow().iter().filter(|e| **e == wanted).count()
    }

    fn push(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl SessionObserver for RecordingObserver {
    fn restore_original(&self) {
        self.push(Event::RestoreOriginal);
    }

    fn update_progress(&self, percent: u8) {
        self.push(Event::Progress(percent));
    }

    fn show_stop_button(&self) {
        self.push(Event::ShowStopButton);
    }

    fn hide_stop_button(&self, completed: bool) {
        self.push(Event::HideStopButton(completed));
    }

    fn translation_complete(&self) {
        self.push(Event::TranslationComplete);
    }

    fn restoration_complete(&self) {
        self.push(Event::RestorationComplete);
    }
}

// ============================================================================
// 测试环境
// ============================================================================

pub struct TestEnvironment {
    pub translator: PageTranslator,
    pub provider: Rc<MockProvider>,
    pub observer: Rc<RecordingObserver>,
    pub cache: Arc<CacheStore>,
}

impl TestEnvironment {
    pub async fn new(html: &str, config: TranslationConfig, provider: MockProvider) -> Self {
        let cache = Arc::new(
            CacheStore::in_memory(1000, Duration::from_secs(3600))
                .await
                .expect("memory cache should open"),
        );
        Self::with_cache(html, config, provider, cache)
    }

    pub fn with_cache(
        html: &str,
        config: TranslationConfig,
        provider: MockProvider,
        cache: Arc<CacheStore>,
    ) -> Self {
        let provider = Rc::new(provider);
        let observer = Rc::new(RecordingObserver::default());
        let translator = PageTranslator::new(
            HtmlTestHelper::create_test_dom(html),
            PAGE_URL,
            config,
            cache.clone(),
            provider.clone(),
        )
        .with_observer(observer.clone());

        Self {
            translator,
            provider,
            observer,
            cache,
        }
    }

    /// body 的全部文本
    pub fn body_text(&self) -> String {
        text_content(self.translator.root())
    }

    /// 按标签名收集 body 下元素的文本
    pub fn texts_of(&self, tag: &str) -> Vec<String> {
        HtmlTestHelper::elements_by_name(self.translator.root(), tag)
            .iter()
            .map(text_content)
            .collect()
    }
}

// ============================================================================
// HTML 辅助函数
// ============================================================================

pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn create_test_dom(html: &str) -> RcDom {
        html_to_dom(html.as_bytes(), "utf-8").expect("test html should parse")
    }

    pub fn page(body: &str) -> String {
        format!(
            "<!DOCTYPE html><html><head><title>Test</title></head><body>{}</body></html>",
            body
        )
    }

    pub fn paragraphs(count: usize) -> String {
        let body: String = (0..count)
            .map(|i| format!("<p>Paragraph number {}</p>", i))
            .collect();
        Self::page(&body)
    }

    pub fn body_of(dom: &RcDom) -> Handle {
        find_body(&dom.document).expect("document should have a body")
    }

    pub fn elements_by_name(root: &Handle, name: &str) -> Vec<Handle> {
        let mut found = Vec::new();
        Self::collect_by_name(root, name, &mut found);
        found
    }

    fn collect_by_name(node: &Handle, name: &str, found: &mut Vec<Handle>) {
        if get_node_name(node) == Some(name) {
            found.push(node.clone());
        }
        for child in node.children.borrow().iter() {
            Self::collect_by_name(child, name, found);
        }
    }
}
