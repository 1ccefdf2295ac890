//! 翻译任务调度器
//!
//! 一次页面翻译的执行过程：
//!
//! 1. 恢复上一次的修改（幂等）；
//! 2. 按 [`SegmentKey`] 去重，渲染结果相同的单元只生成一个任务；
//! 3. 并发查询缓存，命中的单元立即渲染并计入进度，不占用请求名额；
//! 4. 未命中的任务排队，最多同时运行 `max_concurrent` 个，每结束一个补充一个；
//! 5. 每个任务先复查缓存，再发起可取消的流式请求，边接收边渲染，完成后写入缓存；
//! 6. 无论成功、失败还是取消，每个任务恰好计入一次进度。
//!
//! 所有状态都在单线程内通过 `Rc<RefCell<_>>` 共享，只在 await 点之间修改。

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use futures::future::{join_all, LocalBoxFuture};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use super::client::TranslationClient;
use super::observer::SessionObserver;
use crate::translation::config::PromptKind;
use crate::translation::error::{helpers::log_error, ErrorStats, TranslationResult};
use crate::translation::pipeline::{RenderMode, Segment, SegmentKey};
use crate::translation::render::Renderer;
use crate::translation::storage::CacheStore;

/// 单个任务的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Cancelled,
    Failed,
}

impl TaskState {
    fn as_label(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    Completed,
    Stopped,
}

/// 翻译任务：一个去重键及其全部翻译单元
#[derive(Debug)]
pub struct Task {
    pub id: usize,
    pub key: SegmentKey,
    /// 第一个为代表，其余为渲染结果相同的重复单元
    pub segments: Vec<Segment>,
    pub state: TaskState,
    cancel: CancellationToken,
}

impl Task {
    /// 请求与缓存使用的原文
    pub fn text(&self) -> &str {
        self.segments
            .first()
            .map(|segment| segment.original_text.as_str())
            .unwrap_or_default()
    }

    /// 记下最终译文，所有重复单元共用
    pub fn set_translation(&mut self, translation: &str) {
        for segment in &mut self.segments {
            segment.translated_text = translation.to_string();
        }
    }
}

/// 会话结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// 去重后的任务数
    pub total: usize,
    /// 已结束的任务数（含缓存命中、失败和取消）
    pub completed: usize,
    /// 由缓存直接完成的任务数
    pub cached: usize,
    /// 通过网络翻译完成的任务数
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// 是否被停止
    pub stopped: bool,
    /// 同时运行任务数的峰值
    pub peak_running: usize,
}

impl SessionReport {
    pub fn percent(&self) -> u8 {
        progress_percent(self.completed, self.total)
    }
}

/// `floor(completed / total * 100)`，没有任务时为 100
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.saturating_mul(100) / total).min(100) as u8
}

/// 按去重键合并翻译单元，保持首次出现的顺序
pub fn dedup_segments(segments: Vec<Segment>) -> Vec<(SegmentKey, Vec<Segment>)> {
    let mut groups: Vec<(SegmentKey, Vec<Segment>)> = Vec::new();
    let mut index: HashMap<SegmentKey, usize> = HashMap::new();

    for segment in segments {
        let key = segment.key();
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(segment),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![segment]));
            }
        }
    }

    groups
}

#[derive(Debug, Default)]
struct SchedulerState {
    phase: SessionPhase,
    total: usize,
    completed: usize,
    cached: usize,
    done: usize,
    failed: usize,
    cancelled: usize,
    running: usize,
    peak_running: usize,
    stop_requested: bool,
    queue: VecDeque<Task>,
    errors: ErrorStats,
}

impl SchedulerState {
    fn report(&self) -> SessionReport {
        SessionReport {
            total: self.total,
            completed: self.completed,
            cached: self.cached,
            done: self.done,
            failed: self.failed,
            cancelled: self.cancelled,
            stopped: self.stop_requested,
            peak_running: self.peak_running,
        }
    }

    fn reset_counters(&mut self) {
        self.total = 0;
        self.completed = 0;
        self.cached = 0;
        self.done = 0;
        self.failed = 0;
        self.cancelled = 0;
        self.running = 0;
        self.peak_running = 0;
        self.errors.reset();
    }

    fn cancel_tasks(&mut self, tasks: impl IntoIterator<Item = Task>) {
        for mut task in tasks {
            task.state = TaskState::Cancelled;
            self.cancelled += 1;
            self.completed += 1;
            record_outcome(task.state);
        }
    }
}

fn record_outcome(state: TaskState) {
    metrics::counter!("page_translator_tasks_total", "outcome" => state.as_label()).increment(1);
}

/// 停止句柄，可在会话运行期间从同一线程的其他位置调用
#[derive(Clone)]
pub struct StopHandle {
    state: Rc<RefCell<SchedulerState>>,
    token: CancellationToken,
}

impl StopHandle {
    /// 停止所有翻译
    ///
    /// 设置停止标志、取消所有进行中的请求并清空队列。排队中的任务立即计为取消，
    /// 运行中的任务在取消后自行计入进度。不恢复原文。
    pub fn stop_all(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.stop_requested = true;
            let drained: Vec<Task> = state.queue.drain(..).collect();
            if !drained.is_empty() {
                tracing::info!("停止翻译，丢弃 {} 个排队任务", drained.len());
            }
            state.cancel_tasks(drained);
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.borrow().stop_requested
    }
}

struct TaskOutcome {
    task: Task,
    from_cache: bool,
}

/// 调度器，每个会话构造一次
pub struct Scheduler<'a> {
    renderer: &'a Renderer,
    cache: &'a CacheStore,
    client: &'a TranslationClient,
    observer: &'a dyn SessionObserver,
    page_url: &'a str,
    max_concurrent: usize,
    state: Rc<RefCell<SchedulerState>>,
    token: CancellationToken,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        renderer: &'a Renderer,
        cache: &'a CacheStore,
        client: &'a TranslationClient,
        observer: &'a dyn SessionObserver,
        page_url: &'a str,
    ) -> Self {
        Self {
            renderer,
            cache,
            client,
            observer,
            page_url,
            max_concurrent: client.config().max_concurrent_requests.max(1),
            state: Rc::new(RefCell::new(SchedulerState::default())),
            token: CancellationToken::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: Rc::clone(&self.state),
            token: self.token.clone(),
        }
    }

    /// 当前进度快照
    pub fn progress(&self) -> SessionReport {
        self.state.borrow().report()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    /// 本次会话中失败任务的错误统计
    pub fn error_stats(&self) -> ErrorStats {
        self.state.borrow().errors.clone()
    }

    fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.state.borrow().stop_requested
    }

    /// 流式翻译整个页面，在所有任务结束后返回
    ///
    /// 有任务需要发起请求而服务配置不完整时，缓存命中仍会被渲染，随后返回 `ConfigError`。
    pub async fn streaming_page_translate(
        &self,
        segments: Vec<Segment>,
        mode: RenderMode,
        target_lang: &str,
    ) -> TranslationResult<SessionReport> {
        self.renderer.restore();

        let segment_count = segments.len();
        let tasks: Vec<Task> = dedup_segments(segments)
            .into_iter()
            .enumerate()
            .map(|(id, (key, segments))| Task {
                id,
                key,
                segments,
                state: TaskState::Queued,
                cancel: self.token.child_token(),
            })
            .collect();

        {
            let mut state = self.state.borrow_mut();
            state.reset_counters();
            state.total = tasks.len();
            state.phase = SessionPhase::Active;
        }
        tracing::info!(
            "开始翻译页面: {} 个翻译单元，去重后 {} 个任务，模式 {}，目标语言 {}",
            segment_count,
            tasks.len(),
            mode,
            target_lang
        );
        self.observer.show_stop_button();

        let lookups = join_all(
            tasks
                .iter()
                .map(|task| self.cache.get(self.page_url, task.text(), target_lang, mode)),
        )
        .await;

        let mut misses = Vec::new();
        let mut hits = 0usize;
        for (mut task, lookup) in tasks.into_iter().zip(lookups) {
            match lookup {
                Ok(Some(record)) if !self.is_stopped() => {
                    task.set_translation(&record.translation);
                    self.render_translated(&task.segments);
                    task.state = TaskState::Done;
                    hits += 1;
                    let mut state = self.state.borrow_mut();
                    state.cached += 1;
                    state.completed += 1;
                    record_outcome(task.state);
                }
                Ok(_) => misses.push(task),
                Err(e) => {
                    tracing::warn!("缓存查询失败，按未命中处理: {}", e);
                    misses.push(task);
                }
            }
        }
        if hits > 0 {
            metrics::counter!("page_translator_cache_hits_total").increment(hits as u64);
            tracing::info!("缓存命中 {} 个任务", hits);
        }
        self.report_progress();

        if !misses.is_empty() {
            if let Err(e) = self.client.config().validate_for_request(PromptKind::Page) {
                log_error(&e);
                {
                    let mut state = self.state.borrow_mut();
                    state.phase = SessionPhase::Idle;
                    state.reset_counters();
                }
                self.observer.hide_stop_button(false);
                return Err(e);
            }
        }

        {
            let mut state = self.state.borrow_mut();
            if state.stop_requested || self.token.is_cancelled() {
                state.cancel_tasks(misses);
            } else {
                state.queue.extend(misses);
            }
        }

        let mut pool: FuturesUnordered<LocalBoxFuture<'_, TaskOutcome>> = FuturesUnordered::new();
        self.fill(&mut pool, target_lang, mode);
        while let Some(outcome) = pool.next().await {
            self.resolve(outcome);
            self.report_progress();
            self.fill(&mut pool, target_lang, mode);
        }

        Ok(self.finish())
    }

    /// 在并发上限内从队列启动任务
    fn fill<'s>(
        &'s self,
        pool: &mut FuturesUnordered<LocalBoxFuture<'s, TaskOutcome>>,
        target_lang: &'s str,
        mode: RenderMode,
    ) {
        loop {
            let task = {
                let mut state = self.state.borrow_mut();
                if state.stop_requested || state.running >= self.max_concurrent {
                    return;
                }
                let Some(mut task) = state.queue.pop_front() else {
                    return;
                };
                task.state = TaskState::Running;
                state.running += 1;
                state.peak_running = state.peak_running.max(state.running);
                task
            };

            tracing::debug!("启动翻译任务 #{}: {}", task.id, task.key.as_str());
            pool.push(self.run_task(task, target_lang, mode).boxed_local());
        }
    }

    async fn run_task(&self, mut task: Task, target_lang: &str, mode: RenderMode) -> TaskOutcome {
        let text = task.text().to_string();

        match self.cache.get(self.page_url, &text, target_lang, mode).await {
            Ok(Some(record)) => {
                tracing::debug!("任务 #{} 复查时命中缓存", task.id);
                task.set_translation(&record.translation);
                if !self.is_stopped() {
                    self.render_translated(&task.segments);
                }
                task.state = TaskState::Done;
                return TaskOutcome {
                    task,
                    from_cache: true,
                };
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("任务 #{} 复查缓存失败: {}", task.id, e),
        }

        if self.is_stopped() || task.cancel.is_cancelled() {
            task.state = TaskState::Cancelled;
            return TaskOutcome {
                task,
                from_cache: false,
            };
        }

        let result = {
            let segments = &task.segments;
            self.client
                .translate_streaming(&text, target_lang, PromptKind::Page, &task.cancel, |partial| {
                    if !self.is_stopped() {
                        self.render_all(segments, partial);
                    }
                })
                .await
        };

        task.state = match result {
            Ok(decoded) if decoded.is_cancelled() => {
                tracing::debug!("任务 #{} 已取消", task.id);
                TaskState::Cancelled
            }
            Ok(_) if self.is_stopped() => TaskState::Cancelled,
            Ok(decoded) => {
                if decoded.text.is_empty() {
                    tracing::warn!("任务 #{} 翻译结果为空", task.id);
                } else {
                    task.set_translation(&decoded.text);
                    self.render_translated(&task.segments);
                    if let Err(e) = self
                        .cache
                        .set(self.page_url, &text, &decoded.text, target_lang, mode)
                        .await
                    {
                        tracing::warn!("写入缓存失败: {}", e);
                    }
                }
                TaskState::Done
            }
            Err(e) => {
                tracing::warn!(
                    "任务 #{} 翻译失败{}: {}",
                    task.id,
                    if e.is_retryable() { "（可重试）" } else { "" },
                    e
                );
                self.state.borrow_mut().errors.record_error(&e);
                TaskState::Failed
            }
        };

        TaskOutcome {
            task,
            from_cache: false,
        }
    }

    fn render_all(&self, segments: &[Segment], text: &str) {
        for segment in segments {
            if let Err(e) = self.renderer.apply(segment, text) {
                tracing::warn!("渲染译文失败: {}", e);
            }
        }
    }

    fn render_translated(&self, segments: &[Segment]) {
        for segment in segments {
            if let Err(e) = self.renderer.apply(segment, &segment.translated_text) {
                tracing::warn!("渲染译文失败: {}", e);
            }
        }
    }

    fn resolve(&self, outcome: TaskOutcome) {
        let TaskOutcome { task, from_cache } = outcome;
        let mut state = self.state.borrow_mut();
        state.running = state.running.saturating_sub(1);
        state.completed += 1;
        match task.state {
            TaskState::Done if from_cache => state.cached += 1,
            TaskState::Done => state.done += 1,
            TaskState::Failed => state.failed += 1,
            _ => state.cancelled += 1,
        }
        record_outcome(task.state);
    }

    fn report_progress(&self) {
        let percent = self.state.borrow().report().percent();
        self.observer.update_progress(percent);
    }

    fn finish(&self) -> SessionReport {
        let (report, errors) = {
            let mut state = self.state.borrow_mut();
            state.phase = if state.stop_requested {
                SessionPhase::Stopped
            } else {
                SessionPhase::Completed
            };
            let report = state.report();
            let errors = state.errors.clone();
            if report.stopped {
                state.reset_counters();
            }
            (report, errors)
        };

        if report.stopped {
            self.observer.update_progress(report.percent());
        }
        self.observer.hide_stop_button(!report.stopped);
        self.observer.translation_complete();

        if errors.total_errors > 0 {
            tracing::warn!(
                "失败任务按类别: {:?}，失败率 {:.0}%",
                errors.by_category,
                errors.error_rate(report.total) * 100.0
            );
        }

        tracing::info!(
            "翻译会话结束: 共 {} 个任务，缓存 {}，完成 {}，失败 {}，取消 {}{}",
            report.total,
            report.cached,
            report.done,
            report.failed,
            report.cancelled,
            if report.stopped { "（已停止）" } else { "" }
        );
        report
    }
}
