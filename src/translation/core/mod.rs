//! 翻译系统核心模块
//!
//! - **stream**: 流式响应的逐行解码
//! - **client**: 翻译服务请求与 [`TranslationClient`]
//! - **scheduler**: 有并发上限、可去重、可取消的任务调度
//! - **session**: 页面级会话控制 [`PageTranslator`]
//! - **observer**: 面向宿主界面的状态通知

pub mod client;
pub mod observer;
pub mod scheduler;
pub mod session;
pub mod stream;

pub use client::{ChatMessage, ChatRequest, HttpProvider, TranslationClient, TranslationProvider};
pub use observer::{NoopObserver, SessionObserver, TracingObserver};
pub use scheduler::{
    dedup_segments, progress_percent, Scheduler, SessionPhase, SessionReport, StopHandle, Task,
    TaskState,
};
pub use session::{CacheAvailability, PageTranslator, Session};
pub use stream::{decode_stream, ByteStream, DecodedStream, StreamDecoder, StreamStatus};
