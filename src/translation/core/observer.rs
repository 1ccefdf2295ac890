//! 会话状态通知
//!
//! 宿主界面（进度条、停止按钮）通过 [`SessionObserver`] 接收单向通知，引擎不等待任何回应。

/// 会话通知接收者，所有方法默认什么也不做
pub trait SessionObserver {
    /// 新会话开始前已恢复原文
    fn restore_original(&self) {}

    /// 进度百分比（0..=100）
    fn update_progress(&self, _percent: u8) {}

    fn show_stop_button(&self) {}

    /// `completed` 表示全部任务自然完成（而非被停止）
    fn hide_stop_button(&self, _completed: bool) {}

    /// 会话结束（完成或停止），每个会话恰好一次
    fn translation_complete(&self) {}

    /// 显式恢复原文完成
    fn restoration_complete(&self) {}
}

/// 忽略所有通知
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// 把通知写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn restore_original(&self) {
        tracing::debug!("已恢复上一次的翻译");
    }

    fn update_progress(&self, percent: u8) {
        tracing::info!("翻译进度: {}%", percent);
    }

    fn show_stop_button(&self) {
        tracing::debug!("翻译开始，可随时停止");
    }

    fn hide_stop_button(&self, completed: bool) {
        tracing::debug!("翻译结束，全部完成: {}", completed);
    }

    fn translation_complete(&self) {
        tracing::info!("页面翻译完成");
    }

    fn restoration_complete(&self) {
        tracing::info!("原文已恢复");
    }
}
