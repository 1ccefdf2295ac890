//! 翻译管道模块
//!
//! 提供文本处理管道，包括收集、过滤、分组和翻译单元生成

pub mod collector;
pub mod filters;
pub mod segment;

// 重新导出主要类型
pub use collector::{
    find_block_parent, is_block_element, CollectionStats, CollectorConfig, ParagraphGroup,
    TextCollector, TextLeaf, TextPriority,
};
pub use filters::{is_translation_container, is_translation_marker, NodeFilter, SkipReason};
pub use segment::{prepare_units, Anchor, RenderMode, Segment, SegmentKey, Segmenter};
