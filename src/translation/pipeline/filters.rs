//! 节点过滤器模块
//!
//! 判断元素及其子树是否参与文本提取

use std::collections::HashSet;

use markup5ever_rcdom::Handle;

use crate::parsers::html::{get_node_name, has_class, is_visible};
use crate::translation::config::constants;

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 计算样式不可见
    Hidden,
    /// 非内容标签（脚本、样式、媒体、嵌入框架等）
    NonContent,
    /// 上一次翻译生成的节点
    TranslationMarker,
}

/// 元素过滤器
#[derive(Debug, Clone)]
pub struct NodeFilter {
    skip_elements: HashSet<String>,
}

impl Default for NodeFilter {
    fn default() -> Self {
        Self::new(constants::SKIP_ELEMENTS.iter().map(|s| s.to_string()))
    }
}

impl NodeFilter {
    pub fn new<I>(skip_elements: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            skip_elements: skip_elements
                .into_iter()
                .map(|tag| tag.to_ascii_lowercase())
                .collect(),
        }
    }

    /// 元素需要整棵跳过时返回原因
    pub fn skip_reason(&self, node: &Handle) -> Option<SkipReason> {
        let tag = get_node_name(node)?;

        if self.skip_elements.contains(tag) {
            return Some(SkipReason::NonContent);
        }

        if is_translation_marker(node) {
            return Some(SkipReason::TranslationMarker);
        }

        if !is_visible(node) {
            return Some(SkipReason::Hidden);
        }

        None
    }

    /// 去掉首尾空白后长度大于 1 的文本才值得翻译
    pub fn is_translatable_text(&self, text: &str) -> bool {
        text.trim().chars().count() >= constants::MIN_TEXT_CHARS
    }
}

/// 是否为翻译生成的节点（对照容器或行内标记）
pub fn is_translation_marker(node: &Handle) -> bool {
    has_class(node, constants::CONTAINER_CLASS) || has_class(node, constants::INLINE_MARKER_CLASS)
}

/// 是否为对照模式的翻译容器
pub fn is_translation_container(node: &Handle) -> bool {
    has_class(node, constants::CONTAINER_CLASS)
}
