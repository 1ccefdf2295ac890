//! 文本收集器模块
//!
//! 深度优先遍历文档，收集可见文本叶子并按块级祖先分组为段落

use std::collections::HashMap;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use super::filters::NodeFilter;
use crate::parsers::html::{display_of, get_node_name, get_parent_node};
use crate::translation::config::constants;

/// 文本优先级，数值越小越先翻译
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextPriority(pub u8);

impl TextPriority {
    pub const LOWEST: TextPriority = TextPriority(100);

    /// 由直接父元素的标签决定
    pub fn from_parent_tag(tag: Option<&str>) -> Self {
        let value = match tag {
            Some("p") => 1,
            Some("title") => 2,
            Some("h1") => 3,
            Some("h2") => 4,
            Some("h3") => 5,
            Some("h4") => 6,
            Some("h5") => 7,
            Some("h6") => 8,
            Some("div") => 9,
            Some("span") => 10,
            _ => return Self::LOWEST,
        };
        TextPriority(value)
    }
}

/// 一个可翻译的文本节点
#[derive(Debug, Clone)]
pub struct TextLeaf {
    /// 文本节点
    pub node: Handle,
    /// 去掉首尾空白后的内容
    pub text: String,
    pub priority: TextPriority,
    /// 文档顺序
    pub order: usize,
}

/// 同一块级祖先下的文本叶子
#[derive(Debug, Clone)]
pub struct ParagraphGroup {
    pub block: Handle,
    /// 按文档顺序排列
    pub leaves: Vec<TextLeaf>,
}

impl ParagraphGroup {
    pub fn priority(&self) -> TextPriority {
        self.leaves
            .iter()
            .map(|leaf| leaf.priority)
            .min()
            .unwrap_or(TextPriority::LOWEST)
    }
}

/// 文本收集器配置
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 最大收集深度
    pub max_depth: usize,
    /// 跳过的元素标签
    pub skip_elements: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            skip_elements: constants::SKIP_ELEMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 收集统计信息
#[derive(Debug, Default, Clone)]
pub struct CollectionStats {
    pub nodes_visited: usize,
    pub nodes_skipped: usize,
    pub text_nodes_found: usize,
    pub translatable_texts: usize,
    pub filtered_texts: usize,
    pub groups: usize,
}

impl CollectionStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// DOM文本收集器
pub struct TextCollector {
    config: CollectorConfig,
    filter: NodeFilter,
    stats: CollectionStats,
}

impl Default for TextCollector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

impl TextCollector {
    pub fn new(config: CollectorConfig) -> Self {
        let filter = NodeFilter::new(config.skip_elements.iter().cloned());
        Self {
            config,
            filter,
            stats: CollectionStats::default(),
        }
    }

    /// 收集并分组，分组按组内最高优先级排序
    pub fn collect(&mut self, root: &Handle) -> Vec<ParagraphGroup> {
        self.stats.reset();
        let leaves = self.collect_leaves(root);
        let groups = self.group_paragraphs(root, leaves);
        self.stats.groups = groups.len();

        tracing::debug!(
            "文本收集完成: 访问 {} 个节点，{} 段文本，{} 个段落",
            self.stats.nodes_visited,
            self.stats.translatable_texts,
            self.stats.groups
        );

        groups
    }

    /// 深度优先收集可翻译的文本叶子（文档顺序）
    pub fn collect_leaves(&mut self, root: &Handle) -> Vec<TextLeaf> {
        let mut leaves = Vec::new();
        self.collect_recursive(root, &mut leaves, 0);
        leaves
    }

    fn collect_recursive(&mut self, node: &Handle, leaves: &mut Vec<TextLeaf>, depth: usize) {
        if depth > self.config.max_depth {
            return;
        }

        self.stats.nodes_visited += 1;

        match node.data {
            NodeData::Text { ref contents } => {
                self.stats.text_nodes_found += 1;
                let text = contents.borrow().trim().to_string();

                if self.filter.is_translatable_text(&text) {
                    let parent = get_parent_node(node);
                    let priority =
                        TextPriority::from_parent_tag(parent.as_ref().and_then(get_node_name));
                    leaves.push(TextLeaf {
                        node: node.clone(),
                        text,
                        priority,
                        order: leaves.len(),
                    });
                    self.stats.translatable_texts += 1;
                } else {
                    self.stats.filtered_texts += 1;
                }
            }
            NodeData::Element { .. } => {
                if let Some(reason) = self.filter.skip_reason(node) {
                    tracing::trace!("跳过元素 {:?}: {:?}", get_node_name(node), reason);
                    self.stats.nodes_skipped += 1;
                    return;
                }

                for child in node.children.borrow().iter() {
                    self.collect_recursive(child, leaves, depth + 1);
                }
            }
            NodeData::Document => {
                for child in node.children.borrow().iter() {
                    self.collect_recursive(child, leaves, depth + 1);
                }
            }
            _ => {}
        }
    }

    /// 按最近的块级祖先分组
    ///
    /// 叶子先按优先级稳定排序，分组按首次出现的顺序输出；组内恢复文档顺序。
    pub fn group_paragraphs(&self, root: &Handle, mut leaves: Vec<TextLeaf>) -> Vec<ParagraphGroup> {
        leaves.sort_by_key(|leaf| (leaf.priority, leaf.order));

        let mut groups: Vec<ParagraphGroup> = Vec::new();
        let mut index: HashMap<*const markup5ever_rcdom::Node, usize> = HashMap::new();

        for leaf in leaves {
            let block = find_block_parent(&leaf.node, root);
            let slot = *index.entry(Rc::as_ptr(&block)).or_insert_with(|| {
                groups.push(ParagraphGroup {
                    block: block.clone(),
                    leaves: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].leaves.push(leaf);
        }

        for group in &mut groups {
            group.leaves.sort_by_key(|leaf| leaf.order);
        }

        groups
    }

    pub fn get_stats(&self) -> &CollectionStats {
        &self.stats
    }
}

/// 块级：display 为 block/flex/grid，或段落、标题标签
pub fn is_block_element(node: &Handle) -> bool {
    if matches!(
        get_node_name(node),
        Some("p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
    ) {
        return true;
    }
    matches!(node.data, NodeData::Element { .. }) && display_of(node).is_block_level()
}

/// 最近的块级祖先，到达 `root` 即停止
pub fn find_block_parent(node: &Handle, root: &Handle) -> Handle {
    let mut current = get_parent_node(node);
    while let Some(element) = current {
        if Rc::ptr_eq(&element, root) || is_block_element(&element) {
            return element;
        }
        current = get_parent_node(&element);
    }
    root.clone()
}
