//! 翻译单元
//!
//! 段落分组到翻译单元（[`Segment`]）的转换，以及用于去重的结构键。

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use markup5ever_rcdom::{Handle, NodeData};
use serde::{Deserialize, Serialize};

use super::collector::{CollectionStats, CollectorConfig, ParagraphGroup, TextCollector};
use crate::parsers::html::{get_node_name, get_parent_node, node_text, text_content};
use crate::translation::config::constants;
use crate::translation::error::TranslationError;

/// 渲染模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// 在原文旁插入译文副本
    Compare,
    /// 原地替换原文
    Replace,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Compare => "compare",
            RenderMode::Replace => "replace",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compare" => Ok(RenderMode::Compare),
            "replace" => Ok(RenderMode::Replace),
            other => Err(TranslationError::InvalidInput(format!("未知的翻译模式: {}", other))),
        }
    }
}

/// 指向文档中一个或多个节点的引用，不拥有文档
#[derive(Debug, Clone)]
pub struct Anchor {
    nodes: Vec<Handle>,
}

impl Anchor {
    pub fn new(nodes: Vec<Handle>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Handle] {
        &self.nodes
    }

    pub fn first(&self) -> Option<&Handle> {
        self.nodes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 单个元素节点（行内单元）
    pub fn single_element(&self) -> Option<&Handle> {
        match self.nodes.as_slice() {
            [node] if matches!(node.data, NodeData::Element { .. }) => Some(node),
            _ => None,
        }
    }
}

/// 去重键：文本节点记为 `text:<文本>`，元素记为 `<TAG>:<文本>`，以 `|` 连接
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey(String);

impl SegmentKey {
    pub fn from_anchor(anchor: &Anchor) -> Self {
        let parts: Vec<String> = anchor
            .nodes()
            .iter()
            .map(|node| match &node.data {
                NodeData::Text { .. } => {
                    format!("text:{}", node_text(node).unwrap_or_default().trim())
                }
                NodeData::Element { name, .. } => format!(
                    "{}:{}",
                    name.local.to_ascii_uppercase(),
                    text_content(node).trim()
                ),
                _ => String::new(),
            })
            .collect();
        SegmentKey(parts.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 翻译单元
#[derive(Debug, Clone)]
pub struct Segment {
    pub anchor: Anchor,
    pub original_text: String,
    pub translated_text: String,
    pub is_inline: bool,
    pub render_mode: RenderMode,
}

impl Segment {
    pub fn new(anchor: Anchor, original_text: String, is_inline: bool, render_mode: RenderMode) -> Self {
        Self {
            anchor,
            original_text,
            translated_text: String::new(),
            is_inline,
            render_mode,
        }
    }

    pub fn key(&self) -> SegmentKey {
        SegmentKey::from_anchor(&self.anchor)
    }
}

fn is_inline_tag(tag: Option<&str>) -> bool {
    tag.map(|t| constants::INLINE_ELEMENTS.contains(&t))
        .unwrap_or(false)
}

fn flush_run(nodes: &mut Vec<Handle>, texts: &mut Vec<&str>, segments: &mut Vec<Segment>, mode: RenderMode) {
    if nodes.is_empty() {
        return;
    }
    segments.push(Segment::new(
        Anchor::new(std::mem::take(nodes)),
        texts.join(" "),
        false,
        mode,
    ));
    texts.clear();
}

/// 把一个段落分组拆成翻译单元
///
/// - 只有一个文本节点的分组直接成为一个单元；
/// - 父元素是行内强调标签的文本，其父元素整体成为一个行内单元（同一元素只生成一次）；
/// - 其余文本按同一父元素下的连续片段合并，片段之间以空格连接。
pub fn prepare_units(group: &ParagraphGroup, mode: RenderMode) -> Vec<Segment> {
    if let [leaf] = group.leaves.as_slice() {
        return vec![Segment::new(
            Anchor::new(vec![leaf.node.clone()]),
            leaf.text.clone(),
            false,
            mode,
        )];
    }

    let mut segments = Vec::new();
    let mut emitted_inline: Vec<Handle> = Vec::new();
    let mut run_nodes: Vec<Handle> = Vec::new();
    let mut run_texts: Vec<&str> = Vec::new();
    let mut run_parent: Option<Handle> = None;

    for leaf in &group.leaves {
        let parent = get_parent_node(&leaf.node);
        let inline_parent = parent.as_ref().filter(|p| {
            is_inline_tag(get_node_name(p)) && !Rc::ptr_eq(p, &group.block)
        });

        if let Some(element) = inline_parent {
            flush_run(&mut run_nodes, &mut run_texts, &mut segments, mode);
            run_parent = None;

            if emitted_inline.iter().any(|e| Rc::ptr_eq(e, element)) {
                continue;
            }
            emitted_inline.push(element.clone());

            let text = text_content(element).trim().to_string();
            segments.push(Segment::new(Anchor::new(vec![element.clone()]), text, true, mode));
            continue;
        }

        let same_parent = match (&run_parent, &parent) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        if !same_parent {
            flush_run(&mut run_nodes, &mut run_texts, &mut segments, mode);
            run_parent = parent;
        }

        run_nodes.push(leaf.node.clone());
        run_texts.push(&leaf.text);
    }
    flush_run(&mut run_nodes, &mut run_texts, &mut segments, mode);

    segments
}

/// 分段器：收集、分组并生成有序的翻译单元
pub struct Segmenter {
    collector: TextCollector,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

impl Segmenter {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            collector: TextCollector::new(config),
        }
    }

    /// 生成翻译单元，顺序为分组的优先级顺序
    pub fn segment(&mut self, root: &Handle, mode: RenderMode) -> Vec<Segment> {
        let groups = self.collector.collect(root);
        let segments: Vec<Segment> = groups
            .iter()
            .flat_map(|group| prepare_units(group, mode))
            .filter(|segment| !segment.original_text.trim().is_empty())
            .collect();

        tracing::info!("提取到 {} 个段落，{} 个翻译单元", groups.len(), segments.len());
        segments
    }

    pub fn get_stats(&self) -> &CollectionStats {
        self.collector.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{find_body, html_to_dom};
    use markup5ever_rcdom::RcDom;

    fn segments_of(html: &str) -> (RcDom, Vec<Segment>) {
        let dom = html_to_dom(html.as_bytes(), "utf-8").unwrap();
        let body = find_body(&dom.document).unwrap();
        let segments = Segmenter::default().segment(&body, RenderMode::Replace);
        (dom, segments)
    }

    #[test]
    fn test_render_mode_parsing() {
        assert_eq!("Compare".parse::<RenderMode>().unwrap(), RenderMode::Compare);
        assert_eq!(RenderMode::Replace.to_string(), "replace");
        assert!("side-by-side".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_lone_text_node_is_one_segment() {
        let (_dom, segments) = segments_of("<html><body><p>Bonjour</p></body></html>");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].original_text, "Bonjour");
        assert!(!segments[0].is_inline);
        assert_eq!(segments[0].key().as_str(), "text:Bonjour");
    }

    #[test]
    fn test_inline_elements_become_atomic_units() {
        let (_dom, segments) = segments_of(
            "<html><body><p>Read the <a href=\"#\">full <b>docs</b></a> before you start.</p></body></html>",
        );

        let summary: Vec<(&str, bool)> = segments
            .iter()
            .map(|s| (s.original_text.as_str(), s.is_inline))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Read the", false),
                ("full docs", true),
                ("docs", true),
                ("before you start.", false),
            ]
        );
        assert_eq!(segments[1].key().as_str(), "A:full docs");
    }

    #[test]
    fn test_inline_element_counted_once() {
        let (_dom, segments) =
            segments_of("<html><body><p>Say <em>hello <br>again</em> now</p></body></html>");
        let inline: Vec<&Segment> = segments.iter().filter(|s| s.is_inline).collect();
        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].original_text, "hello again");
    }

    #[test]
    fn test_runs_merge_contiguous_text_of_same_parent() {
        let (_dom, segments) = segments_of(
            "<html><body><div>First line<br>second line<ul><li>item one</li></ul></div></body></html>",
        );

        let texts: Vec<&str> = segments.iter().map(|s| s.original_text.as_str()).collect();
        assert!(texts.contains(&"First line second line"));
        assert!(texts.contains(&"item one"));

        let run = segments
            .iter()
            .find(|s| s.original_text == "First line second line")
            .unwrap();
        assert_eq!(run.anchor.nodes().len(), 2);
        assert_eq!(run.key().as_str(), "text:First line|text:second line");
    }
}
