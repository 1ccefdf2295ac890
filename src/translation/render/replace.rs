//! 替换模式：原地改写原文，改写前把原文记入变更记录

use crate::parsers::html::{set_node_text, set_text_content};
use crate::translation::pipeline::Segment;

use super::ledger::MutationLedger;

pub fn render(ledger: &mut MutationLedger, segment: &Segment, text: &str) {
    if segment.is_inline {
        if let Some(element) = segment.anchor.single_element() {
            ledger.record_subtree(element);
            set_text_content(element, text);
            return;
        }
    }

    // 多个文本节点时译文整体写入第一个，其余置空
    for (i, node) in segment.anchor.nodes().iter().enumerate() {
        ledger.record_text(node);
        set_node_text(node, if i == 0 { text } else { "" });
    }
}
