//! 译文渲染与恢复
//!
//! [`Renderer`] 按翻译单元的模式把译文写入文档：
//! - 对照模式在原文之后插入翻译容器；
//! - 替换模式原地改写，原文保存在 [`MutationLedger`] 中。
//!
//! [`Renderer::restore`] 回滚所有改写并移除所有翻译容器，可以重复调用。

mod compare;
pub mod ledger;
mod replace;

use std::cell::RefCell;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::parsers::html::{
    append_child, detach_node, find_elements_by_class, get_parent_node, replace_node,
    set_node_text, set_text_content,
};
use crate::translation::config::constants;
use crate::translation::error::TranslationResult;
use crate::translation::pipeline::{RenderMode, Segment};

pub use ledger::{Mutation, MutationLedger, RestoreReport};

/// 文档渲染器
pub struct Renderer {
    root: Handle,
    ledger: RefCell<MutationLedger>,
}

impl Renderer {
    pub fn new(root: Handle) -> Self {
        Self {
            root,
            ledger: RefCell::new(MutationLedger::new()),
        }
    }

    pub fn root(&self) -> &Handle {
        &self.root
    }

    /// 写入（部分）译文，空白译文不做任何修改
    pub fn apply(&self, segment: &Segment, text: &str) -> TranslationResult<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        match segment.render_mode {
            RenderMode::Compare => compare::render(segment, text, &self.root),
            RenderMode::Replace => {
                replace::render(&mut self.ledger.borrow_mut(), segment, text);
                Ok(())
            }
        }
    }

    /// 是否存在尚未恢复的修改
    pub fn is_modified(&self) -> bool {
        let containers = find_elements_by_class(&self.document_root(), constants::CONTAINER_CLASS);
        !self.ledger.borrow().is_empty() || !containers.is_empty()
    }

    /// 内容根所在文档的最上层节点，对照容器在其中查找
    fn document_root(&self) -> Handle {
        let mut top = self.root.clone();
        while let Some(parent) = get_parent_node(&top) {
            top = parent;
        }
        top
    }

    /// 恢复原文
    pub fn restore(&self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mutations = self.ledger.borrow_mut().take();

        let (runs, subtrees): (Vec<Mutation>, Vec<Mutation>) = mutations
            .into_iter()
            .partition(|m| matches!(m, Mutation::TextRuns { .. }));

        for mutation in runs.into_iter().chain(subtrees) {
            if restore_one(mutation) {
                report.restored += 1;
            } else {
                report.failures += 1;
            }
        }

        let containers = find_elements_by_class(&self.document_root(), constants::CONTAINER_CLASS);
        for container in containers {
            detach_node(&container);
            report.removed_containers += 1;
        }

        if report.failures > 0 {
            tracing::warn!("恢复原文时有 {} 处无法还原", report.failures);
        }
        if !report.is_noop() {
            tracing::info!(
                "已恢复原文: {} 处改写，移除 {} 个翻译容器",
                report.restored,
                report.removed_containers
            );
        }
        report
    }
}

fn restore_one(mutation: Mutation) -> bool {
    match mutation {
        Mutation::TextRuns { parent, runs } => {
            let mut ok = true;
            for (node, original) in runs {
                let attached = parent
                    .children
                    .borrow()
                    .iter()
                    .any(|child| Rc::ptr_eq(child, &node));
                if !attached || !set_node_text(&node, &original) {
                    tracing::warn!("文本节点已脱离文档，无法还原: {}", original);
                    ok = false;
                }
            }
            ok
        }
        Mutation::Subtree { element, snapshot } => {
            if replace_node(&element, snapshot.clone()) {
                return true;
            }
            // 元素已无父节点，原地换回子节点
            let children: Vec<Handle> = snapshot.children.borrow_mut().drain(..).collect();
            set_text_content(&element, "");
            for child in children {
                append_child(&element, child);
            }
            true
        }
    }
}
