//! 变更记录
//!
//! 替换模式修改文档前记下原始内容，恢复时按记录回滚。

use std::collections::HashMap;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::parsers::html::{
    child_index_path, deep_clone, get_parent_node, node_text, replace_node, resolve_path,
    set_node_text,
};

/// 一条变更记录
#[derive(Debug)]
pub enum Mutation {
    /// 父元素下被改写的文本节点及其原文
    TextRuns {
        parent: Handle,
        runs: Vec<(Handle, String)>,
    },
    /// 整个子树被改写前的快照
    Subtree { element: Handle, snapshot: Handle },
}

/// 恢复结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    /// 已还原的记录数
    pub restored: usize,
    /// 移除的对照容器数
    pub removed_containers: usize,
    /// 无法还原的记录数
    pub failures: usize,
}

impl RestoreReport {
    pub fn is_noop(&self) -> bool {
        self.restored == 0 && self.removed_containers == 0 && self.failures == 0
    }
}

fn node_key(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

/// 按元素去重、按插入顺序保存的变更记录
#[derive(Debug, Default)]
pub struct MutationLedger {
    entries: Vec<Mutation>,
    index: HashMap<usize, usize>,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 记录即将被改写的文本节点
    ///
    /// 同一节点只记录第一次看到的原文；父元素已有子树快照时不再记录。
    pub fn record_text(&mut self, text_node: &Handle) {
        let Some(parent) = get_parent_node(text_node) else {
            return;
        };
        let Some(original) = node_text(text_node) else {
            return;
        };

        let key = node_key(&parent);
        match self.index.get(&key).copied() {
            Some(slot) => {
                if let Mutation::TextRuns { runs, .. } = &mut self.entries[slot] {
                    if !runs.iter().any(|(node, _)| Rc::ptr_eq(node, text_node)) {
                        runs.push((text_node.clone(), original));
                    }
                }
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(Mutation::TextRuns {
                    parent,
                    runs: vec![(text_node.clone(), original)],
                });
            }
        }
    }

    /// 记录即将被整体改写的元素
    ///
    /// 快照取自当前文档，其中已被改写的后代按已有记录还原为原文，
    /// 这些后代记录随后并入快照。元素已有快照时不再记录。
    pub fn record_subtree(&mut self, element: &Handle) {
        if let Some(&slot) = self.index.get(&node_key(element)) {
            if matches!(self.entries[slot], Mutation::Subtree { .. }) {
                return;
            }
        }

        let snapshot = deep_clone(element);
        let entries = std::mem::take(&mut self.entries);
        let mut kept = Vec::with_capacity(entries.len() + 1);
        for mutation in entries {
            if !replay_into(&mutation, element, &snapshot) {
                kept.push(mutation);
            }
        }
        kept.push(Mutation::Subtree {
            element: element.clone(),
            snapshot,
        });

        self.entries = kept;
        self.reindex();
    }

    /// 取出全部记录并清空
    pub fn take(&mut self) -> Vec<Mutation> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(slot, mutation)| {
                let owner = match mutation {
                    Mutation::TextRuns { parent, .. } => parent,
                    Mutation::Subtree { element, .. } => element,
                };
                (node_key(owner), slot)
            })
            .collect();
    }
}

/// 把 `outer` 之内的一条记录回放到 `outer` 的快照上，返回记录是否已并入快照
fn replay_into(mutation: &Mutation, outer: &Handle, snapshot: &Handle) -> bool {
    match mutation {
        Mutation::TextRuns { parent, runs } => {
            let Some(copy) = copy_of(outer, parent, snapshot) else {
                return false;
            };
            let live = parent.children.borrow();
            let copies = copy.children.borrow();
            for (node, original) in runs {
                let position = live.iter().position(|child| Rc::ptr_eq(child, node));
                if let Some(target) = position.and_then(|i| copies.get(i)) {
                    set_node_text(target, original);
                }
            }
            true
        }
        Mutation::Subtree { element, snapshot: original } => {
            match copy_of(outer, element, snapshot) {
                Some(copy) => replace_node(&copy, deep_clone(original)),
                None => false,
            }
        }
    }
}

/// `node` 在 `outer` 快照中的对应节点
fn copy_of(outer: &Handle, node: &Handle, snapshot: &Handle) -> Option<Handle> {
    let path = child_index_path(outer, node, |_| true)?;
    resolve_path(snapshot, &path, |_| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{append_child, create_element, create_text_node, text_content};

    #[test]
    fn test_text_records_keep_first_original() {
        let p = create_element("p", &[]);
        let text = create_text_node("Hello world");
        append_child(&p, text.clone());

        let mut ledger = MutationLedger::new();
        ledger.record_text(&text);
        set_node_text(&text, "你好");
        ledger.record_text(&text);
        set_node_text(&text, "你好世界");

        match ledger.take().as_slice() {
            [Mutation::TextRuns { runs, .. }] => {
                assert_eq!(runs.len(), 1);
                assert_eq!(runs[0].1, "Hello world");
            }
            other => panic!("unexpected ledger: {:?}", other),
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_subtree_upgrade_reverts_texts() {
        let span = create_element("span", &[]);
        let first = create_text_node("one");
        let second = create_text_node("two");
        append_child(&span, first.clone());
        append_child(&span, second.clone());

        let mut ledger = MutationLedger::new();
        ledger.record_text(&first);
        set_node_text(&first, "一");
        ledger.record_subtree(&span);
        assert_eq!(ledger.len(), 1);

        // 已有快照时文本记录被忽略
        ledger.record_text(&second);

        match ledger.take().as_slice() {
            [Mutation::Subtree { snapshot, .. }] => {
                assert_eq!(text_content(snapshot), "onetwo");
            }
            other => panic!("unexpected ledger: {:?}", other),
        }
    }

    #[test]
    fn test_outer_snapshot_absorbs_inner_records() {
        let a = create_element("a", &[]);
        let lead = create_text_node("full ");
        let b = create_element("b", &[]);
        let inner = create_text_node("docs");
        append_child(&a, lead.clone());
        append_child(&b, inner.clone());
        append_child(&a, b.clone());

        let mut ledger = MutationLedger::new();
        ledger.record_subtree(&b);
        set_node_text(&inner, "文档");
        ledger.record_text(&lead);
        set_node_text(&lead, "完整");
        assert_eq!(ledger.len(), 2);

        ledger.record_subtree(&a);
        assert_eq!(ledger.len(), 1);

        match ledger.take().as_slice() {
            [Mutation::Subtree { element, snapshot }] => {
                assert!(Rc::ptr_eq(element, &a));
                assert_eq!(text_content(snapshot), "full docs");
            }
            other => panic!("unexpected ledger: {:?}", other),
        }
    }
}
