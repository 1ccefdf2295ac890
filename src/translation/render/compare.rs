//! 对照模式
//!
//! 原文保持不变，在其块级根元素之后插入一个翻译容器，容器内是根元素的副本，
//! 副本中对应位置的文本被替换为译文。

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::{
    append_child, child_index_path, computed_value, create_element, deep_clone, detach_node,
    find_elements_by_class, get_node_name, get_parent_node, has_class, insert_after,
    next_element_sibling, resolve_path, set_node_attr, set_node_text, set_text_content,
};
use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::{is_block_element, is_translation_container, Segment};

/// 把译文写入对照容器
///
/// `content_root` 是文档的内容根（通常为 body），容器只会插在它的内部。
pub fn render(segment: &Segment, text: &str, content_root: &Handle) -> TranslationResult<()> {
    let first = segment
        .anchor
        .first()
        .ok_or_else(|| TranslationError::InternalError("翻译单元没有锚点".to_string()))?;
    if get_parent_node(first).is_none() {
        return Err(TranslationError::RestoreError("锚点已不在文档中".to_string()));
    }

    let root = translation_root(first, content_root);
    let container = ensure_container(&root)?;
    let clone = ensure_clone(&container, &root);

    for (i, node) in segment.anchor.nodes().iter().enumerate() {
        let value = if i == 0 { text } else { "" };
        let Some(path) = child_index_path(&root, node, |n| !is_translation_container(n)) else {
            // 内容根下的零散文本各自成根，其余锚点不在副本中
            if i == 0 {
                tracing::warn!("无法定位对照副本中的节点");
            }
            continue;
        };
        let Some(target) = resolve_path(&clone, &path, |_| true) else {
            tracing::warn!("对照副本结构与原文不一致: {:?}", path);
            continue;
        };

        if !set_node_text(&target, value) {
            set_text_content(&target, value);
        }
    }

    Ok(())
}

/// 从锚点的父元素开始向上找第一个段落类或块级元素
///
/// 不会越过内容根：一路到达内容根时，取锚点所在的内容根直接子节点。
fn translation_root(anchor: &Handle, content_root: &Handle) -> Handle {
    let mut child = anchor.clone();
    let mut current = get_parent_node(anchor);
    while let Some(element) = current {
        if Rc::ptr_eq(&element, content_root) || !matches!(element.data, NodeData::Element { .. })
        {
            break;
        }
        let is_root_tag = get_node_name(&element)
            .map(|tag| constants::ROOT_PARENT_TAGS.contains(&tag))
            .unwrap_or(false);
        if is_root_tag || is_block_element(&element) {
            return element;
        }
        current = get_parent_node(&element);
        child = element;
    }
    child
}

fn ensure_container(root: &Handle) -> TranslationResult<Handle> {
    if let Some(sibling) = next_element_sibling(root) {
        if is_translation_container(&sibling) {
            return Ok(sibling);
        }
    }

    let mut style = String::new();
    for property in constants::COPIED_STYLE_PROPERTIES {
        if let Some(value) = computed_value(root, property) {
            style.push_str(&format!("{}: {}; ", property, value));
        }
    }
    style.push_str(constants::CONTAINER_ACCENT_STYLE);

    let container = create_element(
        "div",
        &[("class", constants::CONTAINER_CLASS), ("style", style.trim())],
    );
    if !insert_after(root, container.clone()) {
        return Err(TranslationError::RestoreError(
            "无法在原文之后插入翻译容器".to_string(),
        ));
    }
    Ok(container)
}

fn ensure_clone(container: &Handle, root: &Handle) -> Handle {
    let existing = container
        .children
        .borrow()
        .iter()
        .find(|child| has_class(child, constants::CLONE_CLASS))
        .cloned();
    if let Some(clone) = existing {
        return clone;
    }

    let clone = if matches!(root.data, NodeData::Element { .. }) {
        let clone = deep_clone(root);
        for nested in find_elements_by_class(&clone, constants::CONTAINER_CLASS) {
            if !Rc::ptr_eq(&nested, &clone) {
                detach_node(&nested);
            }
        }
        blank_text(&clone);
        set_node_attr(&clone, "class", Some(constants::CLONE_CLASS.to_string()));
        clone
    } else {
        // 零散文本没有可复制的元素，副本本身承载译文
        create_element("div", &[("class", constants::CLONE_CLASS)])
    };
    append_child(container, clone.clone());
    clone
}

fn blank_text(node: &Handle) {
    if set_node_text(node, "") {
        return;
    }
    for child in node.children.borrow().iter() {
        blank_text(child);
    }
}
