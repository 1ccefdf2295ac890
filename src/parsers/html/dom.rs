use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> std::io::Result<RcDom> {
    let s = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
}

/// 定位文档的 `<body>` 元素
pub fn find_body(document: &Handle) -> Option<Handle> {
    let html = get_child_node_by_name(document, "html")?;
    get_child_node_by_name(&html, "body")
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    children
        .iter()
        .find(|child| get_node_name(child) == Some(node_name))
        .cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
///
/// 父指针存放在 `Cell` 中，读取后必须放回。
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性，`None` 表示删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        let position = attrs.iter().position(|attr| &*attr.name.local == attr_name);

        match (position, attr_value) {
            (Some(i), Some(value)) => attrs[i].value = StrTendril::from_slice(&value),
            (Some(i), None) => {
                attrs.remove(i);
            }
            (None, Some(value)) => attrs.push(Attribute {
                name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                value: StrTendril::from_slice(&value),
            }),
            (None, None) => {}
        }
    }
}

/// 检查元素的 class 列表是否包含指定类名
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_node_attr(node, "class")
        .map(|classes| classes.split_whitespace().any(|c| c == class_name))
        .unwrap_or(false)
}

pub fn is_text_node(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

/// 创建 HTML 命名空间下的元素
pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(
            attrs
                .iter()
                .map(|(name, value)| Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(*name)),
                    value: StrTendril::from_slice(value),
                })
                .collect(),
        ),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 深拷贝节点及其子树，副本与原树不共享任何节点
pub fn deep_clone(node: &Handle) -> Handle {
    let data = match &node.data {
        NodeData::Document => NodeData::Document,
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => NodeData::Doctype {
            name: name.clone(),
            public_id: public_id.clone(),
            system_id: system_id.clone(),
        },
        NodeData::Text { contents } => NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        },
        NodeData::Comment { contents } => NodeData::Comment {
            contents: contents.clone(),
        },
        NodeData::Element {
            name,
            attrs,
            template_contents,
            mathml_annotation_xml_integration_point,
        } => NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(template_contents.borrow().as_ref().map(deep_clone)),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        },
        NodeData::ProcessingInstruction { target, contents } => {
            NodeData::ProcessingInstruction {
                target: target.clone(),
                contents: contents.clone(),
            }
        }
    };

    let copy = Node::new(data);
    for child in node.children.borrow().iter() {
        let child_copy = deep_clone(child);
        child_copy.parent.set(Some(Rc::downgrade(&copy)));
        copy.children.borrow_mut().push(child_copy);
    }
    copy
}

/// 从父节点中移除
pub fn detach_node(node: &Handle) {
    if let Some(parent) = get_parent_node(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

pub fn append_child(parent: &Handle, child: Handle) {
    detach_node(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 将 `new_node` 插入到 `reference` 之后，`reference` 没有父节点时返回 false
pub fn insert_after(reference: &Handle, new_node: Handle) -> bool {
    let Some(parent) = get_parent_node(reference) else {
        return false;
    };
    detach_node(&new_node);
    let Some(index) = child_index(reference) else {
        return false;
    };
    new_node.parent.set(Some(Rc::downgrade(&parent)));
    parent.children.borrow_mut().insert(index + 1, new_node);
    true
}

/// 用 `replacement` 替换 `old`，`old` 没有父节点时返回 false
pub fn replace_node(old: &Handle, replacement: Handle) -> bool {
    let (Some(parent), Some(index)) = (get_parent_node(old), child_index(old)) else {
        return false;
    };
    detach_node(&replacement);
    replacement.parent.set(Some(Rc::downgrade(&parent)));
    parent.children.borrow_mut()[index] = replacement;
    old.parent.set(None);
    true
}

/// 节点在父节点 childNodes 中的位置
pub fn child_index(node: &Handle) -> Option<usize> {
    let parent = get_parent_node(node)?;
    let children = parent.children.borrow();
    children.iter().position(|child| Rc::ptr_eq(child, node))
}

pub fn next_element_sibling(node: &Handle) -> Option<Handle> {
    let parent = get_parent_node(node)?;
    let index = child_index(node)?;
    let children = parent.children.borrow();
    children
        .iter()
        .skip(index + 1)
        .find(|child| matches!(child.data, NodeData::Element { .. }))
        .cloned()
}

/// 文本节点的内容
pub fn node_text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 覆盖文本节点的内容，非文本节点返回 false
pub fn set_node_text(node: &Handle, text: &str) -> bool {
    match &node.data {
        NodeData::Text { contents } => {
            *contents.borrow_mut() = StrTendril::from_slice(text);
            true
        }
        _ => false,
    }
}

/// 所有后代文本节点内容的拼接（等价于 DOM 的 textContent）
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { .. } | NodeData::Document => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
        _ => {}
    }
}

/// 用单个文本节点替换元素的全部子节点
pub fn set_text_content(node: &Handle, text: &str) {
    if set_node_text(node, text) {
        return;
    }

    let old_children: Vec<Handle> = node.children.borrow_mut().drain(..).collect();
    for child in &old_children {
        child.parent.set(None);
    }
    if !text.is_empty() {
        append_child(node, create_text_node(text));
    }
}

/// 按类名查找元素，命中的元素不再向下搜索
pub fn find_elements_by_class(root: &Handle, class_name: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_by_class(root, class_name, &mut found);
    found
}

fn collect_by_class(node: &Handle, class_name: &str, found: &mut Vec<Handle>) {
    if has_class(node, class_name) {
        found.push(node.clone());
        return;
    }
    for child in node.children.borrow().iter() {
        collect_by_class(child, class_name, found);
    }
}

/// 计算 `node` 相对 `ancestor` 的子节点下标路径
///
/// 只有 `counted` 返回 true 的兄弟节点参与计数；`node` 不在 `ancestor` 之下时返回 `None`。
pub fn child_index_path<F>(ancestor: &Handle, node: &Handle, counted: F) -> Option<Vec<usize>>
where
    F: Fn(&Handle) -> bool,
{
    let mut path = Vec::new();
    let mut current = node.clone();

    while !Rc::ptr_eq(&current, ancestor) {
        let parent = get_parent_node(&current)?;
        let index = {
            let children = parent.children.borrow();
            children
                .iter()
                .filter(|child| counted(child))
                .position(|child| Rc::ptr_eq(child, &current))?
        };
        path.push(index);
        current = parent;
    }

    path.reverse();
    Some(path)
}

/// 在 `root` 下按路径取回节点，与 [`child_index_path`] 互逆
pub fn resolve_path<F>(root: &Handle, path: &[usize], counted: F) -> Option<Handle>
where
    F: Fn(&Handle) -> bool,
{
    let mut current = root.clone();
    for &index in path {
        let next = {
            let children = current.children.borrow();
            children
                .iter()
                .filter(|child| counted(child))
                .nth(index)
                .cloned()?
        };
        current = next;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> RcDom {
        html_to_dom(html.as_bytes(), "utf-8").unwrap()
    }

    fn first_by_name(node: &Handle, name: &str) -> Option<Handle> {
        if get_node_name(node) == Some(name) {
            return Some(node.clone());
        }
        for child in node.children.borrow().iter() {
            if let Some(found) = first_by_name(child, name) {
                return Some(found);
            }
        }
        None
    }

    #[test]
    fn test_parent_lookup_is_repeatable() {
        let dom = parse("<html><body><p>Hello</p></body></html>");
        let p = first_by_name(&dom.document, "p").unwrap();

        let first = get_parent_node(&p).unwrap();
        let second = get_parent_node(&p).unwrap();
        assert_eq!(get_node_name(&first), Some("body"));
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_deep_clone_is_decoupled() {
        let dom = parse("<html><body><p>Hello <b>world</b></p></body></html>");
        let p = first_by_name(&dom.document, "p").unwrap();

        let copy = deep_clone(&p);
        set_text_content(&copy, "changed");

        assert_eq!(text_content(&p), "Hello world");
        assert_eq!(text_content(&copy), "changed");
        assert!(get_parent_node(&copy).is_none());
    }

    #[test]
    fn test_path_roundtrip_in_clone() {
        let dom = parse("<html><body><div><p>a</p><p>b <i>c</i></p></div></body></html>");
        let div = first_by_name(&dom.document, "div").unwrap();
        let italic = first_by_name(&div, "i").unwrap();

        let path = child_index_path(&div, &italic, |_| true).unwrap();
        assert_eq!(path, vec![1, 1]);

        let copy = deep_clone(&div);
        let resolved = resolve_path(&copy, &path, |_| true).unwrap();
        assert_eq!(get_node_name(&resolved), Some("i"));
        assert!(!Rc::ptr_eq(&resolved, &italic));
    }

    #[test]
    fn test_path_skips_filtered_nodes() {
        let dom = parse(
            "<html><body><div><p>a</p><div class=\"skip\"></div><p>b</p></div></body></html>",
        );
        let body = find_body(&dom.document).unwrap();
        let outer = first_by_name(&body, "div").unwrap();
        let second_p = outer.children.borrow()[2].clone();

        let path = child_index_path(&outer, &second_p, |n| !has_class(n, "skip")).unwrap();
        assert_eq!(path, vec![1]);
    }

    #[test]
    fn test_insert_replace_and_detach() {
        let dom = parse("<html><body><p>one</p></body></html>");
        let body = find_body(&dom.document).unwrap();
        let p = first_by_name(&body, "p").unwrap();

        let div = create_element("div", &[("class", "marker")]);
        assert!(insert_after(&p, div.clone()));
        assert!(Rc::ptr_eq(&next_element_sibling(&p).unwrap(), &div));
        assert_eq!(find_elements_by_class(&body, "marker").len(), 1);

        let span = create_element("span", &[]);
        assert!(replace_node(&div, span.clone()));
        assert_eq!(child_index(&span), Some(1));
        assert!(get_parent_node(&div).is_none());

        detach_node(&span);
        assert_eq!(body.children.borrow().len(), 1);
    }

    #[test]
    fn test_attr_roundtrip() {
        let div = create_element("div", &[("id", "x")]);
        set_node_attr(&div, "class", Some("a b".to_string()));
        assert!(has_class(&div, "b"));
        set_node_attr(&div, "class", None);
        assert_eq!(get_node_attr(&div, "class"), None);
        assert_eq!(get_node_attr(&div, "id"), Some("x".to_string()));
    }
}
