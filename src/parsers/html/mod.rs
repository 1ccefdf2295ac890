//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作（属性、文本、节点增删、深拷贝、路径定位）
//! - `style`: 内联样式解析与计算样式近似
//! - `serializer`: 序列化功能

pub mod dom;
pub mod serializer;
pub mod style;

pub use dom::{
    append_child, child_index, child_index_path, create_element, create_text_node, deep_clone,
    detach_node, find_body, find_elements_by_class, get_child_node_by_name, get_node_attr,
    get_node_name, get_parent_node, has_class, html_to_dom, insert_after, is_text_node,
    next_element_sibling, node_text, replace_node, resolve_path, set_node_attr, set_node_text,
    set_text_content, text_content,
};
pub use serializer::{serialize_document, serialize_node};
pub use style::{computed_value, display_of, inline_style_value, is_visible, parse_inline_style, Display};
