//! 内联样式解析与计算样式近似
//!
//! 静态文档没有布局引擎，这里用三种信息近似浏览器的计算样式：
//! `hidden` 属性、内联 `style` 声明（经 cssparser 分词）、以及按标签的默认 `display`。
//! 可继承属性（字体、行高、颜色）沿祖先链查找。

use cssparser::{Parser, ParserInput, Token};
use markup5ever_rcdom::Handle;

use super::dom::{get_node_attr, get_node_name, get_parent_node};

/// `display` 的取值（只区分引擎关心的几种）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Grid,
    Inline,
    ListItem,
    Table,
    None,
    Other,
}

impl Display {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "block" | "flow-root" => Display::Block,
            "flex" => Display::Flex,
            "grid" => Display::Grid,
            "inline" | "inline-block" => Display::Inline,
            "list-item" => Display::ListItem,
            "table" => Display::Table,
            "none" => Display::None,
            _ => Display::Other,
        }
    }

    /// block / flex / grid 视为块级
    pub fn is_block_level(self) -> bool {
        matches!(self, Display::Block | Display::Flex | Display::Grid)
    }
}

// 用户代理样式表中默认 display: block 的元素
const DEFAULT_BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "details", "dialog",
    "dir", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hgroup", "html", "legend", "main", "menu", "nav", "ol",
    "p", "pre", "section", "summary", "ul",
];

/// 解析内联样式声明，返回 (属性名, 值) 列表，属性名转为小写，`!important` 被去掉
pub fn parse_inline_style(style: &str) -> Vec<(String, String)> {
    let mut input = ParserInput::new(style);
    let mut parser = Parser::new(&mut input);
    let mut declarations = Vec::new();

    loop {
        let name = match parser.next() {
            Ok(Token::Ident(name)) => Some(name.to_ascii_lowercase()),
            Ok(_) => None,
            Err(_) => break,
        };

        let Some(name) = name else {
            skip_declaration(&mut parser);
            continue;
        };

        if parser.expect_colon().is_err() {
            skip_declaration(&mut parser);
            continue;
        }

        let start = parser.position();
        let mut end = start;
        loop {
            let finished = matches!(
                parser.next_including_whitespace(),
                Ok(Token::Semicolon) | Err(_)
            );
            if finished {
                break;
            }
            end = parser.position();
        }

        let value = strip_important(parser.slice(start..end).trim());
        if !value.is_empty() {
            declarations.push((name, value.to_string()));
        }
    }

    declarations
}

fn skip_declaration(parser: &mut Parser) {
    loop {
        if matches!(parser.next(), Ok(Token::Semicolon) | Err(_)) {
            break;
        }
    }
}

fn strip_important(value: &str) -> &str {
    let lower = value.to_ascii_lowercase();
    match lower.rfind('!') {
        Some(i) if lower[i + 1..].trim() == "important" => value[..i].trim_end(),
        _ => value,
    }
}

/// 元素内联样式中某属性的值（后出现的声明优先）
pub fn inline_style_value(node: &Handle, property: &str) -> Option<String> {
    let style = get_node_attr(node, "style")?;
    parse_inline_style(&style)
        .into_iter()
        .rev()
        .find(|(name, _)| name == property)
        .map(|(_, value)| value)
}

/// 元素的 display：内联样式优先，否则取标签默认值
pub fn display_of(node: &Handle) -> Display {
    if let Some(value) = inline_style_value(node, "display") {
        return Display::parse(&value);
    }

    match get_node_name(node) {
        Some("li") => Display::ListItem,
        Some("table") => Display::Table,
        Some(tag) if DEFAULT_BLOCK_TAGS.contains(&tag) => Display::Block,
        Some(_) => Display::Inline,
        None => Display::Other,
    }
}

/// 元素自身是否可见
///
/// 不可见：`hidden` 属性、`display:none`、`visibility:hidden`、`opacity:0`、
/// `height:0px` 或 `width:0px`。祖先的可见性由遍历时整棵子树跳过保证。
pub fn is_visible(node: &Handle) -> bool {
    if get_node_attr(node, "hidden").is_some() {
        return false;
    }

    let Some(style) = get_node_attr(node, "style") else {
        return true;
    };

    for (name, value) in parse_inline_style(&style) {
        let value = value.to_ascii_lowercase();
        let hidden = match name.as_str() {
            "display" => value == "none",
            "visibility" => value == "hidden",
            "opacity" => value.parse::<f32>().map(|v| v == 0.0).unwrap_or(false),
            "height" | "width" => value == "0px" || value == "0",
            _ => false,
        };
        if hidden {
            return false;
        }
    }

    true
}

/// 可继承属性的计算值：从自身开始沿祖先链查找内联声明
pub fn computed_value(node: &Handle, property: &str) -> Option<String> {
    let mut current = Some(node.clone());
    while let Some(element) = current {
        if let Some(value) = inline_style_value(&element, property) {
            return Some(value);
        }
        current = get_parent_node(&element);
    }
    None
}
