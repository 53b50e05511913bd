//! Canonical layer document writer
//!
//! Output depends only on tree content: attributes come first in key order,
//! then children in name order, with four-space indentation.

use super::escape::{cdata, escape_attr};
use crate::tree::{AttrValue, Content, Node, VirtualTree};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const DOCTYPE: &str = r#"<!DOCTYPE filesystem PUBLIC "-//NetBeans//DTD Filesystem 1.2//EN" "http://www.netbeans.org/dtds/filesystem-1_2.dtd">"#;

const INDENT_STEP: usize = 4;

pub fn serialize(tree: &VirtualTree) -> String {
    let mut out = String::new();
    out.push_str(XML_DECLARATION);
    out.push('\n');
    out.push_str(DOCTYPE);
    out.push('\n');

    let root = tree.root();
    if root.attributes().next().is_none() && root.children().next().is_none() {
        out.push_str("<filesystem/>\n");
        return out;
    }
    out.push_str("<filesystem>\n");
    write_body(&mut out, root, 1);
    out.push_str("</filesystem>\n");
    out
}

fn write_body(out: &mut String, node: &Node, depth: usize) {
    for (key, value) in node.attributes() {
        write_attr(out, key, value, depth);
    }
    for child in node.children() {
        write_node(out, child, depth);
    }
}

fn write_attr(out: &mut String, key: &str, value: &AttrValue, depth: usize) {
    indent(out, depth);
    out.push_str(&format!(
        "<attr name=\"{}\" {}=\"{}\"/>\n",
        escape_attr(key),
        value.xml_kind(),
        escape_attr(&value.encode())
    ));
}

fn write_node(out: &mut String, node: &Node, depth: usize) {
    let element = node.kind().as_str();
    indent(out, depth);
    out.push_str(&format!("<{} name=\"{}\"", element, escape_attr(node.name())));

    let inline = match node.content() {
        Some(Content::Url(url)) => {
            out.push_str(&format!(" url=\"{}\"", escape_attr(url)));
            None
        }
        Some(Content::Inline(bytes)) => Some(String::from_utf8_lossy(bytes)),
        None => None,
    };

    let has_nested = node.attributes().next().is_some() || node.children().next().is_some();
    match (has_nested, inline) {
        (false, None) => out.push_str("/>\n"),
        (false, Some(text)) => {
            out.push('>');
            out.push_str(&cdata(&text));
            out.push_str(&format!("</{}>\n", element));
        }
        (true, inline) => {
            out.push_str(">\n");
            write_body(out, node, depth + 1);
            if let Some(text) = inline {
                indent(out, depth + 1);
                out.push_str(&cdata(&text));
                out.push('\n');
            }
            indent(out, depth);
            out.push_str(&format!("</{}>\n", element));
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    out.extend(std::iter::repeat(' ').take(depth * INDENT_STEP));
}
