//! Layer document reader built on the `xmlparser` tokenizer.
//!
//! Any schema violation fails the whole document; no partial tree is returned.

use super::escape::unescape;
use crate::error::ApiError;
use crate::tree::attr::VALUE_KINDS;
use crate::tree::{path, validate_attribute_name, AttrValue, Content, Node, VirtualTree};
use xmlparser::{ElementEnd, Token, Tokenizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Filesystem,
    Folder,
    File,
    Attr,
}

impl Element {
    fn tag(&self) -> &'static str {
        match self {
            Element::Filesystem => "filesystem",
            Element::Folder => "folder",
            Element::File => "file",
            Element::Attr => "attr",
        }
    }

    fn allowed_inside(&self, parent: Option<Element>) -> bool {
        match (self, parent) {
            (Element::Filesystem, None) => true,
            (Element::Folder | Element::File, Some(Element::Filesystem | Element::Folder)) => true,
            (Element::Attr, Some(Element::Filesystem | Element::Folder | Element::File)) => true,
            _ => false,
        }
    }
}

/// An element whose end tag has not been seen yet
struct Pending {
    element: Element,
    fields: Vec<(String, String)>,
    node: Option<Node>,
    path: String,
    url: Option<String>,
    text: String,
}

impl Pending {
    fn new(element: Element) -> Self {
        Pending {
            element,
            fields: Vec::new(),
            node: None,
            path: String::new(),
            url: None,
            text: String::new(),
        }
    }

    fn take_field(&mut self, name: &str) -> Option<String> {
        let idx = self.fields.iter().position(|(k, _)| k == name)?;
        Some(self.fields.remove(idx).1)
    }
}

struct Reader<'s> {
    source_id: &'s str,
    stack: Vec<Pending>,
    root: Option<Node>,
}

pub fn deserialize(text: &str, source_id: &str) -> Result<VirtualTree, ApiError> {
    let mut reader = Reader {
        source_id,
        stack: Vec::new(),
        root: None,
    };

    for token in Tokenizer::from(text) {
        let token = token.map_err(|e| ApiError::malformed(source_id, e.to_string()))?;
        match token {
            Token::ElementStart { prefix, local, .. } => {
                reader.start(prefix.as_str(), local.as_str())?
            }
            Token::Attribute {
                prefix,
                local,
                value,
                ..
            } => reader.field(prefix.as_str(), local.as_str(), value.as_str())?,
            Token::ElementEnd { end, .. } => match end {
                ElementEnd::Open => reader.open()?,
                ElementEnd::Empty => {
                    reader.open()?;
                    reader.close()?;
                }
                ElementEnd::Close(prefix, local) => {
                    reader.check_close(prefix.as_str(), local.as_str())?;
                    reader.close()?;
                }
            },
            Token::Text { text } => reader.text(text.as_str())?,
            Token::Cdata { text, .. } => reader.cdata(text.as_str())?,
            _ => {}
        }
    }

    if let Some(open) = reader.stack.last() {
        return Err(reader.error(format!(
            "unexpected end of document inside <{}>",
            open.element.tag()
        )));
    }
    let root = reader
        .root
        .ok_or_else(|| ApiError::malformed(source_id, "missing <filesystem> root element"))?;
    VirtualTree::from_root(root).map_err(|e| ApiError::malformed(source_id, e.to_string()))
}

impl Reader<'_> {
    fn error(&self, reason: impl Into<String>) -> ApiError {
        ApiError::malformed(self.source_id, reason)
    }

    fn start(&mut self, prefix: &str, local: &str) -> Result<(), ApiError> {
        if self.root.is_some() {
            return Err(self.error("content after the root element"));
        }
        let element = match (prefix, local) {
            ("", "filesystem") => Element::Filesystem,
            ("", "folder") => Element::Folder,
            ("", "file") => Element::File,
            ("", "attr") => Element::Attr,
            _ => return Err(self.error(format!("unknown element <{}>", qualified(prefix, local)))),
        };
        let parent = self.stack.last().map(|p| p.element);
        if !element.allowed_inside(parent) {
            let context = parent.map(|p| p.tag()).unwrap_or("document");
            return Err(self.error(format!(
                "<{}> is not allowed inside <{}>",
                element.tag(),
                context
            )));
        }
        self.stack.push(Pending::new(element));
        Ok(())
    }

    fn field(&mut self, prefix: &str, local: &str, raw: &str) -> Result<(), ApiError> {
        let name = qualified(prefix, local);
        let value = unescape(raw).map_err(|e| self.error(e))?;
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| ApiError::malformed(self.source_id, "attribute outside an element"))?;
        if top.fields.iter().any(|(k, _)| *k == name) {
            return Err(ApiError::malformed(
                self.source_id,
                format!("duplicate XML attribute {:?} on <{}>", name, top.element.tag()),
            ));
        }
        top.fields.push((name, value));
        Ok(())
    }

    /// Start tag complete: materialize the node for folders and files
    fn open(&mut self) -> Result<(), ApiError> {
        let parent_path = match self.stack.len() {
            0 | 1 => String::new(),
            n => self.stack[n - 2].path.clone(),
        };
        let source_id = self.source_id;
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| ApiError::malformed(source_id, "end of tag outside an element"))?;
        match top.element {
            Element::Filesystem => {
                top.node = Some(Node::folder(""));
            }
            Element::Folder | Element::File => {
                let name = top.take_field("name").ok_or_else(|| {
                    ApiError::malformed(
                        source_id,
                        format!("<{}> without a name under {:?}", top.element.tag(), parent_path),
                    )
                })?;
                path::validate_name(&name).map_err(|e| ApiError::malformed(source_id, e.to_string()))?;
                top.path = path::join(&parent_path, &name);
                if top.element == Element::File {
                    top.url = top.take_field("url");
                }
                if let Some((key, _)) = top.fields.first() {
                    return Err(ApiError::malformed(
                        source_id,
                        format!("unexpected XML attribute {:?} on {}", key, top.path),
                    ));
                }
                top.node = Some(if top.element == Element::Folder {
                    Node::folder(name)
                } else {
                    Node::file(name)
                });
            }
            Element::Attr => {
                top.path = parent_path;
            }
        }
        Ok(())
    }

    fn check_close(&self, prefix: &str, local: &str) -> Result<(), ApiError> {
        match self.stack.last() {
            Some(top) if prefix.is_empty() && local == top.element.tag() => Ok(()),
            Some(top) => Err(self.error(format!(
                "</{}> does not close <{}>",
                qualified(prefix, local),
                top.element.tag()
            ))),
            None => Err(self.error(format!("unmatched </{}>", qualified(prefix, local)))),
        }
    }

    fn close(&mut self) -> Result<(), ApiError> {
        let source_id = self.source_id;
        let mut done = self
            .stack
            .pop()
            .ok_or_else(|| ApiError::malformed(source_id, "unbalanced end tag"))?;

        if done.element == Element::Attr {
            let (key, value) = self.parse_attr(&mut done)?;
            let parent = self
                .parent_node()
                .ok_or_else(|| ApiError::malformed(source_id, "<attr> outside a node"))?;
            if parent.attributes.contains_key(&key) {
                return Err(ApiError::malformed(
                    source_id,
                    format!("attribute {:?} given twice on {:?}", key, done.path),
                ));
            }
            parent.attributes.insert(key, value);
            return Ok(());
        }

        let mut node = done
            .node
            .take()
            .ok_or_else(|| ApiError::malformed(source_id, "element was never opened"))?;
        if done.element == Element::File {
            // an external url takes precedence over inline text
            let content = match done.url.take() {
                Some(url) => Content::Url(url),
                None => Content::Inline(std::mem::take(&mut done.text).into_bytes()),
            };
            node = node.with_content(content);
        }

        if done.element == Element::Filesystem {
            self.root = Some(node);
            return Ok(());
        }

        let parent = self
            .parent_node()
            .and_then(Node::children_mut)
            .ok_or_else(|| ApiError::malformed(source_id, "node outside a folder"))?;
        if parent.contains_key(node.name()) {
            return Err(ApiError::malformed(
                source_id,
                format!("duplicate entry {}", done.path),
            ));
        }
        parent.insert(node.name().to_string(), node);
        Ok(())
    }

    fn parse_attr(&self, done: &mut Pending) -> Result<(String, AttrValue), ApiError> {
        let key = done
            .take_field("name")
            .ok_or_else(|| self.error(format!("<attr> without a name on {:?}", done.path)))?;
        validate_attribute_name(&done.path, &key).map_err(|e| self.error(e.to_string()))?;

        let mut value = None;
        for (kind, raw) in done.fields.drain(..) {
            if !VALUE_KINDS.contains(&kind.as_str()) {
                return Err(self.error(format!(
                    "unexpected XML attribute {:?} on attr {:?}",
                    kind, key
                )));
            }
            if value.is_some() {
                return Err(self.error(format!("attr {:?} carries more than one value", key)));
            }
            let decoded = AttrValue::decode(&kind, &raw)
                .map_err(|e| self.error(format!("attr {:?}: {}", key, e)))?;
            value = decoded;
        }
        let value = value.ok_or_else(|| self.error(format!("attr {:?} has no value", key)))?;
        Ok((key, value))
    }

    fn parent_node(&mut self) -> Option<&mut Node> {
        self.stack.last_mut().and_then(|p| p.node.as_mut())
    }

    fn text(&mut self, raw: &str) -> Result<(), ApiError> {
        match self.stack.last() {
            Some(top) if top.element == Element::File => {
                let decoded = unescape(raw).map_err(|e| self.error(e))?;
                if let Some(top) = self.stack.last_mut() {
                    top.text.push_str(decoded.trim());
                }
                Ok(())
            }
            _ if raw.trim().is_empty() => Ok(()),
            Some(top) => Err(self.error(format!(
                "unexpected text inside <{}>",
                top.element.tag()
            ))),
            None => Err(self.error("text outside the root element")),
        }
    }

    fn cdata(&mut self, raw: &str) -> Result<(), ApiError> {
        match self.stack.last_mut() {
            Some(top) if top.element == Element::File => {
                top.text.push_str(raw);
                Ok(())
            }
            _ => Err(self.error("CDATA is only allowed inside <file>")),
        }
    }
}

fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    #[test]
    fn test_reads_nested_layer() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE filesystem PUBLIC "-//NetBeans//DTD Filesystem 1.1//EN" "http://www.netbeans.org/dtds/filesystem-1_1.dtd">
<filesystem>
    <!-- menu entries -->
    <folder name="Menu">
        <attr name="position" intvalue="100"/>
        <file name="a.instance">
            <attr name="instanceClass" stringvalue="org.example.A"/>
        </file>
        <file name="b.txt" url="b.txt"/>
        <file name="c.txt"><![CDATA[hello]]></file>
    </folder>
</filesystem>
"#;
        let tree = deserialize(xml, "layer.xml").unwrap();
        assert_eq!(tree.find("Menu").unwrap().kind(), NodeKind::Folder);
        assert_eq!(
            tree.attribute("Menu", "position").unwrap(),
            Some(&AttrValue::Int(100))
        );
        assert_eq!(
            tree.attribute("Menu/a.instance", "instanceClass").unwrap(),
            Some(&AttrValue::String("org.example.A".to_string()))
        );
        assert_eq!(
            tree.content("Menu/b.txt").unwrap(),
            Some(&Content::Url("b.txt".to_string()))
        );
        assert_eq!(
            tree.content("Menu/c.txt").unwrap(),
            Some(&Content::Inline(b"hello".to_vec()))
        );
        assert_eq!(tree.content("Menu/a.instance").unwrap(), None);
    }

    #[test]
    fn test_inline_text_is_trimmed_and_unescaped() {
        let xml = "<filesystem><file name=\"t\">\n   a &amp; b \n</file></filesystem>";
        let tree = deserialize(xml, "t").unwrap();
        assert_eq!(
            tree.content("t").unwrap(),
            Some(&Content::Inline(b"a & b".to_vec()))
        );
    }

    fn assert_malformed(xml: &str) {
        match deserialize(xml, "bad.xml") {
            Err(ApiError::MalformedDocument { source_id, .. }) => assert_eq!(source_id, "bad.xml"),
            other => panic!("expected malformed document for {:?}, got {:?}", xml, other),
        }
    }

    #[test]
    fn test_schema_violations() {
        assert_malformed("not xml at all");
        assert_malformed("<config/>");
        assert_malformed("<filesystem><folder/></filesystem>");
        assert_malformed("<filesystem><file name=\"a\"><folder name=\"b\"/></file></filesystem>");
        assert_malformed("<filesystem><folder name=\"a\"/><file name=\"a\"/></filesystem>");
        assert_malformed("<filesystem><attr name=\"a\"/></filesystem>");
        assert_malformed("<filesystem><attr name=\"a\" intvalue=\"x\"/></filesystem>");
        assert_malformed(
            "<filesystem><attr name=\"a\" intvalue=\"1\" boolvalue=\"true\"/></filesystem>",
        );
        assert_malformed("<filesystem><attr name=\"a\" widgetvalue=\"1\"/></filesystem>");
        assert_malformed("<filesystem><folder name=\"a\">text</folder></filesystem>");
        assert_malformed("<filesystem><folder name=\"a\" url=\"x\"/></filesystem>");
        assert_malformed("<filesystem><folder name=\"a\"></file></filesystem>");
        assert_malformed("<filesystem><folder name=\"a\">");
        assert_malformed("<filesystem/><filesystem/>");
        assert_malformed("");
    }

    #[test]
    fn test_root_attributes() {
        let xml = "<filesystem><attr name=\"x\" boolvalue=\"false\"/></filesystem>";
        let tree = deserialize(xml, "r").unwrap();
        assert_eq!(tree.attribute("", "x").unwrap(), Some(&AttrValue::Bool(false)));
    }
}
