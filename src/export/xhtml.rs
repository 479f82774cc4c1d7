//! HTML to XHTML fragment serialization for EPUB content documents.
//!
//! Chapter HTML is parsed with html5ever the way a browser would read it, so
//! every named character reference resolves and unquoted or unclosed markup
//! is repaired. The resulting tree is written back out as XML: void elements
//! are self-closed, attributes are quoted, and text is escaped.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, Namespace, ParseOpts, QualName, local_name, ns, parse_document};
use quick_xml::escape::{escape, partial_escape};

/// HTML elements that never have content and are written as `<x />`.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Serialize an HTML fragment as XHTML.
///
/// ```
/// use scriptorium::export::xhtml::to_xhtml;
///
/// assert_eq!(to_xhtml("<p>a<br>b&nbsp;c</p>"), "<p>a<br />b\u{a0}c</p>");
/// ```
pub fn to_xhtml(html: &str) -> String {
    let document = format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>");
    let sink = parse_document(FragmentSink::default(), ParseOpts::default())
        .from_utf8()
        .one(document.as_bytes());

    let mut out = String::with_capacity(html.len() + html.len() / 8);
    if let Some(body) = sink.body() {
        for child in body.children.borrow().iter() {
            write_node(&mut out, child, &ns!(html));
        }
    }
    out
}

// === Tree ===

type Handle = Rc<Node>;

struct Node {
    parent: RefCell<Option<Weak<Node>>>,
    children: RefCell<Vec<Handle>>,
    data: NodeData,
}

enum NodeData {
    Document,
    Element {
        name: QualName,
        attrs: RefCell<Vec<Attribute>>,
    },
    Text(RefCell<String>),
    /// Comments, processing instructions and doctypes; never serialized.
    Other,
}

impl Node {
    fn new(data: NodeData) -> Handle {
        Rc::new(Node {
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            data,
        })
    }

    fn text(text: &str) -> Handle {
        Node::new(NodeData::Text(RefCell::new(text.to_string())))
    }

    fn is_element(&self, local: &str) -> bool {
        matches!(&self.data, NodeData::Element { name, .. } if &*name.local == local)
    }

    fn parent(&self) -> Option<Handle> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }
}

fn detach(node: &Handle) {
    let parent = node.parent.borrow_mut().take().and_then(|weak| weak.upgrade());
    if let Some(parent) = parent {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
}

fn append_node(parent: &Handle, child: Handle) {
    detach(&child);
    *child.parent.borrow_mut() = Some(Rc::downgrade(parent));
    parent.children.borrow_mut().push(child);
}

fn append_text(parent: &Handle, text: &str) {
    {
        let children = parent.children.borrow();
        if let Some(last) = children.last()
            && let NodeData::Text(existing) = &last.data
        {
            existing.borrow_mut().push_str(text);
            return;
        }
    }
    append_node(parent, Node::text(text));
}

/// html5ever sink building a reference-counted tree of the parsed document.
struct FragmentSink {
    document: Handle,
}

impl Default for FragmentSink {
    fn default() -> Self {
        Self {
            document: Node::new(NodeData::Document),
        }
    }
}

impl FragmentSink {
    fn body(&self) -> Option<Handle> {
        let html = find_child(&self.document, "html")?;
        find_child(&html, "body")
    }
}

fn find_child(parent: &Handle, local: &str) -> Option<Handle> {
    parent
        .children
        .borrow()
        .iter()
        .find(|child| child.is_element(local))
        .cloned()
}

impl TreeSink for FragmentSink {
    type Handle = Handle;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, _msg: std::borrow::Cow<'static, str>) {
        // malformed editor markup is repaired, not reported
    }

    fn get_document(&self) -> Self::Handle {
        Rc::clone(&self.document)
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: ns!(),
            local: local_name!(""),
        };
        match &target.data {
            NodeData::Element { name, .. } => name,
            _ => &EMPTY,
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        Node::new(NodeData::Element {
            name,
            attrs: RefCell::new(attrs),
        })
    }

    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        Node::new(NodeData::Other)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        Node::new(NodeData::Other)
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => append_node(parent, node),
            NodeOrText::AppendText(text) => append_text(parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if element.parent().is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        Rc::clone(target)
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let Some(parent) = sibling.parent() else {
            return;
        };
        let node = match new_node {
            NodeOrText::AppendNode(node) => {
                detach(&node);
                node
            }
            NodeOrText::AppendText(text) => {
                let children = parent.children.borrow();
                let index = children.iter().position(|c| Rc::ptr_eq(c, sibling));
                if let Some(index) = index
                    && index > 0
                    && let NodeData::Text(previous) = &children[index - 1].data
                {
                    previous.borrow_mut().push_str(&text);
                    return;
                }
                Node::text(&text)
            }
        };
        let mut children = parent.children.borrow_mut();
        let index = children
            .iter()
            .position(|c| Rc::ptr_eq(c, sibling))
            .unwrap_or(children.len());
        *node.parent.borrow_mut() = Some(Rc::downgrade(&parent));
        children.insert(index, node);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        if let NodeData::Element { attrs: existing, .. } = &target.data {
            let mut existing = existing.borrow_mut();
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        detach(target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children = std::mem::take(&mut *node.children.borrow_mut());
        let mut adopted = new_parent.children.borrow_mut();
        for child in children {
            *child.parent.borrow_mut() = Some(Rc::downgrade(new_parent));
            adopted.push(child);
        }
    }
}

// === Serialization ===

fn write_node(out: &mut String, node: &Node, parent_ns: &Namespace) {
    match &node.data {
        NodeData::Text(text) => {
            let text = text.borrow();
            let clean: String = text.chars().filter(|&c| is_xml_char(c)).collect();
            out.push_str(&partial_escape(clean.as_str()));
        }
        NodeData::Element { name, attrs } => {
            write_element(out, node, name, &attrs.borrow(), parent_ns);
        }
        NodeData::Document | NodeData::Other => {}
    }
}

fn write_element(
    out: &mut String,
    node: &Node,
    name: &QualName,
    attrs: &[Attribute],
    parent_ns: &Namespace,
) {
    let local = &*name.local;
    out.push('<');
    out.push_str(local);
    if name.ns != *parent_ns {
        out.push_str(" xmlns=\"");
        out.push_str(&name.ns);
        out.push('"');
    }

    let mut needs_xlink = false;
    for attr in attrs {
        let attr_name = if attr.name.ns == ns!() {
            attr.name.local.to_string()
        } else if attr.name.ns == ns!(xml) {
            format!("xml:{}", attr.name.local)
        } else if &*attr.name.ns == XLINK_NS {
            needs_xlink = true;
            format!("xlink:{}", attr.name.local)
        } else {
            // xmlns declarations are regenerated from element namespaces
            continue;
        };
        if !is_xml_name(&attr_name) {
            continue;
        }
        let value: String = attr.value.chars().filter(|&c| is_xml_char(c)).collect();
        out.push(' ');
        out.push_str(&attr_name);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if needs_xlink {
        out.push_str(" xmlns:xlink=\"");
        out.push_str(XLINK_NS);
        out.push('"');
    }

    let children = node.children.borrow();
    let is_html = name.ns == ns!(html);
    if children.is_empty() && (!is_html || VOID_ELEMENTS.contains(&local)) {
        out.push_str(" />");
        return;
    }
    out.push('>');
    for child in children.iter() {
        write_node(out, child, &name.ns);
    }
    out.push_str("</");
    out.push_str(local);
    out.push('>');
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::Reader;
    use quick_xml::events::Event;

    /// Read `xhtml` back as XML, returning the decoded text content.
    fn read_back(xhtml: &str) -> String {
        let wrapped = format!("<body>{xhtml}</body>");
        let mut reader = Reader::from_str(&wrapped);
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Text(t) => text.push_str(&t.decode().unwrap()),
                Event::GeneralRef(r) => {
                    let reference = format!("&{};", r.decode().unwrap());
                    text.push_str(&quick_xml::escape::unescape(&reference).unwrap());
                }
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(depth, 0);
        text
    }

    #[test]
    fn test_void_elements_self_closed() {
        assert_eq!(
            to_xhtml(r#"<img src="a.png" alt="x"><hr class="scene-break" />"#),
            r#"<img src="a.png" alt="x" /><hr class="scene-break" />"#
        );
        assert_eq!(to_xhtml("<br/>"), "<br />");
    }

    #[test]
    fn test_non_void_tags_keep_end_tags() {
        assert_eq!(to_xhtml("<p></p>"), "<p></p>");
        assert_eq!(to_xhtml("<b>bold</b>"), "<b>bold</b>");
    }

    #[test]
    fn test_accented_entities_decode() {
        let xhtml = to_xhtml("<p>&Eacute;mile &oacute; caf&eacute; &aring;</p>");
        assert_eq!(xhtml, "<p>\u{c9}mile \u{f3} caf\u{e9} \u{e5}</p>");
        assert_eq!(read_back(&xhtml), "\u{c9}mile \u{f3} caf\u{e9} \u{e5}");
    }

    #[test]
    fn test_entities() {
        assert_eq!(to_xhtml("&amp;&lt;&mdash;&hellip;"), "&amp;&lt;\u{2014}\u{2026}");
        assert_eq!(to_xhtml("&#8617;"), "\u{21a9}");
        // unknown names stay literal text
        assert_eq!(to_xhtml("&bogus;"), "&amp;bogus;");
        assert_eq!(read_back(&to_xhtml("&bogus;")), "&bogus;");
    }

    #[test]
    fn test_unquoted_attributes_are_quoted() {
        let xhtml = to_xhtml("<p><img src=a.png alt=x></p>");
        assert_eq!(xhtml, r#"<p><img src="a.png" alt="x" /></p>"#);
        read_back(&xhtml);
    }

    #[test]
    fn test_attribute_values_escaped() {
        let xhtml = to_xhtml(r#"<a href='?a=1&b=2' title='say "hi"'>x</a>"#);
        assert_eq!(
            xhtml,
            r#"<a href="?a=1&amp;b=2" title="say &quot;hi&quot;">x</a>"#
        );
    }

    #[test]
    fn test_unclosed_markup_is_repaired() {
        let xhtml = to_xhtml("<p>one<p>two <em>three");
        assert_eq!(xhtml, "<p>one</p><p>two <em>three</em></p>");
        assert_eq!(read_back(&xhtml), "onetwo three");
    }

    #[test]
    fn test_epub_type_and_svg_survive() {
        let xhtml = to_xhtml(
            r##"<a href="#fn-1" epub:type="noteref">1</a><svg viewBox="0 0 1 1"><use xlink:href="#c"></use></svg>"##,
        );
        assert!(xhtml.starts_with(r##"<a href="#fn-1" epub:type="noteref">1</a>"##));
        assert!(xhtml.contains(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1 1">"#));
        assert!(xhtml.contains(
            r##"<use xlink:href="#c" xmlns:xlink="http://www.w3.org/1999/xlink" />"##
        ));
    }

    #[test]
    fn test_comments_and_control_chars_dropped() {
        assert_eq!(to_xhtml("a<!-- note -->b\u{1}c"), "abc");
    }

    #[test]
    fn test_idempotent() {
        let once = to_xhtml("<p>a<br>&nbsp;<img src=x></p>");
        assert_eq!(to_xhtml(&once), once);
    }
}
