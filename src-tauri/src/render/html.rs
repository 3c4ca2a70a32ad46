//! HTML serialization of the display tree.
//! Actions become `data-action` / `data-code` attributes that the webview
//! bridge sends back as click events.

use super::{Node, NodeKind};

pub fn to_html(node: &Node) -> String {
    let mut out = String::with_capacity(4096);
    write_node(&mut out, node);
    out
}

fn write_node(out: &mut String, node: &Node) {
    let tag = node.kind.tag();
    out.push('<');
    out.push_str(tag);

    if let Some(id) = &node.id {
        write_attr(out, "id", id);
    }
    if !node.classes.is_empty() {
        write_attr(out, "class", &node.classes.join(" "));
    }
    if node.kind == NodeKind::Button {
        write_attr(out, "type", "button");
    }
    if let Some(action) = &node.action {
        write_attr(out, "data-action", action.name());
        if let Some(code) = action.code() {
            write_attr(out, "data-code", code);
        }
    }
    for (name, value) in &node.attrs {
        write_attr(out, name, value);
    }
    out.push('>');

    if let Some(text) = &node.text {
        html_escape_into(out, text);
    }
    for child in &node.children {
        write_node(out, child);
    }

    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    html_escape_into(out, value);
    out.push('"');
}

fn html_escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{connectivity_indicator, Connectivity};
    use crate::ui_state::UiAction;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_text_and_attributes() {
        let node = Node::new(NodeKind::Text)
            .attr("title", "a \"quoted\" <b>")
            .text("Tom & Jerry's <tag>");
        assert_eq!(
            to_html(&node),
            "<div title=\"a &quot;quoted&quot; &lt;b&gt;\">Tom &amp; Jerry&#39;s &lt;tag&gt;</div>"
        );
    }

    #[test]
    fn buttons_carry_action_attributes() {
        let node = Node::new(NodeKind::Button)
            .class("option")
            .text("Korean")
            .action(UiAction::SelectLanguage("ko".into()));
        assert_eq!(
            to_html(&node),
            "<button class=\"option\" type=\"button\" data-action=\"select_language\" data-code=\"ko\">Korean</button>"
        );
    }

    #[test]
    fn footer_markup_has_stable_ids() {
        let html = to_html(&connectivity_indicator(Connectivity::Offline));
        assert!(html.starts_with("<footer id=\"connection-footer\">"));
        assert!(html.contains("<span id=\"connection-badge-dot\" class=\"dot offline\"></span>"));
        assert!(html.contains(">Offline mode</div>"));
    }
}
