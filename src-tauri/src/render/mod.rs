//! Display tree for the phrasebook screen.
//!
//! Rendering is a pure function of the phrase book, a UI state snapshot and
//! the connectivity signal. Every call builds the whole tree; there is no
//! diffing. Interactive nodes carry a [`UiAction`] value and nothing else,
//! the lifecycle dispatcher decides what the action does.

pub mod html;

use serde::Serialize;

use crate::phrases::tokenize::{tokenize, Token};
use crate::phrases::{Phrase, PhraseBook, Style};
use crate::ui_state::{UiAction, UiState};

pub const APP_TITLE: &str = "Phrasebook";
pub const POLITE_LABEL: &str = "Polite";

pub const APP_ID: &str = "app";
pub const POLITE_TOGGLE_ID: &str = "polite-toggle";
pub const SELECTOR_ID: &str = "language-selector";
pub const SELECTOR_BUTTON_ID: &str = "language-button";
pub const SELECTOR_MENU_ID: &str = "language-menu";
pub const PHRASE_LIST_ID: &str = "phrase-list";
pub const FOOTER_ID: &str = "connection-footer";
pub const BADGE_DOT_ID: &str = "connection-badge-dot";
pub const BADGE_TEXT_ID: &str = "connection-badge-text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    App,
    Header,
    Title,
    Button,
    Selector,
    Menu,
    List,
    Card,
    Text,
    Row,
    Chip,
    Separator,
    Divider,
    Label,
    Footer,
    Badge,
    Dot,
}

impl NodeKind {
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::App | NodeKind::Selector | NodeKind::Menu => "div",
            NodeKind::Header => "header",
            NodeKind::Title => "h1",
            NodeKind::Button => "button",
            NodeKind::List => "section",
            NodeKind::Card => "article",
            NodeKind::Text | NodeKind::Row | NodeKind::Divider | NodeKind::Label => "div",
            NodeKind::Badge => "div",
            NodeKind::Chip | NodeKind::Separator | NodeKind::Dot => "span",
            NodeKind::Footer => "footer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<UiAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
            text: None,
            action: None,
            children: Vec::new(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn class_if(self, condition: bool, class: &str) -> Self {
        if condition {
            self.class(class)
        } else {
            self
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.push((name.to_string(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn action(mut self, action: UiAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Depth-first search, self included.
    pub fn find(&self, pred: &dyn Fn(&Node) -> bool) -> Option<&Node> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(pred))
    }

    pub fn find_all<'a>(&'a self, pred: &dyn Fn(&Node) -> bool) -> Vec<&'a Node> {
        let mut found = Vec::new();
        self.collect(pred, &mut found);
        found
    }

    fn collect<'a>(&'a self, pred: &dyn Fn(&Node) -> bool, out: &mut Vec<&'a Node>) {
        if pred(self) {
            out.push(self);
        }
        for child in &self.children {
            child.collect(pred, out);
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Node> {
        self.find(&|node| node.id.as_deref() == Some(id))
    }

    /// Concatenated text of this node and its descendants, space separated.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(text) = &self.text {
            out.push(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }
}

/// Online/offline signal shown in the footer badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Connectivity::Online => "Online",
            Connectivity::Offline => "Offline mode",
        }
    }

    fn class(self) -> &'static str {
        match self {
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
        }
    }
}

/// Full screen: header, phrase list, connectivity footer.
pub fn render_app(book: &PhraseBook, state: &UiState, connectivity: Connectivity) -> Node {
    Node::new(NodeKind::App)
        .id(APP_ID)
        .child(header(book, state))
        .child(phrase_list(book, state))
        .child(connectivity_indicator(connectivity))
}

fn header(book: &PhraseBook, state: &UiState) -> Node {
    let polite = Node::new(NodeKind::Button)
        .id(POLITE_TOGGLE_ID)
        .class("toggle")
        .class_if(state.show_polite, "pressed")
        .attr("aria-pressed", state.show_polite.to_string())
        .text(POLITE_LABEL)
        .action(UiAction::TogglePolite);

    Node::new(NodeKind::Header)
        .child(Node::new(NodeKind::Title).text(APP_TITLE))
        .child(polite)
        .child(language_selector(book, state))
}

fn language_selector(book: &PhraseBook, state: &UiState) -> Node {
    let open = state.dropdown_open;
    let button = Node::new(NodeKind::Button)
        .id(SELECTOR_BUTTON_ID)
        .attr("aria-haspopup", "listbox")
        .attr("aria-expanded", open.to_string())
        .text(book.language_label(&state.target_language))
        .action(UiAction::ToggleDropdown);

    let options = book.languages().iter().map(|language| {
        let selected = language.code == state.target_language;
        Node::new(NodeKind::Button)
            .class("option")
            .class_if(selected, "selected")
            .attr("role", "option")
            .attr("aria-selected", selected.to_string())
            .text(language.label.as_str())
            .action(UiAction::SelectLanguage(language.code.clone()))
    });

    let menu = Node::new(NodeKind::Menu)
        .id(SELECTOR_MENU_ID)
        .class(if open { "open" } else { "hidden" })
        .attr("role", "listbox")
        .children(options);

    Node::new(NodeKind::Selector)
        .id(SELECTOR_ID)
        .child(button)
        .child(menu)
}

fn phrase_list(book: &PhraseBook, state: &UiState) -> Node {
    Node::new(NodeKind::List)
        .id(PHRASE_LIST_ID)
        .children(book.phrases().iter().map(|phrase| phrase_card(phrase, state)))
}

/// One card. When polite mode is on and the phrase has a polite variant in
/// the current language, the polite section comes first, then the English
/// line and the casual rows.
pub fn phrase_card(phrase: &Phrase, state: &UiState) -> Node {
    let lang = state.target_language.as_str();
    let mut card = Node::new(NodeKind::Card)
        .class("card")
        .attr("data-phrase-id", phrase.id.as_str());

    if state.show_polite && phrase.has_polite_variant(lang) {
        card = card
            .child(Node::new(NodeKind::Divider).class("divider"))
            .child(Node::new(NodeKind::Label).class("polite-label").text(POLITE_LABEL))
            .child(pronunciation_row(phrase.pronunciation(lang, Style::Polite), true))
            .child(
                Node::new(NodeKind::Text)
                    .class("target")
                    .class("polite")
                    .text(phrase.text(lang, Style::Polite)),
            );
    }

    card.child(Node::new(NodeKind::Text).class("english").text(phrase.en.as_str()))
        .child(pronunciation_row(phrase.pronunciation(lang, Style::Casual), false))
        .child(
            Node::new(NodeKind::Text)
                .class("target")
                .text(phrase.text(lang, Style::Casual)),
        )
}

fn pronunciation_row(pron: &str, polite: bool) -> Node {
    Node::new(NodeKind::Row)
        .class("pron")
        .class_if(polite, "polite")
        .children(tokenize(pron).into_iter().map(token_node))
}

fn token_node(token: Token) -> Node {
    match token {
        Token::Syllable(text) => Node::new(NodeKind::Chip).class("chip").text(text),
        Token::Separator(text) => Node::new(NodeKind::Separator).class("separator").text(text),
    }
}

/// Footer badge. Also used on its own for connectivity-only updates.
pub fn connectivity_indicator(connectivity: Connectivity) -> Node {
    Node::new(NodeKind::Footer).id(FOOTER_ID).child(
        Node::new(NodeKind::Badge)
            .class("badge")
            .child(
                Node::new(NodeKind::Dot)
                    .id(BADGE_DOT_ID)
                    .class("dot")
                    .class(connectivity.class()),
            )
            .child(
                Node::new(NodeKind::Label)
                    .id(BADGE_TEXT_ID)
                    .text(connectivity.label()),
            ),
    )
}
