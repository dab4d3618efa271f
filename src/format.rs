//! Classification of HTML elements into semantic formatting flags.
//!
//! The recognized vocabulary is fixed: a tag table (one [`TagRule`] per tag)
//! and a handful of CSS classes. Anything else is an inline container whose
//! only effect comes from its classes.

use phf::phf_map;
use std::collections::BTreeSet;

/// One semantic styling attribute. The discriminant is the stable id used
/// when building style keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FormatFlag {
    Linebreak = 0,
    Bold = 1,
    Italic = 2,
    Underline = 3,
    Strike = 4,
    Insert = 5,
    Delete = 6,
    Link = 7,
    Indent = 8,
    Superscript = 9,
    Subscript = 10,
}

impl FormatFlag {
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            FormatFlag::Linebreak => "linebreak",
            FormatFlag::Bold => "bold",
            FormatFlag::Italic => "italic",
            FormatFlag::Underline => "underlined",
            FormatFlag::Strike => "strike",
            FormatFlag::Insert => "ins",
            FormatFlag::Delete => "del",
            FormatFlag::Link => "link",
            FormatFlag::Indent => "indented",
            FormatFlag::Superscript => "sup",
            FormatFlag::Subscript => "sub",
        }
    }

    /// Insert and Delete mark tracked changes rather than plain styling.
    pub const fn is_change_marker(self) -> bool {
        matches!(self, FormatFlag::Insert | FormatFlag::Delete)
    }
}

/// An ordered set of flags; iteration is always ascending by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FormatSet(BTreeSet<FormatFlag>);

impl FormatSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: FormatFlag) {
        self.0.insert(flag);
    }

    pub fn remove(&mut self, flag: FormatFlag) {
        self.0.remove(&flag);
    }

    pub fn contains(&self, flag: FormatFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = FormatFlag> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &FormatSet) -> FormatSet {
        FormatSet(self.0.union(&other.0).copied().collect())
    }

    pub fn with(&self, flag: FormatFlag) -> FormatSet {
        let mut out = self.clone();
        out.insert(flag);
        out
    }

    pub fn without(&self, flag: FormatFlag) -> FormatSet {
        let mut out = self.clone();
        out.remove(flag);
        out
    }

    /// Canonical cache key: ascending ids joined by `_`.
    pub fn key(&self) -> String {
        self.iter()
            .map(|f| f.id().to_string())
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl FromIterator<FormatFlag> for FormatSet {
    fn from_iter<I: IntoIterator<Item = FormatFlag>>(iter: I) -> Self {
        FormatSet(iter.into_iter().collect())
    }
}

impl Extend<FormatFlag> for FormatSet {
    fn extend<I: IntoIterator<Item = FormatFlag>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

/// Shape of the node an element turns into on the text path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Span,
    LineBreak,
    Link,
    Paragraph,
    /// Contributes no node of its own; children are spliced into the parent.
    Transparent,
    Blockquote,
    List,
    ListItem,
    /// Heading level; 4 covers `h4` to `h6`.
    Heading(u8),
}

/// Boundary a flattened element leaves behind on the spreadsheet path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakAfter {
    None,
    Plain,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRule {
    pub output: OutputKind,
    pub flags: &'static [FormatFlag],
    pub break_after: BreakAfter,
}

const fn rule(output: OutputKind, flags: &'static [FormatFlag], break_after: BreakAfter) -> TagRule {
    TagRule {
        output,
        flags,
        break_after,
    }
}

const SPAN: TagRule = rule(OutputKind::Span, &[], BreakAfter::None);

static TAG_RULES: phf::Map<&'static str, TagRule> = phf_map! {
    "b" => rule(OutputKind::Span, &[FormatFlag::Bold], BreakAfter::None),
    "strong" => rule(OutputKind::Span, &[FormatFlag::Bold], BreakAfter::None),
    "i" => rule(OutputKind::Span, &[FormatFlag::Italic], BreakAfter::None),
    "em" => rule(OutputKind::Span, &[FormatFlag::Italic], BreakAfter::None),
    "s" => rule(OutputKind::Span, &[FormatFlag::Strike], BreakAfter::None),
    "u" => rule(OutputKind::Span, &[FormatFlag::Underline], BreakAfter::None),
    "sub" => rule(OutputKind::Span, &[FormatFlag::Subscript], BreakAfter::None),
    "sup" => rule(OutputKind::Span, &[FormatFlag::Superscript], BreakAfter::None),
    "del" => rule(OutputKind::Span, &[FormatFlag::Delete], BreakAfter::None),
    "ins" => rule(OutputKind::Span, &[FormatFlag::Insert], BreakAfter::None),
    "span" => SPAN,
    "br" => rule(OutputKind::LineBreak, &[], BreakAfter::Plain),
    "a" => rule(OutputKind::Link, &[FormatFlag::Link], BreakAfter::None),
    "p" => rule(OutputKind::Paragraph, &[], BreakAfter::Plain),
    "div" => rule(OutputKind::Transparent, &[], BreakAfter::Plain),
    "blockquote" => rule(OutputKind::Blockquote, &[], BreakAfter::Plain),
    "ul" => rule(OutputKind::List, &[FormatFlag::Indent], BreakAfter::None),
    "ol" => rule(OutputKind::List, &[FormatFlag::Indent], BreakAfter::None),
    "li" => rule(OutputKind::ListItem, &[], BreakAfter::Plain),
    "h1" => rule(OutputKind::Heading(1), &[FormatFlag::Bold], BreakAfter::Bold),
    "h2" => rule(OutputKind::Heading(2), &[FormatFlag::Bold], BreakAfter::Bold),
    "h3" => rule(OutputKind::Heading(3), &[FormatFlag::Bold], BreakAfter::Bold),
    "h4" => rule(OutputKind::Heading(4), &[FormatFlag::Bold], BreakAfter::Bold),
    "h5" => rule(OutputKind::Heading(4), &[FormatFlag::Bold], BreakAfter::Bold),
    "h6" => rule(OutputKind::Heading(4), &[FormatFlag::Bold], BreakAfter::Bold),
};

/// Every tag with a rule of its own.
pub const TAG_VOCABULARY: &[&str] = &[
    "b", "strong", "i", "em", "s", "u", "sub", "sup", "del", "ins", "span", "br", "a", "p", "div",
    "blockquote", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Rule for a lower-cased tag name; unknown tags behave like `span`.
pub fn tag_rule(tag: &str) -> &'static TagRule {
    TAG_RULES.get(tag).unwrap_or(&SPAN)
}

fn class_flag(class: &str) -> Option<FormatFlag> {
    match class {
        "underline" => Some(FormatFlag::Underline),
        "strike" => Some(FormatFlag::Strike),
        "ins" | "inserted" => Some(FormatFlag::Insert),
        "del" | "deleted" => Some(FormatFlag::Delete),
        "superscript" => Some(FormatFlag::Superscript),
        "subscript" => Some(FormatFlag::Subscript),
        _ => None,
    }
}

pub fn is_known_class(class: &str) -> bool {
    class_flag(class).is_some()
}

pub fn class_flags<S: AsRef<str>>(classes: &[S]) -> FormatSet {
    classes.iter().filter_map(|c| class_flag(c.as_ref())).collect()
}

/// Flags an element introduces: those of its tag plus those of its classes.
pub fn classify<S: AsRef<str>>(tag: &str, classes: &[S]) -> FormatSet {
    let mut out = class_flags(classes);
    out.extend(tag_rule(tag).flags.iter().copied());
    out
}

/// Formatting active at some point of a descent, including the link target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatContext {
    pub flags: FormatSet,
    pub href: Option<String>,
}

impl FormatContext {
    pub fn new(flags: FormatSet) -> Self {
        Self { flags, href: None }
    }

    /// Context for the children of an element; the parent context is untouched.
    pub fn enter<S: AsRef<str>>(&self, tag: &str, classes: &[S], href: Option<String>) -> Self {
        let flags = self.flags.union(&classify(tag, classes));
        let href = match tag_rule(tag).output {
            OutputKind::Link => href.filter(|h| !h.is_empty()).or_else(|| self.href.clone()),
            _ => self.href.clone(),
        };
        Self { flags, href }
    }
}
