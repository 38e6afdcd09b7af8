#![forbid(unsafe_code)]

//! Binding path grammar.
//!
//! ```text
//! path     := anchor? segments
//!           | "."            // the local context object
//!           | "." "."+       // the context object N-1 inventories up
//!           | "\"            // the root context object
//! anchor   := "\"            // root inventory
//!           | "."+           // N inventories up
//! segments := segment ("." segment)*
//! segment  := name ("@" tag "[" index "]")?
//! name     := [A-Za-z0-9_-]+
//! tag      := [A-Za-z0-9_-]*
//! ```
//!
//! `Items@index[2]` reads element 2 of the list returned by `Items`. The tag
//! between `@` and `[` is free text for the path author; it does not take
//! part in lookup, so `Items@[2]`, `Items@0[2]` and `Items@index[2]` bind the
//! same slot. Index text that is not a non-negative integer parses as
//! [`IndexSelector::Unparsed`]; dereferencing degrades it to the un-indexed
//! value instead of failing.
//!
//! Every path also has a canonical [`key`](BindingPath::key) with the tags
//! dropped (`Items@[2].Name`). Change notifications are reported in that
//! form, and inventories match tracked paths against it.

use core::fmt;
use core::str::FromStr;

use pathbind_core::BindError;

/// Which inventory's context object a path starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    Local,
    /// `n` inventories up the parent chain.
    Up(usize),
    /// The top of the parent chain.
    Root,
}

impl Anchor {
    /// Text this anchor contributes in front of the segments.
    #[must_use]
    pub fn prefix(self) -> String {
        match self {
            Self::Local => String::new(),
            Self::Up(n) => ".".repeat(n),
            Self::Root => "\\".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexSelector {
    At(usize),
    /// Bracket text that is not an index.
    Unparsed(String),
}

impl fmt::Display for IndexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(i) => write!(f, "{i}"),
            Self::Unparsed(text) => f.write_str(text),
        }
    }
}

/// One member access, optionally indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    name: String,
    tag: String,
    index: Option<IndexSelector>,
}

impl Segment {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text between `@` and `[`, empty when absent.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn index(&self) -> Option<&IndexSelector> {
        self.index.as_ref()
    }

    fn write_key(&self, out: &mut String) {
        out.push_str(&self.name);
        if let Some(index) = &self.index {
            out.push_str("@[");
            out.push_str(&index.to_string());
            out.push(']');
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        match &self.index {
            Some(index) => write!(f, "@{}[{index}]", self.tag),
            None => Ok(()),
        }
    }
}

/// A parsed binding path.
///
/// ```
/// use pathbind_runtime::{Anchor, BindingPath};
///
/// let path = BindingPath::parse("..Items@index[2].Name").unwrap();
/// assert_eq!(path.anchor(), Anchor::Up(2));
/// assert_eq!(path.as_str(), "..Items@index[2].Name");
/// assert_eq!(path.key(), "..Items@[2].Name");
/// assert_eq!(path.relative(), "Items@[2].Name");
/// assert_eq!(path.segments().len(), 2);
///
/// assert!(BindingPath::parse("A..B").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingPath {
    source: String,
    key: String,
    anchor: Anchor,
    relative_start: usize,
    segments: Vec<Segment>,
}

impl BindingPath {
    /// Parse `path`.
    ///
    /// # Errors
    ///
    /// [`BindError::InvalidPath`] for empty input, empty segments, illegal
    /// characters, or a malformed index selector.
    pub fn parse(path: &str) -> Result<Self, BindError> {
        if path.is_empty() {
            return Err(BindError::invalid_path(path, "empty path"));
        }

        let (anchor, rest_start) = if let Some(rest) = path.strip_prefix('\\') {
            if rest.is_empty() {
                return Ok(Self::anchor_only(path, Anchor::Root));
            }
            (Anchor::Root, 1)
        } else {
            let dots = path.bytes().take_while(|&b| b == b'.').count();
            match (dots, dots == path.len()) {
                (0, _) => (Anchor::Local, 0),
                (1, true) => return Ok(Self::anchor_only(path, Anchor::Local)),
                (n, true) => return Ok(Self::anchor_only(path, Anchor::Up(n - 1))),
                (n, false) => (Anchor::Up(n), n),
            }
        };

        let segments = path[rest_start..]
            .split('.')
            .map(|text| parse_segment(path, text))
            .collect::<Result<Vec<_>, _>>()?;

        let mut key = path[..rest_start].to_owned();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                key.push('.');
            }
            segment.write_key(&mut key);
        }

        Ok(Self {
            source: path.to_owned(),
            key,
            anchor,
            relative_start: rest_start,
            segments,
        })
    }

    fn anchor_only(path: &str, anchor: Anchor) -> Self {
        Self {
            source: path.to_owned(),
            key: path.to_owned(),
            anchor,
            relative_start: path.len(),
            segments: Vec::new(),
        }
    }

    /// The path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Canonical form: the anchor followed by the segments with index tags
    /// dropped. Paths that bind the same member share a key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The canonical key with its anchor stripped, as the anchored context's
    /// subject would report it.
    #[must_use]
    pub fn relative(&self) -> &str {
        &self.key[self.relative_start..]
    }

    /// Whether the path names a context object rather than a member.
    #[must_use]
    pub fn is_anchor_only(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether a change reported as `changed` (relative to this path's
    /// anchor) can alter the value at this path.
    ///
    /// `None` is a whole-object change and affects everything. Otherwise the
    /// path must equal `changed` or continue it with `.` or `@`.
    #[must_use]
    pub fn is_affected_by(&self, changed: Option<&str>) -> bool {
        match changed {
            None => true,
            Some(changed) => continues(self.relative(), changed),
        }
    }
}

/// Whether `path` equals `prefix` or descends from it.
pub(crate) fn continues(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('@'),
        None => false,
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn check_chars(path: &str, text: &str) -> Result<(), BindError> {
    match text.chars().find(|c| !is_name_char(*c)) {
        Some(bad) => Err(BindError::invalid_path(
            path,
            format!("invalid character '{bad}'"),
        )),
        None => Ok(()),
    }
}

fn parse_segment(path: &str, text: &str) -> Result<Segment, BindError> {
    if text.is_empty() {
        return Err(BindError::invalid_path(path, "empty segment"));
    }

    let (name, tag, index) = match text.split_once('@') {
        Some((name, selector)) => {
            let Some((tag, bracketed)) = selector.split_once('[') else {
                return Err(BindError::invalid_path(path, "index selector without '['"));
            };
            let Some(inner) = bracketed.strip_suffix(']') else {
                return Err(BindError::invalid_path(path, "unterminated index"));
            };
            if inner.contains(['[', ']', '@']) {
                return Err(BindError::invalid_path(path, "nested index"));
            }
            check_chars(path, tag)?;
            let index = match inner.parse::<usize>() {
                Ok(i) => IndexSelector::At(i),
                Err(_) => IndexSelector::Unparsed(inner.to_owned()),
            };
            (name, tag, Some(index))
        }
        None => (text, "", None),
    };

    if name.is_empty() {
        return Err(BindError::invalid_path(path, "empty member name"));
    }
    check_chars(path, name)?;

    Ok(Segment {
        name: name.to_owned(),
        tag: tag.to_owned(),
        index,
    })
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for BindingPath {
    type Err = BindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(path: &BindingPath) -> Vec<String> {
        path.segments().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn plain_dotted_path() {
        let path = BindingPath::parse("Obj.Obj.I").unwrap();
        assert_eq!(path.anchor(), Anchor::Local);
        assert_eq!(names(&path), vec!["Obj", "Obj", "I"]);
        assert_eq!(path.relative(), "Obj.Obj.I");
        assert_eq!(path.key(), "Obj.Obj.I");
    }

    #[test]
    fn anchors() {
        assert_eq!(BindingPath::parse(".X").unwrap().anchor(), Anchor::Up(1));
        assert_eq!(BindingPath::parse("...X").unwrap().anchor(), Anchor::Up(3));
        assert_eq!(BindingPath::parse("\\X.Y").unwrap().anchor(), Anchor::Root);
        assert_eq!(BindingPath::parse("\\X.Y").unwrap().relative(), "X.Y");
        assert_eq!(BindingPath::parse(".X@i[1]").unwrap().key(), ".X@[1]");
    }

    #[test]
    fn anchor_only_forms() {
        let local = BindingPath::parse(".").unwrap();
        assert!(local.is_anchor_only());
        assert_eq!(local.anchor(), Anchor::Local);

        let up = BindingPath::parse("...").unwrap();
        assert_eq!(up.anchor(), Anchor::Up(2));
        assert!(up.is_anchor_only());
        assert_eq!(up.key(), "...");

        let root = BindingPath::parse("\\").unwrap();
        assert_eq!(root.anchor(), Anchor::Root);
        assert_eq!(root.relative(), "");
    }

    #[test]
    fn index_selectors() {
        let path = BindingPath::parse("Items@index[2].Name").unwrap();
        assert_eq!(path.segments()[0].index(), Some(&IndexSelector::At(2)));
        assert_eq!(path.segments()[0].tag(), "index");
        assert_eq!(path.segments()[1].index(), None);

        let soft = BindingPath::parse("Items@0[x]").unwrap();
        assert_eq!(
            soft.segments()[0].index(),
            Some(&IndexSelector::Unparsed("x".into()))
        );
        assert_eq!(soft.key(), "Items@[x]");
    }

    #[test]
    fn tags_share_one_key() {
        let keys: Vec<String> = ["Items@[1].Label", "Items@0[1].Label", "Items@index[1].Label"]
            .iter()
            .map(|p| BindingPath::parse(p).unwrap().key().to_owned())
            .collect();
        assert_eq!(keys, vec!["Items@[1].Label"; 3]);
    }

    #[test]
    fn malformed_paths() {
        for bad in [
            "",
            "A..B",
            "A.",
            "\\.A",
            "Items@[2",
            "Items@2",
            "Items[2]",
            "Items]",
            "@[1]",
            "A B",
            "A@[1]x",
            "A@[[1]]",
            "A@x y[1]",
        ] {
            let err = BindingPath::parse(bad).unwrap_err();
            assert!(
                matches!(err, BindError::InvalidPath { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn affected_by_prefix_boundaries() {
        let path = BindingPath::parse("Items@index[2].Name").unwrap();
        assert!(path.is_affected_by(None));
        assert!(path.is_affected_by(Some("Items")));
        assert!(path.is_affected_by(Some("Items@[2]")));
        assert!(path.is_affected_by(Some("Items@[2].Name")));
        assert!(!path.is_affected_by(Some("Item")));
        assert!(!path.is_affected_by(Some("Items@[2].NameX")));
        assert!(!path.is_affected_by(Some("Items@[2].Name.Length")));
        assert!(!path.is_affected_by(Some("Items@[20]")));
    }

    fn segment_strategy() -> impl Strategy<Value = (String, String)> {
        (
            "[A-Za-z_][A-Za-z0-9_-]{0,8}",
            proptest::option::of(("[a-z0-9]{0,5}", 0usize..100)),
        )
            .prop_map(|(name, index)| match index {
                Some((tag, i)) => (format!("{name}@{tag}[{i}]"), format!("{name}@[{i}]")),
                None => (name.clone(), name),
            })
    }

    proptest! {
        #[test]
        fn parse_display_roundtrip(
            prefix in prop_oneof![Just(String::new()), Just("\\".to_string()), "\\.{1,3}"],
            segments in proptest::collection::vec(segment_strategy(), 1..5),
        ) {
            let written: Vec<String> = segments.iter().map(|(w, _)| w.clone()).collect();
            let canonical: Vec<String> = segments.iter().map(|(_, c)| c.clone()).collect();
            let text = format!("{prefix}{}", written.join("."));
            let path = BindingPath::parse(&text).unwrap();
            prop_assert_eq!(path.to_string(), text.clone());
            prop_assert_eq!(names(&path), written);
            prop_assert_eq!(path.key(), format!("{prefix}{}", canonical.join(".")));
            prop_assert_eq!(format!("{}{}", path.anchor().prefix(), path.relative()), path.key());
            let reparsed = BindingPath::parse(&path.to_string()).unwrap();
            prop_assert_eq!(reparsed, path);
        }

        #[test]
        fn parse_never_panics(text in "\\PC{0,24}") {
            let _ = BindingPath::parse(&text);
        }
    }
}
