//! Rule data model.
//!
//! # Responsibilities
//! - Hold the raw `origin = TYPE:value` table as loaded
//! - Represent parsed rules as a sum type, one variant per target type
//! - Represent `{n}` target templates and resolve them against a request
//!
//! # Design Decisions
//! - Rules are immutable once parsed
//! - Host parts are stored TLD-first (`a.b.com` → `["com", "b", "a"]`)
//! - Templates keep their source text for diagnostics and serialization

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DispatchError;
use crate::routing::request::RequestData;

/// Raw rule table: origin → target spec, in definition order.
///
/// Inserting an origin that already exists replaces its target in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRuleSet {
    entries: Vec<(String, String)>,
}

impl RawRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, overwriting an earlier definition of the same origin.
    pub fn insert(&mut self, origin: impl Into<String>, target: impl Into<String>) {
        let origin = origin.into();
        let target = target.into();
        match self.entries.iter_mut().find(|(o, _)| *o == origin) {
            Some(entry) => entry.1 = target,
            None => self.entries.push((origin, target)),
        }
    }

    /// Merge another set on top of this one.
    pub fn extend(&mut self, other: RawRuleSet) {
        for (origin, target) in other.entries {
            self.insert(origin, target);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(o, t)| (o.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RawRuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (origin, target) in &self.entries {
            map.serialize_entry(origin, target)?;
        }
        map.end()
    }
}

/// Reads a table entry by entry so definition order survives.
impl<'de> Deserialize<'de> for RawRuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = RawRuleSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a table of origin = \"TYPE:value\" entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawRuleSet, A::Error> {
                let mut set = RawRuleSet::new();
                while let Some((origin, target)) = access.next_entry::<String, String>()? {
                    set.insert(origin, target);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(RulesVisitor)
    }
}

impl<O: Into<String>, T: Into<String>> FromIterator<(O, T)> for RawRuleSet {
    fn from_iter<I: IntoIterator<Item = (O, T)>>(iter: I) -> Self {
        let mut set = RawRuleSet::new();
        for (origin, target) in iter {
            set.insert(origin, target);
        }
        set
    }
}

/// Target type prefix of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetType {
    Static,
    Proxy,
    Redirect,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Static => "STATIC",
            TargetType::Proxy => "PROXY",
            TargetType::Redirect => "REDIRECT",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of a target template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `{n}`: segment `n` (0-based) of the request path.
    Path(usize),
    /// `{-k}`: label `k` (1-based, counted from the left) of the request host.
    Host(usize),
}

/// A target string with `{n}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub(crate) fn new(source: String, segments: Vec<Segment>) -> Self {
        Self { source, segments }
    }

    /// A template with no placeholders.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            segments: vec![Segment::Literal(text.clone())],
            source: text,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_variables(&self) -> bool {
        self.segments.iter().any(|s| !matches!(s, Segment::Literal(_)))
    }

    /// Substitute placeholders with tokens from the matched request.
    pub fn render(&self, data: &RequestData) -> Result<String, DispatchError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Path(n) => {
                    let value = data.path_parts.get(*n).ok_or_else(|| {
                        DispatchError::MissingVariable {
                            placeholder: format!("{{{}}}", n),
                        }
                    })?;
                    out.push_str(value);
                }
                Segment::Host(k) => {
                    let len = data.host_parts.len();
                    let value = (*k >= 1 && *k <= len)
                        .then(|| &data.host_parts[len - *k])
                        .ok_or_else(|| DispatchError::MissingVariable {
                            placeholder: format!("{{-{}}}", k),
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

/// Fields shared by every rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseRule {
    /// Original `origin=target` text.
    pub raw: String,
    pub origin_url: String,
    pub origin_host: String,
    pub origin_path: String,
    /// Host labels, TLD first.
    pub host_parts: Vec<String>,
    pub path_parts: Vec<String>,
    pub has_wildcard: bool,
    /// Host label indices referenced by `{-k}` placeholders.
    pub host_vars: Vec<usize>,
    /// Path segment indices referenced by `{n}` placeholders.
    pub path_vars: Vec<usize>,
    pub target_type: TargetType,
    /// Target spec after the `TYPE:` prefix, unparsed.
    pub target_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticRule {
    #[serde(flatten)]
    pub base: BaseRule,
    /// Absolute filesystem root.
    pub target: Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyTarget {
    pub secure: bool,
    pub host: Template,
    pub port: u16,
    /// Forward `Proxy-*` request headers to this target.
    pub allow_proxy_request_header: bool,
}

impl ProxyTarget {
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRule {
    #[serde(flatten)]
    pub base: BaseRule,
    pub target: Vec<ProxyTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectTarget {
    pub protocol: String,
    pub host: Template,
    pub port: u16,
    /// Always starts with `/`.
    pub path: Template,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectRule {
    #[serde(flatten)]
    pub base: BaseRule,
    pub target: Vec<RedirectTarget>,
}

/// A parsed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Rule {
    Static(StaticRule),
    Proxy(ProxyRule),
    Redirect(RedirectRule),
}

impl Rule {
    pub fn base(&self) -> &BaseRule {
        match self {
            Rule::Static(r) => &r.base,
            Rule::Proxy(r) => &r.base,
            Rule::Redirect(r) => &r.base,
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Rule::Static(_) => TargetType::Static,
            Rule::Proxy(_) => TargetType::Proxy,
            Rule::Redirect(_) => TargetType::Redirect,
        }
    }

    pub fn raw(&self) -> &str {
        &self.base().raw
    }
}
