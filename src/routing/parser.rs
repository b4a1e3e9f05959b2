//! Rule parsing and validation.
//!
//! # Responsibilities
//! - Split `origin = TYPE:value` into host/path tokens and a typed target
//! - Extract `{n}` / `{-k}` placeholders from target templates
//! - Reject malformed rules with a descriptive error (never drop them)
//!
//! # Grammar
//! ```text
//! origin         ::= [*|label][.label]*[/path]*     ('*' leftmost only)
//! STATIC value   ::= /absolute/path[/{n}]*
//! PROXY value    ::= target[,target]*   target ::= [proto://]host[:port]
//! REDIRECT value ::= target[,target]*   target ::= [proto://]host[:port][/path]
//! ```
//!
//! # Design Decisions
//! - Parsing is a pure function of its input: same text, identical rule
//! - The first failure aborts the whole rule set

use crate::error::{ParseErrorKind, RuleError};
use crate::routing::request::{is_ipv4, split_host, split_path};
use crate::routing::rule::{
    BaseRule, ProxyRule, ProxyTarget, RawRuleSet, RedirectRule, RedirectTarget, Rule, Segment,
    StaticRule, TargetType, Template,
};
use crate::routing::sorter::sort_rules;

/// Parse every rule of a raw set and return them in match order.
pub fn parse_rules(raw: &RawRuleSet) -> Result<Vec<Rule>, RuleError> {
    if raw.is_empty() {
        return Err(RuleError::EmptyRuleSet);
    }

    let mut rules = Vec::with_capacity(raw.len());
    for (origin, target) in raw.iter() {
        let rule = parse_rule(origin, target)?;
        tracing::debug!(
            rule = %rule.raw(),
            target_type = %rule.target_type(),
            host_parts = ?rule.base().host_parts,
            "Rule parsed"
        );
        rules.push(rule);
    }

    Ok(sort_rules(rules))
}

/// Parse a single `origin = target` pair.
pub fn parse_rule(origin: &str, target_spec: &str) -> Result<Rule, RuleError> {
    let origin = origin.trim();
    let target_spec = target_spec.trim();
    let raw = format!("{}={}", origin, target_spec);
    let fail = |kind: ParseErrorKind| RuleError::parse(&raw, kind);

    if origin.is_empty() {
        return Err(fail(ParseErrorKind::EmptyOrigin));
    }
    if target_spec.is_empty() {
        return Err(fail(ParseErrorKind::EmptyTarget));
    }

    let (origin_host, origin_path) = split_origin(origin);
    validate_origin_host(&origin_host).map_err(&fail)?;

    let (type_str, value) = target_spec
        .split_once(':')
        .ok_or_else(|| fail(ParseErrorKind::MissingTypeSeparator))?;
    let type_str = type_str.trim();
    let value = value.trim();
    if type_str.is_empty() {
        return Err(fail(ParseErrorKind::EmptyType));
    }
    if value.is_empty() {
        return Err(fail(ParseErrorKind::EmptyValue));
    }
    let target_type = match type_str.to_ascii_uppercase().as_str() {
        "STATIC" => TargetType::Static,
        "PROXY" => TargetType::Proxy,
        "REDIRECT" => TargetType::Redirect,
        _ => return Err(fail(ParseErrorKind::UnknownType(type_str.to_string()))),
    };

    let host_parts = if origin_host == "*" {
        vec!["*".to_string()]
    } else {
        split_host(&origin_host)
    };

    let mut base = BaseRule {
        raw: raw.clone(),
        origin_url: format!("{}{}", origin_host, origin_path),
        has_wildcard: origin_host.contains('*'),
        path_parts: split_path(&origin_path),
        host_parts,
        origin_host,
        origin_path,
        host_vars: Vec::new(),
        path_vars: Vec::new(),
        target_type,
        target_value: value.to_string(),
    };

    let rule = match target_type {
        TargetType::Static => {
            let target = parse_static_target(value, &mut base).map_err(&fail)?;
            Rule::Static(StaticRule { base, target })
        }
        TargetType::Proxy => {
            let target = parse_proxy_targets(value, &mut base).map_err(&fail)?;
            Rule::Proxy(ProxyRule { base, target })
        }
        TargetType::Redirect => {
            let target = parse_redirect_targets(value, &mut base).map_err(&fail)?;
            Rule::Redirect(RedirectRule { base, target })
        }
    };

    validate_rule(&rule)?;
    Ok(rule)
}

/// Post-parse structural checks.
pub fn validate_rule(rule: &Rule) -> Result<(), RuleError> {
    let base = rule.base();
    let invalid = |message: &str| Err(RuleError::validation(&base.raw, message));

    if base.host_parts.is_empty() {
        return invalid("origin host has no labels");
    }
    if !base.origin_path.starts_with('/') {
        return invalid("origin path must start with `/`");
    }
    if base.target_value.is_empty() {
        return invalid("target value is empty");
    }

    match rule {
        Rule::Static(r) => {
            let root = r.target.source();
            if !root.starts_with('/') || root.contains("://") {
                return invalid("static target must be an absolute filesystem path");
            }
        }
        Rule::Proxy(r) => {
            if r.target.is_empty() {
                return invalid("proxy rule has no targets");
            }
            if r.target.iter().any(|t| t.port == 0 || t.host.source().is_empty()) {
                return invalid("proxy target needs a host and a non-zero port");
            }
        }
        Rule::Redirect(r) => {
            if r.target.is_empty() {
                return invalid("redirect rule has no targets");
            }
            if r
                .target
                .iter()
                .any(|t| t.port == 0 || t.host.source().is_empty() || !t.path.source().starts_with('/'))
            {
                return invalid("redirect target needs a host, a non-zero port and an absolute path");
            }
        }
    }
    Ok(())
}

/// Split an origin into a lower-cased host and a path starting with `/`.
fn split_origin(origin: &str) -> (String, String) {
    if origin.starts_with('/') {
        return ("*".to_string(), origin.to_string());
    }
    match origin.find('/') {
        Some(idx) => (origin[..idx].to_ascii_lowercase(), origin[idx..].to_string()),
        None => (origin.to_ascii_lowercase(), "/".to_string()),
    }
}

fn validate_origin_host(host: &str) -> Result<(), ParseErrorKind> {
    if host == "*" || is_ipv4(host) {
        return Ok(());
    }
    for (idx, label) in host.split('.').enumerate() {
        if label == "*" {
            if idx != 0 {
                return Err(ParseErrorKind::MisplacedWildcard(host.to_string()));
            }
            continue;
        }
        if label.contains('*') {
            return Err(ParseErrorKind::MisplacedWildcard(host.to_string()));
        }
        if !is_valid_label(label) {
            return Err(ParseErrorKind::InvalidLabel(label.to_string()));
        }
    }
    Ok(())
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Parse `{n}` placeholders out of `text`, recording indices on the rule.
fn parse_template(text: &str, base: &mut BaseRule) -> Result<Template, ParseErrorKind> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let close = rest[open..]
            .find('}')
            .ok_or_else(|| ParseErrorKind::UnclosedVariable(text.to_string()))?;
        let inner = rest[open + 1..open + close].trim();
        let index: i64 = inner
            .parse()
            .map_err(|_| ParseErrorKind::InvalidVariable(inner.to_string()))?;
        if index < 0 {
            let k = index.unsigned_abs() as usize;
            base.host_vars.push(k);
            segments.push(Segment::Host(k));
        } else {
            let n = index as usize;
            base.path_vars.push(n);
            segments.push(Segment::Path(n));
        }
        rest = &rest[open + close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(Template::new(text.to_string(), segments))
}

fn parse_static_target(value: &str, base: &mut BaseRule) -> Result<Template, ParseErrorKind> {
    if value.contains("://") {
        return Err(ParseErrorKind::StaticScheme(value.to_string()));
    }
    if !value.starts_with('/') {
        return Err(ParseErrorKind::StaticNotAbsolute(value.to_string()));
    }
    parse_template(&normalize_fs_path(value), base)
}

/// Lexically resolve `.` and `..` and collapse repeated slashes.
fn normalize_fs_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    format!("/{}", stack.join("/"))
}

/// A `[proto://]host[:port][/path]` target, split but not yet typed.
struct UrlParts<'a> {
    protocol: Option<String>,
    host: &'a str,
    port: Option<&'a str>,
    path: &'a str,
}

fn split_url_target(entry: &str) -> Result<UrlParts<'_>, ParseErrorKind> {
    let (protocol, rest) = match entry.find("://") {
        Some(idx) => (Some(entry[..idx].to_ascii_lowercase()), &entry[idx + 3..]),
        None => (None, entry),
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let (host, port) = if authority.starts_with('[') {
        let end = authority
            .find(']')
            .ok_or_else(|| ParseErrorKind::InvalidLabel(authority.to_string()))?;
        let after = &authority[end + 1..];
        let port = match after {
            "" => None,
            _ => Some(
                after
                    .strip_prefix(':')
                    .ok_or_else(|| ParseErrorKind::InvalidPort(entry.to_string()))?,
            ),
        };
        (&authority[..=end], port)
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(ParseErrorKind::MissingHost(entry.to_string()));
    }

    Ok(UrlParts {
        protocol,
        host,
        port,
        path,
    })
}

fn parse_port(entry: &str, port: Option<&str>, default: u16) -> Result<u16, ParseErrorKind> {
    match port.map(str::trim) {
        None => Ok(default),
        Some("") => Err(ParseErrorKind::MissingPort(entry.to_string())),
        Some(p) => match p.parse::<u16>() {
            Ok(0) | Err(_) => Err(ParseErrorKind::InvalidPort(entry.to_string())),
            Ok(port) => Ok(port),
        },
    }
}

/// Parse a target host, checking every label once placeholders are filled.
fn parse_target_host(host: &str, base: &mut BaseRule) -> Result<Template, ParseErrorKind> {
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_hexdigit() || b == b':' || b == b'.') {
            return Err(ParseErrorKind::InvalidLabel(host.to_string()));
        }
        return Ok(Template::literal(host));
    }

    let template = parse_template(host, base)?;
    let probe: String = template
        .segments()
        .iter()
        .map(|s| match s {
            Segment::Literal(text) => text.as_str(),
            _ => "x",
        })
        .collect();
    if !is_ipv4(&probe) {
        if let Some(bad) = probe.split('.').find(|label| !is_valid_label(label)) {
            return Err(ParseErrorKind::InvalidLabel(bad.to_string()));
        }
    }
    Ok(template)
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim)
}

fn parse_proxy_targets(value: &str, base: &mut BaseRule) -> Result<Vec<ProxyTarget>, ParseErrorKind> {
    let mut targets = Vec::new();
    for entry in split_list(value) {
        let parts = split_url_target(entry)?;
        let (secure, allow_proxy_request_header) = match parts.protocol.as_deref() {
            None | Some("http") | Some("ws") => (false, false),
            Some("https") | Some("wss") => (true, false),
            Some("proxy") => (false, true),
            Some(other) => return Err(ParseErrorKind::UnsupportedProtocol(other.to_string())),
        };
        if !parts.path.is_empty() && parts.path != "/" {
            return Err(ParseErrorKind::ProxyPath(entry.to_string()));
        }
        let port = parse_port(entry, parts.port, if secure { 443 } else { 80 })?;
        let host = parse_target_host(parts.host, base)?;

        targets.push(ProxyTarget {
            secure,
            host,
            port,
            allow_proxy_request_header,
        });
    }
    Ok(targets)
}

fn parse_redirect_targets(
    value: &str,
    base: &mut BaseRule,
) -> Result<Vec<RedirectTarget>, ParseErrorKind> {
    let mut targets = Vec::new();
    for entry in split_list(value) {
        let parts = split_url_target(entry)?;
        let protocol = parts.protocol.unwrap_or_else(|| "https".to_string());
        let default_port = match protocol.as_str() {
            "https" => 443,
            "http" => 80,
            other => return Err(ParseErrorKind::UnsupportedProtocol(other.to_string())),
        };
        let port = parse_port(entry, parts.port, default_port)?;
        let host = parse_target_host(parts.host, base)?;
        let path = parse_template(if parts.path.is_empty() { "/" } else { parts.path }, base)?;

        targets.push(RedirectTarget {
            protocol,
            host,
            port,
            path,
        });
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_kind(origin: &str, target: &str) -> ParseErrorKind {
        match parse_rule(origin, target) {
            Err(RuleError::Parse { kind, .. }) => kind,
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn parses_proxy_rule() {
        let rule = parse_rule("www.example.com/api", "PROXY:localhost:3000").unwrap();
        let base = rule.base();
        assert_eq!(base.raw, "www.example.com/api=PROXY:localhost:3000");
        assert_eq!(base.origin_host, "www.example.com");
        assert_eq!(base.origin_path, "/api");
        assert_eq!(base.origin_url, "www.example.com/api");
        assert_eq!(base.host_parts, vec!["com", "example", "www"]);
        assert_eq!(base.path_parts, vec!["api"]);
        assert!(!base.has_wildcard);
        assert_eq!(base.target_value, "localhost:3000");

        let Rule::Proxy(proxy) = rule else {
            panic!("expected proxy rule");
        };
        assert_eq!(proxy.target.len(), 1);
        assert_eq!(proxy.target[0].host.source(), "localhost");
        assert_eq!(proxy.target[0].port, 3000);
        assert!(!proxy.target[0].secure);
    }

    #[test]
    fn proxy_protocols_and_default_ports() {
        let Rule::Proxy(rule) =
            parse_rule("a.com", "PROXY:https://one, http://two, three:81, proxy://four").unwrap()
        else {
            panic!("expected proxy rule");
        };
        let summary: Vec<_> = rule
            .target
            .iter()
            .map(|t| (t.host.source(), t.port, t.secure, t.allow_proxy_request_header))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("one", 443, true, false),
                ("two", 80, false, false),
                ("three", 81, false, false),
                ("four", 80, false, true),
            ]
        );
    }

    #[test]
    fn wildcard_origin_and_host_variable() {
        let rule = parse_rule("*.example.com", "PROXY:backend-{-1}:9000").unwrap();
        let base = rule.base();
        assert!(base.has_wildcard);
        assert_eq!(base.host_parts, vec!["com", "example", "*"]);
        assert_eq!(base.host_vars, vec![1]);
        assert!(base.path_vars.is_empty());
    }

    #[test]
    fn path_only_origin_gets_wildcard_host() {
        let rule = parse_rule("/assets", "STATIC:/srv/assets").unwrap();
        assert_eq!(rule.base().origin_host, "*");
        assert_eq!(rule.base().host_parts, vec!["*"]);
        assert!(rule.base().has_wildcard);
    }

    #[test]
    fn static_target_is_normalized() {
        let Rule::Static(rule) = parse_rule("example.com", "STATIC:/srv//www/./site/../{0}/").unwrap() else {
            panic!("expected static rule");
        };
        assert_eq!(rule.target.source(), "/srv/www/{0}");
        assert_eq!(rule.base.path_vars, vec![0]);
    }

    #[test]
    fn redirect_defaults() {
        let Rule::Redirect(rule) = parse_rule("old.com", "REDIRECT:new.com, http://x.com:8080/landing/{0}").unwrap()
        else {
            panic!("expected redirect rule");
        };
        assert_eq!(rule.target[0].protocol, "https");
        assert_eq!(rule.target[0].port, 443);
        assert_eq!(rule.target[0].path.source(), "/");
        assert_eq!(rule.target[1].protocol, "http");
        assert_eq!(rule.target[1].port, 8080);
        assert_eq!(rule.target[1].path.source(), "/landing/{0}");
    }

    #[test]
    fn type_is_case_insensitive() {
        let rule = parse_rule("a.com", "proxy:b:1").unwrap();
        assert_eq!(rule.target_type(), TargetType::Proxy);
    }

    #[test]
    fn ipv4_origin_is_single_part() {
        let rule = parse_rule("10.0.0.5/x", "PROXY:b:1").unwrap();
        assert_eq!(rule.base().host_parts, vec!["10.0.0.5"]);
    }

    #[test]
    fn reparse_is_identical() {
        let a = parse_rule("*.test.com/p", "REDIRECT:https://{-1}.other.com/{0}").unwrap();
        let b = parse_rule("*.test.com/p", "REDIRECT:https://{-1}.other.com/{0}").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_malformed_rules() {
        assert_eq!(parse_kind("", "PROXY:a:1"), ParseErrorKind::EmptyOrigin);
        assert_eq!(parse_kind("a.com", ""), ParseErrorKind::EmptyTarget);
        assert_eq!(parse_kind("a.com", "localhost"), ParseErrorKind::MissingTypeSeparator);
        assert_eq!(parse_kind("a.com", ":x"), ParseErrorKind::EmptyType);
        assert_eq!(parse_kind("a.com", "PROXY:"), ParseErrorKind::EmptyValue);
        assert_eq!(parse_kind("a.com", "FORWARD:x"), ParseErrorKind::UnknownType("FORWARD".into()));
        assert!(matches!(parse_kind("a.com", "STATIC:/srv/{1"), ParseErrorKind::UnclosedVariable(_)));
        assert_eq!(parse_kind("a.com", "STATIC:/srv/{x}"), ParseErrorKind::InvalidVariable("x".into()));
        assert!(matches!(parse_kind("a.com", "STATIC:file:///srv"), ParseErrorKind::StaticScheme(_)));
        assert!(matches!(parse_kind("a.com", "STATIC:srv/www"), ParseErrorKind::StaticNotAbsolute(_)));
        assert!(matches!(parse_kind("a.com", "PROXY:http://:80"), ParseErrorKind::MissingHost(_)));
        assert!(matches!(parse_kind("a.com", "PROXY:backend:"), ParseErrorKind::MissingPort(_)));
        assert!(matches!(parse_kind("a.com", "PROXY:backend:http"), ParseErrorKind::InvalidPort(_)));
        assert!(matches!(parse_kind("a.com", "PROXY:localhost:3000/api"), ParseErrorKind::ProxyPath(_)));
        assert!(matches!(parse_kind("a.com", "PROXY:bad_host!:3000"), ParseErrorKind::InvalidLabel(_)));
        assert!(matches!(parse_kind("a..com", "PROXY:b:1"), ParseErrorKind::InvalidLabel(_)));
        assert!(matches!(parse_kind("a.*.com", "PROXY:b:1"), ParseErrorKind::MisplacedWildcard(_)));
        assert!(matches!(parse_kind("a.com", "PROXY:ftp://b"), ParseErrorKind::UnsupportedProtocol(_)));
        assert!(matches!(parse_kind("a.com", "REDIRECT:ws://b"), ParseErrorKind::UnsupportedProtocol(_)));
    }

    #[test]
    fn empty_rule_set_is_an_error() {
        assert_eq!(parse_rules(&RawRuleSet::new()), Err(RuleError::EmptyRuleSet));
    }

    #[test]
    fn one_bad_rule_fails_the_set() {
        let raw: RawRuleSet = [("a.com", "PROXY:b:1"), ("c.com", "STATIC:relative")]
            .into_iter()
            .collect();
        let err = parse_rules(&raw).unwrap_err();
        assert!(err.to_string().contains("c.com=STATIC:relative"));
    }
}
