//! Filter rule model, rule grammar parser, and macro expander
//!
//! A filter rule arrives as a directive name (`Divert`, `Split`, `Pass`,
//! `Block`, `Match`) plus a value in the rule mini-language:
//!
//! ```text
//! rule        := [ from_clause ] [ to_clause ] [ log_clause ]
//! from_clause := "from" ( "*" | "ip" sel | "user" sel [ "desc" sel ] )
//! to_clause   := "to"   ( "*" | "ip" sel [ "port" sel ]
//!                           | "sni" sel | "cn" sel | "host" sel | "uri" sel )
//! log_clause  := "log" log_token { log_token }
//! ```
//!
//! `$name` tokens are macro references and expand Cartesian-style before
//! translation, so one textual rule can compile to many atomic rules.
//! Selectors are exact matchers unless they end in `*` (prefix substring
//! match); a lone `*` is the wildcard.

use std::collections::HashMap;

use crate::common::{ProxyError, Result};

/// Action named by the rule directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Divert,
    Split,
    Pass,
    Block,
    Match,
}

impl RuleAction {
    /// Map a config directive name to its action, if it is one of the
    /// filter rule directives.
    pub fn from_directive(name: &str) -> Option<Self> {
        match name {
            "Divert" => Some(Self::Divert),
            "Split" => Some(Self::Split),
            "Pass" => Some(Self::Pass),
            "Block" => Some(Self::Block),
            "Match" => Some(Self::Match),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Divert => 1 << 0,
            Self::Split => 1 << 1,
            Self::Pass => 1 << 2,
            Self::Block => 1 << 3,
            Self::Match => 1 << 4,
        }
    }
}

/// Set of actions accumulated on a trie node.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionMask(u8);

impl ActionMask {
    pub fn insert(&mut self, action: RuleAction) {
        self.0 |= action.bit();
    }

    pub fn contains(self, action: RuleAction) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for ActionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(RuleAction, &str); 5] = [
            (RuleAction::Divert, "divert"),
            (RuleAction::Split, "split"),
            (RuleAction::Pass, "pass"),
            (RuleAction::Block, "block"),
            (RuleAction::Match, "match"),
        ];
        let mut first = true;
        for (action, name) in NAMES {
            if self.contains(action) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// Log channels a rule can enable or suppress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChannel {
    Connect = 0,
    Master = 1,
    Cert = 2,
    Content = 3,
    Pcap = 4,
    Mirror = 5,
}

impl LogChannel {
    pub const ALL: [LogChannel; 6] = [
        Self::Connect,
        Self::Master,
        Self::Cert,
        Self::Content,
        Self::Pcap,
        Self::Mirror,
    ];

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "connect" => Some(Self::Connect),
            "master" => Some(Self::Master),
            "cert" => Some(Self::Cert),
            "content" => Some(Self::Content),
            "pcap" => Some(Self::Pcap),
            "mirror" => Some(Self::Mirror),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Per-channel tri-state resolved from a log bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Unspecified,
    Enable,
    Suppress,
}

/// Tri-state log bitmap: each channel is unspecified, enabled, or
/// suppressed. Stored as two parallel bitmaps; a suppressed channel is
/// never also enabled.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct LogMask {
    enabled: u8,
    suppressed: u8,
}

impl LogMask {
    pub fn enable(&mut self, channel: LogChannel) {
        if self.suppressed & channel.bit() == 0 {
            self.enabled |= channel.bit();
        }
    }

    pub fn suppress(&mut self, channel: LogChannel) {
        self.suppressed |= channel.bit();
        self.enabled &= !channel.bit();
    }

    pub fn state(self, channel: LogChannel) -> LogState {
        if self.suppressed & channel.bit() != 0 {
            LogState::Suppress
        } else if self.enabled & channel.bit() != 0 {
            LogState::Enable
        } else {
            LogState::Unspecified
        }
    }

    pub fn is_empty(self) -> bool {
        self.enabled == 0 && self.suppressed == 0
    }

    /// Merge another bitmap into this one: enable beats unspecified,
    /// suppress beats enable on the same channel.
    pub fn merge(&mut self, other: LogMask) {
        self.enabled |= other.enabled;
        self.suppressed |= other.suppressed;
        self.enabled &= !self.suppressed;
    }
}

impl std::fmt::Debug for LogMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [&str; 6] = ["connect", "master", "cert", "content", "pcap", "mirror"];
        let mut first = true;
        for channel in LogChannel::ALL {
            let mark = match self.state(channel) {
                LogState::Unspecified => continue,
                LogState::Enable => "",
                LogState::Suppress => "!",
            };
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}{}", mark, NAMES[channel as usize])?;
            first = false;
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// A selector matcher: wildcard, exact literal, or prefix substring
/// (written with a trailing `*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Any,
    Exact(String),
    Substring(String),
}

impl Matcher {
    /// Build a matcher from a selector token.
    pub fn from_token(token: &str) -> Self {
        if token == "*" {
            Matcher::Any
        } else if let Some(prefix) = token.strip_suffix('*') {
            Matcher::Substring(prefix.to_string())
        } else {
            Matcher::Exact(token.to_string())
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Matcher::Any)
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Matcher::Exact(_))
    }

    /// Test a value against this matcher.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(s) => value == s,
            Matcher::Substring(prefix) => value.starts_with(prefix.as_str()),
        }
    }
}

/// Destination axis a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    DstIp,
    Sni,
    Cn,
    Host,
    Uri,
}

impl Axis {
    pub const ALL: [Axis; 5] = [Axis::DstIp, Axis::Sni, Axis::Cn, Axis::Host, Axis::Uri];
}

/// Set of destination axes.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyTo(u8);

impl ApplyTo {
    /// All five axes; used when the `to` clause is omitted or wildcard.
    pub const ALL: ApplyTo = ApplyTo(0b11111);

    pub fn single(axis: Axis) -> Self {
        let mut s = ApplyTo(0);
        s.insert(axis);
        s
    }

    pub fn insert(&mut self, axis: Axis) {
        self.0 |= 1 << axis as u8;
    }

    pub fn contains(self, axis: Axis) -> bool {
        self.0 & (1 << axis as u8) != 0
    }

    pub fn axes(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl std::fmt::Debug for ApplyTo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut set = f.debug_set();
        for axis in self.axes() {
            set.entry(&axis);
        }
        set.finish()
    }
}

/// One normalized atomic filter rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub action: RuleAction,
    pub log: LogMask,
    /// Source IP matcher; `Any` covers all connections.
    pub src_ip: Matcher,
    /// `Some` only for user-auth scoped rules; `Some(Any)` targets every
    /// authenticated user.
    pub user: Option<Matcher>,
    pub keyword: Option<Matcher>,
    pub site: Matcher,
    pub port: Option<Matcher>,
    pub applies_to: ApplyTo,
    pub precedence: u8,
}

/// Outcome of accepting one rule line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The line compiled to a single atomic rule.
    Added,
    /// Macro expansion compiled the line to this many atomic rules.
    Expanded(usize),
}

/// Named ordered token lists, referenced from rules as `$name`.
///
/// Lookups are case-sensitive; a macro may not be redefined, and macro
/// values may not themselves be macro references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    defs: HashMap<String, Vec<String>>,
}

impl MacroTable {
    /// Define a macro from a `Define` directive value: `$name tok [tok…]`.
    pub fn define(&mut self, value: &str, line: u32) -> Result<()> {
        let mut tokens = value.split_whitespace();
        let name = tokens.next().ok_or_else(|| ProxyError::ConfigSyntax {
            line,
            msg: "macro definition requires a name".to_string(),
        })?;
        if !name.starts_with('$') || name.len() < 2 {
            return Err(ProxyError::ConfigSyntax {
                line,
                msg: format!("macro name '{}' must start with '$'", name),
            });
        }
        let values: Vec<String> = tokens.map(str::to_string).collect();
        if values.is_empty() {
            return Err(ProxyError::ConfigSyntax {
                line,
                msg: format!("macro '{}' requires at least one value", name),
            });
        }
        if let Some(bad) = values.iter().find(|v| v.starts_with('$')) {
            return Err(ProxyError::ConfigSyntax {
                line,
                msg: format!("macro value '{}' may not reference a macro", bad),
            });
        }
        if self.defs.contains_key(name) {
            return Err(ProxyError::MacroRedefined { line, name: name.to_string() });
        }
        log::debug!("Macro {}: {:?}", name, values);
        self.defs.insert(name.to_string(), values);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&[String]> {
        self.defs.get(name).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Parse one rule line, expanding macros, and append the resulting atomic
/// rules to `rules`.
pub(crate) fn set_rule(
    macros: &MacroTable,
    rules: &mut Vec<FilterRule>,
    user_auth: bool,
    action: RuleAction,
    value: &str,
    line: u32,
) -> Result<RuleOutcome> {
    let tokens: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if tokens.is_empty() {
        return Err(ProxyError::ConfigSyntax {
            line,
            msg: "empty filter rule".to_string(),
        });
    }
    let expanded = tokens.iter().any(|t| t.starts_with('$'));

    // Expand first, then translate: no rule from a failing line must be
    // kept, so translate into a scratch list and only then commit.
    let mut flat = Vec::new();
    expand_tokens(macros, tokens, &mut flat, line)?;

    let mut compiled = Vec::with_capacity(flat.len());
    for tokens in &flat {
        compiled.push(translate(tokens, user_auth, action, line)?);
    }
    let count = compiled.len();
    rules.extend(compiled);

    if expanded {
        Ok(RuleOutcome::Expanded(count))
    } else {
        Ok(RuleOutcome::Added)
    }
}

/// Replace macro references with every combination of their values.
///
/// The leftmost reference is substituted first and varies slowest, so a
/// rule with references R1..Rk of widths n1..nk yields n1*…*nk token
/// vectors in deterministic order.
fn expand_tokens(
    macros: &MacroTable,
    tokens: Vec<String>,
    out: &mut Vec<Vec<String>>,
    line: u32,
) -> Result<()> {
    if let Some(i) = tokens.iter().position(|t| t.starts_with('$')) {
        let values = macros
            .lookup(&tokens[i])
            .ok_or_else(|| ProxyError::MacroUndefined { line, name: tokens[i].clone() })?;
        for value in values {
            let mut next = tokens.clone();
            next[i] = value.clone();
            expand_tokens(macros, next, out, line)?;
        }
        Ok(())
    } else {
        out.push(tokens);
        Ok(())
    }
}

/// Compute rule precedence.
///
/// A rule gains precedence for its identity scope (a `from user`/`desc`
/// clause, a concrete user, a keyword), for naming a destination axis
/// (even with a wildcard site), for a port selector, and for a log
/// clause. The source IP matcher and the action contribute nothing; at
/// equal precedence the trie's bucket order decides.
fn precedence_of(
    user: &Option<Matcher>,
    keyword: &Option<Matcher>,
    to_axis: bool,
    port: &Option<Matcher>,
    has_log: bool,
) -> u8 {
    let mut precedence = 0;
    if let Some(user) = user {
        precedence += 1;
        if !user.is_any() {
            precedence += 1;
        }
    }
    if keyword.is_some() {
        precedence += 1;
    }
    if to_axis {
        precedence += 1;
    }
    if port.is_some() {
        precedence += 1;
    }
    if has_log {
        precedence += 1;
    }
    precedence
}

fn expect_token<'a>(tokens: &'a [String], i: usize, line: u32) -> Result<&'a str> {
    tokens.get(i).map(String::as_str).ok_or_else(|| ProxyError::ConfigSyntax {
        line,
        msg: "unexpected end of filter rule".to_string(),
    })
}

/// Translate one fully-expanded token vector into an atomic rule.
fn translate(
    tokens: &[String],
    user_auth: bool,
    action: RuleAction,
    line: u32,
) -> Result<FilterRule> {
    let mut i = 0;
    let next = |i: usize| expect_token(tokens, i, line);

    let mut src_ip = Matcher::Any;
    let mut user = None;
    let mut keyword = None;

    if tokens[i] == "*" {
        i += 1;
    } else if tokens[i] == "from" {
        i += 1;
        match next(i)? {
            "*" => i += 1,
            "ip" => {
                i += 1;
                src_ip = Matcher::from_token(next(i)?);
                i += 1;
            }
            "user" => {
                if !user_auth {
                    return Err(ProxyError::UserAuthRequired { line });
                }
                i += 1;
                user = Some(Matcher::from_token(next(i)?));
                i += 1;
                if i < tokens.len() && tokens[i] == "desc" {
                    i += 1;
                    keyword = Some(Matcher::from_token(next(i)?));
                    i += 1;
                }
            }
            other => {
                return Err(ProxyError::ConfigSyntax {
                    line,
                    msg: format!("unexpected token '{}' in from clause", other),
                })
            }
        }
    }

    let mut site = Matcher::Any;
    let mut port = None;
    let mut applies_to = ApplyTo::ALL;
    let mut to_axis = false;

    if i < tokens.len() && tokens[i] == "to" {
        i += 1;
        match next(i)? {
            "*" => i += 1,
            "ip" => {
                i += 1;
                site = Matcher::from_token(next(i)?);
                i += 1;
                applies_to = ApplyTo::single(Axis::DstIp);
                to_axis = true;
                if i < tokens.len() && tokens[i] == "port" {
                    i += 1;
                    port = Some(Matcher::from_token(next(i)?));
                    i += 1;
                }
            }
            axis @ ("sni" | "cn" | "host" | "uri") => {
                let axis = match axis {
                    "sni" => Axis::Sni,
                    "cn" => Axis::Cn,
                    "host" => Axis::Host,
                    _ => Axis::Uri,
                };
                i += 1;
                site = Matcher::from_token(next(i)?);
                i += 1;
                applies_to = ApplyTo::single(axis);
                to_axis = true;
            }
            other => {
                return Err(ProxyError::ConfigSyntax {
                    line,
                    msg: format!("unexpected token '{}' in to clause", other),
                })
            }
        }
    }

    let mut log = LogMask::default();
    let mut has_log = false;
    if i < tokens.len() && tokens[i] == "log" {
        i += 1;
        if i >= tokens.len() {
            return Err(ProxyError::ConfigSyntax {
                line,
                msg: "log clause requires at least one action".to_string(),
            });
        }
        has_log = true;
        while i < tokens.len() {
            parse_log_token(&tokens[i], &mut log, line)?;
            i += 1;
        }
    }

    if i < tokens.len() {
        return Err(ProxyError::ConfigSyntax {
            line,
            msg: format!("unexpected token '{}' in filter rule", tokens[i]),
        });
    }

    let precedence = precedence_of(&user, &keyword, to_axis, &port, has_log);

    Ok(FilterRule {
        action,
        log,
        src_ip,
        user,
        keyword,
        site,
        port,
        applies_to,
        precedence,
    })
}

fn parse_log_token(token: &str, log: &mut LogMask, line: u32) -> Result<()> {
    let (suppress, name) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    if name == "*" {
        for channel in LogChannel::ALL {
            if suppress {
                log.suppress(channel);
            } else {
                log.enable(channel);
            }
        }
        return Ok(());
    }
    let channel = LogChannel::from_token(name).ok_or_else(|| ProxyError::ConfigSyntax {
        line,
        msg: format!("unknown log action '{}'", token),
    })?;
    if suppress {
        log.suppress(channel);
    } else {
        log.enable(channel);
    }
    Ok(())
}

/// Translate a legacy `PassSite` directive into a Pass rule on the SNI
/// and CN axes: `PassSite site [clientip|user|*] [keyword]`.
pub(crate) fn passsite_rule(user_auth: bool, value: &str, line: u32) -> Result<FilterRule> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() > 3 {
        return Err(ProxyError::ConfigSyntax {
            line,
            msg: format!("invalid PassSite '{}'", value),
        });
    }

    let site = Matcher::from_token(tokens[0]);
    let mut src_ip = Matcher::Any;
    let mut user = None;
    let mut keyword = None;

    if let Some(who) = tokens.get(1) {
        let bare = who.trim_end_matches('*');
        if *who != "*" && bare.parse::<std::net::IpAddr>().is_ok() {
            src_ip = Matcher::from_token(who);
            if tokens.len() > 2 {
                return Err(ProxyError::ConfigSyntax {
                    line,
                    msg: "PassSite keyword requires a user".to_string(),
                });
            }
        } else {
            if !user_auth {
                return Err(ProxyError::UserAuthRequired { line });
            }
            user = Some(Matcher::from_token(who));
            keyword = tokens.get(2).map(|k| Matcher::from_token(k));
        }
    }

    let mut applies_to = ApplyTo::single(Axis::Sni);
    applies_to.insert(Axis::Cn);
    let precedence = precedence_of(&user, &keyword, true, &None, false);

    Ok(FilterRule {
        action: RuleAction::Pass,
        log: LogMask::default(),
        src_ip,
        user,
        keyword,
        site,
        port: None,
        applies_to,
        precedence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(action: RuleAction, value: &str) -> FilterRule {
        parse_with_auth(action, value, false)
    }

    fn parse_with_auth(action: RuleAction, value: &str, user_auth: bool) -> FilterRule {
        let macros = MacroTable::default();
        let mut rules = Vec::new();
        set_rule(&macros, &mut rules, user_auth, action, value, 0).unwrap();
        assert_eq!(rules.len(), 1);
        rules.pop().unwrap()
    }

    #[test]
    fn test_catch_all_forms() {
        for value in ["*", "from *", "to *", "from * to *"] {
            let rule = parse_one(RuleAction::Divert, value);
            assert_eq!(rule.src_ip, Matcher::Any, "{}", value);
            assert_eq!(rule.site, Matcher::Any);
            assert_eq!(rule.applies_to, ApplyTo::ALL);
            assert_eq!(rule.precedence, 0, "{}", value);
        }
    }

    #[test]
    fn test_matcher_kinds() {
        let rule = parse_one(RuleAction::Match, "from ip 192.168.0.1 to ip 192.168.0.*");
        assert_eq!(rule.src_ip, Matcher::Exact("192.168.0.1".to_string()));
        assert_eq!(rule.site, Matcher::Substring("192.168.0.".to_string()));
        assert!(rule.site.matches("192.168.0.77"));
        assert!(!rule.site.matches("10.0.0.1"));
    }

    #[test]
    fn test_axis_inference() {
        let rule = parse_one(RuleAction::Block, "to sni example.com");
        assert_eq!(rule.applies_to, ApplyTo::single(Axis::Sni));

        let rule = parse_one(RuleAction::Block, "to uri /admin*");
        assert_eq!(rule.applies_to, ApplyTo::single(Axis::Uri));

        // Omitted to clause applies to every axis
        let rule = parse_one(RuleAction::Block, "from ip 1.2.3.4");
        assert_eq!(rule.applies_to.axes().count(), 5);
    }

    #[test]
    fn test_port_only_after_to_ip() {
        let rule = parse_one(RuleAction::Match, "to ip 10.0.0.1 port 443");
        assert_eq!(rule.port, Some(Matcher::Exact("443".to_string())));

        let macros = MacroTable::default();
        let mut rules = Vec::new();
        let err = set_rule(
            &macros,
            &mut rules,
            false,
            RuleAction::Match,
            "to sni example.com port 443",
            7,
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::ConfigSyntax { line: 7, .. }));
        assert!(rules.is_empty(), "no rule from a failing line may be kept");
    }

    #[test]
    fn test_user_rule_requires_user_auth() {
        let macros = MacroTable::default();
        let mut rules = Vec::new();
        let err = set_rule(
            &macros,
            &mut rules,
            false,
            RuleAction::Pass,
            "from user root to sni x",
            3,
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::UserAuthRequired { line: 3 }));
        assert!(rules.is_empty());

        // Same rule is accepted once user auth is on
        let rule = parse_with_auth(RuleAction::Pass, "from user root to sni x", true);
        assert_eq!(rule.user, Some(Matcher::Exact("root".to_string())));
    }

    #[test]
    fn test_precedence_formula() {
        // Catch-alls carry no precedence regardless of action
        assert_eq!(parse_one(RuleAction::Divert, "*").precedence, 0);
        assert_eq!(parse_one(RuleAction::Split, "from *").precedence, 0);
        assert_eq!(parse_one(RuleAction::Pass, "from ip *").precedence, 0);

        // Identity scope counts even with a wildcard user
        assert_eq!(parse_with_auth(RuleAction::Block, "from user *", true).precedence, 1);
        assert_eq!(
            parse_with_auth(RuleAction::Match, "from user * desc desc", true).precedence,
            2
        );

        // A log clause counts once; a bare `to *` does not
        assert_eq!(parse_one(RuleAction::Match, "from * to * log *").precedence, 1);

        // Source IP specificity never contributes
        assert_eq!(
            parse_one(RuleAction::Divert, "from ip 192.168.0.1 to ip 192.168.0.2").precedence,
            1
        );
        assert_eq!(
            parse_one(
                RuleAction::Split,
                "from ip 192.168.0.1 to ip 192.168.0.2 log connect master cert content pcap mirror"
            )
            .precedence,
            2
        );

        // Port selectors count, wildcard included
        assert_eq!(
            parse_one(RuleAction::Divert, "from ip 192.168.0.1 to ip 192.168.0.2 port 443")
                .precedence,
            2
        );
        assert_eq!(
            parse_one(RuleAction::Match, "from ip 192.168.0.2 to ip 192.168.0.1 port *")
                .precedence,
            2
        );

        // User and keyword specificity
        assert_eq!(
            parse_with_auth(RuleAction::Divert, "from user root to sni example.com", true)
                .precedence,
            3
        );
        assert_eq!(
            parse_with_auth(RuleAction::Match, "from user daemon to sni *", true).precedence,
            3
        );
        assert_eq!(
            parse_with_auth(
                RuleAction::Divert,
                "from user root desc desc to cn example.com",
                true
            )
            .precedence,
            4
        );
        assert_eq!(
            parse_with_auth(
                RuleAction::Split,
                "from user root desc desc to cn example.com log connect",
                true
            )
            .precedence,
            5
        );
        assert_eq!(
            parse_with_auth(RuleAction::Match, "from user * desc desc to cn example5.com", true)
                .precedence,
            3
        );
    }

    #[test]
    fn test_log_tokens() {
        let rule = parse_one(RuleAction::Match, "log connect !master cert !content");
        assert_eq!(rule.log.state(LogChannel::Connect), LogState::Enable);
        assert_eq!(rule.log.state(LogChannel::Master), LogState::Suppress);
        assert_eq!(rule.log.state(LogChannel::Cert), LogState::Enable);
        assert_eq!(rule.log.state(LogChannel::Content), LogState::Suppress);
        assert_eq!(rule.log.state(LogChannel::Pcap), LogState::Unspecified);

        let rule = parse_one(RuleAction::Match, "log !*");
        for channel in LogChannel::ALL {
            assert_eq!(rule.log.state(channel), LogState::Suppress);
        }

        let macros = MacroTable::default();
        let mut rules = Vec::new();
        assert!(set_rule(&macros, &mut rules, false, RuleAction::Match, "log bogus", 0).is_err());
        assert!(set_rule(&macros, &mut rules, false, RuleAction::Match, "log", 0).is_err());
    }

    #[test]
    fn test_log_merge() {
        let mut a = LogMask::default();
        for channel in LogChannel::ALL {
            a.enable(channel);
        }
        let mut b = LogMask::default();
        b.suppress(LogChannel::Connect);
        b.suppress(LogChannel::Cert);
        b.suppress(LogChannel::Pcap);

        a.merge(b);
        assert_eq!(a.state(LogChannel::Connect), LogState::Suppress);
        assert_eq!(a.state(LogChannel::Master), LogState::Enable);
        assert_eq!(a.state(LogChannel::Cert), LogState::Suppress);
        assert_eq!(a.state(LogChannel::Content), LogState::Enable);
        assert_eq!(a.state(LogChannel::Pcap), LogState::Suppress);
        assert_eq!(a.state(LogChannel::Mirror), LogState::Enable);

        // Suppress stays sticky even if an enable merges in later
        let mut c = LogMask::default();
        c.enable(LogChannel::Connect);
        a.merge(c);
        assert_eq!(a.state(LogChannel::Connect), LogState::Suppress);
    }

    #[test]
    fn test_macro_definition() {
        let mut macros = MacroTable::default();
        macros.define("$ips 192.168.0.1 192.168.0.2", 1).unwrap();
        assert_eq!(macros.lookup("$ips").unwrap().len(), 2);

        // Case-sensitive lookup
        assert!(macros.lookup("$IPS").is_none());

        // Redefinition is an error
        let err = macros.define("$ips 10.0.0.1", 2).unwrap_err();
        assert!(matches!(err, ProxyError::MacroRedefined { line: 2, .. }));

        // Name must start with '$', values may not be references
        assert!(macros.define("ips 10.0.0.1", 3).is_err());
        assert!(macros.define("$empty", 4).is_err());
        assert!(macros.define("$nested $ips", 5).is_err());
    }

    #[test]
    fn test_macro_expansion_product() {
        let mut macros = MacroTable::default();
        macros.define("$ips 192.168.0.1 192.168.0.2", 0).unwrap();
        macros.define("$dsts 192.168.0.3 192.168.0.4", 0).unwrap();
        macros.define("$ports 80 443", 0).unwrap();
        macros.define("$logs !master !pcap", 0).unwrap();

        let mut rules = Vec::new();
        let outcome = set_rule(
            &macros,
            &mut rules,
            false,
            RuleAction::Match,
            "from ip $ips to ip $dsts port $ports log $logs",
            0,
        )
        .unwrap();
        assert_eq!(outcome, RuleOutcome::Expanded(16));
        assert_eq!(rules.len(), 16);

        // Leftmost reference varies slowest
        assert_eq!(rules[0].src_ip, Matcher::Exact("192.168.0.1".to_string()));
        assert_eq!(rules[0].site, Matcher::Exact("192.168.0.3".to_string()));
        assert_eq!(rules[0].port, Some(Matcher::Exact("80".to_string())));
        assert_eq!(rules[0].log.state(LogChannel::Master), LogState::Suppress);
        assert_eq!(rules[1].log.state(LogChannel::Pcap), LogState::Suppress);
        assert_eq!(rules[8].src_ip, Matcher::Exact("192.168.0.2".to_string()));

        for rule in &rules {
            assert_eq!(rule.precedence, 3);
        }
    }

    #[test]
    fn test_undefined_macro() {
        let macros = MacroTable::default();
        let mut rules = Vec::new();
        let err =
            set_rule(&macros, &mut rules, false, RuleAction::Divert, "from ip $nope", 9).unwrap_err();
        assert!(matches!(err, ProxyError::MacroUndefined { line: 9, ref name } if name == "$nope"));
        assert!(rules.is_empty());
    }

    #[test]
    fn test_single_vs_expanded_outcome() {
        let mut macros = MacroTable::default();
        macros.define("$m 192.168.0.1 192.168.0.2", 0).unwrap();
        let mut rules = Vec::new();

        let outcome =
            set_rule(&macros, &mut rules, false, RuleAction::Divert, "from ip 1.2.3.4", 0).unwrap();
        assert_eq!(outcome, RuleOutcome::Added);

        let outcome =
            set_rule(&macros, &mut rules, false, RuleAction::Divert, "from ip $m", 0).unwrap();
        assert_eq!(outcome, RuleOutcome::Expanded(2));
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn test_passsite_forms() {
        // Site only
        let rule = passsite_rule(false, "example.com", 0).unwrap();
        assert_eq!(rule.action, RuleAction::Pass);
        assert!(rule.applies_to.contains(Axis::Sni));
        assert!(rule.applies_to.contains(Axis::Cn));
        assert!(!rule.applies_to.contains(Axis::Host));
        assert_eq!(rule.precedence, 1);

        // Client IP filter
        let rule = passsite_rule(false, "example.com 192.168.0.1", 0).unwrap();
        assert_eq!(rule.src_ip, Matcher::Exact("192.168.0.1".to_string()));

        // User filter requires user auth
        assert!(matches!(
            passsite_rule(false, "example.com root", 4),
            Err(ProxyError::UserAuthRequired { line: 4 })
        ));
        let rule = passsite_rule(true, "example.com root admin-box", 0).unwrap();
        assert_eq!(rule.user, Some(Matcher::Exact("root".to_string())));
        assert_eq!(rule.keyword, Some(Matcher::Exact("admin-box".to_string())));
        assert_eq!(rule.precedence, 4);
    }
}
