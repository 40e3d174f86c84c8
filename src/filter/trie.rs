//! Compiled filter trie
//!
//! The normalized rule list compiles into a forest of ordered decision
//! tables grouped by identity class. The hot path walks the buckets in a
//! fixed order:
//!
//! 1. user+keyword (exact), user+keyword (substring)
//! 2. user (exact), user (substring)
//! 3. keyword (exact), keyword (substring)
//! 4. all authenticated users
//! 5. source IP (exact), source IP (substring)
//! 6. all connections
//!
//! Each terminal axis (dst-IP, SNI, CN, HTTP Host, HTTP URI) holds an
//! exact list and a substring list in insertion order; the all-sites
//! wildcard entry is always the last element of its list. Destination-IP
//! entries carry a nested port table with the same discipline.
//!
//! Adding a rule for an already-present key merges into the existing
//! node: rules below the node's current precedence are dropped, otherwise
//! the action bit is OR-ed in, the log bitmap merges, and the precedence
//! rises. Once built the trie is never mutated again.

use crate::filter::rule::{ActionMask, Axis, FilterRule, LogMask, Matcher};

/// The `(action_mask, log_mask, precedence)` triple returned to the
/// connection state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterVerdict {
    pub actions: ActionMask,
    pub log: LogMask,
    pub precedence: u8,
}

impl FilterVerdict {
    fn absorb(&mut self, rule: &FilterRule) {
        if rule.precedence < self.precedence {
            return;
        }
        self.precedence = rule.precedence;
        self.actions.insert(rule.action);
        self.log.merge(rule.log);
    }

    fn non_empty(self) -> Option<FilterVerdict> {
        if self.actions.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PortNode {
    pub(crate) port: String,
    pub(crate) wildcard: bool,
    pub(crate) verdict: FilterVerdict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PortTable {
    pub(crate) exact: Vec<PortNode>,
    pub(crate) substr: Vec<PortNode>,
}

impl PortTable {
    fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.substr.is_empty()
    }

    fn upsert(&mut self, matcher: &Matcher) -> &mut PortNode {
        match matcher {
            Matcher::Exact(port) => {
                match self.exact.iter().position(|n| n.port == *port) {
                    Some(pos) => &mut self.exact[pos],
                    None => {
                        self.exact.push(PortNode {
                            port: port.clone(),
                            wildcard: false,
                            verdict: FilterVerdict::default(),
                        });
                        self.exact.last_mut().unwrap()
                    }
                }
            }
            Matcher::Substring(port) => {
                match self.substr.iter().position(|n| !n.wildcard && n.port == *port) {
                    Some(pos) => &mut self.substr[pos],
                    None => {
                        let node = PortNode {
                            port: port.clone(),
                            wildcard: false,
                            verdict: FilterVerdict::default(),
                        };
                        // The all-ports entry stays last
                        let at = if self.substr.last().map_or(false, |n| n.wildcard) {
                            self.substr.len() - 1
                        } else {
                            self.substr.len()
                        };
                        self.substr.insert(at, node);
                        &mut self.substr[at]
                    }
                }
            }
            Matcher::Any => {
                match self.substr.iter().position(|n| n.wildcard) {
                    Some(pos) => &mut self.substr[pos],
                    None => {
                        self.substr.push(PortNode {
                            port: String::new(),
                            wildcard: true,
                            verdict: FilterVerdict::default(),
                        });
                        self.substr.last_mut().unwrap()
                    }
                }
            }
        }
    }

    fn lookup(&self, port: &str) -> Option<FilterVerdict> {
        let node = self
            .exact
            .iter()
            .find(|n| n.port == port)
            .or_else(|| self.substr.iter().find(|n| n.wildcard || port.starts_with(n.port.as_str())))?;
        node.verdict.non_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SiteNode {
    pub(crate) site: String,
    pub(crate) wildcard: bool,
    pub(crate) verdict: FilterVerdict,
    pub(crate) ports: PortTable,
}

impl SiteNode {
    fn new(site: String, wildcard: bool) -> Self {
        SiteNode {
            site,
            wildcard,
            verdict: FilterVerdict::default(),
            ports: PortTable::default(),
        }
    }

    /// Resolve the verdict for this destination entry, consulting the
    /// nested port table when a port is known. A port-specific verdict is
    /// preferred over the site-wide one unless the site-wide verdict has
    /// strictly higher precedence.
    fn verdict_for(&self, port: Option<&str>) -> Option<FilterVerdict> {
        let port_verdict = match port {
            Some(p) if !self.ports.is_empty() => self.ports.lookup(p),
            _ => None,
        };
        let site_verdict = self.verdict.non_empty();
        match (port_verdict, site_verdict) {
            (Some(p), Some(s)) => Some(if s.precedence > p.precedence { s } else { p }),
            (p, s) => p.or(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SiteTable {
    pub(crate) exact: Vec<SiteNode>,
    pub(crate) substr: Vec<SiteNode>,
}

impl SiteTable {
    fn upsert(&mut self, matcher: &Matcher) -> &mut SiteNode {
        match matcher {
            Matcher::Exact(site) => {
                match self.exact.iter().position(|n| n.site == *site) {
                    Some(pos) => &mut self.exact[pos],
                    None => {
                        self.exact.push(SiteNode::new(site.clone(), false));
                        self.exact.last_mut().unwrap()
                    }
                }
            }
            Matcher::Substring(site) => {
                match self.substr.iter().position(|n| !n.wildcard && n.site == *site) {
                    Some(pos) => &mut self.substr[pos],
                    None => {
                        // The all-sites entry stays last
                        let at = if self.substr.last().map_or(false, |n| n.wildcard) {
                            self.substr.len() - 1
                        } else {
                            self.substr.len()
                        };
                        self.substr.insert(at, SiteNode::new(site.clone(), false));
                        &mut self.substr[at]
                    }
                }
            }
            Matcher::Any => {
                match self.substr.iter().position(|n| n.wildcard) {
                    Some(pos) => &mut self.substr[pos],
                    None => {
                        self.substr.push(SiteNode::new(String::new(), true));
                        self.substr.last_mut().unwrap()
                    }
                }
            }
        }
    }

    /// First node accepting the value: exact entries first, then
    /// substring entries in insertion order.
    fn lookup(&self, value: &str, port: Option<&str>) -> Option<FilterVerdict> {
        let node = self
            .exact
            .iter()
            .find(|n| n.site == value)
            .or_else(|| self.substr.iter().find(|n| n.wildcard || value.starts_with(n.site.as_str())))?;
        node.verdict_for(port)
    }
}

/// Per-axis destination tables for one identity node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AxisTables {
    pub(crate) dstip: SiteTable,
    pub(crate) sni: SiteTable,
    pub(crate) cn: SiteTable,
    pub(crate) host: SiteTable,
    pub(crate) uri: SiteTable,
}

impl AxisTables {
    pub(crate) fn table(&self, axis: Axis) -> &SiteTable {
        match axis {
            Axis::DstIp => &self.dstip,
            Axis::Sni => &self.sni,
            Axis::Cn => &self.cn,
            Axis::Host => &self.host,
            Axis::Uri => &self.uri,
        }
    }

    fn table_mut(&mut self, axis: Axis) -> &mut SiteTable {
        match axis {
            Axis::DstIp => &mut self.dstip,
            Axis::Sni => &mut self.sni,
            Axis::Cn => &mut self.cn,
            Axis::Host => &mut self.host,
            Axis::Uri => &mut self.uri,
        }
    }

    fn lookup(&self, axis: Axis, value: &str, port: Option<&str>) -> Option<FilterVerdict> {
        self.table(axis).lookup(value, port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeywordNode {
    pub(crate) keyword: Matcher,
    pub(crate) sites: AxisTables,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UserKeywordNode {
    pub(crate) user: Matcher,
    pub(crate) keywords: Vec<KeywordNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UserNode {
    pub(crate) user: Matcher,
    pub(crate) sites: AxisTables,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IpNode {
    pub(crate) ip: Matcher,
    pub(crate) sites: AxisTables,
}

/// Connection identity presented to the trie by the connection state
/// machine: the client address and, when user auth resolved one, the
/// authenticated user and its description keyword.
#[derive(Debug, Clone, Copy)]
pub struct ClientMatch<'a> {
    pub src_ip: &'a str,
    pub user: Option<&'a str>,
    pub keyword: Option<&'a str>,
}

impl<'a> ClientMatch<'a> {
    pub fn anonymous(src_ip: &'a str) -> Self {
        ClientMatch { src_ip, user: None, keyword: None }
    }
}

/// The compiled multi-level decision structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterTrie {
    pub(crate) userkeyword_exact: Vec<UserKeywordNode>,
    pub(crate) userkeyword_substr: Vec<UserKeywordNode>,
    pub(crate) user_exact: Vec<UserNode>,
    pub(crate) user_substr: Vec<UserNode>,
    pub(crate) keyword_exact: Vec<KeywordNode>,
    pub(crate) keyword_substr: Vec<KeywordNode>,
    pub(crate) all_user: AxisTables,
    pub(crate) ip_exact: Vec<IpNode>,
    pub(crate) ip_substr: Vec<IpNode>,
    pub(crate) all: AxisTables,
}

fn upsert_userkeyword<'a>(
    list: &'a mut Vec<UserKeywordNode>,
    user: &Matcher,
) -> &'a mut UserKeywordNode {
    match list.iter().position(|n| n.user == *user) {
        Some(pos) => &mut list[pos],
        None => {
            list.push(UserKeywordNode { user: user.clone(), keywords: Vec::new() });
            list.last_mut().unwrap()
        }
    }
}

fn upsert_keyword<'a>(list: &'a mut Vec<KeywordNode>, keyword: &Matcher) -> &'a mut KeywordNode {
    match list.iter().position(|n| n.keyword == *keyword) {
        Some(pos) => &mut list[pos],
        None => {
            list.push(KeywordNode { keyword: keyword.clone(), sites: AxisTables::default() });
            list.last_mut().unwrap()
        }
    }
}

fn upsert_user<'a>(list: &'a mut Vec<UserNode>, user: &Matcher) -> &'a mut UserNode {
    match list.iter().position(|n| n.user == *user) {
        Some(pos) => &mut list[pos],
        None => {
            list.push(UserNode { user: user.clone(), sites: AxisTables::default() });
            list.last_mut().unwrap()
        }
    }
}

fn upsert_ip<'a>(list: &'a mut Vec<IpNode>, ip: &Matcher) -> &'a mut IpNode {
    match list.iter().position(|n| n.ip == *ip) {
        Some(pos) => &mut list[pos],
        None => {
            list.push(IpNode { ip: ip.clone(), sites: AxisTables::default() });
            list.last_mut().unwrap()
        }
    }
}

impl FilterTrie {
    /// Project a normalized rule list into the compiled trie.
    pub fn build(rules: &[FilterRule]) -> FilterTrie {
        let mut trie = FilterTrie::default();
        for rule in rules {
            trie.add(rule);
        }
        trie
    }

    fn add(&mut self, rule: &FilterRule) {
        let sites: &mut AxisTables = match (&rule.user, &rule.keyword) {
            (Some(user), Some(keyword)) if !user.is_any() => {
                let bucket = if user.is_exact() && keyword.is_exact() {
                    &mut self.userkeyword_exact
                } else {
                    &mut self.userkeyword_substr
                };
                let node = upsert_userkeyword(bucket, user);
                &mut upsert_keyword(&mut node.keywords, keyword).sites
            }
            (Some(user), None) if !user.is_any() => {
                let bucket = if user.is_exact() { &mut self.user_exact } else { &mut self.user_substr };
                &mut upsert_user(bucket, user).sites
            }
            (Some(_), Some(keyword)) => {
                let bucket =
                    if keyword.is_exact() { &mut self.keyword_exact } else { &mut self.keyword_substr };
                &mut upsert_keyword(bucket, keyword).sites
            }
            (Some(_), None) => &mut self.all_user,
            (None, _) => match &rule.src_ip {
                Matcher::Any => &mut self.all,
                ip => {
                    let bucket = if ip.is_exact() { &mut self.ip_exact } else { &mut self.ip_substr };
                    &mut upsert_ip(bucket, ip).sites
                }
            },
        };

        for axis in rule.applies_to.axes() {
            let node = sites.table_mut(axis).upsert(&rule.site);
            if axis == Axis::DstIp {
                if let Some(port) = &rule.port {
                    node.ports.upsert(port).verdict.absorb(rule);
                    continue;
                }
            }
            node.verdict.absorb(rule);
        }
    }

    /// Evaluate one destination axis value for a connection.
    ///
    /// Buckets are walked in their fixed order; across buckets the
    /// verdict with strictly higher precedence wins, so a tie keeps the
    /// earliest match.
    pub fn lookup(
        &self,
        client: &ClientMatch<'_>,
        axis: Axis,
        value: &str,
        port: Option<&str>,
    ) -> Option<FilterVerdict> {
        let mut best: Option<FilterVerdict> = None;
        let mut consider = |candidate: Option<FilterVerdict>| {
            if let Some(candidate) = candidate {
                match best {
                    Some(current) if candidate.precedence <= current.precedence => {}
                    _ => best = Some(candidate),
                }
            }
        };

        if let (Some(user), Some(keyword)) = (client.user, client.keyword) {
            for bucket in [&self.userkeyword_exact, &self.userkeyword_substr] {
                consider(bucket.iter().find(|n| n.user.matches(user)).and_then(|n| {
                    n.keywords
                        .iter()
                        .find(|k| k.keyword.matches(keyword))
                        .and_then(|k| k.sites.lookup(axis, value, port))
                }));
            }
        }
        if let Some(user) = client.user {
            for bucket in [&self.user_exact, &self.user_substr] {
                consider(
                    bucket
                        .iter()
                        .find(|n| n.user.matches(user))
                        .and_then(|n| n.sites.lookup(axis, value, port)),
                );
            }
            if let Some(keyword) = client.keyword {
                for bucket in [&self.keyword_exact, &self.keyword_substr] {
                    consider(
                        bucket
                            .iter()
                            .find(|n| n.keyword.matches(keyword))
                            .and_then(|n| n.sites.lookup(axis, value, port)),
                    );
                }
            }
            consider(self.all_user.lookup(axis, value, port));
        }
        for bucket in [&self.ip_exact, &self.ip_substr] {
            consider(
                bucket
                    .iter()
                    .find(|n| n.ip.matches(client.src_ip))
                    .and_then(|n| n.sites.lookup(axis, value, port)),
            );
        }
        consider(self.all.lookup(axis, value, port));

        best
    }
}
