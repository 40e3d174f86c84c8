//! Filter policy tests
//!
//! End-to-end tests driving the public option-set API: rule parsing,
//! macro expansion, trie compilation, and hot-path evaluation.

use tlswedge::config::OptionSet;
use tlswedge::filter::{
    Axis, ClientMatch, LogChannel, LogState, RuleAction, RuleOutcome,
};

#[test]
fn test_catch_all_divert_everywhere() {
    let mut opts = OptionSet::new();
    opts.set_filter_rule(RuleAction::Divert, "*", 0).unwrap();
    opts.compile_filter();
    let trie = opts.filter.as_ref().unwrap();

    let client = ClientMatch::anonymous("203.0.113.7");
    for axis in Axis::ALL {
        let verdict = trie.lookup(&client, axis, "any-value", None).unwrap();
        assert!(verdict.actions.contains(RuleAction::Divert), "{:?}", axis);
        assert_eq!(verdict.precedence, 0);
    }
}

#[test]
fn test_merged_node_with_log_override() {
    let mut opts = OptionSet::new();
    opts.set_filter_rule(RuleAction::Divert, "from ip 192.168.0.1 to ip 192.168.0.2", 1).unwrap();
    opts.set_filter_rule(
        RuleAction::Split,
        "from ip 192.168.0.1 to ip 192.168.0.2 log connect master cert content pcap mirror",
        2,
    )
    .unwrap();
    opts.set_filter_rule(
        RuleAction::Pass,
        "from ip 192.168.0.1 to ip 192.168.0.2 log !connect !cert !pcap",
        3,
    )
    .unwrap();
    opts.compile_filter();
    let trie = opts.filter.as_ref().unwrap();

    let client = ClientMatch::anonymous("192.168.0.1");
    let verdict = trie.lookup(&client, Axis::DstIp, "192.168.0.2", None).unwrap();
    assert_eq!(verdict.precedence, 2);
    assert!(verdict.actions.contains(RuleAction::Divert));
    assert!(verdict.actions.contains(RuleAction::Split));
    assert!(verdict.actions.contains(RuleAction::Pass));
    assert_eq!(verdict.log.state(LogChannel::Master), LogState::Enable);
    assert_eq!(verdict.log.state(LogChannel::Content), LogState::Enable);
    assert_eq!(verdict.log.state(LogChannel::Mirror), LogState::Enable);
    assert_eq!(verdict.log.state(LogChannel::Connect), LogState::Suppress);
    assert_eq!(verdict.log.state(LogChannel::Cert), LogState::Suppress);
    assert_eq!(verdict.log.state(LogChannel::Pcap), LogState::Suppress);
}

#[test]
fn test_macro_cartesian_expansion() {
    let mut opts = OptionSet::new();
    opts.set_macro("$ips 192.168.0.1 192.168.0.2", 0).unwrap();
    opts.set_macro("$dsts 192.168.0.3 192.168.0.4", 0).unwrap();
    opts.set_macro("$ports 80 443", 0).unwrap();
    opts.set_macro("$logs !master !pcap", 0).unwrap();

    let outcome = opts
        .set_filter_rule(RuleAction::Match, "from ip $ips to ip $dsts port $ports log $logs", 0)
        .unwrap();
    assert_eq!(outcome, RuleOutcome::Expanded(16));
    assert_eq!(opts.rules.len(), 16);

    opts.compile_filter();
    let trie = opts.filter.as_ref().unwrap();
    let client = ClientMatch::anonymous("192.168.0.1");
    for port in ["80", "443"] {
        let verdict = trie.lookup(&client, Axis::DstIp, "192.168.0.3", Some(port)).unwrap();
        assert!(verdict.actions.contains(RuleAction::Match));
        assert_eq!(verdict.log.state(LogChannel::Master), LogState::Suppress);
        assert_eq!(verdict.log.state(LogChannel::Pcap), LogState::Suppress);
    }
    assert!(trie.lookup(&client, Axis::DstIp, "192.168.0.3", Some("22")).is_none());
}

#[test]
fn test_user_rule_rejected_without_userauth() {
    let mut opts = OptionSet::new();
    let err = opts.set_filter_rule(RuleAction::Match, "from user root to sni x", 4).unwrap_err();
    assert!(matches!(err, tlswedge::ProxyError::UserAuthRequired { line: 4 }));
    assert!(opts.rules.is_empty(), "nothing may be added from a rejected rule");

    opts.user_auth = true;
    opts.set_filter_rule(RuleAction::Match, "from user root to sni x", 5).unwrap();
    assert_eq!(opts.rules.len(), 1);
}

#[test]
fn test_precedence_across_identity_classes() {
    let mut opts = OptionSet::new();
    opts.user_auth = true;
    // A user rule outranks an ip rule for the same site
    opts.set_filter_rule(RuleAction::Block, "from ip 10.0.0.1 to sni secret.example", 0).unwrap();
    opts.set_filter_rule(RuleAction::Pass, "from user root to sni secret.example", 0).unwrap();
    opts.compile_filter();
    let trie = opts.filter.as_ref().unwrap();

    let root = ClientMatch { src_ip: "10.0.0.1", user: Some("root"), keyword: None };
    let verdict = trie.lookup(&root, Axis::Sni, "secret.example", None).unwrap();
    assert!(verdict.actions.contains(RuleAction::Pass));
    assert!(!verdict.actions.contains(RuleAction::Block));
    assert_eq!(verdict.precedence, 3);

    // Without the user identity only the ip rule applies
    let anon = ClientMatch::anonymous("10.0.0.1");
    let verdict = trie.lookup(&anon, Axis::Sni, "secret.example", None).unwrap();
    assert!(verdict.actions.contains(RuleAction::Block));
    assert_eq!(verdict.precedence, 1);
}

#[test]
fn test_substring_site_matching() {
    let mut opts = OptionSet::new();
    opts.set_filter_rule(RuleAction::Block, "to sni .tracker.example*", 0).unwrap();
    opts.set_filter_rule(RuleAction::Pass, "to sni *", 0).unwrap();
    opts.compile_filter();
    let trie = opts.filter.as_ref().unwrap();

    let client = ClientMatch::anonymous("198.51.100.3");
    let verdict = trie.lookup(&client, Axis::Sni, ".tracker.example.net", None).unwrap();
    assert!(verdict.actions.contains(RuleAction::Block));
    let verdict = trie.lookup(&client, Axis::Sni, "fine.example", None).unwrap();
    assert!(verdict.actions.contains(RuleAction::Pass));
    assert!(!verdict.actions.contains(RuleAction::Block));
}

#[test]
fn test_rules_survive_compile() {
    // Compiling the trie keeps the normalized rule list intact, so a
    // proxyspec created later still inherits every rule.
    let mut opts = OptionSet::new();
    opts.set_filter_rule(RuleAction::Divert, "*", 0).unwrap();
    opts.compile_filter();
    assert_eq!(opts.rules.len(), 1);

    let copy = opts.clone_for_spec();
    assert_eq!(copy.rules.len(), 1);
    assert!(copy.filter.is_none());
}
