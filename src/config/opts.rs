//! Per-scope option set
//!
//! An `OptionSet` is the bag of tunables attached to every scope: the
//! global configuration carries one as the default, and every proxyspec
//! owns an independent deep copy taken at the moment the spec is
//! created. It also owns the filter macro table, the normalized rule
//! list, and (after freeze) the compiled filter trie.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use openssl::dh::Dh;
use openssl::pkey::{Params, PKey, Private};
use openssl::x509::X509;

use crate::common::{ProxyError, Result};
use crate::config::defaults;
use crate::filter::{rule, FilterRule, FilterTrie, MacroTable, RuleAction, RuleOutcome};

/// SSL/TLS protocol versions understood by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Ssl3,
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Parse a protocol name as it appears in the config file.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ssl3" => Some(Self::Ssl3),
            "tls10" | "tls1" => Some(Self::Tls10),
            "tls11" => Some(Self::Tls11),
            "tls12" => Some(Self::Tls12),
            "tls13" => Some(Self::Tls13),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Ssl3 => 1 << 0,
            Self::Tls10 => 1 << 1,
            Self::Tls11 => 1 << 2,
            Self::Tls12 => 1 << 3,
            Self::Tls13 => 1 << 4,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ssl3 => "ssl3",
            Self::Tls10 => "tls10",
            Self::Tls11 => "tls11",
            Self::Tls12 => "tls12",
            Self::Tls13 => "tls13",
        };
        write!(f, "{}", s)
    }
}

/// Per-version disable bitset (`DisableSSLProto`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsVersionSet(u8);

impl TlsVersionSet {
    pub fn insert(&mut self, version: TlsVersion) {
        self.0 |= version.bit();
    }

    pub fn contains(self, version: TlsVersion) -> bool {
        self.0 & version.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Effective TLS version selection: a forced single version excludes the
/// min/max range, so exactly one of the two is ever in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsSelection {
    Forced(TlsVersion),
    Range { min: TlsVersion, max: TlsVersion },
}

/// Certificate and key material referenced by an option set.
///
/// Both the path tokens and the loaded handles are kept: a proxyspec
/// clone shares the handles by refcount but may replace any of them
/// before the TLS forger is initialized.
#[derive(Clone, Default)]
pub struct CertStore {
    pub cacrt_path: Option<PathBuf>,
    pub cakey_path: Option<PathBuf>,
    pub clientcrt_path: Option<PathBuf>,
    pub clientkey_path: Option<PathBuf>,
    pub chain_path: Option<PathBuf>,
    pub dh_path: Option<PathBuf>,
    pub cacrt: Option<Arc<X509>>,
    pub cakey: Option<Arc<PKey<Private>>>,
    pub clientcrt: Option<Arc<X509>>,
    pub clientkey: Option<Arc<PKey<Private>>>,
    pub chain: Vec<Arc<X509>>,
    pub dh: Option<Arc<Dh<Params>>>,
}

impl fmt::Debug for CertStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertStore")
            .field("cacrt", &self.cacrt_path)
            .field("cakey", &self.cakey_path)
            .field("clientcrt", &self.clientcrt_path)
            .field("clientkey", &self.clientkey_path)
            .field("chain", &self.chain_path)
            .field("dh", &self.dh_path)
            .finish()
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| ProxyError::CryptoLoad {
        path: path.display().to_string(),
        msg: e.to_string(),
    })
}

fn crypto_err(path: &Path, e: openssl::error::ErrorStack) -> ProxyError {
    ProxyError::CryptoLoad { path: path.display().to_string(), msg: e.to_string() }
}

/// The per-scope bag of tunables.
#[derive(Debug, Clone)]
pub struct OptionSet {
    /// Divert mode: expose the auxiliary loopback path for an external
    /// inspector; cleared for split-mode specs.
    pub divert: bool,
    pub sslcomp: bool,
    pub passthrough: bool,
    pub deny_ocsp: bool,
    pub validate_proto: bool,
    pub remove_http_accept_encoding: bool,
    pub remove_http_referer: bool,
    pub verify_peer: bool,
    pub allow_wrong_host: bool,
    pub user_auth: bool,
    pub user_auth_url: Option<String>,
    pub user_timeout: u32,
    pub max_http_header_size: u32,

    forced_tls: Option<TlsVersion>,
    min_tls: TlsVersion,
    max_tls: TlsVersion,
    pub disabled_tls: TlsVersionSet,

    pub ciphers: Option<String>,
    pub ciphersuites: Option<String>,
    pub ecdhcurve: Option<String>,
    pub leaf_crl_url: Option<String>,

    pub certs: CertStore,

    pub divert_users: Vec<String>,
    pub pass_users: Vec<String>,

    pub macros: MacroTable,
    pub rules: Vec<FilterRule>,
    pub filter: Option<FilterTrie>,
}

impl Default for OptionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionSet {
    /// Create an option set with the built-in defaults.
    pub fn new() -> Self {
        OptionSet {
            divert: defaults::divert(),
            sslcomp: defaults::sslcomp(),
            passthrough: false,
            deny_ocsp: false,
            validate_proto: false,
            remove_http_accept_encoding: false,
            remove_http_referer: defaults::remove_http_referer(),
            verify_peer: defaults::verify_peer(),
            allow_wrong_host: false,
            user_auth: false,
            user_auth_url: None,
            user_timeout: defaults::user_timeout(),
            max_http_header_size: defaults::max_http_header_size(),
            forced_tls: None,
            min_tls: defaults::min_tls(),
            max_tls: defaults::max_tls(),
            disabled_tls: TlsVersionSet::default(),
            ciphers: None,
            ciphersuites: None,
            ecdhcurve: None,
            leaf_crl_url: None,
            certs: CertStore::default(),
            divert_users: Vec::new(),
            pass_users: Vec::new(),
            macros: MacroTable::default(),
            rules: Vec::new(),
            filter: None,
        }
    }

    /// Deep copy for a new proxyspec: user lists, macro table and rule
    /// list are duplicated so the spec can diverge; crypto handles are
    /// shared by refcount; the compiled trie is never copied, each spec
    /// compiles its own at freeze.
    pub fn clone_for_spec(&self) -> OptionSet {
        let mut copy = self.clone();
        copy.filter = None;
        copy
    }

    // --- TLS protocol selection ---

    /// The effective protocol selection; a forced version wins over the
    /// min/max range by construction.
    pub fn tls_selection(&self) -> TlsSelection {
        match self.forced_tls {
            Some(v) => TlsSelection::Forced(v),
            None => TlsSelection::Range { min: self.min_tls, max: self.max_tls },
        }
    }

    /// Force a single protocol version (`ForceSSLProto`). Forcing twice
    /// is an error.
    pub fn force_tls_proto(&mut self, value: &str, line: u32) -> Result<()> {
        if self.forced_tls.is_some() {
            return Err(ProxyError::ConfigValue {
                line,
                option: "ForceSSLProto".to_string(),
                msg: "protocol already forced".to_string(),
            });
        }
        let version = Self::parse_tls(value, "ForceSSLProto", line)?;
        self.forced_tls = Some(version);
        log::debug!("ForceSSLProto: {}", version);
        Ok(())
    }

    /// Disable one protocol version (`DisableSSLProto`).
    pub fn disable_tls_proto(&mut self, value: &str, line: u32) -> Result<()> {
        let version = Self::parse_tls(value, "DisableSSLProto", line)?;
        self.disabled_tls.insert(version);
        log::debug!("DisableSSLProto: {}", version);
        Ok(())
    }

    pub fn set_min_tls_proto(&mut self, value: &str, line: u32) -> Result<()> {
        self.min_tls = Self::parse_tls(value, "MinSSLProto", line)?;
        log::debug!("MinSSLProto: {}", self.min_tls);
        Ok(())
    }

    pub fn set_max_tls_proto(&mut self, value: &str, line: u32) -> Result<()> {
        self.max_tls = Self::parse_tls(value, "MaxSSLProto", line)?;
        log::debug!("MaxSSLProto: {}", self.max_tls);
        Ok(())
    }

    fn parse_tls(value: &str, option: &str, line: u32) -> Result<TlsVersion> {
        TlsVersion::parse(value).ok_or_else(|| {
            ProxyError::value(line, option, value, "ssl3|tls10|tls11|tls12|tls13")
        })
    }

    // --- numeric options ---

    pub fn set_user_timeout(&mut self, value: &str, line: u32) -> Result<()> {
        let (lo, hi) = defaults::USER_TIMEOUT_RANGE;
        self.user_timeout = parse_ranged(value, "UserTimeout", lo, hi, line)?;
        log::debug!("UserTimeout: {}", self.user_timeout);
        Ok(())
    }

    pub fn set_max_http_header_size(&mut self, value: &str, line: u32) -> Result<()> {
        let (lo, hi) = defaults::MAX_HTTP_HEADER_SIZE_RANGE;
        self.max_http_header_size = parse_ranged(value, "MaxHTTPHeaderSize", lo, hi, line)?;
        log::debug!("MaxHTTPHeaderSize: {}", self.max_http_header_size);
        Ok(())
    }

    // --- certificate material ---

    /// Load the CA certificate used to sign forged leaf certificates.
    ///
    /// The certificate is prepended to the extra chain; a CA key or DH
    /// parameters found in the same PEM file are picked up
    /// opportunistically.
    pub fn set_cacrt(&mut self, path: &str) -> Result<()> {
        let path = PathBuf::from(path);
        let pem = read_pem(&path)?;
        let crt = Arc::new(X509::from_pem(&pem).map_err(|e| crypto_err(&path, e))?);
        self.certs.chain.insert(0, crt.clone());
        self.certs.cacrt = Some(crt);
        if self.certs.cakey.is_none() {
            if let Ok(key) = PKey::private_key_from_pem(&pem) {
                self.certs.cakey = Some(Arc::new(key));
            }
        }
        if self.certs.dh.is_none() {
            if let Ok(dh) = Dh::params_from_pem(&pem) {
                self.certs.dh = Some(Arc::new(dh));
            }
        }
        log::debug!("CACert: {}", path.display());
        self.certs.cacrt_path = Some(path);
        Ok(())
    }

    /// Load the CA private key; a CA certificate in the same PEM file is
    /// picked up opportunistically.
    pub fn set_cakey(&mut self, path: &str) -> Result<()> {
        let path = PathBuf::from(path);
        let pem = read_pem(&path)?;
        let key = PKey::private_key_from_pem(&pem).map_err(|e| crypto_err(&path, e))?;
        self.certs.cakey = Some(Arc::new(key));
        if self.certs.cacrt.is_none() {
            if let Ok(crt) = X509::from_pem(&pem) {
                let crt = Arc::new(crt);
                self.certs.chain.insert(0, crt.clone());
                self.certs.cacrt = Some(crt);
            }
        }
        if self.certs.dh.is_none() {
            if let Ok(dh) = Dh::params_from_pem(&pem) {
                self.certs.dh = Some(Arc::new(dh));
            }
        }
        log::debug!("CAKey: {}", path.display());
        self.certs.cakey_path = Some(path);
        Ok(())
    }

    pub fn set_clientcrt(&mut self, path: &str) -> Result<()> {
        let path = PathBuf::from(path);
        let pem = read_pem(&path)?;
        let crt = X509::from_pem(&pem).map_err(|e| crypto_err(&path, e))?;
        self.certs.clientcrt = Some(Arc::new(crt));
        log::debug!("ClientCert: {}", path.display());
        self.certs.clientcrt_path = Some(path);
        Ok(())
    }

    pub fn set_clientkey(&mut self, path: &str) -> Result<()> {
        let path = PathBuf::from(path);
        let pem = read_pem(&path)?;
        let key = PKey::private_key_from_pem(&pem).map_err(|e| crypto_err(&path, e))?;
        self.certs.clientkey = Some(Arc::new(key));
        log::debug!("ClientKey: {}", path.display());
        self.certs.clientkey_path = Some(path);
        Ok(())
    }

    /// Load an extra certificate chain to present along with forged
    /// leaves.
    pub fn set_chain(&mut self, path: &str) -> Result<()> {
        let path = PathBuf::from(path);
        let pem = read_pem(&path)?;
        let stack = X509::stack_from_pem(&pem).map_err(|e| crypto_err(&path, e))?;
        if stack.is_empty() {
            return Err(ProxyError::CryptoLoad {
                path: path.display().to_string(),
                msg: "no certificates in file".to_string(),
            });
        }
        self.certs.chain.extend(stack.into_iter().map(Arc::new));
        log::debug!("CAChain: {}", path.display());
        self.certs.chain_path = Some(path);
        Ok(())
    }

    pub fn set_dh(&mut self, path: &str) -> Result<()> {
        let path = PathBuf::from(path);
        let pem = read_pem(&path)?;
        let dh = Dh::params_from_pem(&pem).map_err(|e| crypto_err(&path, e))?;
        self.certs.dh = Some(Arc::new(dh));
        log::debug!("DHGroupParams: {}", path.display());
        self.certs.dh_path = Some(path);
        Ok(())
    }

    // --- user lists ---

    /// Parse a DivertUsers/PassUsers list: up to 50 names separated by
    /// commas, spaces or tabs. Replaces any previously configured list.
    pub fn set_userlist(&mut self, which: UserList, value: &str, line: u32) -> Result<()> {
        let name = which.option_name();
        let users: Vec<String> =
            value.split([',', ' ', '\t']).filter(|t| !t.is_empty()).map(str::to_string).collect();
        if users.is_empty() {
            return Err(ProxyError::ConfigValue {
                line,
                option: name.to_string(),
                msg: "requires at least one user".to_string(),
            });
        }
        if users.len() > defaults::MAX_USERS {
            return Err(ProxyError::ConfigValue {
                line,
                option: name.to_string(),
                msg: format!("too many users, max {}", defaults::MAX_USERS),
            });
        }
        log::debug!("{}: {:?}", name, users);
        match which {
            UserList::Divert => self.divert_users = users,
            UserList::Pass => self.pass_users = users,
        }
        Ok(())
    }

    // --- filter state ---

    /// Define a filter macro (`Define $name tok…`).
    pub fn set_macro(&mut self, value: &str, line: u32) -> Result<()> {
        self.macros.define(value, line)
    }

    /// Accept one filter rule line, expanding macro references.
    pub fn set_filter_rule(
        &mut self,
        action: RuleAction,
        value: &str,
        line: u32,
    ) -> Result<RuleOutcome> {
        rule::set_rule(&self.macros, &mut self.rules, self.user_auth, action, value, line)
    }

    /// Accept a legacy `PassSite` directive.
    pub fn set_passsite(&mut self, value: &str, line: u32) -> Result<()> {
        let rule = rule::passsite_rule(self.user_auth, value, line)?;
        self.rules.push(rule);
        Ok(())
    }

    /// Compile the rule list into the filter trie. Called once at
    /// freeze.
    pub fn compile_filter(&mut self) {
        self.filter = Some(FilterTrie::build(&self.rules));
    }

    /// Check cross-field invariants that individual setters cannot see.
    pub fn validate(&self) -> Result<()> {
        if let TlsSelection::Range { min, max } = self.tls_selection() {
            if min > max {
                return Err(ProxyError::ConfigValue {
                    line: 0,
                    option: "MinSSLProto".to_string(),
                    msg: format!("min version {} above max version {}", min, max),
                });
            }
        }
        if !self.user_auth && (!self.divert_users.is_empty() || !self.pass_users.is_empty()) {
            log::warn!("DivertUsers/PassUsers configured without UserAuth");
        }
        Ok(())
    }
}

/// Which of the two ordered user lists an option targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserList {
    Divert,
    Pass,
}

impl UserList {
    fn option_name(self) -> &'static str {
        match self {
            UserList::Divert => "DivertUsers",
            UserList::Pass => "PassUsers",
        }
    }
}

/// Parse an unsigned option value and enforce its accepted range.
pub(crate) fn parse_ranged(value: &str, option: &str, lo: u32, hi: u32, line: u32) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(v) if v >= lo && v <= hi => Ok(v),
        _ => Err(ProxyError::value(line, option, value, &format!("{}-{}", lo, hi))),
    }
}

impl fmt::Display for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.divert { "divert" } else { "split" })?;
        if !self.sslcomp {
            write!(f, "|no sslcomp")?;
        }
        if self.passthrough {
            write!(f, "|passthrough")?;
        }
        if self.deny_ocsp {
            write!(f, "|deny_ocsp")?;
        }
        match self.tls_selection() {
            TlsSelection::Forced(v) => write!(f, "|{}", v)?,
            TlsSelection::Range { min, max } => write!(f, "|>={}|<={}", min, max)?,
        }
        for version in [
            TlsVersion::Ssl3,
            TlsVersion::Tls10,
            TlsVersion::Tls11,
            TlsVersion::Tls12,
            TlsVersion::Tls13,
        ] {
            if self.disabled_tls.contains(version) {
                write!(f, "|no_{}", version)?;
            }
        }
        write!(f, "|{}", self.ciphers.as_deref().unwrap_or("no ciphers"))?;
        write!(f, "|{}", self.ciphersuites.as_deref().unwrap_or("no ciphersuites"))?;
        if self.remove_http_accept_encoding {
            write!(f, "|remove_http_accept_encoding")?;
        }
        if self.remove_http_referer {
            write!(f, "|remove_http_referer")?;
        }
        if self.verify_peer {
            write!(f, "|verify_peer")?;
        }
        if self.allow_wrong_host {
            write!(f, "|allow_wrong_host")?;
        }
        if self.user_auth {
            write!(f, "|user_auth|{}", self.user_timeout)?;
        }
        if self.validate_proto {
            write!(f, "|validate_proto")?;
        }
        write!(f, "|{}", self.max_http_header_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let opts = OptionSet::new();
        assert!(opts.divert);
        assert!(opts.sslcomp);
        assert!(opts.remove_http_referer);
        assert!(opts.verify_peer);
        assert!(!opts.remove_http_accept_encoding);
        assert!(!opts.user_auth);
        assert_eq!(opts.user_timeout, 300);
        assert_eq!(opts.max_http_header_size, 8192);
        assert_eq!(
            opts.tls_selection(),
            TlsSelection::Range { min: TlsVersion::Tls10, max: TlsVersion::Tls13 }
        );
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_numeric_ranges() {
        let mut opts = OptionSet::new();
        opts.set_user_timeout("0", 1).unwrap();
        opts.set_user_timeout("86400", 1).unwrap();
        assert!(opts.set_user_timeout("86401", 1).is_err());
        assert!(opts.set_user_timeout("x", 1).is_err());

        opts.set_max_http_header_size("1024", 1).unwrap();
        opts.set_max_http_header_size("65536", 1).unwrap();
        assert!(opts.set_max_http_header_size("1023", 1).is_err());
        assert!(opts.set_max_http_header_size("65537", 1).is_err());

        // Setting the same value twice is a clean no-op
        opts.set_user_timeout("600", 1).unwrap();
        opts.set_user_timeout("600", 1).unwrap();
        assert_eq!(opts.user_timeout, 600);
    }

    #[test]
    fn test_force_proto_locks() {
        let mut opts = OptionSet::new();
        opts.force_tls_proto("tls12", 1).unwrap();
        assert_eq!(opts.tls_selection(), TlsSelection::Forced(TlsVersion::Tls12));

        let err = opts.force_tls_proto("tls13", 2).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigValue { line: 2, .. }));

        assert!(opts.validate().is_ok(), "forced version replaces the range");
    }

    #[test]
    fn test_min_max_validation() {
        let mut opts = OptionSet::new();
        opts.set_min_tls_proto("tls12", 1).unwrap();
        opts.set_max_tls_proto("tls11", 2).unwrap();
        assert!(opts.validate().is_err());

        opts.set_max_tls_proto("tls12", 3).unwrap();
        assert!(opts.validate().is_ok());

        // tls1 is accepted as an alias for tls10
        opts.set_min_tls_proto("tls1", 4).unwrap();
        assert!(matches!(
            opts.tls_selection(),
            TlsSelection::Range { min: TlsVersion::Tls10, .. }
        ));
    }

    #[test]
    fn test_disable_proto() {
        let mut opts = OptionSet::new();
        opts.disable_tls_proto("ssl3", 1).unwrap();
        opts.disable_tls_proto("tls10", 1).unwrap();
        assert!(opts.disabled_tls.contains(TlsVersion::Ssl3));
        assert!(opts.disabled_tls.contains(TlsVersion::Tls10));
        assert!(!opts.disabled_tls.contains(TlsVersion::Tls12));
        assert!(opts.disable_tls_proto("tls9", 1).is_err());
    }

    #[test]
    fn test_userlists() {
        let mut opts = OptionSet::new();
        opts.set_userlist(UserList::Divert, "root,daemon  www", 1).unwrap();
        assert_eq!(opts.divert_users, vec!["root", "daemon", "www"]);

        // Replaces, not appends
        opts.set_userlist(UserList::Divert, "alice", 2).unwrap();
        assert_eq!(opts.divert_users, vec!["alice"]);

        assert!(opts.set_userlist(UserList::Pass, " , ", 3).is_err());

        let too_many = (0..51).map(|i| format!("u{}", i)).collect::<Vec<_>>().join(",");
        assert!(opts.set_userlist(UserList::Pass, &too_many, 4).is_err());
    }

    #[test]
    fn test_clone_for_spec_is_deep() {
        let mut global = OptionSet::new();
        global.set_macro("$ips 10.0.0.1 10.0.0.2", 0).unwrap();
        global.set_filter_rule(RuleAction::Divert, "from ip $ips", 0).unwrap();
        global.set_userlist(UserList::Pass, "root", 0).unwrap();

        let mut spec = global.clone_for_spec();
        assert_eq!(spec.rules.len(), 2);
        assert!(spec.filter.is_none());

        // Divergence after the clone does not leak back
        spec.set_filter_rule(RuleAction::Block, "*", 0).unwrap();
        spec.set_userlist(UserList::Pass, "alice,bob", 0).unwrap();
        spec.user_timeout = 10;
        assert_eq!(global.rules.len(), 2);
        assert_eq!(global.pass_users, vec!["root"]);
        assert_eq!(global.user_timeout, 300);

        // The copied macro table answers lookups independently
        assert!(spec.set_filter_rule(RuleAction::Match, "to ip $ips", 0).is_ok());
    }

    #[test]
    fn test_crypto_load_failure() {
        let mut opts = OptionSet::new();
        let err = opts.set_cacrt("/nonexistent/ca.pem").unwrap_err();
        assert!(matches!(err, ProxyError::CryptoLoad { .. }));
        assert!(opts.certs.cacrt.is_none(), "no partial state on failure");
        assert!(opts.certs.cacrt_path.is_none());

        // Garbage PEM content fails with the OpenSSL error text
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();
        let err = opts.set_cacrt(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ProxyError::CryptoLoad { .. }));
        assert!(opts.certs.chain.is_empty());
    }

    #[test]
    fn test_display_summary() {
        let opts = OptionSet::new();
        let s = opts.to_string();
        assert!(s.starts_with("divert"));
        assert!(s.contains(">=tls10"));
        assert!(s.contains("<=tls13"));

        let mut opts = OptionSet::new();
        opts.divert = false;
        opts.force_tls_proto("tls13", 0).unwrap();
        let s = opts.to_string();
        assert!(s.starts_with("split"));
        assert!(s.contains("|tls13"));
    }
}
