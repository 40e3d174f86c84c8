//! Global configuration root
//!
//! The `Global` struct owns everything configured at startup: process
//! level settings, log sinks, TLS forging material, the default option
//! set, and the proxyspecs. It is populated from the config file
//! (line/block grammar) and from `key=value` command line overrides,
//! then frozen into an immutable shared root before the first connection
//! is accepted.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::common::{fs as fsutil, ProxyError, Result};
use crate::config::defaults;
use crate::config::opts::{parse_ranged, OptionSet, UserList};
use crate::config::spec::{parse_proxyspecs, ProxySpec};
use crate::filter::RuleAction;

/// A certificate/chain/key combo loaded from a single PEM file.
#[derive(Clone)]
pub struct LeafCert {
    pub crt: Arc<X509>,
    pub key: Arc<PKey<Private>>,
    pub chain: Vec<Arc<X509>>,
}

impl LeafCert {
    /// Load the combo and verify that the certificate matches the key.
    pub fn load(path: &str) -> Result<Self> {
        let pem = fs::read(path).map_err(|e| ProxyError::CryptoLoad {
            path: path.to_string(),
            msg: e.to_string(),
        })?;
        let err = |e: openssl::error::ErrorStack| ProxyError::CryptoLoad {
            path: path.to_string(),
            msg: e.to_string(),
        };
        let crt = X509::from_pem(&pem).map_err(err)?;
        let key = PKey::private_key_from_pem(&pem).map_err(err)?;
        let pubkey = crt.public_key().map_err(err)?;
        if !key.public_eq(&pubkey) {
            return Err(ProxyError::CryptoLoad {
                path: path.to_string(),
                msg: "certificate does not match key".to_string(),
            });
        }
        let chain = X509::stack_from_pem(&pem)
            .map_err(err)?
            .into_iter()
            .skip(1)
            .map(Arc::new)
            .collect();
        Ok(LeafCert { crt: Arc::new(crt), key: Arc::new(key), chain })
    }
}

/// Transient state threaded through config loading: the global split
/// flag from the command line, and the include-recursion guard.
#[derive(Debug, Clone, Default)]
pub struct LoadState {
    pub split: bool,
    include: bool,
}

impl LoadState {
    pub fn new(split: bool) -> Self {
        LoadState { split, include: false }
    }
}

/// The configuration root.
pub struct Global {
    pub conn_idle_timeout: u32,
    pub expired_conn_check_period: u32,
    pub stats_period: u32,
    pub statslog: bool,
    pub detach: bool,
    pub debug: bool,
    pub debug_level: Option<String>,

    pub leafkey_rsabits: u32,
    pub leafkey: Option<Arc<PKey<Private>>>,
    pub leafcertdir: Option<PathBuf>,
    pub defaultleafcert: Option<LeafCert>,
    pub certgendir: Option<PathBuf>,
    pub certgen_writeall: bool,
    pub openssl_engine: Option<String>,

    pub dropuser: Option<String>,
    pub dropgroup: Option<String>,
    pub jaildir: Option<PathBuf>,
    pub pidfile: Option<PathBuf>,
    pub conffile: Option<PathBuf>,

    pub connectlog: Option<PathBuf>,
    pub contentlog: Option<PathBuf>,
    pub contentlog_isdir: bool,
    pub contentlog_isspec: bool,
    pub contentlog_basedir: Option<PathBuf>,
    pub masterkeylog: Option<PathBuf>,
    pub pcaplog: Option<PathBuf>,
    pub pcaplog_isdir: bool,
    pub pcaplog_isspec: bool,
    pub pcaplog_basedir: Option<PathBuf>,
    pub mirrorif: Option<String>,
    pub mirrortarget: Option<String>,
    pub userdb_path: Option<PathBuf>,

    pub opts: OptionSet,
    pub specs: Vec<ProxySpec>,
}

impl Default for Global {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Global")
            .field("conffile", &self.conffile)
            .field("conn_idle_timeout", &self.conn_idle_timeout)
            .field("detach", &self.detach)
            .field("opts", &self.opts)
            .field("specs", &self.specs)
            .finish_non_exhaustive()
    }
}

/// Split a config line into option name and verbatim value.
///
/// The name ends at the first whitespace or separator character; the
/// value is what remains after the separator run, right-trimmed. The
/// value may be empty; each option decides whether that is acceptable.
pub(crate) fn get_name_value(line: &str, sep: char) -> (&str, &str) {
    let is_delim = |c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n' || c == sep;
    let end = line.find(is_delim).unwrap_or(line.len());
    let name = &line[..end];
    let value = line[end..].trim_matches(is_delim);
    (name, value)
}

fn is_yesno(value: &str) -> Option<bool> {
    match value {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

fn check_value_yesno(value: &str, name: &str, line: u32) -> Result<bool> {
    is_yesno(value).ok_or_else(|| ProxyError::value(line, name, value, "yes|no"))
}

/// Sequential reader over the config file lines, tracking line numbers
/// so the proxyspec block parser can keep consuming where the main loop
/// stopped.
struct LineFeed<'a> {
    lines: std::str::Lines<'a>,
    line_num: u32,
}

impl<'a> LineFeed<'a> {
    fn new(content: &'a str) -> Self {
        LineFeed { lines: content.lines(), line_num: 0 }
    }

    fn next(&mut self) -> Option<&'a str> {
        let line = self.lines.next()?;
        self.line_num += 1;
        Some(line)
    }
}

/// Strip leading whitespace; returns `None` for comment and empty lines.
fn significant(line: &str) -> Option<&str> {
    let line = line.trim_start_matches([' ', '\t']);
    match line.chars().next() {
        None | Some('#') | Some(';') | Some('\r') | Some('\n') => None,
        _ => Some(line),
    }
}

impl Global {
    pub fn new() -> Self {
        Global {
            conn_idle_timeout: defaults::conn_idle_timeout(),
            expired_conn_check_period: defaults::expired_conn_check_period(),
            stats_period: defaults::stats_period(),
            statslog: false,
            detach: false,
            debug: false,
            debug_level: None,
            leafkey_rsabits: defaults::leafkey_rsabits(),
            leafkey: None,
            leafcertdir: None,
            defaultleafcert: None,
            certgendir: None,
            certgen_writeall: false,
            openssl_engine: None,
            dropuser: None,
            dropgroup: None,
            jaildir: None,
            pidfile: None,
            conffile: None,
            connectlog: None,
            contentlog: None,
            contentlog_isdir: false,
            contentlog_isspec: false,
            contentlog_basedir: None,
            masterkeylog: None,
            pcaplog: None,
            pcaplog_isdir: false,
            pcaplog_isspec: false,
            pcaplog_basedir: None,
            mirrorif: None,
            mirrortarget: None,
            userdb_path: None,
            opts: OptionSet::new(),
            specs: Vec::new(),
        }
    }

    // --- global queries used by the outer system ---

    /// Whether any proxyspec (eventually) uses SSL/TLS.
    pub fn has_ssl_spec(&self) -> bool {
        self.specs.iter().any(|s| s.ssl || s.upgrade)
    }

    pub fn has_dns_spec(&self) -> bool {
        self.specs.iter().any(|s| s.dns)
    }

    pub fn has_userauth_spec(&self) -> bool {
        self.specs.iter().any(|s| s.opts.user_auth)
    }

    pub fn has_cakey_spec(&self) -> bool {
        self.specs.iter().any(|s| s.opts.certs.cakey.is_some())
    }

    // --- config entry points ---

    /// Load a configuration file.
    pub fn load_conffile(
        &mut self,
        path: &str,
        natengine: &mut Option<String>,
        state: &mut LoadState,
    ) -> Result<()> {
        self.conffile = Some(PathBuf::from(path));
        self.load_file(path, natengine, state)
    }

    fn load_file(
        &mut self,
        path: &str,
        natengine: &mut Option<String>,
        state: &mut LoadState,
    ) -> Result<()> {
        log::debug!("Conf file: {}", path);
        let content = fs::read_to_string(path)?;
        let mut feed = LineFeed::new(&content);
        while let Some(raw) = feed.next() {
            let Some(line) = significant(raw) else { continue };
            let line_num = feed.line_num;
            let (name, value) = get_name_value(line, ' ');
            if name.is_empty() {
                return Err(ProxyError::ConfigSyntax {
                    line: line_num,
                    msg: "no option name".to_string(),
                });
            }
            self.set_global_option(name, value, line_num, Some(&mut feed), natengine, state)?;
        }
        Ok(())
    }

    /// Apply one `key=value` command line option. The same option set as
    /// the config file is recognized; line numbers are reported as 0.
    pub fn set_option_kv(
        &mut self,
        optarg: &str,
        natengine: &mut Option<String>,
        state: &mut LoadState,
    ) -> Result<()> {
        let line = optarg.trim_start_matches([' ', '\t']);
        let (name, value) = get_name_value(line, '=');
        if name.is_empty() {
            return Err(ProxyError::ConfigSyntax { line: 0, msg: "no option name".to_string() });
        }
        self.set_global_option(name, value, 0, None, natengine, state)
    }

    /// Parse positional proxyspec tokens from the command line.
    pub fn load_proxyspecs(
        &mut self,
        tokens: &[String],
        natengine: Option<&str>,
        state: &LoadState,
    ) -> Result<()> {
        let specs = parse_proxyspecs(tokens, natengine, &self.opts, state.split, 0)?;
        self.specs.extend(specs);
        Ok(())
    }

    /// Freeze the configuration: validate every option set, compile
    /// every filter trie, and hand out the immutable shared root.
    pub fn freeze(mut self) -> Result<Arc<Global>> {
        self.opts.validate()?;
        self.opts.compile_filter();
        for spec in &mut self.specs {
            spec.opts.validate()?;
            spec.opts.compile_filter();
        }
        Ok(Arc::new(self))
    }

    // --- option dispatch ---

    fn set_global_option(
        &mut self,
        name: &str,
        value: &str,
        line: u32,
        feed: Option<&mut LineFeed<'_>>,
        natengine: &mut Option<String>,
        state: &mut LoadState,
    ) -> Result<()> {
        if value.is_empty() {
            return Err(ProxyError::ConfigSyntax {
                line,
                msg: format!("no value assigned for {}", name),
            });
        }
        match name {
            "LeafCertDir" => self.set_leafcertdir(value, line),
            "DefaultLeafCert" => {
                self.defaultleafcert = Some(LeafCert::load(value)?);
                log::debug!("DefaultLeafCert: {}", value);
                Ok(())
            }
            "WriteGenCertsDir" => self.set_certgendir(value, false, line),
            "WriteAllCertsDir" => self.set_certgendir(value, true, line),
            "User" => self.set_user(value, line),
            "Group" => self.set_group(value, line),
            "Chroot" => self.set_jaildir(value, line),
            "PidFile" => {
                self.pidfile = Some(PathBuf::from(value));
                log::debug!("PidFile: {}", value);
                Ok(())
            }
            "ConnectLog" => {
                self.connectlog = Some(Self::log_realdir(value, "ConnectLog", line)?);
                log::debug!("ConnectLog: {}", value);
                Ok(())
            }
            "ContentLog" => {
                self.contentlog = Some(Self::log_realdir(value, "ContentLog", line)?);
                self.contentlog_isdir = false;
                self.contentlog_isspec = false;
                log::debug!("ContentLog: {}", value);
                Ok(())
            }
            "ContentLogDir" => {
                self.contentlog = Some(Self::log_dir(value, "ContentLogDir", line)?);
                self.contentlog_isdir = true;
                self.contentlog_isspec = false;
                log::debug!("ContentLogDir: {}", value);
                Ok(())
            }
            "ContentLogPathSpec" => {
                let (basedir, spec) = Self::log_pathspec(value, "ContentLogPathSpec", line)?;
                self.contentlog_basedir = Some(basedir);
                self.contentlog = Some(PathBuf::from(spec));
                self.contentlog_isdir = false;
                self.contentlog_isspec = true;
                log::debug!("ContentLogPathSpec: {}", value);
                Ok(())
            }
            "MasterKeyLog" => {
                self.masterkeylog = Some(Self::log_realdir(value, "MasterKeyLog", line)?);
                log::debug!("MasterKeyLog: {}", value);
                Ok(())
            }
            "PcapLog" => {
                self.pcaplog = Some(Self::log_realdir(value, "PcapLog", line)?);
                self.pcaplog_isdir = false;
                self.pcaplog_isspec = false;
                log::debug!("PcapLog: {}", value);
                Ok(())
            }
            "PcapLogDir" => {
                self.pcaplog = Some(Self::log_dir(value, "PcapLogDir", line)?);
                self.pcaplog_isdir = true;
                self.pcaplog_isspec = false;
                log::debug!("PcapLogDir: {}", value);
                Ok(())
            }
            "PcapLogPathSpec" => {
                let (basedir, spec) = Self::log_pathspec(value, "PcapLogPathSpec", line)?;
                self.pcaplog_basedir = Some(basedir);
                self.pcaplog = Some(PathBuf::from(spec));
                self.pcaplog_isdir = false;
                self.pcaplog_isspec = true;
                log::debug!("PcapLogPathSpec: {}", value);
                Ok(())
            }
            "MirrorIf" => {
                self.mirrorif = Some(value.to_string());
                log::debug!("MirrorIf: {}", value);
                Ok(())
            }
            "MirrorTarget" => {
                self.mirrortarget = Some(value.to_string());
                log::debug!("MirrorTarget: {}", value);
                Ok(())
            }
            "Daemon" => {
                self.detach = check_value_yesno(value, "Daemon", line)?;
                log::debug!("Daemon: {}", self.detach);
                Ok(())
            }
            "Debug" => {
                self.debug = check_value_yesno(value, "Debug", line)?;
                log::debug!("Debug: {}", self.debug);
                Ok(())
            }
            "DebugLevel" => {
                let filter = crate::common::log::debug_level_to_filter(value)
                    .ok_or_else(|| ProxyError::value(line, "DebugLevel", value, "2-4"))?;
                self.debug_level = Some(filter.to_string());
                log::debug!("DebugLevel: {}", value);
                Ok(())
            }
            "UserDBPath" => {
                self.userdb_path = Some(PathBuf::from(value));
                log::debug!("UserDBPath: {}", value);
                Ok(())
            }
            "ProxySpec" => {
                if value == "{" {
                    match feed {
                        Some(feed) => self.load_proxyspec_block(feed, natengine, state),
                        None => Err(ProxyError::ConfigSyntax {
                            line,
                            msg: "ProxySpec block requires a config file".to_string(),
                        }),
                    }
                } else {
                    self.load_proxyspec_line(value, natengine, state, line)
                }
            }
            "ConnIdleTimeout" => {
                let (lo, hi) = defaults::CONN_IDLE_TIMEOUT_RANGE;
                self.conn_idle_timeout = parse_ranged(value, "ConnIdleTimeout", lo, hi, line)?;
                log::debug!("ConnIdleTimeout: {}", self.conn_idle_timeout);
                Ok(())
            }
            "ExpiredConnCheckPeriod" => {
                let (lo, hi) = defaults::EXPIRED_CONN_CHECK_PERIOD_RANGE;
                self.expired_conn_check_period =
                    parse_ranged(value, "ExpiredConnCheckPeriod", lo, hi, line)?;
                log::debug!("ExpiredConnCheckPeriod: {}", self.expired_conn_check_period);
                Ok(())
            }
            "LogStats" => {
                self.statslog = check_value_yesno(value, "LogStats", line)?;
                log::debug!("LogStats: {}", self.statslog);
                Ok(())
            }
            "StatsPeriod" => {
                let (lo, hi) = defaults::STATS_PERIOD_RANGE;
                self.stats_period = parse_ranged(value, "StatsPeriod", lo, hi, line)?;
                log::debug!("StatsPeriod: {}", self.stats_period);
                Ok(())
            }
            "OpenFilesLimit" => Self::set_open_files_limit(value, line),
            "LeafKey" => self.set_leafkey(value),
            "LeafKeyRSABits" => {
                let bits = value.parse::<u32>().ok().filter(|b| {
                    defaults::LEAFKEY_RSABITS_VALUES.contains(b)
                });
                self.leafkey_rsabits = bits.ok_or_else(|| {
                    ProxyError::value(line, "LeafKeyRSABits", value, "1024|2048|3072|4096")
                })?;
                log::debug!("LeafKeyRSABits: {}", self.leafkey_rsabits);
                Ok(())
            }
            "OpenSSLEngine" => {
                self.openssl_engine = Some(value.to_string());
                log::debug!("OpenSSLEngine: {}", value);
                Ok(())
            }
            "Include" => {
                if state.include {
                    return Err(ProxyError::IncludeRecursion { line });
                }
                state.include = true;
                let result = self.load_file(value, natengine, state);
                state.include = false;
                result.map_err(|e| {
                    log::error!("error in include file '{}' on line {}: {}", value, line, e);
                    e
                })
            }
            _ => set_opts_option(&mut self.opts, name, value, natengine, line),
        }
    }

    // --- proxyspec forms ---

    fn load_proxyspec_line(
        &mut self,
        value: &str,
        natengine: &mut Option<String>,
        state: &LoadState,
        line: u32,
    ) -> Result<()> {
        let tokens: Vec<String> = value.split_whitespace().map(str::to_string).collect();
        if tokens.len() > defaults::MAX_SPEC_TOKENS {
            return Err(ProxyError::ConfigValue {
                line,
                option: "ProxySpec".to_string(),
                msg: format!("too many arguments, max {}", defaults::MAX_SPEC_TOKENS),
            });
        }
        let specs =
            parse_proxyspecs(&tokens, natengine.as_deref(), &self.opts, state.split, line)?;
        self.specs.extend(specs);
        Ok(())
    }

    fn load_proxyspec_block(
        &mut self,
        feed: &mut LineFeed<'_>,
        natengine: &mut Option<String>,
        state: &mut LoadState,
    ) -> Result<()> {
        let open_line = feed.line_num;
        log::debug!("ProxySpec {{ on line {}", open_line);

        let mut spec = ProxySpec::new(self.opts.clone_for_spec());
        spec.set_return_addr(defaults::LOOPBACK_ADDR, open_line)?;

        let mut listen_addr: Option<String> = None;
        let mut divert_addr: Option<String> = None;
        let mut target_addr: Option<String> = None;
        let mut listen_set = false;
        let mut divert_explicit = false;
        let mut closed = false;

        while let Some(raw) = feed.next() {
            let Some(text) = significant(raw) else { continue };
            let line = feed.line_num;
            let (name, value) = get_name_value(text, ' ');
            if name == "}" {
                log::debug!("ProxySpec }} on line {}", line);
                if !listen_set {
                    return Err(ProxyError::ProxySpecIncomplete { line });
                }
                closed = true;
                break;
            }
            if value.is_empty() {
                return Err(ProxyError::ConfigSyntax {
                    line,
                    msg: format!("no value assigned for {}", name),
                });
            }
            match name {
                "Proto" => spec.set_proto(value)?,
                "Addr" => listen_addr = Some(value.to_string()),
                "Port" => match &listen_addr {
                    Some(addr) => {
                        spec.set_listen_addr(addr, value, natengine.as_deref(), line)?;
                        listen_set = true;
                    }
                    None => {
                        return Err(ProxyError::ConfigValue {
                            line,
                            option: "Port".to_string(),
                            msg: "ProxySpec Port without Addr".to_string(),
                        })
                    }
                },
                "DivertAddr" => divert_addr = Some(value.to_string()),
                "DivertPort" => {
                    let addr = divert_addr.as_deref().unwrap_or(defaults::LOOPBACK_ADDR);
                    spec.set_divert_addr(addr, value, line)?;
                }
                "ReturnAddr" => spec.set_return_addr(value, line)?,
                "TargetAddr" => target_addr = Some(value.to_string()),
                "TargetPort" => match &target_addr {
                    Some(addr) => spec.set_target_addr(addr, value, line)?,
                    None => {
                        return Err(ProxyError::ConfigValue {
                            line,
                            option: "TargetPort".to_string(),
                            msg: "ProxySpec TargetPort without TargetAddr".to_string(),
                        })
                    }
                },
                "SNIPort" => spec.set_sni_port(value, line)?,
                "NatEngine" => spec.set_natengine(value)?,
                "Divert" => match is_yesno(value) {
                    Some(yes) => {
                        spec.opts.divert = yes;
                        divert_explicit = true;
                        log::debug!("Divert: {}", yes);
                    }
                    None => {
                        spec.opts.set_filter_rule(RuleAction::Divert, value, line)?;
                    }
                },
                _ => set_opts_option(&mut spec.opts, name, value, natengine, line)?,
            }
        }

        if !closed {
            return Err(ProxyError::ProxySpecIncomplete { line: feed.line_num });
        }

        spec.apply_divert_policy(state.split, divert_explicit);
        self.specs.push(spec);
        Ok(())
    }

    // --- individual global setters ---

    fn set_leafcertdir(&mut self, value: &str, line: u32) -> Result<()> {
        if !Path::new(value).is_dir() {
            return Err(ProxyError::ConfigValue {
                line,
                option: "LeafCertDir".to_string(),
                msg: format!("'{}' is not a directory", value),
            });
        }
        self.leafcertdir = Some(PathBuf::from(value));
        log::debug!("LeafCertDir: {}", value);
        Ok(())
    }

    fn set_certgendir(&mut self, value: &str, writeall: bool, line: u32) -> Result<()> {
        if !Path::new(value).is_dir() {
            return Err(ProxyError::ConfigValue {
                line,
                option: if writeall { "WriteAllCertsDir" } else { "WriteGenCertsDir" }.to_string(),
                msg: format!("'{}' is not a directory", value),
            });
        }
        self.certgen_writeall = writeall;
        self.certgendir = Some(PathBuf::from(value));
        log::debug!("CertGenDir: {}, writeall={}", value, writeall);
        Ok(())
    }

    fn set_user(&mut self, value: &str, line: u32) -> Result<()> {
        let known = nix::unistd::User::from_name(value).ok().flatten().is_some();
        if !known {
            return Err(ProxyError::ConfigValue {
                line,
                option: "User".to_string(),
                msg: format!("'{}' is not an existing user", value),
            });
        }
        self.dropuser = Some(value.to_string());
        log::debug!("User: {}", value);
        Ok(())
    }

    fn set_group(&mut self, value: &str, line: u32) -> Result<()> {
        let known = nix::unistd::Group::from_name(value).ok().flatten().is_some();
        if !known {
            return Err(ProxyError::ConfigValue {
                line,
                option: "Group".to_string(),
                msg: format!("'{}' is not an existing group", value),
            });
        }
        self.dropgroup = Some(value.to_string());
        log::debug!("Group: {}", value);
        Ok(())
    }

    fn set_jaildir(&mut self, value: &str, line: u32) -> Result<()> {
        if !Path::new(value).is_dir() {
            return Err(ProxyError::ConfigValue {
                line,
                option: "Chroot".to_string(),
                msg: format!("'{}' is not a directory", value),
            });
        }
        self.jaildir = Some(fs::canonicalize(value)?);
        log::debug!("Chroot: {}", value);
        Ok(())
    }

    fn set_leafkey(&mut self, value: &str) -> Result<()> {
        let pem = fs::read(value).map_err(|e| ProxyError::CryptoLoad {
            path: value.to_string(),
            msg: e.to_string(),
        })?;
        let key = PKey::private_key_from_pem(&pem).map_err(|e| ProxyError::CryptoLoad {
            path: value.to_string(),
            msg: e.to_string(),
        })?;
        self.leafkey = Some(Arc::new(key));
        if self.opts.certs.dh.is_none() {
            if let Ok(dh) = openssl::dh::Dh::params_from_pem(&pem) {
                self.opts.certs.dh = Some(Arc::new(dh));
            }
        }
        log::debug!("LeafKey: {}", value);
        Ok(())
    }

    fn set_open_files_limit(value: &str, line: u32) -> Result<()> {
        let (lo, hi) = defaults::OPEN_FILES_LIMIT_RANGE;
        let limit = parse_ranged(value, "OpenFilesLimit", lo, hi, line)?;
        nix::sys::resource::setrlimit(
            nix::sys::resource::Resource::RLIMIT_NOFILE,
            limit as u64,
            limit as u64,
        )
        .map_err(|e| ProxyError::ResourceExhausted(format!("setrlimit: {}", e)))?;
        log::debug!("OpenFilesLimit: {}", limit);
        Ok(())
    }

    fn log_realdir(value: &str, option: &str, line: u32) -> Result<PathBuf> {
        fsutil::realdir(value).map_err(|e| ProxyError::ConfigValue {
            line,
            option: option.to_string(),
            msg: format!("directory part of '{}' is not usable: {}", value, e),
        })
    }

    fn log_dir(value: &str, option: &str, line: u32) -> Result<PathBuf> {
        if !Path::new(value).is_dir() {
            return Err(ProxyError::ConfigValue {
                line,
                option: option.to_string(),
                msg: format!("'{}' is not a directory", value),
            });
        }
        Ok(fs::canonicalize(value)?)
    }

    fn log_pathspec(value: &str, option: &str, line: u32) -> Result<(PathBuf, String)> {
        fsutil::resolve_pathspec(value).map_err(|e| ProxyError::ConfigValue {
            line,
            option: option.to_string(),
            msg: format!("failed to resolve '{}': {}", value, e),
        })
    }
}

/// Apply an option that lives in an `OptionSet`: the global defaults,
/// or the set owned by a proxyspec block.
fn set_opts_option(
    opts: &mut OptionSet,
    name: &str,
    value: &str,
    natengine: &mut Option<String>,
    line: u32,
) -> Result<()> {
    match name {
        "CACert" => opts.set_cacrt(value),
        "CAKey" => opts.set_cakey(value),
        "ClientCert" => opts.set_clientcrt(value),
        "ClientKey" => opts.set_clientkey(value),
        "CAChain" => opts.set_chain(value),
        "DHGroupParams" => opts.set_dh(value),
        "LeafCRLURL" => {
            opts.leaf_crl_url = Some(value.to_string());
            log::debug!("LeafCRLURL: {}", value);
            Ok(())
        }
        "ECDHCurve" => {
            opts.ecdhcurve = Some(value.to_string());
            log::debug!("ECDHCurve: {}", value);
            Ok(())
        }
        "Ciphers" => {
            opts.ciphers = Some(value.to_string());
            log::debug!("Ciphers: {}", value);
            Ok(())
        }
        "CipherSuites" => {
            opts.ciphersuites = Some(value.to_string());
            log::debug!("CipherSuites: {}", value);
            Ok(())
        }
        "SSLCompression" => {
            opts.sslcomp = check_value_yesno(value, "SSLCompression", line)?;
            log::debug!("SSLCompression: {}", opts.sslcomp);
            Ok(())
        }
        "DenyOCSP" => {
            opts.deny_ocsp = check_value_yesno(value, "DenyOCSP", line)?;
            log::debug!("DenyOCSP: {}", opts.deny_ocsp);
            Ok(())
        }
        "Passthrough" => {
            opts.passthrough = check_value_yesno(value, "Passthrough", line)?;
            log::debug!("Passthrough: {}", opts.passthrough);
            Ok(())
        }
        "ValidateProto" => {
            opts.validate_proto = check_value_yesno(value, "ValidateProto", line)?;
            log::debug!("ValidateProto: {}", opts.validate_proto);
            Ok(())
        }
        "VerifyPeer" => {
            opts.verify_peer = check_value_yesno(value, "VerifyPeer", line)?;
            log::debug!("VerifyPeer: {}", opts.verify_peer);
            Ok(())
        }
        "AllowWrongHost" => {
            opts.allow_wrong_host = check_value_yesno(value, "AllowWrongHost", line)?;
            log::debug!("AllowWrongHost: {}", opts.allow_wrong_host);
            Ok(())
        }
        "RemoveHTTPAcceptEncoding" => {
            opts.remove_http_accept_encoding =
                check_value_yesno(value, "RemoveHTTPAcceptEncoding", line)?;
            log::debug!("RemoveHTTPAcceptEncoding: {}", opts.remove_http_accept_encoding);
            Ok(())
        }
        "RemoveHTTPReferer" => {
            opts.remove_http_referer = check_value_yesno(value, "RemoveHTTPReferer", line)?;
            log::debug!("RemoveHTTPReferer: {}", opts.remove_http_referer);
            Ok(())
        }
        "ForceSSLProto" => opts.force_tls_proto(value, line),
        "DisableSSLProto" => opts.disable_tls_proto(value, line),
        "MinSSLProto" => opts.set_min_tls_proto(value, line),
        "MaxSSLProto" => opts.set_max_tls_proto(value, line),
        "NATEngine" => {
            *natengine = Some(value.to_string());
            log::debug!("NATEngine: {}", value);
            Ok(())
        }
        "UserAuth" => {
            opts.user_auth = check_value_yesno(value, "UserAuth", line)?;
            log::debug!("UserAuth: {}", opts.user_auth);
            Ok(())
        }
        "UserAuthURL" => {
            opts.user_auth_url = Some(value.to_string());
            log::debug!("UserAuthURL: {}", value);
            Ok(())
        }
        "UserTimeout" => opts.set_user_timeout(value, line),
        "DivertUsers" => opts.set_userlist(UserList::Divert, value, line),
        "PassUsers" => opts.set_userlist(UserList::Pass, value, line),
        "MaxHTTPHeaderSize" => opts.set_max_http_header_size(value, line),
        "PassSite" => opts.set_passsite(value, line),
        "Define" => opts.set_macro(value, line),
        "Split" | "Pass" | "Block" | "Match" => {
            let action = RuleAction::from_directive(name).unwrap();
            opts.set_filter_rule(action, value, line)?;
            Ok(())
        }
        "Divert" => match is_yesno(value) {
            Some(yes) => {
                opts.divert = yes;
                log::debug!("Divert: {}", yes);
                Ok(())
            }
            None => {
                opts.set_filter_rule(RuleAction::Divert, value, line)?;
                Ok(())
            }
        },
        _ => Err(ProxyError::ConfigSyntax {
            line,
            msg: format!("unknown option '{}'", name),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_name_value() {
        assert_eq!(get_name_value("Daemon yes", ' '), ("Daemon", "yes"));
        assert_eq!(get_name_value("Daemon \t yes ", ' '), ("Daemon", "yes"));
        assert_eq!(get_name_value("Daemon", ' '), ("Daemon", ""));
        // Command line separator, with whitespace around it
        assert_eq!(get_name_value("UserTimeout = 600", '='), ("UserTimeout", "600"));
        // The value is verbatim after the separator run
        assert_eq!(
            get_name_value("Divert from ip 1.2.3.4 to ip *", ' '),
            ("Divert", "from ip 1.2.3.4 to ip *")
        );
    }

    #[test]
    fn test_yesno() {
        assert_eq!(is_yesno("yes"), Some(true));
        assert_eq!(is_yesno("no"), Some(false));
        assert_eq!(is_yesno("maybe"), None);
        assert!(check_value_yesno("bogus", "Daemon", 5).is_err());
    }

    #[test]
    fn test_defaults() {
        let global = Global::new();
        assert_eq!(global.conn_idle_timeout, 120);
        assert_eq!(global.expired_conn_check_period, 10);
        assert_eq!(global.stats_period, 1);
        assert_eq!(global.leafkey_rsabits, 2048);
        assert!(!global.detach);
        assert!(global.specs.is_empty());
    }

    #[test]
    fn test_kv_option_dispatch() {
        let mut global = Global::new();
        let mut nat = None;
        let mut state = LoadState::default();
        global.set_option_kv("UserTimeout=600", &mut nat, &mut state).unwrap();
        assert_eq!(global.opts.user_timeout, 600);

        global.set_option_kv("Daemon = yes", &mut nat, &mut state).unwrap();
        assert!(global.detach);

        let err = global.set_option_kv("NoSuchOption=1", &mut nat, &mut state).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigSyntax { line: 0, .. }));

        let err = global.set_option_kv("StatsPeriod=11", &mut nat, &mut state).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigValue { .. }));
    }

    #[test]
    fn test_global_queries() {
        let mut global = Global::new();
        let state = LoadState::default();
        let tokens: Vec<String> =
            "https 127.0.0.1 8443 sni 443 tcp 127.0.0.1 8080".split_whitespace().map(str::to_string).collect();
        global.load_proxyspecs(&tokens, None, &state).unwrap();
        assert!(global.has_ssl_spec());
        assert!(global.has_dns_spec());
        assert!(!global.has_userauth_spec());
        assert!(!global.has_cakey_spec());
    }
}
