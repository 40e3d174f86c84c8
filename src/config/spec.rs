//! Proxy specifications
//!
//! A proxyspec binds one listener to a protocol and a destination
//! resolution strategy, and owns an independent copy of the global
//! option set. Specs are written either in the positional form
//!
//! ```text
//! <proto> <listen-addr> <listen-port>
//!     [ up:<divert-port> [ua:<divert-addr>] [ra:<return-addr>] ]
//!     [ <natengine> | <target-addr> <target-port> | sni <port> ]
//! ```
//!
//! driven by the token state machine below, or in the `ProxySpec {}`
//! block form handled by the config-file loader.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::common::{parse_port, parse_sockaddr, ProxyError, Result};
use crate::config::defaults;
use crate::config::opts::OptionSet;
use crate::nat;

/// Recognized protocol tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    Tcp,
    Ssl,
    Http,
    Https,
    AutoSsl,
    Pop3,
    Pop3s,
    Smtp,
    Smtps,
}

impl Proto {
    /// Parse a proxyspec protocol tag.
    pub fn from_token(token: &str) -> Result<Self> {
        match token {
            "tcp" => Ok(Self::Tcp),
            "ssl" => Ok(Self::Ssl),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "autossl" => Ok(Self::AutoSsl),
            "pop3" => Ok(Self::Pop3),
            "pop3s" => Ok(Self::Pop3s),
            "smtp" => Ok(Self::Smtp),
            "smtps" => Ok(Self::Smtps),
            _ => Err(ProxyError::UnknownProtocol { token: token.to_string() }),
        }
    }

    /// Whether a token names a protocol; used by the state machine to
    /// detect the start of the next spec.
    pub fn is_protocol_token(token: &str) -> bool {
        Self::from_token(token).is_ok()
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tcp => "tcp",
            Self::Ssl => "ssl",
            Self::Http => "http",
            Self::Https => "https",
            Self::AutoSsl => "autossl",
            Self::Pop3 => "pop3",
            Self::Pop3s => "pop3s",
            Self::Smtp => "smtp",
            Self::Smtps => "smtps",
        };
        write!(f, "{}", s)
    }
}

/// How the original destination of a connection is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestMode<'a> {
    /// Ask the platform NAT engine for the pre-redirect destination.
    Nat(&'a str),
    /// Fixed upstream address.
    Static(SocketAddr),
    /// Resolve the upstream from the client SNI, connecting to this port.
    Sni(u16),
}

/// One listener: protocol, listen address, destination resolution, and
/// the owned option set.
#[derive(Debug, Clone)]
pub struct ProxySpec {
    pub proto: Proto,
    pub ssl: bool,
    pub http: bool,
    pub upgrade: bool,
    pub pop3: bool,
    pub smtp: bool,
    /// Upstream resolution needs DNS (SNI mode).
    pub dns: bool,

    pub listen_addr: Option<SocketAddr>,
    /// Fixed upstream address, when configured.
    pub connect_addr: Option<SocketAddr>,
    /// Address of the auxiliary divert listener an external inspector
    /// re-injects traffic through.
    pub divert_addr: Option<SocketAddr>,
    /// Source address for the re-injection path back from the inspector.
    pub return_addr: Option<SocketAddr>,
    pub sni_port: Option<u16>,
    pub natengine: Option<String>,

    pub opts: OptionSet,
}

impl ProxySpec {
    /// Create a spec owning the given (already deep-copied) option set.
    pub fn new(opts: OptionSet) -> Self {
        ProxySpec {
            proto: Proto::Tcp,
            ssl: false,
            http: false,
            upgrade: false,
            pop3: false,
            smtp: false,
            dns: false,
            listen_addr: None,
            connect_addr: None,
            divert_addr: None,
            return_addr: None,
            sni_port: None,
            natengine: None,
            opts,
        }
    }

    /// Set the protocol tag and the flags derived from it.
    pub fn set_proto(&mut self, token: &str) -> Result<()> {
        let proto = Proto::from_token(token)?;
        self.proto = proto;
        self.ssl = matches!(proto, Proto::Ssl | Proto::Https | Proto::Pop3s | Proto::Smtps);
        self.http = matches!(proto, Proto::Http | Proto::Https);
        self.upgrade = proto == Proto::AutoSsl;
        self.pop3 = matches!(proto, Proto::Pop3 | Proto::Pop3s);
        self.smtp = matches!(proto, Proto::Smtp | Proto::Smtps);
        log::debug!("Proto: {}", proto);
        Ok(())
    }

    /// Set the listen address and install the default NAT engine; an
    /// explicit target or SNI port clears it again.
    pub fn set_listen_addr(
        &mut self,
        addr: &str,
        port: &str,
        default_nat: Option<&str>,
        line: u32,
    ) -> Result<()> {
        self.listen_addr = Some(parse_sockaddr(addr, port, line)?);
        self.natengine = default_nat.map(str::to_string).or_else(|| nat::default_engine().map(str::to_string));
        log::debug!("Addr: [{}]:{}, {:?}", addr, port, self.natengine);
        Ok(())
    }

    pub fn set_divert_addr(&mut self, addr: &str, port: &str, line: u32) -> Result<()> {
        self.divert_addr = Some(parse_sockaddr(addr, port, line)?);
        log::debug!("DivertAddr: [{}]:{}", addr, port);
        Ok(())
    }

    /// The return address carries no port; the kernel picks one.
    pub fn set_return_addr(&mut self, addr: &str, line: u32) -> Result<()> {
        let ip: IpAddr = addr.parse().map_err(|_| ProxyError::ConfigValue {
            line,
            option: "ReturnAddr".to_string(),
            msg: format!("'{}' is not an IP address", addr),
        })?;
        self.return_addr = Some(SocketAddr::new(ip, 0));
        log::debug!("ReturnAddr: [{}]", addr);
        Ok(())
    }

    /// Explicit upstream address; overrides any NAT engine.
    pub fn set_target_addr(&mut self, addr: &str, port: &str, line: u32) -> Result<()> {
        self.connect_addr = Some(parse_sockaddr(addr, port, line)?);
        self.natengine = None;
        log::debug!("TargetAddr: [{}]:{}", addr, port);
        Ok(())
    }

    /// SNI upstream resolution; only meaningful for ssl specs, implies
    /// DNS, and overrides any NAT engine.
    pub fn set_sni_port(&mut self, port: &str, line: u32) -> Result<()> {
        if !self.ssl {
            return Err(ProxyError::ConfigValue {
                line,
                option: "SNIPort".to_string(),
                msg: "SNI hostname lookup only works for ssl and https proxyspecs".to_string(),
            });
        }
        self.sni_port = Some(parse_port(port, line)?);
        self.dns = true;
        self.natengine = None;
        log::debug!("SNIPort: {}", port);
        Ok(())
    }

    pub fn set_natengine(&mut self, name: &str) -> Result<()> {
        if !nat::exists(name) {
            return Err(ProxyError::UnknownNatEngine { token: name.to_string() });
        }
        self.natengine = Some(name.to_string());
        log::debug!("NatEngine: {}", name);
        Ok(())
    }

    /// The destination resolution mode, if any is configured.
    pub fn dest_mode(&self) -> Option<DestMode<'_>> {
        if let Some(port) = self.sni_port {
            Some(DestMode::Sni(port))
        } else if let Some(addr) = self.connect_addr {
            Some(DestMode::Static(addr))
        } else {
            self.natengine.as_deref().map(DestMode::Nat)
        }
    }

    /// Resolve the divert/split policy once the spec is fully parsed.
    ///
    /// A spec without a divert address always runs in split mode. With
    /// one, an explicit per-spec `Divert` setting wins; otherwise the
    /// global split flag forces split mode.
    pub fn apply_divert_policy(&mut self, global_split: bool, divert_explicit: bool) {
        if self.divert_addr.is_none() {
            self.opts.divert = false;
        } else if !divert_explicit && global_split {
            self.opts.divert = false;
        }
        if !self.opts.divert && self.divert_addr.is_some() {
            log::warn!("divert address specified in split mode");
        }
    }
}

impl fmt::Display for ProxySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.listen_addr {
            Some(addr) => write!(f, "listen={}", addr)?,
            None => write!(f, "listen=?")?,
        }
        write!(f, " {}", if self.ssl { "ssl" } else { "tcp" })?;
        if self.upgrade {
            write!(f, "|autossl")?;
        }
        if self.http {
            write!(f, "|http")?;
        }
        if self.pop3 {
            write!(f, "|pop3")?;
        }
        if self.smtp {
            write!(f, "|smtp")?;
        }
        match self.dest_mode() {
            Some(DestMode::Nat(engine)) => write!(f, " natengine={}", engine)?,
            Some(DestMode::Static(addr)) => write!(f, " connect={}", addr)?,
            Some(DestMode::Sni(port)) => write!(f, " sni {}", port)?,
            None => {}
        }
        if let Some(addr) = self.divert_addr {
            write!(f, " divert={}", addr)?;
        }
        if let Some(addr) = self.return_addr {
            write!(f, " return={}", addr.ip())?;
        }
        write!(f, " opts={}", self.opts)?;
        if !self.opts.divert && self.divert_addr.is_some() {
            write!(f, "\nWARNING: Divert address specified in split mode")?;
        }
        Ok(())
    }
}

/// State of the positional proxyspec token consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecState {
    /// Expecting a protocol tag opening a new spec.
    Proto,
    ListenAddr,
    ListenPort,
    /// Optional `up:`/`ua:`/`ra:` divert-path tokens.
    DivertPath,
    /// NAT engine name, target address, `sni`, or the next spec's
    /// protocol tag (rewind).
    NatOrTarget,
    TargetPort,
    SniPort,
}

/// Parse a stream of positional tokens into proxyspecs.
///
/// A token matching a protocol name while in the optional trailing state
/// starts the next spec. The divert/split policy is applied to every
/// completed spec.
pub(crate) fn parse_proxyspecs(
    tokens: &[String],
    default_nat: Option<&str>,
    global_opts: &OptionSet,
    global_split: bool,
    line: u32,
) -> Result<Vec<ProxySpec>> {
    let mut specs: Vec<ProxySpec> = Vec::new();
    let mut state = SpecState::Proto;
    let mut pending_addr: Option<&str> = None;
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_str();
        match state {
            SpecState::Proto => {
                let mut spec = ProxySpec::new(global_opts.clone_for_spec());
                spec.set_proto(token)?;
                specs.push(spec);
                state = SpecState::ListenAddr;
            }
            SpecState::ListenAddr => {
                pending_addr = Some(token);
                state = SpecState::ListenPort;
            }
            SpecState::ListenPort => {
                let spec = specs.last_mut().unwrap();
                spec.set_listen_addr(pending_addr.unwrap(), token, default_nat, line)?;
                state = SpecState::DivertPath;
            }
            SpecState::DivertPath => {
                state = SpecState::NatOrTarget;
                if let Some(divert_port) = token.strip_prefix("up:") {
                    let mut divert_addr = defaults::LOOPBACK_ADDR;
                    let mut return_addr = defaults::LOOPBACK_ADDR;
                    // ua: and ra: are optional; ua: comes before ra:
                    if let Some(next) = tokens.get(i + 1).and_then(|t| t.strip_prefix("ua:")) {
                        divert_addr = next;
                        i += 1;
                    }
                    if let Some(next) = tokens.get(i + 1).and_then(|t| t.strip_prefix("ra:")) {
                        return_addr = next;
                        i += 1;
                    }
                    let spec = specs.last_mut().unwrap();
                    spec.set_divert_addr(divert_addr, divert_port, line)?;
                    spec.set_return_addr(return_addr, line)?;
                } else {
                    // Not a divert token: reprocess it in the next state
                    continue;
                }
            }
            SpecState::NatOrTarget => {
                if Proto::is_protocol_token(token) {
                    // Implicit default NAT engine; rewind one token and
                    // start the next spec
                    state = SpecState::Proto;
                    continue;
                } else if token == "sni" {
                    state = SpecState::SniPort;
                } else if nat::exists(token) {
                    specs.last_mut().unwrap().set_natengine(token)?;
                    state = SpecState::Proto;
                } else {
                    pending_addr = Some(token);
                    state = SpecState::TargetPort;
                }
            }
            SpecState::TargetPort => {
                let spec = specs.last_mut().unwrap();
                spec.set_target_addr(pending_addr.unwrap(), token, line)?;
                state = SpecState::Proto;
            }
            SpecState::SniPort => {
                specs.last_mut().unwrap().set_sni_port(token, line)?;
                state = SpecState::Proto;
            }
        }
        i += 1;
    }

    match state {
        SpecState::Proto | SpecState::DivertPath | SpecState::NatOrTarget => {}
        _ => return Err(ProxyError::ProxySpecIncomplete { line }),
    }

    for spec in &mut specs {
        spec.apply_divert_policy(global_split, false);
    }
    Ok(specs)
}
