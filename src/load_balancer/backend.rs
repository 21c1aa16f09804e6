//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend endpoint and its logical name
//! - Map self-reported backend addresses back to logical names

use std::net::{AddrParseError, IpAddr, SocketAddr};

use crate::config::BackendConfig;

/// Logical name used when a backend cannot be identified.
pub const UNKNOWN_BACKEND: &str = "UNKNOWN";

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// The address of the backend.
    pub addr: SocketAddr,
    /// Logical name shown to clients, if one is configured.
    pub name: Option<String>,
}

impl Endpoint {
    pub fn new(addr: SocketAddr, name: Option<String>) -> Self {
        Self { addr, name }
    }

    pub fn named(addr: SocketAddr, name: &str) -> Self {
        Self::new(addr, Some(name.to_string()))
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, AddrParseError> {
        Ok(Self::new(config.address.parse()?, config.name.clone()))
    }

    /// Logical name, or [`UNKNOWN_BACKEND`] when none is configured.
    pub fn logical_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_BACKEND)
    }
}

/// A backend address as a backend reports it about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedAddr {
    Socket(SocketAddr),
    Ip(IpAddr),
}

impl ReportedAddr {
    /// Parse "ip" or "ip:port"; anything else is not an address.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(addr) = value.parse::<SocketAddr>() {
            return Some(ReportedAddr::Socket(addr));
        }
        value.parse::<IpAddr>().ok().map(ReportedAddr::Ip)
    }

    fn matches(&self, addr: &SocketAddr) -> bool {
        match self {
            ReportedAddr::Socket(reported) => reported == addr,
            ReportedAddr::Ip(ip) => *ip == addr.ip(),
        }
    }
}

/// Address to logical name mapping for every known backend.
#[derive(Debug, Clone, Default)]
pub struct BackendDirectory {
    endpoints: Vec<Endpoint>,
}

impl BackendDirectory {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, AddrParseError> {
        configs
            .iter()
            .map(Endpoint::from_config)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Logical name of the backend at `reported`.
    ///
    /// An IP without a port can match several backends sharing a host; the
    /// backend that was actually contacted wins in that case.
    pub fn lookup<'a>(&'a self, reported: ReportedAddr, contacted: &'a Endpoint) -> Option<&'a str> {
        if reported.matches(&contacted.addr) {
            if let Some(name) = contacted.name.as_deref() {
                return Some(name);
            }
        }
        self.endpoints
            .iter()
            .filter(|e| reported.matches(&e.addr))
            .find_map(|e| e.name.as_deref())
    }
}
