use std::fmt;

use serde::Serialize;

use crate::tls::ClientFingerprint;

/// ALPN negotiation profile used for one probe
///
/// The set is closed: every server name is probed with all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "u8")]
pub enum AlpnProfile {
    /// No ALPN extension
    None,
    /// `http/1.1` only
    Http11,
    /// `h2` then `http/1.1`, sent with a browser fingerprint
    H2Http11,
}

impl AlpnProfile {
    pub const ALL: [AlpnProfile; 3] = [Self::None, Self::Http11, Self::H2Http11];

    pub fn index(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Http11 => 1,
            Self::H2Http11 => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn alpn_protocols(self) -> Vec<Vec<u8>> {
        match self {
            Self::None => Vec::new(),
            Self::Http11 => vec![b"http/1.1".to_vec()],
            Self::H2Http11 => vec![b"h2".to_vec(), b"http/1.1".to_vec()],
        }
    }

    pub fn fingerprint(self) -> ClientFingerprint {
        match self {
            Self::H2Http11 => ClientFingerprint::Chrome,
            Self::None | Self::Http11 => ClientFingerprint::Generic,
        }
    }
}

impl From<AlpnProfile> for u8 {
    fn from(profile: AlpnProfile) -> Self {
        profile.index()
    }
}

/// Identity of one measurement unit: destination, server name and ALPN profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProbeKey {
    pub dest: String,
    pub server_name: String,
    pub alpn: AlpnProfile,
}

impl ProbeKey {
    pub fn new(dest: impl Into<String>, server_name: impl Into<String>, alpn: AlpnProfile) -> Self {
        Self { dest: dest.into(), server_name: server_name.into(), alpn }
    }
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.dest, self.server_name, self.alpn.index())
    }
}
