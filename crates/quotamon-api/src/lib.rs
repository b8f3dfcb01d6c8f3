// quotamon-api: local language-server discovery and quota protocol clients

pub mod error;
pub mod locator;
pub mod peer;
pub mod remote;
pub mod transport;

pub use error::Error;
pub use locator::{
    DiscoveryError, HttpsPortProber, LocalPeerLocator, PeerConnection, PeerLocator, PeerProcess,
    PortProber, ProcessPlatform, detect_platform,
};
pub use peer::PeerClient;
pub use remote::{RemoteClient, RemoteQuotaEntry};
pub use transport::{TlsMode, TransportConfig};
