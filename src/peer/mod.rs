pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod sender;
pub mod transport;
pub mod types;

pub use connection::{WebRtcTransport, WebRtcTransportFactory};
pub use data_channel::SIDE_CHANNEL_LABEL;
pub use transport::{PeerTransport, TransportEventSink, TransportFactory, TransportHandle};
pub use types::{
    IceCandidate, IceConnectivity, IceServer, IceServerList, PeerState, SessionDescription,
    TransportDiagnostics, TransportEvent,
};
