use serde::Serialize;
use tracing::{info, warn};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;

use crate::peer::types::{IceCandidate, IceServer, IceServerList};
use crate::utils::add_ice_url_scheme;

fn is_turn_url(url: &str) -> bool {
    url.starts_with("turn:") || url.starts_with("turns:")
}

/// Переводит список серверов в формат webrtc; TURN без учётных данных пропускаем
fn to_rtc_server(server: &IceServer) -> Option<RTCIceServer> {
    let has_credentials = server.username.is_some() && server.credential.is_some();

    let urls: Vec<String> = server
        .urls
        .to_vec()
        .iter()
        .filter(|u| !u.trim().is_empty())
        .map(|u| add_ice_url_scheme(u, has_credentials))
        .filter(|u| {
            if is_turn_url(u) && !has_credentials {
                warn!(url = %u, "TURN servers require username and credential; skipping");
                false
            } else {
                true
            }
        })
        .collect();

    if urls.is_empty() {
        return None;
    }

    Some(RTCIceServer {
        urls,
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
    })
}

pub fn rtc_ice_servers(list: &IceServerList) -> Vec<RTCIceServer> {
    let servers: Vec<RTCIceServer> = list.ice_servers.iter().filter_map(to_rtc_server).collect();
    if servers.is_empty() {
        warn!("no usable relay servers; using fallback rendezvous server");
        return IceServerList::fallback()
            .ice_servers
            .iter()
            .filter_map(to_rtc_server)
            .collect();
    }
    servers
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(list: &IceServerList) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: rtc_ice_servers(list),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateTally {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

pub fn analyze_candidates(candidates: &[IceCandidate]) -> CandidateTally {
    let mut tally = CandidateTally::default();

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            tally.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            tally.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            tally.relay += 1;
        }
    }

    info!(
        host = tally.host,
        srflx = tally.srflx,
        relay = tally.relay,
        "candidate analysis"
    );
    if tally.relay == 0 {
        warn!("no TURN relay candidates found; connection through NAT may fail");
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::{IceUrls, FALLBACK_STUN_URL};

    fn server(urls: IceUrls, creds: bool) -> IceServer {
        IceServer {
            urls,
            username: creds.then(|| "user".to_owned()),
            credential: creds.then(|| "pass".to_owned()),
        }
    }

    fn candidate(line: &str) -> IceCandidate {
        IceCandidate {
            candidate: line.to_owned(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn turn_without_credentials_is_skipped() {
        let list = IceServerList {
            ice_servers: vec![
                server(IceUrls::One("turn:relay.example.org:3478".into()), false),
                server(IceUrls::One("stun.example.org:3478".into()), false),
            ],
        };
        let rtc = rtc_ice_servers(&list);
        assert_eq!(rtc.len(), 1);
        assert_eq!(rtc[0].urls, vec!["stun:stun.example.org:3478"]);
    }

    #[test]
    fn bare_host_with_credentials_becomes_turn() {
        let list = IceServerList {
            ice_servers: vec![server(
                IceUrls::Many(vec!["relay.example.org:3478".into(), "turns:relay.example.org:443".into()]),
                true,
            )],
        };
        let rtc = rtc_ice_servers(&list);
        assert_eq!(
            rtc[0].urls,
            vec!["turn:relay.example.org:3478", "turns:relay.example.org:443"]
        );
        assert_eq!(rtc[0].username, "user");
        assert_eq!(rtc[0].credential, "pass");
    }

    #[test]
    fn unusable_list_falls_back_to_public_stun() {
        let list = IceServerList {
            ice_servers: vec![server(IceUrls::One("turn:relay.example.org".into()), false)],
        };
        let rtc = rtc_ice_servers(&list);
        assert_eq!(rtc.len(), 1);
        assert_eq!(rtc[0].urls, vec![FALLBACK_STUN_URL]);
    }

    #[test]
    fn counts_candidate_types() {
        let tally = analyze_candidates(&[
            candidate("candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host"),
            candidate("candidate:2 1 udp 1686052607 203.0.113.7 40000 typ srflx raddr 10.0.0.2 rport 54321"),
            candidate("candidate:3 1 udp 41885439 198.51.100.1 50000 typ relay raddr 203.0.113.7 rport 40000"),
            candidate("candidate:4 1 udp 2122260223 10.0.0.3 54322 typ host"),
        ]);
        assert_eq!(tally, CandidateTally { host: 2, srflx: 1, relay: 1 });
    }
}
