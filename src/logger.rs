use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::stats::StatsReportType;

use crate::config::WidgetConfig;
use crate::peer::types::CandidatePairSummary;

/// Environment variable that overrides the filter derived from the config.
pub const LOG_ENV: &str = "VOICELINK_LOG";

fn default_directive(config: &WidgetConfig) -> &'static str {
    if config.debug_enabled {
        "debug"
    } else {
        "info"
    }
}

/// Устанавливает глобальный subscriber; повторный вызов ничего не меняет.
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &WidgetConfig) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        debug!(
            "trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
            init.candidate, init.sdp_mid, init.sdp_mline_index, init.username_fragment
        );
    }
}

/// Выбранная (nominated) пара из getStats
pub async fn selected_pair(pc: &RTCPeerConnection) -> Option<CandidatePairSummary> {
    let stats = pc.get_stats().await;
    stats.reports.into_values().find_map(|report| match report {
        StatsReportType::CandidatePair(pair) if pair.nominated => Some(CandidatePairSummary {
            local_candidate_id: pair.local_candidate_id,
            remote_candidate_id: pair.remote_candidate_id,
            bytes_sent: pair.bytes_sent,
            bytes_received: pair.bytes_received,
            state: format!("{:?}", pair.state),
        }),
        _ => None,
    })
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    match selected_pair(pc).await {
        Some(pair) => info!(
            "STATS {moment}: {}:{} bytes={}/{} state={}",
            pair.local_candidate_id,
            pair.remote_candidate_id,
            pair.bytes_sent,
            pair.bytes_received,
            pair.state
        ),
        None => debug!("STATS {moment}: no nominated candidate pair"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_verbosity() {
        let mut config = WidgetConfig::new("http://localhost");
        assert_eq!(default_directive(&config), "info");
        config.debug_enabled = true;
        assert_eq!(default_directive(&config), "debug");
    }

    #[test]
    fn second_init_is_harmless() {
        let config = WidgetConfig::new("http://localhost");
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
