use std::sync::Arc;

use tracing::{debug, info};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

use crate::peer::transport::TransportEventSink;
use crate::peer::types::TransportEvent;

/// Label the media server expects for the side channel.
pub const SIDE_CHANNEL_LABEL: &str = "text";

/// общий обработчик data-channel: открытие и любое входящее сообщение
/// считаются признаком живого соединения
pub fn attach_side_channel(dc: &Arc<RTCDataChannel>, events: TransportEventSink) {
    let label = dc.label().to_owned();

    dc.on_open(Box::new({
        let events = events.clone();
        let label = label.clone();
        move || {
            info!(session = %events.session(), channel = %label, "data channel opened");
            events.emit(TransportEvent::SideChannelOpen);
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new({
        let events = events.clone();
        move |msg: DataChannelMessage| {
            debug!(len = msg.data.len(), "received data channel message");
            events.emit(TransportEvent::SideChannelMessage {
                len: msg.data.len(),
            });
            Box::pin(async {})
        }
    }));

    dc.on_close(Box::new(move || {
        debug!(session = %events.session(), channel = %label, "data channel closed");
        events.emit(TransportEvent::SideChannelClosed);
        Box::pin(async {})
    }));
}
