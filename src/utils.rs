use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Short base-36 token used as `webrtc_id` for one negotiation attempt.
pub fn random_id() -> String {
    let mut rng = rand::rng();
    (0..10)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}

// Добавляет схему к URL relay-сервера, если она отсутствует
pub fn add_ice_url_scheme(url: &str, turn: bool) -> String {
    let url = url.trim();
    if url.starts_with("turn:")
        || url.starts_with("turns:")
        || url.starts_with("stun:")
        || url.starts_with("stuns:")
    {
        url.to_owned()
    } else {
        let scheme = if turn { "turn:" } else { "stun:" };
        format!("{scheme}{url}")
    }
}

/// Trims trailing slashes so endpoint paths can be appended verbatim.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_is_base36() {
        let id = random_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn random_ids_differ_between_attempts() {
        assert_ne!(random_id(), random_id());
    }

    #[test]
    fn scheme_is_added_only_when_missing() {
        assert_eq!(add_ice_url_scheme("stun.example.org:3478", false), "stun:stun.example.org:3478");
        assert_eq!(add_ice_url_scheme("relay.example.org:3478", true), "turn:relay.example.org:3478");
        assert_eq!(add_ice_url_scheme("turns:relay.example.org:443", false), "turns:relay.example.org:443");
    }

    #[test]
    fn base_url_loses_trailing_slashes() {
        assert_eq!(normalize_base_url("http://localhost:8000//"), "http://localhost:8000");
    }
}
