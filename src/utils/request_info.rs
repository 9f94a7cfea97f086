use actix_web::HttpRequest;
use sqlx::types::ipnetwork::IpNetwork;

/// Best-effort client address: first `x-forwarded-for` hop, then `x-real-ip`, then the peer.
pub fn client_ip(req: &HttpRequest) -> String {
    if let Some(forwarded_for) = req.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded_for.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(real_ip_str) = real_ip.to_str() {
            return real_ip_str.trim().to_string();
        }
    }

    if let Some(peer_addr) = req.peer_addr() {
        peer_addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

/// Parsed form of [`client_ip`], for storing in audit rows.
pub fn client_ip_network(req: &HttpRequest) -> Option<IpNetwork> {
    client_ip(req)
        .parse::<std::net::IpAddr>()
        .ok()
        .map(IpNetwork::from)
}

pub fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_forwarded_for_wins() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-for", "203.0.113.7, 10.0.0.1"))
            .insert_header(("x-real-ip", "198.51.100.2"))
            .to_http_request();
        assert_eq!(client_ip(&req), "203.0.113.7");
        assert_eq!(
            client_ip_network(&req),
            Some(IpNetwork::from("203.0.113.7".parse::<std::net::IpAddr>().unwrap()))
        );
    }

    #[test]
    fn test_real_ip_then_peer_fallback() {
        let req = TestRequest::default()
            .insert_header(("x-real-ip", "198.51.100.2"))
            .to_http_request();
        assert_eq!(client_ip(&req), "198.51.100.2");

        let req = TestRequest::default()
            .peer_addr("192.0.2.10:4431".parse().unwrap())
            .to_http_request();
        assert_eq!(client_ip(&req), "192.0.2.10");

        let req = TestRequest::default().to_http_request();
        assert_eq!(client_ip(&req), "unknown");
        assert_eq!(client_ip_network(&req), None);
    }
}
