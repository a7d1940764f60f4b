//! Destination URL validation and SSRF protection.
//!
//! Subscription URLs are stored by the account service, outside this core,
//! so the delivery engine re-validates each destination before transmitting:
//! scheme requirements (HTTPS unless explicitly relaxed for dev/test) and
//! private/internal address ranges.

use std::net::IpAddr;

use crate::error::NotifyError;

/// Validate a notification destination URL.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is HTTPS
/// 3. Host is not a private/internal address
///
/// `allow_insecure` relaxes checks 2 and 3 for dev/test deployments, where
/// endpoints are plain-HTTP listeners on loopback.
pub fn validate_destination_url(url: &str, allow_insecure: bool) -> Result<(), NotifyError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| NotifyError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_insecure => {}
        "http" => {
            return Err(NotifyError::InvalidUrl(
                "Destination URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(NotifyError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| NotifyError::InvalidUrl("URL must have a host".to_string()))?;

    if !allow_insecure {
        validate_host_not_internal(host)?;
    }

    Ok(())
}

/// Validate that a host is not a private/internal address.
///
/// Blocks loopback, RFC1918 ranges, link-local (cloud metadata endpoints),
/// CGNAT, IPv6 loopback/unspecified, and common internal hostnames.
pub fn validate_host_not_internal(host: &str) -> Result<(), NotifyError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(NotifyError::SsrfDetected(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(NotifyError::SsrfDetected(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

/// Check if an IP address belongs to a private/internal range.
fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()                // 127.0.0.0/8
                || v4.is_private()          // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
                || v4.is_link_local()       // 169.254.0.0/16
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // 100.64.0.0/10 (CGNAT)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
