//! Additional ingress domains
//!
//! A host published under one of the cluster's known base domains is also
//! published under every configured additional domain, keeping its
//! subdomain: `foo.example.com` with additional domain `alt.com` yields
//! `foo.alt.com`.

use std::collections::HashSet;

use servegate_common::config::IngressConfig;
use servegate_common::network::is_dns1123_subdomain;
use tracing::warn;

/// Hosts for `service_host` under each additional ingress domain, in config order
///
/// The subdomain is taken from the first known domain that `service_host`
/// ends with. Duplicate additional domains are collapsed and hosts that are
/// not valid DNS-1123 subdomains are skipped.
pub fn additional_hosts(
    known_domains: &[String],
    service_host: &str,
    config: &IngressConfig,
) -> Vec<String> {
    let subdomain = known_domains
        .iter()
        .find_map(|domain| service_host.strip_suffix(domain.as_str()))
        .unwrap_or_default();

    if subdomain.is_empty() || config.additional_ingress_domains.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for domain in &config.additional_ingress_domains {
        if seen.contains(domain.as_str()) {
            continue;
        }
        let host = format!("{}{}", subdomain, domain);
        if !is_dns1123_subdomain(&host) {
            warn!(%domain, %host, "additional ingress domain does not produce a valid host, skipping");
            continue;
        }
        seen.insert(domain.as_str());
        hosts.push(host);
    }
    hosts
}
