//! Hostname helpers for in-cluster services and Istio authority matching

use once_cell::sync::Lazy;
use regex::Regex;

/// Kubernetes cluster DNS domain
pub const CLUSTER_DOMAIN: &str = "cluster.local";

/// Maximum length of a DNS-1123 subdomain
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS-1123 subdomain pattern is hardcoded and valid")
});

const PORT_MATCH: &str = ":[0-9]{1,5}";

/// Characters with a meaning in RE2 syntax
const REGEX_META: &str = r"\.+*?()|[]{}^$";

/// Fully qualified in-cluster hostname of a service: `{name}.{namespace}.svc.cluster.local`
pub fn service_hostname(name: &str, namespace: &str) -> String {
    format!("{}.{}.svc.{}", name, namespace, CLUSTER_DOMAIN)
}

/// Regex matching a host with or without a port, anchored at both ends.
///
/// For in-cluster hosts the `.svc` and `.svc.cluster.local` suffixes are
/// optional, so `name.ns`, `name.ns.svc` and the full form all match.
pub fn host_regexp(host: &str) -> String {
    let local_suffix = format!(".svc.{}", CLUSTER_DOMAIN);
    match host.strip_suffix(&local_suffix) {
        Some(prefix) => {
            let cluster_suffix = quote_meta(&format!(".{}", CLUSTER_DOMAIN));
            let svc_suffix = quote_meta(".svc");
            exact(&format!(
                "{}{}",
                quote_meta(prefix),
                optional(&format!("{}{}", svc_suffix, optional(&cluster_suffix)))
            ))
        }
        None => exact(&quote_meta(host)),
    }
}

/// Escape RE2 metacharacters, leaving everything else (including `-`) as is
fn quote_meta(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len());
    for c in text.chars() {
        if REGEX_META.contains(c) {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted
}

fn exact(pattern: &str) -> String {
    format!("^{}{}$", pattern, optional(PORT_MATCH))
}

fn optional(pattern: &str) -> String {
    format!("({})?", pattern)
}

/// Check that a hostname is a valid DNS-1123 subdomain
pub fn is_dns1123_subdomain(host: &str) -> bool {
    !host.is_empty() && host.len() <= DNS1123_SUBDOMAIN_MAX_LENGTH && DNS1123_SUBDOMAIN.is_match(host)
}
