//! Public host and URL resolution
//!
//! The host and URL of an InferenceService are derived from the status URL
//! of the component that receives predict traffic: the transformer when one
//! is configured, the predictor otherwise. Stripping the component suffix
//! (`-predictor`, `-predictor-default`, ...) yields the logical host shared
//! by all components.

use kube::ResourceExt;
use servegate_common::config::IngressConfig;
use servegate_common::crd::InferenceService;
use servegate_common::naming::strip_component_suffix;
use servegate_common::template::generate_url_path;
use tracing::error;
use url::Url;

/// Logical service host, or `None` while the routed component has no URL
pub fn service_host(isvc: &InferenceService) -> Option<String> {
    let component = isvc.routed_component();
    let raw = isvc.status.as_ref()?.component_url(component)?;
    Url::parse(raw).ok()?;
    Some(strip_component_suffix(raw_host(raw)?, component))
}

/// Host and port exactly as written in `raw`, without userinfo
fn raw_host(raw: &str) -> Option<&str> {
    let (_, rest) = raw.split_once("://")?;
    let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    (!host.is_empty()).then_some(host)
}

/// Public URL of the service, or `None` while it cannot be determined
///
/// With a path template configured the URL is path based
/// (`{scheme}://{ingressDomain}{path}`); a template that fails to render is
/// logged and reported as `None`, same as a component that is not ready.
pub fn service_url(isvc: &InferenceService, config: &IngressConfig) -> Option<String> {
    let host_based = host_based_service_url(isvc, config)?;
    if !config.has_path_template() {
        return Some(host_based);
    }
    path_based_service_url(isvc, config)
}

fn host_based_service_url(isvc: &InferenceService, config: &IngressConfig) -> Option<String> {
    let component = isvc.routed_component();
    let raw = isvc.status.as_ref()?.component_url(component)?;
    Url::parse(raw).ok()?;
    let (_, rest) = raw.split_once("://")?;
    let url = format!("{}://{}", config.url_scheme, rest);

    if config.disable_istio_virtual_host {
        Some(url)
    } else {
        Some(strip_component_suffix(&url, component))
    }
}

fn path_based_service_url(isvc: &InferenceService, config: &IngressConfig) -> Option<String> {
    let name = isvc.name_any();
    let namespace = isvc.namespace().unwrap_or_default();
    match generate_url_path(&name, &namespace, config) {
        Ok(path) => Some(format!(
            "{}://{}{}",
            config.url_scheme, config.ingress_domain, path
        )),
        Err(e) => {
            error!(error = %e, %name, %namespace, "failed to generate URL path from path template");
            None
        }
    }
}
