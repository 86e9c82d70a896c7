//! Status published back onto the InferenceService

use kube::ResourceExt;
use servegate_common::crd::{
    Addressable, Condition, ConditionStatus, InferenceService, INGRESS_READY,
};
use servegate_common::naming::backend_service_name;
use servegate_common::network::service_hostname;
use servegate_common::Error;
use url::Url;

/// Name under which the service is addressable inside the cluster
///
/// With a virtual host the InferenceService name itself is routed. Without
/// one, clients talk to the routed component's service directly.
pub fn host_prefix(isvc: &InferenceService, disable_virtual_host: bool, use_default: bool) -> String {
    if disable_virtual_host {
        backend_service_name(&isvc.name_any(), isvc.routed_component(), use_default)
    } else {
        isvc.name_any()
    }
}

/// Record the public URL, in-cluster address and IngressReady=True
pub fn publish_status(
    isvc: &mut InferenceService,
    service_url: &str,
    host_prefix: &str,
) -> Result<(), Error> {
    Url::parse(service_url)
        .map_err(|e| Error::url_parse(service_url, e).wrap("fails to parse service url"))?;

    let namespace = isvc.namespace().unwrap_or_default();
    let status = isvc.status_mut();
    status.url = Some(service_url.to_string());
    status.address = Some(Addressable {
        url: Some(format!("http://{}", service_hostname(host_prefix, &namespace))),
    });
    status.set_condition(Condition::new(INGRESS_READY, ConditionStatus::True));
    Ok(())
}
