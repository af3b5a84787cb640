//! Render endpoint enumeration and preferred-device resolution
//!
//! Results are snapshots: nothing is cached between calls, and the host may
//! return a different set (or order) on the next query.

use crate::audio::check::check;
use crate::audio::host::{AudioHost, HostEndpoint};
use crate::audio::types::{DeviceDescriptor, DeviceState};

/// List active render endpoints
///
/// An enumeration failure is logged and reported as no devices. Endpoints
/// whose id or name cannot be read are skipped.
pub fn list_devices<H: AudioHost>(host: &H) -> Vec<DeviceDescriptor> {
    let Some(endpoints) = check("Could not retrieve devices", host.render_endpoints()) else {
        return Vec::new();
    };

    let mut devices = Vec::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        if let Some(device) = describe(endpoint) {
            if device.is_active() {
                devices.push(device);
            }
        }
    }

    log::debug!("[WASAPI] {} active render endpoint(s)", devices.len());
    devices
}

fn describe<E: HostEndpoint>(endpoint: &E) -> Option<DeviceDescriptor> {
    let id = check("Error retrieving device", endpoint.id())?;
    let name = check("Could not open device properties", endpoint.friendly_name())?;
    let state = check("Could not read device state", endpoint.state()).unwrap_or(DeviceState::Active);
    Some(DeviceDescriptor { id, name, state })
}

/// Find the active endpoint whose friendly name equals `name` (case-sensitive)
///
/// Returns `None` when nothing matches; the caller falls back to the default
/// endpoint.
pub fn resolve_preferred<H: AudioHost>(host: &H, name: &str) -> Option<DeviceDescriptor> {
    list_devices(host).into_iter().find(|d| d.name == name)
}

/// Friendly names of the active render endpoints, for presentation
pub fn device_names<H: AudioHost>(host: &H) -> Vec<String> {
    list_devices(host).into_iter().map(|d| d.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::check::test_log;
    use crate::audio::error::hresult;
    use crate::audio::virtual_host::{HostCall, VirtualEndpoint, VirtualHost};
    use log::Level;

    fn host() -> VirtualHost {
        VirtualHost::new()
            .with_endpoint(VirtualEndpoint::new("{0.0.0}.{aaa}", "Speakers (Realtek Audio)"))
            .with_endpoint(VirtualEndpoint::new("{0.0.0}.{bbb}", "Headphones"))
            .with_endpoint(VirtualEndpoint::new("{0.0.0}.{ccc}", "HDMI Output").inactive())
            .with_default("{0.0.0}.{aaa}")
    }

    #[test]
    fn test_lists_only_active_endpoints() {
        let devices = list_devices(&host());
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Speakers (Realtek Audio)", "Headphones"]);
        assert!(devices.iter().all(|d| d.is_active()));
    }

    #[test]
    fn test_exact_match_resolves() {
        let device = resolve_preferred(&host(), "Headphones").unwrap();
        assert_eq!(device.id, "{0.0.0}.{bbb}");
    }

    #[test]
    fn test_match_is_case_sensitive_and_exact() {
        let host = host();
        assert!(resolve_preferred(&host, "headphones").is_none());
        assert!(resolve_preferred(&host, "Speakers").is_none());
        assert!(resolve_preferred(&host, "Headphones ").is_none());
    }

    #[test]
    fn test_inactive_endpoint_never_matches() {
        assert!(resolve_preferred(&host(), "HDMI Output").is_none());
    }

    #[test]
    fn test_no_endpoints_never_matches() {
        let empty = VirtualHost::new();
        assert!(list_devices(&empty).is_empty());
        assert!(resolve_preferred(&empty, "").is_none());
        assert!(resolve_preferred(&empty, "Speakers").is_none());
    }

    #[test]
    fn test_enumeration_failure_means_no_devices() {
        test_log::start();
        let host = host();
        host.fail(HostCall::EnumEndpoints, hresult::AUDCLNT_E_SERVICE_NOT_RUNNING);

        assert!(device_names(&host).is_empty());
        assert_eq!(
            test_log::count_containing(Level::Error, "Could not retrieve devices"),
            1
        );
    }

    #[test]
    fn test_unreadable_name_is_skipped() {
        test_log::start();
        let host = host();
        host.fail(HostCall::OpenPropertyStore, hresult::E_OUTOFMEMORY);
        assert!(list_devices(&host).is_empty());
        assert_eq!(
            test_log::count_containing(Level::Error, "Could not open device properties"),
            2
        );
    }

    #[test]
    fn test_enumeration_releases_handles() {
        let host = host();
        let _ = device_names(&host);
        let _ = resolve_preferred(&host, "Headphones");
        assert_eq!(host.live_handles(), 0);
    }
}
