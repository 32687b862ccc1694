use crate::node_id::NodeId;

/// OpenLCB-over-CAN mDNS service type, per `spec.md` §6.
pub const SERVICE_TYPE: &str = "_openlcb-can._tcp.local.";

/// Build a service instance name for `node`, optionally prefixed by an
/// organization and/or model segment, following the convention
/// `[org_][model_]<12hex>._openlcb-can._tcp.local.` used by
/// `python-openlcb`'s `tcplink/mdnsconventions.py`.
pub fn format_service_name(node: NodeId, org: Option<&str>, model: Option<&str>) -> String {
    let hex12 = node
        .to_array()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<String>();
    let mut name = String::new();
    if let Some(org) = org {
        name.push_str(org);
        name.push('_');
    }
    if let Some(model) = model {
        name.push_str(model);
        name.push('_');
    }
    name.push_str(&hex12);
    name.push('.');
    name.push_str(SERVICE_TYPE);
    name
}

/// Extract the embedded NodeID from an mDNS service instance name such as
/// `pythonopenlcb_02015700049C._openlcb-can._tcp.local.` or
/// `bobjacobsen_pythonopenlcb_02015700049C._openlcb-can._tcp.local.`.
///
/// Scans the underscore-separated parts before the first `.` for one that
/// is exactly 12 hex digits; `org_`/`model_` prefixes are otherwise
/// ignored. Returns `None` if no such part is found.
pub fn parse_service_name(full_name: &str) -> Option<NodeId> {
    let first_label = full_name.split('.').next()?;
    first_label
        .split('_')
        .find_map(|part| NodeId::parse_hex12(part).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_node_id() {
        let node = NodeId::new(0x0102_0304_0506);
        let name = format_service_name(node, None, None);
        assert_eq!(name, "010203040506._openlcb-can._tcp.local.");
        assert_eq!(parse_service_name(&name), Some(node));
    }

    #[test]
    fn round_trips_with_org_and_model() {
        let node = NodeId::new(0x0102_0304_0506);
        let name = format_service_name(node, Some("jmri"), Some("canusb"));
        assert_eq!(name, "jmri_canusb_010203040506._openlcb-can._tcp.local.");
        assert_eq!(parse_service_name(&name), Some(node));
    }

    #[test]
    fn rejects_non_matching_suffix() {
        assert_eq!(parse_service_name("foo._http._tcp.local."), None);
    }
}
