use super::packet::VersionPacket;

/// Board hardware revisions this ground station can drive.
pub const ALLOWED_HARDWARE_REVISIONS: &[u8] = &[2, 3];
/// Firmware versions speaking the protocol implemented here.
pub const ALLOWED_FIRMWARE_VERSIONS: &[u16] = &[5];

pub fn is_supported(packet: &VersionPacket) -> bool {
    ALLOWED_HARDWARE_REVISIONS.contains(&packet.hardware_version)
        && ALLOWED_FIRMWARE_VERSIONS.contains(&packet.firmware_version)
}

pub fn hardware_revision_name(revision: u8) -> String {
    match revision {
        0 => "Revision 1.0".to_string(),
        1 => "Revision 1.1".to_string(),
        2 => "Revision 1.2".to_string(),
        other => format!("Unknown ({})", other),
    }
}

pub fn firmware_revision_name(version: u16) -> String {
    version.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_lists_gate_both_fields() {
        let packet = |hardware_version, firmware_version| VersionPacket {
            firmware_version,
            hardware_version,
        };
        assert!(is_supported(&packet(2, 5)));
        assert!(is_supported(&packet(3, 5)));
        assert!(!is_supported(&packet(1, 5)));
        assert!(!is_supported(&packet(3, 4)));
    }

    #[test]
    fn revision_names() {
        assert_eq!(hardware_revision_name(2), "Revision 1.2");
        assert_eq!(hardware_revision_name(9), "Unknown (9)");
        assert_eq!(firmware_revision_name(5), "5");
    }
}
