//! Board self-test error codes and their operator-facing messages.

pub const STORAGE_DEVICE: usize = 0;
pub const ADC_DEVICE: usize = 1;
pub const RADIO_DEVICE: usize = 2;

fn message(device: usize, code: u8) -> Option<&'static str> {
    let text = match (device, code) {
        (STORAGE_DEVICE, 0) => "SD card nominal.",
        (STORAGE_DEVICE, 1) => "No SD card detected.",
        (STORAGE_DEVICE, 2) => "SD card unwritable. Please ensure it is formatted FAT32.",
        (STORAGE_DEVICE, 3) => "SD card full.",
        (STORAGE_DEVICE, 255) => "SD card uninitialized.",
        (ADC_DEVICE, 0) => "ADC nominal.",
        (ADC_DEVICE, 1) => "ADC self-check failed.",
        (ADC_DEVICE, 255) => "ADC uninitialized.",
        (RADIO_DEVICE, 0) => "Radio nominal.",
        (RADIO_DEVICE, 1) => "Radio received malformed firing packet.",
        _ => return None,
    };
    Some(text)
}

/// Renders `"{device}.{code}: {message}"`.
pub fn format_error_message(device: usize, code: u8) -> String {
    format!(
        "{}.{}: {}",
        device,
        code,
        message(device, code).unwrap_or("Unknown error.")
    )
}

pub fn is_nominal(code: u8) -> bool {
    code == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_known_and_unknown_codes() {
        assert_eq!(format_error_message(0, 3), "0.3: SD card full.");
        assert_eq!(format_error_message(1, 0), "1.0: ADC nominal.");
        assert_eq!(format_error_message(2, 9), "2.9: Unknown error.");
        assert_eq!(format_error_message(7, 0), "7.0: Unknown error.");
    }
}
