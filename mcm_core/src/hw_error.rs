//! Maps `Box<dyn Error>` from the transport boundary to typed `StageError`.
//!
//! `mcm_traits::Transport` returns `Box<dyn Error + Send + Sync>`; this module
//! turns those into `StageError`, with an optional feature-gated path that
//! downcasts `mcm_hardware::error::HwError` precisely.

use crate::error::StageError;

/// Map a transport failure during an exchange on `channel`.
pub fn map_transport_error(channel: u8, e: &(dyn std::error::Error + 'static)) -> StageError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<mcm_hardware::error::HwError>() {
            return match hw {
                mcm_hardware::error::HwError::Open { .. } => {
                    StageError::TransportUnavailable(hw.to_string())
                }
                other => StageError::Transport {
                    channel,
                    detail: other.to_string(),
                },
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        if matches!(
            io.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::PermissionDenied
                | std::io::ErrorKind::NotConnected
        ) {
            return StageError::TransportUnavailable(io.to_string());
        }
    }

    StageError::Transport {
        channel,
        detail: e.to_string(),
    }
}

/// Map a failure to open the link in the first place.
pub fn map_open_error(e: &(dyn std::error::Error + 'static)) -> StageError {
    StageError::TransportUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_means_unavailable() {
        let e = std::io::Error::new(std::io::ErrorKind::NotFound, "no such port");
        assert!(matches!(
            map_transport_error(1, &e),
            StageError::TransportUnavailable(_)
        ));
    }

    #[test]
    fn other_errors_keep_channel() {
        let e = std::io::Error::other("line noise");
        match map_transport_error(2, &e) {
            StageError::Transport { channel, detail } => {
                assert_eq!(channel, 2);
                assert!(detail.contains("line noise"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_timeout_maps_to_transport() {
        let e = mcm_hardware::error::HwError::Timeout;
        assert!(matches!(
            map_transport_error(0, &e),
            StageError::Transport { channel: 0, .. }
        ));
    }
}
