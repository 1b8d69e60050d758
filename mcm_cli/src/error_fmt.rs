//! Human-readable error descriptions and structured JSON error formatting.

use mcm_core::error::{BuildError, Desync, StageError};
use serde_json::json;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::UnknownStage(name) => format!(
                "What happened: Stage model '{name}' is not in the catalog.\nLikely causes: Typo in a [[channel]] stage name (names are case-sensitive) or a missing [[stage_models]] entry.\nHow to fix: Run `mcm stages` to list known models, or add the model to the config or a --stages-csv file."
            ),
            BuildError::ChannelIndex(i) => format!(
                "What happened: Channel index {i} does not exist.\nLikely causes: The controller has channels 0, 1 and 2 only.\nHow to fix: Use a channel between 0 and 2."
            ),
            BuildError::NoActiveChannels => {
                "What happened: No channel has a stage attached.\nLikely causes: Every [[channel]] entry is empty.\nHow to fix: Set `stage = \"...\"` on at least one [[channel]] entry.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<StageError>() {
        return match se {
            StageError::ChannelNotConfigured(ch) => format!(
                "What happened: Channel {ch} has no stage attached.\nLikely causes: The [[channel]] entry is empty or the index is out of range.\nHow to fix: Pick a configured channel, or attach a stage to channel {ch} in the config."
            ),
            StageError::LimitExceeded {
                channel,
                requested_um,
                limit_um,
            } => format!(
                "What happened: Move on channel {channel} to {requested_um:.3} um is outside the travel range of +/-{limit_um:.3} um.\nLikely causes: Target typed in the wrong unit, or a relative move from a position already near the end.\nHow to fix: Choose a target inside the range; see `mcm limits --channel {channel}`. Nothing was sent to the device."
            ),
            StageError::MoveTimedOut {
                channel,
                target_counts,
                last_counts,
            } => format!(
                "What happened: Channel {channel} did not reach {target_counts} counts in time (last read {last_counts}).\nLikely causes: Stage blocked or unpowered, long move with a short timeout.\nHow to fix: Check the stage, or raise --timeout-ms / motion.move_timeout_ms."
            ),
            StageError::ProtocolDesync { channel, desync } => {
                let cause = match desync {
                    Desync::ResidualBytes(_) => "Another program is using the port, or the line is noisy",
                    Desync::ChannelMismatch { .. } => "A stale reply from an earlier request was still in the buffer",
                    Desync::ShortFrame(_) => "The device sent a truncated reply",
                };
                format!(
                    "What happened: Lost protocol sync on channel {channel} ({desync}).\nLikely causes: {cause}.\nHow to fix: Close other programs using the port and power-cycle the controller."
                )
            }
            StageError::TransportUnavailable(detail) => format!(
                "What happened: The serial port could not be used ({detail}).\nLikely causes: Wrong port name, controller unplugged, or missing permissions (dialout group).\nHow to fix: Check [port].name or pass --port, then rerun."
            ),
            StageError::Transport { channel, detail } => format!(
                "What happened: I/O error talking to channel {channel} ({detail}).\nLikely causes: Cable disconnected or port read timeout too low.\nHow to fix: Check the connection; raise port.read_timeout_ms if replies are slow."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("stage model csv must have headers") {
        return "Invalid headers in stage model CSV. Expected 'name,um_per_count,limit_um'.".to_string();
    }

    if lower.contains("[[channel]]")
        || lower.contains("port.")
        || lower.contains("motion.")
        || lower.contains("logging.")
        || lower.contains("stage model")
    {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable name of the typed error, used as the JSON `reason`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<StageError>() {
        return match se {
            StageError::ChannelNotConfigured(_) => "ChannelNotConfigured",
            StageError::TransportUnavailable(_) => "TransportUnavailable",
            StageError::ProtocolDesync { .. } => "ProtocolDesync",
            StageError::LimitExceeded { .. } => "LimitExceeded",
            StageError::MoveTimedOut { .. } => "MoveTimedOut",
            StageError::Transport { .. } => "Transport",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidSetup";
    }
    "Error"
}

/// Map typed stage errors to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<StageError>() {
        Some(StageError::LimitExceeded { .. }) => 3,
        Some(StageError::MoveTimedOut { .. }) => 4,
        Some(StageError::ProtocolDesync { .. }) => 5,
        Some(StageError::TransportUnavailable(_)) => 6,
        Some(StageError::ChannelNotConfigured(_)) => 7,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let msg = humanize(err);
    let details = match err.downcast_ref::<StageError>() {
        Some(StageError::LimitExceeded {
            channel,
            requested_um,
            limit_um,
        }) => Some(json!({
            "channel": channel,
            "requested_um": requested_um,
            "limit_um": limit_um,
        })),
        Some(StageError::MoveTimedOut {
            channel,
            target_counts,
            last_counts,
        }) => Some(json!({
            "channel": channel,
            "target_counts": target_counts,
            "last_counts": last_counts,
        })),
        Some(StageError::ProtocolDesync { channel, desync }) => Some(json!({
            "channel": channel,
            "desync": desync.to_string(),
        })),
        Some(StageError::ChannelNotConfigured(channel)) => Some(json!({ "channel": channel })),
        _ => None,
    };

    let obj = match details {
        Some(d) => json!({ "reason": reason_name(err), "details": d, "message": msg }),
        None => json!({ "reason": reason_name(err), "message": msg }),
    };
    obj.to_string()
}
