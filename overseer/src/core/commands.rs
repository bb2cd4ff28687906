//! Oracle text protocol: `RUN <command>` lines and the end-of-session token.

use std::collections::BTreeMap;

use tracing::warn;

/// Literal token an oracle emits when it wants to stop generating work.
pub const END_SIGNAL: &str = "<END!>";

/// Prefix every executable command line carries.
pub const RUN_PREFIX: &str = "RUN ";

/// String-encoded sequence key -> command text, as produced by the oracle.
pub type CommandBatch = BTreeMap<String, String>;

/// Parse `RUN <command>` lines in document order into a 1-based batch.
///
/// Lines are trimmed; anything not starting with `RUN ` is ignored. The
/// stored value keeps the `RUN ` prefix.
pub fn parse_commands(response: &str) -> CommandBatch {
    response
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(RUN_PREFIX))
        .enumerate()
        .map(|(i, line)| ((i + 1).to_string(), line.to_string()))
        .collect()
}

pub fn is_end_signal(response: &str) -> bool {
    response.contains(END_SIGNAL)
}

/// Ensure a command carries the `RUN ` prefix.
pub fn with_run_prefix(command: &str) -> String {
    if command.starts_with(RUN_PREFIX) {
        command.to_string()
    } else {
        format!("{RUN_PREFIX}{command}")
    }
}

/// Batch entries in ascending numeric key order.
///
/// `BTreeMap` orders keys lexically ("10" < "2"), so keys are re-sorted
/// numerically. Non-numeric keys are dropped with a warning.
pub fn ordered_commands(batch: &CommandBatch) -> Vec<(u64, &str)> {
    let mut ordered: Vec<(u64, &str)> = batch
        .iter()
        .filter_map(|(key, command)| match key.trim().parse::<u64>() {
            Ok(seq) => Some((seq, command.as_str())),
            Err(_) => {
                warn!(key = %key, "dropping command with non-numeric sequence key");
                None
            }
        })
        .collect();
    ordered.sort_by_key(|(seq, _)| *seq);
    ordered
}
