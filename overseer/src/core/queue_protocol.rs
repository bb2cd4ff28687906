//! Parser for the queue text sub-protocol: `list`, `rm <index>`, `add <json>`, `clear`.

use thiserror::Error;

use crate::core::commands::CommandBatch;

/// Optional prefix accepted in front of every queue verb.
pub const QUEUE_PREFIX: &str = "/queue ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCommand {
    List,
    Remove(u64),
    Add(CommandBatch),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueCommandError {
    #[error("Invalid queue command")]
    Empty,
    #[error("Unknown queue command '{0}'")]
    UnknownVerb(String),
    #[error("Missing index")]
    MissingIndex,
    #[error("Invalid index '{0}'")]
    InvalidIndex(String),
    #[error("Missing JSON object")]
    MissingPayload,
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("Invalid sequence key '{0}'")]
    InvalidKey(String),
}

/// Parse one line of the queue text protocol.
pub fn parse_queue_command(line: &str) -> Result<QueueCommand, QueueCommandError> {
    let line = line.trim();
    let line = line.strip_prefix(QUEUE_PREFIX).unwrap_or(line).trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "" => Err(QueueCommandError::Empty),
        "list" => Ok(QueueCommand::List),
        "clear" => Ok(QueueCommand::Clear),
        "rm" => {
            if rest.is_empty() {
                return Err(QueueCommandError::MissingIndex);
            }
            rest.parse::<u64>()
                .map(QueueCommand::Remove)
                .map_err(|_| QueueCommandError::InvalidIndex(rest.to_string()))
        }
        "add" => {
            if rest.is_empty() {
                return Err(QueueCommandError::MissingPayload);
            }
            let batch: CommandBatch = serde_json::from_str(rest)
                .map_err(|err| QueueCommandError::InvalidJson(err.to_string()))?;
            if let Some(bad) = batch.keys().find(|key| key.trim().parse::<u64>().is_err()) {
                return Err(QueueCommandError::InvalidKey(bad.clone()));
            }
            Ok(QueueCommand::Add(batch))
        }
        other => Err(QueueCommandError::UnknownVerb(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_verbs() {
        assert_eq!(parse_queue_command("list"), Ok(QueueCommand::List));
        assert_eq!(parse_queue_command("/queue clear"), Ok(QueueCommand::Clear));
        assert_eq!(parse_queue_command(" rm 7 "), Ok(QueueCommand::Remove(7)));
    }

    #[test]
    fn parses_add_payload() {
        let cmd = parse_queue_command(r#"add {"1": "RUN a", "2": "RUN b c"}"#).expect("parse");
        let QueueCommand::Add(batch) = cmd else {
            panic!("expected add");
        };
        assert_eq!(batch["2"], "RUN b c");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_queue_command(""), Err(QueueCommandError::Empty));
        assert_eq!(parse_queue_command("rm"), Err(QueueCommandError::MissingIndex));
        assert_eq!(
            parse_queue_command("rm two"),
            Err(QueueCommandError::InvalidIndex("two".to_string()))
        );
        assert!(matches!(
            parse_queue_command("add {not json"),
            Err(QueueCommandError::InvalidJson(_))
        ));
        assert_eq!(
            parse_queue_command(r#"add {"first": "RUN a"}"#),
            Err(QueueCommandError::InvalidKey("first".to_string()))
        );
        assert_eq!(
            parse_queue_command("purge"),
            Err(QueueCommandError::UnknownVerb("purge".to_string()))
        );
    }
}
