use thiserror::Error;

/// Reasons a dump is rejected. Every variant except [`ParseError::EmptyInput`]
/// carries the 1-based line number and the offending line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: malformed chain declaration: {content}")]
    MalformedChainLine { line: usize, content: String },

    #[error("line {line}: malformed rule, expected '[packets:bytes] -A <chain> ...': {content}")]
    MalformedRuleLine { line: usize, content: String },

    #[error("line {line}: rule references undeclared chain '{chain}': {content}")]
    UnknownChain {
        line: usize,
        content: String,
        chain: String,
    },

    #[error("line {line}: unrecognized line: {content}")]
    UnrecognizedLine { line: usize, content: String },

    #[error("line {line}: chain or rule outside of a table: {content}")]
    OutsideTable { line: usize, content: String },

    #[error("line {line}: table '{table}' declared twice: {content}")]
    DuplicateTable {
        line: usize,
        content: String,
        table: String,
    },

    #[error("line {line}: chain '{chain}' declared twice: {content}")]
    DuplicateChain {
        line: usize,
        content: String,
        chain: String,
    },

    #[error("no tables in iptables-save output; this is probably due to insufficient permissions")]
    EmptyInput,
}

impl ParseError {
    pub fn line_number(&self) -> Option<usize> {
        match self {
            ParseError::MalformedChainLine { line, .. }
            | ParseError::MalformedRuleLine { line, .. }
            | ParseError::UnknownChain { line, .. }
            | ParseError::UnrecognizedLine { line, .. }
            | ParseError::OutsideTable { line, .. }
            | ParseError::DuplicateTable { line, .. }
            | ParseError::DuplicateChain { line, .. } => Some(*line),
            ParseError::EmptyInput => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            ParseError::MalformedChainLine { content, .. }
            | ParseError::MalformedRuleLine { content, .. }
            | ParseError::UnknownChain { content, .. }
            | ParseError::UnrecognizedLine { content, .. }
            | ParseError::OutsideTable { content, .. }
            | ParseError::DuplicateTable { content, .. }
            | ParseError::DuplicateChain { content, .. } => Some(content),
            ParseError::EmptyInput => None,
        }
    }
}

/// Failures running the rule listing tool
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout {
        program: String,
        timeout: std::time::Duration,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{program} produced non UTF-8 output")]
    InvalidUtf8 { program: String },
}
