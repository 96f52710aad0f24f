use regex::Regex;
use std::borrow::Cow;
use thiserror::Error;

/// Expression used when none is configured: the whole rule body is the identifier.
pub const DEFAULT_CAPTURE_PATTERN: &str = ".*";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid capture expression '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Derives the exported identifier of a rule from its body.
///
/// Returning `None` excludes the rule from per-identifier counters.
pub trait RuleIdentifier: Send + Sync {
    fn identify<'a>(&self, body: &'a str) -> Option<Cow<'a, str>>;
}

/// Regex backed [`RuleIdentifier`].
///
/// Without capturing groups the identifier is the matched text. With groups it
/// is every participating group joined by `separator`; groups that did not
/// take part in the match are skipped.
#[derive(Debug, Clone)]
pub struct CapturePattern {
    regex: Regex,
    separator: String,
}

impl CapturePattern {
    pub fn new(pattern: &str) -> Result<Self, CaptureError> {
        Self::with_separator(pattern, "")
    }

    pub fn with_separator(pattern: &str, separator: &str) -> Result<Self, CaptureError> {
        let regex = Regex::new(pattern).map_err(|source| CaptureError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            regex,
            separator: separator.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    fn has_groups(&self) -> bool {
        // slot 0 is the implicit whole-match group
        self.regex.captures_len() > 1
    }
}

impl Default for CapturePattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_CAPTURE_PATTERN).expect("default capture expression is valid"),
            separator: String::new(),
        }
    }
}

impl RuleIdentifier for CapturePattern {
    fn identify<'a>(&self, body: &'a str) -> Option<Cow<'a, str>> {
        if !self.has_groups() {
            return self.regex.find(body).map(|m| Cow::Borrowed(m.as_str()));
        }

        let captures = self.regex.captures(body)?;
        let groups: Vec<&'a str> = captures
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .collect();

        match groups.as_slice() {
            [single] => Some(Cow::Borrowed(single)),
            _ => Some(Cow::Owned(groups.join(&self.separator))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "-A INPUT -s 10.1.2.3/32 -p tcp -m tcp --dport 22 -j DROP";

    #[test]
    fn default_pattern_keeps_whole_body() {
        let capture = CapturePattern::default();
        assert_eq!(capture.identify(BODY).as_deref(), Some(BODY));
    }

    #[test]
    fn whole_match_without_groups() {
        let capture = CapturePattern::new(r"--dport \d+").unwrap();
        assert_eq!(capture.identify(BODY).as_deref(), Some("--dport 22"));
    }

    #[test]
    fn single_group_is_identifier() {
        let capture = CapturePattern::new(r"-j (\S+)").unwrap();
        assert_eq!(capture.identify(BODY).as_deref(), Some("DROP"));
    }

    #[test]
    fn groups_are_joined_with_separator() {
        let capture = CapturePattern::new(r"-p (\S+).*-j (\S+)").unwrap();
        assert_eq!(capture.identify(BODY).as_deref(), Some("tcpDROP"));

        let capture = CapturePattern::with_separator(r"-p (\S+).*-j (\S+)", "/").unwrap();
        assert_eq!(capture.identify(BODY).as_deref(), Some("tcp/DROP"));
    }

    #[test]
    fn non_participating_groups_are_skipped() {
        let capture =
            CapturePattern::with_separator(r"(-i \S+)?.*(--comment \S+)?.*-j (\S+)", ",").unwrap();
        assert_eq!(capture.identify(BODY).as_deref(), Some("DROP"));
    }

    #[test]
    fn no_match_is_none() {
        let capture = CapturePattern::new(r"--comment (\S+)").unwrap();
        assert!(capture.identify(BODY).is_none());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = CapturePattern::new("(unclosed").unwrap_err();
        assert!(matches!(err, CaptureError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }
}
