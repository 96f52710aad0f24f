use crate::error::ParseError;
use ipt_core::{Chain, Counters, Policy, Rule, Ruleset, Table};

/// Parse the output of `iptables-save -c` into a [`Ruleset`].
///
/// Parsing is a single pass over the lines. The first malformed line aborts
/// with an error naming it; nothing is skipped. Input without any table
/// (empty, blank or only comments) yields [`ParseError::EmptyInput`].
pub fn parse(raw: &str) -> Result<Ruleset, ParseError> {
    let mut parser = SaveParser::default();
    for (idx, line) in raw.lines().enumerate() {
        parser.feed(idx + 1, line)?;
    }
    parser.finish()
}

#[derive(Default)]
struct SaveParser {
    ruleset: Ruleset,
    /// Table opened by the last `*` line, until COMMIT
    current: Option<Table>,
}

impl SaveParser {
    fn feed(&mut self, number: usize, raw_line: &str) -> Result<(), ParseError> {
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        if let Some(name) = line.strip_prefix('*') {
            return self.open_table(number, line, name.trim());
        }

        if line == "COMMIT" {
            return match self.current.take() {
                Some(table) => {
                    self.ruleset.add_table(table);
                    Ok(())
                }
                None => Err(ParseError::OutsideTable {
                    line: number,
                    content: line.to_string(),
                }),
            };
        }

        if let Some(decl) = line.strip_prefix(':') {
            return self.declare_chain(number, line, decl);
        }

        if line.starts_with('[') || line.starts_with("-A") {
            return self.append_rule(number, line);
        }

        Err(ParseError::UnrecognizedLine {
            line: number,
            content: line.to_string(),
        })
    }

    fn open_table(&mut self, number: usize, line: &str, name: &str) -> Result<(), ParseError> {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ParseError::UnrecognizedLine {
                line: number,
                content: line.to_string(),
            });
        }

        // A new table header implicitly closes an uncommitted one
        if let Some(table) = self.current.take() {
            self.ruleset.add_table(table);
        }

        if self.ruleset.contains_table(name) {
            return Err(ParseError::DuplicateTable {
                line: number,
                content: line.to_string(),
                table: name.to_string(),
            });
        }

        self.current = Some(Table::new(name));
        Ok(())
    }

    /// `:<name> <policy> [<packets>:<bytes>]`
    fn declare_chain(&mut self, number: usize, line: &str, decl: &str) -> Result<(), ParseError> {
        let malformed = || ParseError::MalformedChainLine {
            line: number,
            content: line.to_string(),
        };

        let parts: Vec<&str> = decl.split_whitespace().collect();
        let [name, policy, counters] = parts.as_slice() else {
            return Err(malformed());
        };
        if decl.starts_with(char::is_whitespace) {
            return Err(malformed());
        }
        let counters = parse_counters(counters).ok_or_else(malformed)?;

        let table = self.current.as_mut().ok_or_else(|| ParseError::OutsideTable {
            line: number,
            content: line.to_string(),
        })?;

        let chain = Chain::new(*name, Policy::from_token(policy), counters);
        if !table.add_chain(chain) {
            return Err(ParseError::DuplicateChain {
                line: number,
                content: line.to_string(),
                chain: name.to_string(),
            });
        }

        Ok(())
    }

    /// `[<packets>:<bytes>] -A <chain> <rule...>`
    fn append_rule(&mut self, number: usize, line: &str) -> Result<(), ParseError> {
        let malformed = || ParseError::MalformedRuleLine {
            line: number,
            content: line.to_string(),
        };

        // The exporter always asks for counters, so a bare `-A` is an error
        if !line.starts_with('[') {
            return Err(malformed());
        }

        let (counter_token, body) = line.split_once(char::is_whitespace).ok_or_else(malformed)?;
        let counters = parse_counters(counter_token).ok_or_else(malformed)?;
        let body = body.trim_start();

        let mut words = body.split_whitespace();
        match words.next() {
            Some("-A") => {}
            _ => {
                return Err(ParseError::UnrecognizedLine {
                    line: number,
                    content: line.to_string(),
                });
            }
        }
        let chain_name = words.next().ok_or_else(malformed)?;

        let table = self.current.as_mut().ok_or_else(|| ParseError::OutsideTable {
            line: number,
            content: line.to_string(),
        })?;

        let chain = table
            .chain_mut(chain_name)
            .ok_or_else(|| ParseError::UnknownChain {
                line: number,
                content: line.to_string(),
                chain: chain_name.to_string(),
            })?;

        chain.push_rule(Rule::new(body, counters));
        Ok(())
    }

    fn finish(mut self) -> Result<Ruleset, ParseError> {
        if let Some(table) = self.current.take() {
            self.ruleset.add_table(table);
        }
        if self.ruleset.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        Ok(self.ruleset)
    }
}

/// `[<packets>:<bytes>]`, both plain decimal digits
fn parse_counters(token: &str) -> Option<Counters> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    let (packets, bytes) = inner.split_once(':')?;
    Some(Counters::new(parse_count(packets)?, parse_count(bytes)?))
}

fn parse_count(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
# Generated by iptables-save v1.8.7 on Sat Oct 17 09:12:44 2026
*filter
:INPUT DROP [1204:98312]
:FORWARD ACCEPT [0:0]
:OUTPUT ACCEPT [5531:660112]
:blocklist - [0:0]
[12:720] -A INPUT -i lo -j ACCEPT
[3021:4512007] -A INPUT -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT
[40:2400] -A INPUT -j blocklist
[7:420] -A blocklist -s 203.0.113.7/32 -j DROP
[2:120] -A blocklist -s 203.0.113.9/32 -j DROP
COMMIT
# Completed on Sat Oct 17 09:12:44 2026
# Generated by iptables-save v1.8.7 on Sat Oct 17 09:12:44 2026
*nat
:PREROUTING ACCEPT [88:5280]
:INPUT ACCEPT [0:0]
:OUTPUT ACCEPT [14:912]
:POSTROUTING ACCEPT [14:912]
:DOCKER - [0:0]
[1:60] -A PREROUTING -m addrtype --dst-type LOCAL -j DOCKER
[0:0] -A POSTROUTING -s 172.17.0.0/16 ! -o docker0 -j MASQUERADE
[0:0] -A DOCKER -i docker0 -j RETURN
COMMIT
# Completed on Sat Oct 17 09:12:44 2026
";

    #[test]
    fn parses_tables_in_dump_order() {
        let ruleset = parse(DUMP).unwrap();
        let names: Vec<&str> = ruleset.tables().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["filter", "nat"]);
    }

    #[test]
    fn parses_chain_policies_and_counters() {
        let ruleset = parse(DUMP).unwrap();
        let filter = ruleset.table("filter").unwrap();

        let input = filter.chain("INPUT").unwrap();
        assert_eq!(input.policy, Policy::Drop);
        assert_eq!(input.counters, Counters::new(1204, 98312));
        assert_eq!(input.rules.len(), 3);

        let blocklist = filter.chain("blocklist").unwrap();
        assert_eq!(blocklist.policy, Policy::None);
        assert_eq!(blocklist.counters, Counters::default());
        assert_eq!(blocklist.rules.len(), 2);
    }

    #[test]
    fn rule_body_keeps_chain_reference_without_counters() {
        let ruleset = parse(DUMP).unwrap();
        let input = ruleset.table("filter").unwrap().chain("INPUT").unwrap();

        assert_eq!(
            input.rules[1].body,
            "-A INPUT -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT"
        );
        assert_eq!(input.rules[1].counters, Counters::new(3021, 4512007));
    }

    #[test]
    fn rules_attach_to_the_named_chain() {
        let ruleset = parse(DUMP).unwrap();
        let nat = ruleset.table("nat").unwrap();
        assert_eq!(nat.chain("PREROUTING").unwrap().rules.len(), 1);
        assert_eq!(nat.chain("POSTROUTING").unwrap().rules.len(), 1);
        assert_eq!(
            nat.chain("DOCKER").unwrap().rules[0].body,
            "-A DOCKER -i docker0 -j RETURN"
        );
        assert_eq!(nat.rule_count(), 3);
    }

    #[test]
    fn parsing_is_repeatable() {
        assert_eq!(parse(DUMP).unwrap(), parse(DUMP).unwrap());
    }

    #[test]
    fn tolerates_crlf_and_trailing_whitespace() {
        let dump = "*filter\r\n:INPUT ACCEPT [1:2]  \r\n[3:4] -A INPUT -j ACCEPT\r\nCOMMIT\r\n";
        let ruleset = parse(dump).unwrap();
        let input = ruleset.table("filter").unwrap().chain("INPUT").unwrap();
        assert_eq!(input.rules[0].body, "-A INPUT -j ACCEPT");
    }

    #[test]
    fn non_numeric_chain_counter_is_rejected() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\n:CHAIN ACCEPT [x:0]\nCOMMIT\n";
        let err = parse(dump).unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedChainLine {
                line: 3,
                content: ":CHAIN ACCEPT [x:0]".to_string(),
            }
        );
        assert_eq!(err.line_number(), Some(3));
    }

    #[test]
    fn chain_counter_shapes_are_checked() {
        for decl in [
            ":INPUT ACCEPT",
            ":INPUT ACCEPT [1:2] extra",
            ":INPUT ACCEPT [1-2]",
            ":INPUT ACCEPT [-1:2]",
            ":INPUT ACCEPT [+1:2]",
            ":INPUT ACCEPT 1:2",
            ": INPUT ACCEPT [1:2]",
        ] {
            let dump = format!("*filter\n{decl}\nCOMMIT\n");
            assert!(
                matches!(parse(&dump), Err(ParseError::MalformedChainLine { line: 2, .. })),
                "{decl}"
            );
        }
    }

    #[test]
    fn rule_without_counters_is_rejected() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\n-A INPUT -j ACCEPT\nCOMMIT\n";
        assert!(matches!(
            parse(dump),
            Err(ParseError::MalformedRuleLine { line: 3, .. })
        ));
    }

    #[test]
    fn rule_with_bad_counters_is_rejected() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\n[1:b] -A INPUT -j ACCEPT\nCOMMIT\n";
        assert!(matches!(
            parse(dump),
            Err(ParseError::MalformedRuleLine { line: 3, .. })
        ));

        let dump = "*filter\n:INPUT ACCEPT [0:0]\n[1:1] -A\nCOMMIT\n";
        assert!(matches!(
            parse(dump),
            Err(ParseError::MalformedRuleLine { line: 3, .. })
        ));
    }

    #[test]
    fn rule_for_undeclared_chain_is_rejected() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\n[1:1] -A UNDECLARED -j DROP\n:UNDECLARED - [0:0]\nCOMMIT\n";
        let err = parse(dump).unwrap_err();
        assert!(matches!(
            &err,
            ParseError::UnknownChain { line: 3, chain, .. } if chain == "UNDECLARED"
        ));
    }

    #[test]
    fn chains_do_not_leak_across_tables() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\nCOMMIT\n*nat\n[1:1] -A INPUT -j ACCEPT\nCOMMIT\n";
        assert!(matches!(
            parse(dump),
            Err(ParseError::UnknownChain { line: 5, .. })
        ));
    }

    #[test]
    fn lines_after_commit_need_a_new_table() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\nCOMMIT\n:OUTPUT ACCEPT [0:0]\n";
        assert!(matches!(
            parse(dump),
            Err(ParseError::OutsideTable { line: 4, .. })
        ));

        assert!(matches!(
            parse("[1:1] -A INPUT -j ACCEPT\n"),
            Err(ParseError::OutsideTable { line: 1, .. })
        ));
        assert!(matches!(
            parse("COMMIT\n"),
            Err(ParseError::OutsideTable { line: 1, .. })
        ));
    }

    #[test]
    fn unrecognized_line_reports_content() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\n\n-N custom\nCOMMIT\n";
        let err = parse(dump).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnrecognizedLine {
                line: 4,
                content: "-N custom".to_string(),
            }
        );
        assert!(err.to_string().contains("line 4"));
    }

    #[test]
    fn duplicate_declarations_are_rejected() {
        let dump = "*filter\n:INPUT ACCEPT [0:0]\n:INPUT DROP [0:0]\nCOMMIT\n";
        assert!(matches!(
            parse(dump),
            Err(ParseError::DuplicateChain { line: 3, .. })
        ));

        let dump = "*filter\nCOMMIT\n*filter\nCOMMIT\n";
        assert!(matches!(
            parse(dump),
            Err(ParseError::DuplicateTable { line: 3, .. })
        ));
    }

    #[test]
    fn empty_inputs_are_distinguished() {
        for dump in ["", "   \n\t\n", "# Generated by iptables-save\n# Completed\n"] {
            assert_eq!(parse(dump), Err(ParseError::EmptyInput));
        }
    }

    #[test]
    fn table_without_chains_counts() {
        let ruleset = parse("*raw\nCOMMIT\n").unwrap();
        assert_eq!(ruleset.len(), 1);
        assert!(ruleset.table("raw").unwrap().chains().is_empty());
    }

    #[test]
    fn uncommitted_table_is_kept() {
        let ruleset = parse("*mangle\n:PREROUTING ACCEPT [5:300]\n*raw\n:OUTPUT ACCEPT [1:1]\n").unwrap();
        assert_eq!(ruleset.len(), 2);
        assert!(ruleset.table("mangle").unwrap().contains_chain("PREROUTING"));
    }
}
