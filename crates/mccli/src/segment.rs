//! Splitting a token stream into command invocations.

use crate::error::ParseError;
use crate::registry::{Arity, CommandKind, Registry};

/// Prefix that forces one invocation's record to render structured.
pub const STRUCTURED_MARKER: char = '.';

/// One resolved command with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub kind: CommandKind,
    /// Canonical command name.
    pub name: &'static str,
    pub args: Vec<String>,
    /// Render this invocation's record structured whatever the run mode.
    pub structured: bool,
}

impl Invocation {
    /// Build an invocation without going through the segmenter.
    pub fn new(kind: CommandKind, name: &'static str, args: Vec<String>) -> Self {
        Invocation {
            kind,
            name,
            args,
            structured: false,
        }
    }
}

/// A segment of the token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A command ready to run.
    Invocation(Invocation),
    /// Tokens that could not be turned into a command.
    Invalid {
        /// The token at the command position.
        token: String,
        /// Whether it carried the structured marker.
        structured: bool,
        /// Why it failed.
        error: ParseError,
    },
}

/// Resolve a command-position token, honouring the structured marker.
fn command_token<'r>(registry: &'r Registry, token: &str) -> Option<(&'r crate::registry::CommandSpec, bool)> {
    if let Some(spec) = registry.resolve(token) {
        return Some((spec, false));
    }
    token
        .strip_prefix(STRUCTURED_MARKER)
        .and_then(|rest| registry.resolve(rest))
        .map(|spec| (spec, true))
}

/// Split `tokens` into segments.
///
/// Positional arguments are taken as they come. A free-text body runs up to
/// the next token that names a command. Tokens left over after a command
/// has all its arguments start the next segment.
pub fn segment(registry: &Registry, tokens: &[String]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut pos = 0;
    let is_command = |t: &str| command_token(registry, t).is_some();

    while pos < tokens.len() {
        let token = &tokens[pos];
        pos += 1;

        let Some((spec, structured)) = command_token(registry, token) else {
            // Swallow the following plain tokens into the same error
            while pos < tokens.len() && !is_command(&tokens[pos]) {
                pos += 1;
            }
            segments.push(Segment::Invalid {
                token: token.clone(),
                structured: token.starts_with(STRUCTURED_MARKER),
                error: ParseError::UnknownCommand(token.clone()),
            });
            continue;
        };

        let missing = || ParseError::MissingArguments {
            command: spec.name.to_string(),
            usage: spec.usage.to_string(),
        };

        let args = match spec.arity {
            Arity::Fixed(n) => {
                if pos + n > tokens.len() {
                    pos = tokens.len();
                    Err(missing())
                } else {
                    let args = tokens[pos..pos + n].to_vec();
                    pos += n;
                    Ok(args)
                }
            }
            Arity::Optional(words) => match tokens.get(pos) {
                Some(next) if words.contains(&next.as_str()) => {
                    pos += 1;
                    Ok(vec![next.clone()])
                }
                _ => Ok(Vec::new()),
            },
            Arity::Text { leading } => {
                if pos + leading > tokens.len() {
                    pos = tokens.len();
                    Err(missing())
                } else {
                    let mut args = tokens[pos..pos + leading].to_vec();
                    pos += leading;
                    let start = pos;
                    while pos < tokens.len() && !is_command(&tokens[pos]) {
                        pos += 1;
                    }
                    if start == pos {
                        Err(missing())
                    } else {
                        args.push(tokens[start..pos].join(" "));
                        Ok(args)
                    }
                }
            }
        };

        segments.push(match args {
            Ok(args) => Segment::Invocation(Invocation {
                kind: spec.kind,
                name: spec.name,
                args,
                structured,
            }),
            Err(error) => Segment::Invalid {
                token: token.clone(),
                structured,
                error,
            },
        });
    }

    segments
}

/// Split one input line into tokens with shell quoting rules.
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    shell_words::split(line).map_err(|e| ParseError::InvalidArgument {
        command: "line".to_string(),
        what: "quoting".to_string(),
        value: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<String> {
        tokenize(line).unwrap()
    }

    fn invocations(line: &str) -> Vec<Invocation> {
        segment(&Registry::builtin(), &tokens(line))
            .into_iter()
            .map(|s| match s {
                Segment::Invocation(inv) => inv,
                Segment::Invalid { token, error, .. } => panic!("{} invalid: {}", token, error),
            })
            .collect()
    }

    #[test]
    fn test_text_body_stops_at_next_command() {
        let invs = invocations("msg alice hello there wait_ack");
        assert_eq!(invs.len(), 2);
        assert_eq!(invs[0].kind, CommandKind::Msg);
        assert_eq!(invs[0].args, vec!["alice", "hello there"]);
        assert_eq!(invs[1].kind, CommandKind::WaitAck);
        assert!(invs[1].args.is_empty());
    }

    #[test]
    fn test_quoted_body_is_one_token() {
        let invs = invocations("msg alice \"i am at the a site\" wa");
        assert_eq!(invs[0].args, vec!["alice", "i am at the a site"]);
        assert_eq!(invs[1].kind, CommandKind::WaitAck);
    }

    #[test]
    fn test_fixed_arity_positions_are_taken_verbatim() {
        // `s` is also the sleep alias, but here it is the password
        let invs = invocations("login relay s wait_login");
        assert_eq!(invs[0].args, vec!["relay", "s"]);
        assert_eq!(invs[1].kind, CommandKind::WaitLogin);
    }

    #[test]
    fn test_extra_tokens_are_reexamined() {
        let segments = segment(&Registry::builtin(), &tokens("sleep 1 2 infos"));
        assert_eq!(segments.len(), 3);
        assert!(matches!(&segments[0], Segment::Invocation(i) if i.args == vec!["1"]));
        assert!(matches!(
            &segments[1],
            Segment::Invalid { error: ParseError::UnknownCommand(t), .. } if t == "2"
        ));
        assert!(matches!(&segments[2], Segment::Invocation(i) if i.kind == CommandKind::Infos));
    }

    #[test]
    fn test_unknown_token_swallows_plain_tokens() {
        let segments = segment(&Registry::builtin(), &tokens("frobnicate a1 b2 clock"));
        // `a1` and `b2` are not command names
        assert_eq!(segments.len(), 2);
        assert!(matches!(&segments[1], Segment::Invocation(i) if i.kind == CommandKind::Clock));
    }

    #[test]
    fn test_optional_sub_word() {
        let invs = invocations("clock sync clock infos");
        assert_eq!(invs.len(), 3);
        assert_eq!(invs[0].args, vec!["sync"]);
        assert!(invs[1].args.is_empty());
        assert_eq!(invs[2].kind, CommandKind::Infos);
    }

    #[test]
    fn test_structured_marker() {
        let invs = invocations(".clock infos");
        assert!(invs[0].structured);
        assert_eq!(invs[0].kind, CommandKind::Clock);
        assert!(!invs[1].structured);
    }

    #[test]
    fn test_navigation_argument_is_not_a_marker() {
        let invs = invocations("to .. to !");
        assert_eq!(invs[0].args, vec![".."]);
        assert_eq!(invs[1].args, vec!["!"]);
    }

    #[test]
    fn test_missing_arguments() {
        let segments = segment(&Registry::builtin(), &tokens("msg alice"));
        assert!(matches!(
            &segments[0],
            Segment::Invalid { error: ParseError::MissingArguments { command, .. }, .. } if command == "msg"
        ));

        let segments = segment(&Registry::builtin(), &tokens("set_radio 869.5 250"));
        assert_eq!(segments.len(), 1);
        assert!(matches!(&segments[0], Segment::Invalid { .. }));
    }

    #[test]
    fn test_empty_body_before_next_command() {
        let segments = segment(&Registry::builtin(), &tokens("dch infos"));
        assert_eq!(segments.len(), 2);
        assert!(matches!(&segments[0], Segment::Invalid { .. }));
        assert!(matches!(&segments[1], Segment::Invocation(i) if i.kind == CommandKind::Infos));
    }

    #[test]
    fn test_unbalanced_quote() {
        assert!(tokenize("msg bob \"oops").is_err());
    }
}
