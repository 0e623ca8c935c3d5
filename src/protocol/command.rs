//! protocol::command
//!
//! Input side of the protocol.
//!
//! [`Command::parse`] turns one line into a command. [`ProtocolReader`]
//! reads lines from git, distinguishing a blank line from end of input,
//! and gathers the lines of a `push` or `fetch` batch.

use std::io::BufRead;

use crate::core::types::Oid;

use super::ProtocolError;

/// One `push [+]<src>:<dst>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSpec {
    /// Local source; empty requests deletion of `dst`
    pub src: String,
    /// Remote destination ref
    pub dst: String,
    /// `+` prefix
    pub force: bool,
}

/// One `fetch <oid> <name>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSpec {
    /// Object to make local
    pub oid: Oid,
    /// Ref name it was listed under
    pub name: String,
}

/// A command from git.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `capabilities`
    Capabilities,
    /// `list` or `list for-push`
    List {
        /// Listing ahead of a push
        for_push: bool,
    },
    /// `option <name> <value>`
    Option {
        /// Option name
        name: String,
        /// Raw value; empty if absent
        value: String,
    },
    /// First or subsequent line of a push batch
    Push(PushSpec),
    /// First or subsequent line of a fetch batch
    Fetch(FetchSpec),
    /// Blank line
    Empty,
}

impl Command {
    /// Parse one line (without its newline).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let malformed = |reason: &str| ProtocolError::Malformed {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        if line.is_empty() {
            return Ok(Self::Empty);
        }

        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (line, None),
        };

        match (verb, rest) {
            ("capabilities", None) => Ok(Self::Capabilities),
            ("list", None) => Ok(Self::List { for_push: false }),
            ("list", Some("for-push")) => Ok(Self::List { for_push: true }),
            ("option", Some(rest)) => {
                let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
                if name.is_empty() {
                    return Err(malformed("missing option name"));
                }
                Ok(Self::Option {
                    name: name.to_string(),
                    value: value.to_string(),
                })
            }
            ("push", Some(rest)) => {
                let (force, spec) = match rest.strip_prefix('+') {
                    Some(spec) => (true, spec),
                    None => (false, rest),
                };
                let (src, dst) = spec
                    .split_once(':')
                    .ok_or_else(|| malformed("expected <src>:<dst>"))?;
                if dst.is_empty() {
                    return Err(malformed("empty destination"));
                }
                Ok(Self::Push(PushSpec {
                    src: src.to_string(),
                    dst: dst.to_string(),
                    force,
                }))
            }
            ("fetch", Some(rest)) => {
                let (oid, name) = rest
                    .split_once(' ')
                    .ok_or_else(|| malformed("expected <oid> <name>"))?;
                let oid = Oid::new(oid).map_err(|e| malformed(&e.to_string()))?;
                Ok(Self::Fetch(FetchSpec {
                    oid,
                    name: name.to_string(),
                }))
            }
            _ => Err(ProtocolError::UnknownCommand(line.to_string())),
        }
    }
}

/// Reads commands from git.
pub struct ProtocolReader<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> ProtocolReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    /// Read the next command. `None` at end of input.
    pub fn read_command(&mut self) -> Result<Option<Command>, ProtocolError> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        tracing::trace!(line = self.line.trim_end(), "recv");
        Command::parse(&self.line).map(Some)
    }

    /// Read the rest of a push batch that began with `first`.
    pub fn read_push_batch(&mut self, first: PushSpec) -> Result<Vec<PushSpec>, ProtocolError> {
        let mut batch = vec![first];
        loop {
            match self.read_command()? {
                Some(Command::Push(spec)) => batch.push(spec),
                Some(Command::Empty) => return Ok(batch),
                Some(_) => {
                    return Err(ProtocolError::UnexpectedCommand {
                        batch: "push",
                        line: self.line.trim_end().to_string(),
                    })
                }
                None => return Err(ProtocolError::UnexpectedEof { batch: "push" }),
            }
        }
    }

    /// Read the rest of a fetch batch that began with `first`.
    pub fn read_fetch_batch(&mut self, first: FetchSpec) -> Result<Vec<FetchSpec>, ProtocolError> {
        let mut batch = vec![first];
        loop {
            match self.read_command()? {
                Some(Command::Fetch(spec)) => batch.push(spec),
                Some(Command::Empty) => return Ok(batch),
                Some(_) => {
                    return Err(ProtocolError::UnexpectedCommand {
                        batch: "fetch",
                        line: self.line.trim_end().to_string(),
                    })
                }
                None => return Err(ProtocolError::UnexpectedEof { batch: "fetch" }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const OID: &str = "ce013625030ba8dba906f756967f9e9ca394464a";

    #[test]
    fn parse_simple_commands() {
        assert_eq!(Command::parse("capabilities\n").unwrap(), Command::Capabilities);
        assert_eq!(
            Command::parse("list").unwrap(),
            Command::List { for_push: false }
        );
        assert_eq!(
            Command::parse("list for-push").unwrap(),
            Command::List { for_push: true }
        );
        assert_eq!(Command::parse("\n").unwrap(), Command::Empty);
    }

    #[test]
    fn parse_option() {
        assert_eq!(
            Command::parse("option verbosity 2").unwrap(),
            Command::Option {
                name: "verbosity".into(),
                value: "2".into()
            }
        );
        assert_eq!(
            Command::parse("option followtags").unwrap(),
            Command::Option {
                name: "followtags".into(),
                value: String::new()
            }
        );
    }

    #[test]
    fn parse_push_variants() {
        assert_eq!(
            Command::parse("push refs/heads/main:refs/heads/main").unwrap(),
            Command::Push(PushSpec {
                src: "refs/heads/main".into(),
                dst: "refs/heads/main".into(),
                force: false
            })
        );
        assert_eq!(
            Command::parse("push +refs/heads/a:refs/heads/b").unwrap(),
            Command::Push(PushSpec {
                src: "refs/heads/a".into(),
                dst: "refs/heads/b".into(),
                force: true
            })
        );
        assert_eq!(
            Command::parse("push :refs/heads/gone").unwrap(),
            Command::Push(PushSpec {
                src: String::new(),
                dst: "refs/heads/gone".into(),
                force: false
            })
        );
    }

    #[test]
    fn parse_fetch() {
        let cmd = Command::parse(&format!("fetch {OID} refs/heads/main")).unwrap();
        assert_eq!(
            cmd,
            Command::Fetch(FetchSpec {
                oid: Oid::new(OID).unwrap(),
                name: "refs/heads/main".into()
            })
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Command::parse("connect git-upload-pack"),
            Err(ProtocolError::UnknownCommand(_))
        ));
        assert!(matches!(
            Command::parse("push refs/heads/main"),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            Command::parse("fetch nothex refs/heads/main"),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            Command::parse("capabilities please"),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn reader_distinguishes_blank_and_eof() {
        let mut reader = ProtocolReader::new(Cursor::new("capabilities\n\n"));
        assert_eq!(reader.read_command().unwrap(), Some(Command::Capabilities));
        assert_eq!(reader.read_command().unwrap(), Some(Command::Empty));
        assert_eq!(reader.read_command().unwrap(), None);
    }

    #[test]
    fn push_batch_reads_until_blank() {
        let input = "push refs/heads/b:refs/heads/b\n\nlist\n";
        let mut reader = ProtocolReader::new(Cursor::new(input));
        let first = PushSpec {
            src: "refs/heads/a".into(),
            dst: "refs/heads/a".into(),
            force: false,
        };
        let batch = reader.read_push_batch(first).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].dst, "refs/heads/b");
        assert_eq!(
            reader.read_command().unwrap(),
            Some(Command::List { for_push: false })
        );
    }

    #[test]
    fn batch_errors() {
        let first = || PushSpec {
            src: "a".into(),
            dst: "refs/heads/a".into(),
            force: false,
        };

        let mut reader = ProtocolReader::new(Cursor::new("push a:refs/heads/a\n"));
        assert!(matches!(
            reader.read_push_batch(first()),
            Err(ProtocolError::UnexpectedEof { batch: "push" })
        ));

        let mut reader = ProtocolReader::new(Cursor::new(format!("fetch {OID} x\n")));
        assert!(matches!(
            reader.read_push_batch(first()),
            Err(ProtocolError::UnexpectedCommand { batch: "push", .. })
        ));
    }
}
