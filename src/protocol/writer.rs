//! protocol::writer
//!
//! Output side of the protocol. Every response that ends an exchange is
//! flushed, since git blocks on it.

use std::io::Write;

use crate::core::types::{Oid, RefName};

/// Capabilities advertised to git.
pub const CAPABILITIES: &[&str] = &["option", "push", "fetch"];

/// Writes responses to git.
pub struct ProtocolWriter<W: Write> {
    writer: W,
}

impl<W: Write> ProtocolWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, line: &str) -> std::io::Result<()> {
        tracing::trace!(line, "send");
        writeln!(self.writer, "{line}")
    }

    /// Capability list and terminator.
    pub fn write_capabilities(&mut self) -> std::io::Result<()> {
        for capability in CAPABILITIES {
            self.line(capability)?;
        }
        self.write_end()
    }

    /// `<oid> <name>`
    pub fn write_ref(&mut self, oid: &Oid, name: &RefName) -> std::io::Result<()> {
        self.line(&format!("{oid} {name}"))
    }

    /// `@<target> HEAD`
    pub fn write_symref_head(&mut self, target: &RefName) -> std::io::Result<()> {
        self.line(&format!("@{target} HEAD"))
    }

    /// Blank line ending a response.
    pub fn write_end(&mut self) -> std::io::Result<()> {
        self.line("")?;
        self.writer.flush()
    }

    /// `ok` or `unsupported`.
    pub fn write_option_response(&mut self, supported: bool) -> std::io::Result<()> {
        self.line(if supported { "ok" } else { "unsupported" })?;
        self.writer.flush()
    }

    /// `error <message>` for a recognised option with an unusable value.
    pub fn write_option_error(&mut self, message: &str) -> std::io::Result<()> {
        self.line(&format!("error {message}"))?;
        self.writer.flush()
    }

    /// `ok <ref>`
    pub fn write_push_ok(&mut self, dst: &str) -> std::io::Result<()> {
        self.line(&format!("ok {dst}"))
    }

    /// `error <ref> <message>`
    pub fn write_push_error(&mut self, dst: &str, message: &str) -> std::io::Result<()> {
        self.line(&format!("error {dst} {message}"))
    }
}
