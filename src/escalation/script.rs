//! Renders the caller's command into a script that runs it from the caller's
//! working directory with the requested environment.

use std::io;

use crate::request::Env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `sh`/`bash`.
    Posix,
    /// `cmd.exe` batch files.
    Batch,
}

impl Dialect {
    pub fn line_ending(self) -> &'static str {
        match self {
            Dialect::Posix => "\n",
            Dialect::Batch => "\r\n",
        }
    }
}

/// Escapes `"` for use inside a double-quoted POSIX shell word.
pub fn escape_double_quotes(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// Caret-escapes the characters `cmd.exe` treats specially in an unquoted
/// `set` value. Quoting is not an option there: the quotes would become part
/// of the value.
pub fn escape_batch(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '<' | '>' | '\\' | '|' | '&' | '^') {
            out.push('^');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct Script<'a> {
    pub dialect: Dialect,
    pub cwd: &'a str,
    pub env: &'a Env,
    pub command: &'a str,
}

impl<'a> Script<'a> {
    /// Lines that set up the directory and environment, without the command.
    pub fn prelude(&self) -> io::Result<Vec<String>> {
        let mut lines = vec![];
        match self.dialect {
            Dialect::Posix => {
                lines.push(format!("cd \"{}\"", escape_double_quotes(self.cwd)));
                for (key, value) in self.env {
                    lines.push(format!("export {key}=\"{}\"", escape_double_quotes(value)));
                }
            }
            Dialect::Batch => {
                if self.cwd.contains('"') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "working directory cannot contain double-quotes",
                    ));
                }
                lines.push("@echo off".into());
                lines.push("chcp 65001>nul".into());
                // /d also switches drives.
                lines.push(format!("cd /d \"{}\"", self.cwd));
                for (key, value) in self.env {
                    lines.push(format!("set {key}={}", escape_batch(value)));
                }
            }
        }
        Ok(lines)
    }

    pub fn render(&self) -> io::Result<String> {
        let mut lines = self.prelude()?;
        lines.push(self.command.to_owned());
        Ok(lines.join(self.dialect.line_ending()))
    }
}
