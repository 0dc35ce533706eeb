//! Open mode strings and the capabilities they grant.
//!
//! Grammar: exactly one of `r`, `w`, `a`, `x`, an optional `+`, and an
//! optional `b` or `t`, in any order and without repeats.

use crate::error::{Result, StageError};

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Append,
    Exclusive,
}

/// Directions a handle may be used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
}

/// What gets copied into the staging file before the caller sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prepopulate {
    Nothing,
    /// Target must exist.
    Required,
    /// Copied when the target exists, otherwise staging starts empty.
    IfPresent,
}

/// A parsed open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    access: Access,
    update: bool,
    binary: bool,
    text: bool,
}

impl Mode {
    pub fn access(&self) -> Access {
        self.access
    }

    /// True for `+` modes.
    pub fn is_update(&self) -> bool {
        self.update
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// True when `t` was given. Handles are byte streams either way: no
    /// newline translation or decoding is applied.
    pub fn is_text(&self) -> bool {
        self.text
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            read: self.update || self.access == Access::Read,
            write: self.update || self.access != Access::Read,
        }
    }

    /// Whether this mode goes through a staging file.
    ///
    /// Plain reads cannot corrupt the target and exclusive creation is
    /// already atomic, so both open the real path directly.
    pub fn is_staged(&self) -> bool {
        match self.access {
            Access::Read => self.update,
            Access::Write | Access::Append => true,
            Access::Exclusive => false,
        }
    }

    pub(crate) fn prepopulate(&self) -> Prepopulate {
        match self.access {
            Access::Read => Prepopulate::Required,
            Access::Append => Prepopulate::IfPresent,
            Access::Write | Access::Exclusive => Prepopulate::Nothing,
        }
    }
}

impl FromStr for Mode {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: String| StageError::InvalidMode(s.to_string(), reason);

        let mut access = None;
        let mut update = false;
        let mut binary = false;
        let mut text = false;

        for c in s.chars() {
            match c {
                'r' | 'w' | 'a' | 'x' => {
                    let kind = match c {
                        'r' => Access::Read,
                        'w' => Access::Write,
                        'a' => Access::Append,
                        _ => Access::Exclusive,
                    };
                    if access.replace(kind).is_some() {
                        return Err(invalid("must have exactly one of r, w, a, x".into()));
                    }
                }
                '+' if !update => update = true,
                'b' if !binary => binary = true,
                't' if !text => text = true,
                _ => return Err(invalid(format!("unexpected or repeated character '{}'", c))),
            }
        }

        if binary && text {
            return Err(invalid("cannot be both binary and text".into()));
        }

        let access = access.ok_or_else(|| invalid("must have exactly one of r, w, a, x".into()))?;

        Ok(Self {
            access,
            update,
            binary,
            text,
        })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = match self.access {
            Access::Read => 'r',
            Access::Write => 'w',
            Access::Append => 'a',
            Access::Exclusive => 'x',
        };
        write!(f, "{}", access)?;
        if self.update {
            f.write_str("+")?;
        }
        if self.binary {
            f.write_str("b")?;
        }
        if self.text {
            f.write_str("t")?;
        }
        Ok(())
    }
}
