//! Mapping from raw notifications to [`ChangeEvent`]s.
//!
//! | raw op   | rule                                                        | emits                 |
//! |----------|-------------------------------------------------------------|-----------------------|
//! | `Attrib` | stat; gone -> as `Remove`, still there -> nothing            | `Deleted` or nothing  |
//! | `Remove` | unconditional                                               | `Deleted`             |
//! | `Rename` | unconditional                                               | `Deleted`             |
//! | `Write`  | stat; gone -> `Deleted`, shrank below a non-zero previous size -> `Truncated`, else `Modified` | one of the three |
//! | `Create` | ignored on an active watch                                  | nothing               |
//!
//! Truncation is only visible as a size regression between two `Write`
//! notifications. A truncate followed by an append past the old size before
//! the next notification is observed reads as `Modified`.

use crate::watcher::event::{ChangeEvent, RawOp};
use std::fs;
use std::io;
use std::path::Path;

/// Result of stat'ing the watched path.
#[derive(Debug)]
pub enum Stat {
    Exists { size: u64 },
    Missing,
    /// Anything other than "does not exist", e.g. a permission race.
    Failed(io::Error),
}

impl Stat {
    pub fn of(path: &Path) -> Stat {
        match fs::metadata(path) {
            Ok(meta) => Stat::Exists { size: meta.len() },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Stat::Missing,
            Err(e) => Stat::Failed(e),
        }
    }
}

#[derive(Debug)]
pub enum Decision {
    /// Deliver `event`. `size` is the freshly observed size when the rule
    /// stat'ed the file and found it.
    Emit {
        event: ChangeEvent,
        size: Option<u64>,
    },
    Ignore,
    /// The stat failed for a reason other than absence. Nothing is emitted
    /// and the next notification retries.
    Inconclusive(io::Error),
}

impl Decision {
    fn deleted() -> Self {
        Decision::Emit {
            event: ChangeEvent::Deleted,
            size: None,
        }
    }
}

/// Classifies one notification. `stat` is only called by the rules that
/// need a fresh stat.
pub fn classify(op: RawOp, previous_size: u64, stat: impl FnOnce() -> Stat) -> Decision {
    match op {
        RawOp::Attrib => match stat() {
            Stat::Missing => Decision::deleted(),
            Stat::Exists { .. } => Decision::Ignore,
            Stat::Failed(e) => Decision::Inconclusive(e),
        },
        RawOp::Remove | RawOp::Rename => Decision::deleted(),
        RawOp::Write => match stat() {
            Stat::Missing => Decision::deleted(),
            Stat::Failed(e) => Decision::Inconclusive(e),
            Stat::Exists { size } => {
                let event = if previous_size > 0 && previous_size > size {
                    ChangeEvent::Truncated
                } else {
                    ChangeEvent::Modified
                };
                Decision::Emit {
                    event,
                    size: Some(size),
                }
            }
        },
        RawOp::Create => Decision::Ignore,
    }
}
