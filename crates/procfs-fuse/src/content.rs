//! Helpers for handlers whose content is rendered as a whole and then sliced.

use crate::context::ProcContext;
use crate::error::Result;
use crate::route::{Captures, ReadHandler};

/// Return the `size`-byte window of `content` starting at `offset`. Reading
/// at or past the end yields nothing.
pub fn slice_content(content: &[u8], size: usize, offset: u64) -> Vec<u8> {
    let len = content.len() as u64;
    if offset >= len {
        return Vec::new();
    }
    let start = offset as usize;
    let end = start + size.min(content.len() - start);
    content[start..end].to_vec()
}

/// Renders the full content of a file.
pub type RenderFn = fn(&ProcContext, &Captures) -> Result<String>;

/// Read handler that renders the full text on every call and returns the
/// requested window of it.
#[derive(Clone, Copy)]
pub struct Rendered(pub RenderFn);

impl ReadHandler for Rendered {
    fn read(
        &self,
        ctx: &ProcContext,
        args: &Captures,
        size: usize,
        offset: u64,
    ) -> Result<Vec<u8>> {
        let text = (self.0)(ctx, args)?;
        Ok(slice_content(text.as_bytes(), size, offset))
    }
}

/// Format a duration the way per-task times are shown: `S.UUUUUUs`.
pub fn seconds_micros(d: std::time::Duration) -> String {
    format!("{}.{:06}s", d.as_secs(), d.subsec_micros())
}
