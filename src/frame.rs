//! Frame extraction for the inbound CoT stream.
//!
//! TAK servers write concatenated `<event>` documents onto the socket with
//! no reliable separator, and a single read may carry half a message or
//! several whole ones. [`next_event`] finds the first complete event in an
//! accumulating buffer and hands back the remainder; callers loop it until
//! it reports that more bytes are needed.
//!
//! Extraction is an explicit tag scan rather than a regex: it matches the
//! `event` element name as a whole token (so `<events>` is never mistaken
//! for a delimiter), tracks nesting depth, recognizes the self-closing
//! form, and skips quoted attribute values so delimiter text inside an
//! attribute cannot terminate a match early.

use std::borrow::Cow;

const EVENT_NAME: &str = "event";

/// Result of a successful extraction: the first complete event and the
/// unconsumed text after it.
#[derive(Debug, PartialEq, Eq)]
pub struct EventSplit<'a> {
    /// The matched event document, open tag through close tag (or the
    /// self-closing tag).
    pub event: &'a str,
    /// Everything after the match, to be scanned again on the next call.
    pub remainder: &'a str,
}

/// Remove the stray control characters some peers inject into the stream.
///
/// Strips U+000B–U+001F and U+007F–U+009F; tab and newline survive. The
/// operation is idempotent and lossy only for those control characters;
/// message content is never altered. Boundary matching in [`next_event`]
/// assumes its input has been scrubbed.
#[must_use]
pub fn strip_control(input: &str) -> Cow<'_, str> {
    if input.chars().any(is_stripped_control) {
        Cow::Owned(input.chars().filter(|c| !is_stripped_control(*c)).collect())
    } else {
        Cow::Borrowed(input)
    }
}

fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{000B}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}

/// Extract the first complete `<event>` document from `input`.
///
/// Returns `None` when no complete event is present yet: a dangling open
/// tag, leading garbage with no open tag at all, or an empty buffer. The
/// caller must keep its accumulation untouched in that case and retry once
/// more bytes arrive. On success any garbage before the match is consumed
/// along with it; garbage after the match stays in the remainder.
///
/// The function is pure: calling it in a loop over the remainder drains a
/// multi-event read one event at a time, never spanning two events in a
/// single match.
///
/// # Examples
///
/// ```
/// use cotwire::frame::next_event;
///
/// let split = next_event("<event/><event uid='b'/>").expect("complete event");
/// assert_eq!(split.event, "<event/>");
/// assert_eq!(split.remainder, "<event uid='b'/>");
///
/// assert!(next_event("<event ><detail>").is_none());
/// ```
#[must_use]
pub fn next_event(input: &str) -> Option<EventSplit<'_>> {
    let start = find_event_open(input)?;
    let mut pos = start;
    let mut depth = 0usize;

    loop {
        let lt = pos + input[pos..].find('<')?;
        let tag = parse_tag(input, lt)?;
        pos = tag.end;
        if !tag.is_event {
            continue;
        }
        match tag.kind {
            TagKind::SelfClosing if depth == 0 => {
                return Some(split_at(input, start, tag.end));
            }
            // A nested self-closed event is already complete and does not
            // affect the depth of the enclosing one.
            TagKind::SelfClosing => {}
            TagKind::Open => depth += 1,
            TagKind::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(split_at(input, start, tag.end));
                }
            }
        }
    }
}

fn split_at(input: &str, start: usize, end: usize) -> EventSplit<'_> {
    EventSplit {
        event: &input[start..end],
        remainder: &input[end..],
    }
}

/// Locate the `<` of the first `<event` open tag, matching the element
/// name as a whole token.
fn find_event_open(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut from = 0;
    loop {
        let at = from + input[from..].find("<event")?;
        match bytes.get(at + 1 + EVENT_NAME.len()) {
            Some(b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/') => return Some(at),
            // `<events>` or another longer name sharing the prefix.
            Some(_) => from = at + 1,
            // Buffer ends inside the tag name; wait for more bytes.
            None => return None,
        }
    }
}

enum TagKind {
    Open,
    Close,
    SelfClosing,
}

struct Tag {
    /// Byte offset just past the terminating `>`.
    end: usize,
    is_event: bool,
    kind: TagKind,
}

/// Parse the tag starting at `input[lt] == '<'`, honouring quoted attribute
/// values. Returns `None` when the buffer ends before the tag does.
fn parse_tag(input: &str, lt: usize) -> Option<Tag> {
    let bytes = input.as_bytes();
    let after_lt = bytes.get(lt + 1)?;
    let (closing, name_start) = if *after_lt == b'/' {
        (true, lt + 2)
    } else {
        (false, lt + 1)
    };

    let mut name_end = name_start;
    while name_end < bytes.len() && is_name_byte(bytes[name_end]) {
        name_end += 1;
    }
    let is_event = &input[name_start..name_end] == EVENT_NAME;

    let mut in_quote: Option<u8> = None;
    let mut at = name_end;
    while at < bytes.len() {
        let b = bytes[at];
        match in_quote {
            Some(q) => {
                if b == q {
                    in_quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => in_quote = Some(b),
                b'>' => {
                    let self_closing = !closing && bytes[at - 1] == b'/';
                    let kind = if closing {
                        TagKind::Close
                    } else if self_closing {
                        TagKind::SelfClosing
                    } else {
                        TagKind::Open
                    };
                    return Some(Tag {
                        end: at + 1,
                        is_event,
                        kind,
                    });
                }
                _ => {}
            },
        }
        at += 1;
    }
    None
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':')
}
