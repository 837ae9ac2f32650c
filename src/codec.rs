//! Message codec seam between the connection engine and CoT semantics.
//!
//! The engine never interprets message bodies beyond three questions: is
//! this a keepalive acknowledgment, is it a version announcement, or is it
//! traffic for the caller? [`Codec`] captures exactly that surface, plus
//! serialization in both directions and keepalive construction. The
//! default [`XmlCodec`] answers them with a minimal attribute scan over
//! the raw XML; richer CoT models can be plugged in without touching the
//! connection engine.

use chrono::{SecondsFormat, Utc};
use thiserror::Error;

/// Type marker carried by a peer keepalive acknowledgment.
pub const TYPE_PING_ACK: &str = "t-x-c-t-r";
/// Type marker carried by a peer version announcement.
pub const TYPE_VERSION: &str = "t-x-takp-v";
/// Type marker of an outbound keepalive.
pub const TYPE_PING: &str = "t-x-c-t";

/// Seconds a keepalive stays fresh before peers may discard it.
const PING_STALE_SECS: i64 = 20;

/// Failure to turn a raw extracted message into an event.
///
/// Decode failures are per-message and never fatal to the stream: the
/// connection logs them and keeps extracting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The text is not an `<event>` document.
    #[error("message is not a CoT event document")]
    NotAnEvent,
    /// The event open tag carries no `type` attribute.
    #[error("event is missing a type attribute")]
    MissingType,
}

/// How the connection engine should treat a decoded message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Keepalive acknowledgment: marks the session open, never forwarded.
    PingAck,
    /// Version announcement. Carries the reported version string when the
    /// required nested fields are present; without them the message is
    /// forwarded like any other.
    Version(Option<String>),
    /// Ordinary traffic, forwarded to the caller.
    Other,
}

/// Serialization and classification surface consumed by the connection.
///
/// Implementations must be cheap to call from the read loop; anything
/// heavier than attribute inspection belongs behind the forwarded event.
pub trait Codec: Send + Sync + 'static {
    /// Decoded message type handed to callers.
    type Event: Send + Sync + 'static;

    /// Decode one complete extracted message.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed input; the connection skips
    /// the message and continues with the rest of the read.
    fn decode(&self, raw: &str) -> Result<Self::Event, DecodeError>;

    /// Serialize an event to its wire form, without a trailing newline.
    fn encode(&self, event: &Self::Event) -> String;

    /// Classify a decoded event for internal consumption or forwarding.
    fn classify(&self, event: &Self::Event) -> Classification;

    /// Build an outbound keepalive event.
    fn keepalive(&self) -> Self::Event;
}

/// A decoded CoT event: the raw XML plus the type marker pulled from its
/// open tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CotEvent {
    xml: String,
    event_type: String,
}

impl CotEvent {
    /// Parse an event document, extracting its type marker.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotAnEvent`] when the text does not start
    /// with an `<event>` open tag, and [`DecodeError::MissingType`] when
    /// that tag has no `type` attribute.
    pub fn from_xml(xml: impl Into<String>) -> Result<Self, DecodeError> {
        let xml = xml.into();
        let tag = open_tag(&xml).ok_or(DecodeError::NotAnEvent)?;
        let event_type = attr_value(tag, "type")
            .ok_or(DecodeError::MissingType)?
            .to_owned();
        Ok(Self { xml, event_type })
    }

    /// Build a keepalive event stamped with the current time.
    #[must_use]
    pub fn ping() -> Self {
        let now = Utc::now();
        let time = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let stale = (now + chrono::Duration::seconds(PING_STALE_SECS))
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let xml = format!(
            "<event version=\"2.0\" uid=\"TAK-Ping\" type=\"{TYPE_PING}\" how=\"m-g\" \
             time=\"{time}\" start=\"{time}\" stale=\"{stale}\">\
             <point lat=\"0.0\" lon=\"0.0\" hae=\"0.0\" ce=\"9999999.0\" le=\"9999999.0\"/>\
             </event>"
        );
        Self {
            xml,
            event_type: TYPE_PING.to_owned(),
        }
    }

    /// Type marker from the event open tag.
    #[must_use]
    pub fn event_type(&self) -> &str { &self.event_type }

    /// `uid` attribute from the event open tag, when present.
    #[must_use]
    pub fn uid(&self) -> Option<&str> { open_tag(&self.xml).and_then(|tag| attr_value(tag, "uid")) }

    /// The raw XML document.
    #[must_use]
    pub fn as_xml(&self) -> &str { &self.xml }
}

/// Default codec: attribute-level inspection of raw CoT XML.
#[derive(Clone, Copy, Debug, Default)]
pub struct XmlCodec;

impl Codec for XmlCodec {
    type Event = CotEvent;

    fn decode(&self, raw: &str) -> Result<CotEvent, DecodeError> { CotEvent::from_xml(raw) }

    fn encode(&self, event: &CotEvent) -> String { event.xml.clone() }

    fn classify(&self, event: &CotEvent) -> Classification {
        match event.event_type() {
            TYPE_PING_ACK => Classification::PingAck,
            TYPE_VERSION => Classification::Version(server_version(&event.xml)),
            _ => Classification::Other,
        }
    }

    fn keepalive(&self) -> CotEvent { CotEvent::ping() }
}

/// Slice out the event open tag (or self-closing tag), `<` through `>`.
fn open_tag(xml: &str) -> Option<&str> {
    let rest = xml.trim_start();
    if !rest.starts_with("<event") {
        return None;
    }
    match rest.as_bytes().get("<event".len()) {
        Some(b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/') => {}
        _ => return None,
    }
    let end = tag_end(rest)?;
    Some(&rest[..end])
}

/// Offset just past the `>` closing the tag that starts at `tag[0]`,
/// honouring quoted attribute values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut in_quote: Option<u8> = None;
    for (at, b) in tag.bytes().enumerate() {
        match in_quote {
            Some(q) => {
                if b == q {
                    in_quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => in_quote = Some(b),
                b'>' => return Some(at + 1),
                _ => {}
            },
        }
    }
    None
}

/// Value of attribute `name` inside a single tag's text.
fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let bytes = tag.as_bytes();
    let mut from = 0;
    loop {
        let at = from + tag[from..].find(name)?;
        let after = at + name.len();
        // Whole attribute name, preceded by whitespace and followed by `=`.
        let bounded = at > 0
            && bytes[at - 1].is_ascii_whitespace()
            && bytes.get(after).is_some_and(|b| *b == b'=');
        if !bounded {
            from = at + 1;
            continue;
        }
        let quote = *bytes.get(after + 1)?;
        if quote != b'"' && quote != b'\'' {
            from = at + 1;
            continue;
        }
        let value_start = after + 2;
        let len = tag[value_start..].find(quote as char)?;
        return Some(&tag[value_start..value_start + len]);
    }
}

/// Version string from `detail/TakControl/TakServerVersionInfo`, when all
/// the required nesting is present.
fn server_version(xml: &str) -> Option<String> {
    let control = xml.find("<TakControl")?;
    let info = control + xml[control..].find("<TakServerVersionInfo")?;
    let tag_len = tag_end(&xml[info..])?;
    attr_value(&xml[info..info + tag_len], "serverVersion").map(str::to_owned)
}
