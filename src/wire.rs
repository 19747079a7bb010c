//! Wire codec (spec §6): encodes and decodes the five `<request>` element
//! shapes the transport collaborator carries. Hand-rolled rather than built
//! on a general XML crate — the grammar is five fixed, flat element shapes,
//! never nested markup, so a small dedicated parser is both simpler and
//! more auditable than pulling in a DOM/SAX dependency for it (see
//! DESIGN.md).
//!
//! ```text
//! <request user="U" time="V"><insert pos="P">…payload…</insert></request>
//! <request user="U" time="V"><delete pos="P" len="L"/></request>
//! <request user="U" time="V"><undo target="T"/></request>
//! <request user="U" time="V"><redo target="T"/></request>
//! <request user="U" time="V"><move caret="C" selection="S"/></request>
//! ```
//!
//! `target` on `<undo>`/`<redo>` is a supplement beyond the literal spec
//! grammar: this crate resolves Undo/Redo back-links by explicit log offset
//! (spec §4.3 invariant 2) rather than by each peer mirroring the issuing
//! site's grouping state, so the offset has to travel on the wire somehow.

use crate::error::{OtError, Result};
use crate::id::UserId;
use crate::op::text::TextChunk;
use crate::op::Operation;
use crate::request::{Request, RequestKind};
use crate::vector::StateVector;

/// Renders `req` as a `<request>` element (spec §6).
pub fn encode_request(req: &Request) -> String {
    let user = req.user_id.as_u32();
    let time = req.vector.serialize();
    let body = match (&req.kind, &req.operation) {
        (RequestKind::Do, Operation::Insert { pos, payload }) => {
            format!("<insert pos=\"{pos}\">{}</insert>", escape(&payload.to_plain_string()))
        }
        (RequestKind::Do, Operation::Delete { pos, len }) => format!("<delete pos=\"{pos}\" len=\"{len}\"/>"),
        (RequestKind::Do, Operation::ReversibleDelete { pos, payload }) => {
            format!("<delete pos=\"{pos}\" len=\"{}\"/>", payload.len_chars())
        }
        (RequestKind::Do, Operation::Move { from, to, .. }) => {
            format!("<move caret=\"{to}\" selection=\"{from}\"/>")
        }
        (RequestKind::Do, Operation::NoOp) => "<delete pos=\"0\" len=\"0\"/>".to_string(),
        (RequestKind::Do, Operation::Split(..)) => {
            // A Split only ever arises from `transform`, internal to a
            // session; nothing a peer issues directly ever needs to encode
            // one. Encoding it as a no-op delete keeps `encode_request`
            // total without fabricating wire syntax the grammar doesn't
            // have.
            "<delete pos=\"0\" len=\"0\"/>".to_string()
        }
        (RequestKind::Undo, _) => format!(
            "<undo target=\"{}\"/>",
            req.target_index.expect("Undo request always carries target_index")
        ),
        (RequestKind::Redo, _) => format!(
            "<redo target=\"{}\"/>",
            req.target_index.expect("Redo request always carries target_index")
        ),
    };
    format!("<request user=\"{user}\" time=\"{time}\">{body}</request>")
}

/// One parsed element: its attribute substring (raw `key="val"` text) and,
/// for a non-self-closing element, its body content.
struct Tag<'a> {
    attrs: &'a str,
    body: Option<&'a str>,
}

/// Parses the single top-level element `<name ...>` / `<name .../>` at the
/// start of `s`. The grammar here never nests an element inside another of
/// the same name, so the first matching close tag is always *the* close
/// tag.
fn parse_tag<'a>(s: &'a str, name: &str) -> Result<Tag<'a>> {
    let open = format!("<{name}");
    if !s.starts_with(&open) {
        return Err(OtError::UnknownOperation(format!("expected <{name}>, got {s:?}")));
    }
    let gt = s.find('>').ok_or_else(|| OtError::UnknownOperation("unterminated tag".into()))?;
    if s.as_bytes()[gt - 1] == b'/' {
        return Ok(Tag { attrs: &s[open.len()..gt - 1], body: None });
    }
    let close = format!("</{name}>");
    let body_start = gt + 1;
    let body_end = s[body_start..]
        .find(&close)
        .map(|i| body_start + i)
        .ok_or_else(|| OtError::UnknownOperation(format!("missing {close}")))?;
    Ok(Tag { attrs: &s[open.len()..gt], body: Some(&s[body_start..body_end]) })
}

/// Parses the single top-level element `<name ...>`/`<name .../>` at the
/// start of `s`, returning `None` if `s` doesn't start with that tag (used
/// to try each of the alternative child element shapes in turn).
fn try_parse_tag<'a>(s: &'a str, name: &str) -> Option<Tag<'a>> {
    if s.starts_with(&format!("<{name}")) {
        parse_tag(s, name).ok()
    } else {
        None
    }
}

/// Parses a `<request>` element back into a [`Request`].
pub fn decode_request(xml: &str) -> Result<Request> {
    let outer = parse_tag(xml.trim(), "request")?;
    let user = UserId(parse_attr(outer.attrs, "user")?);
    let time = attr(outer.attrs, "time").ok_or_else(|| OtError::UnknownOperation("<request> missing time attribute".into()))?;
    let vector = StateVector::parse(&time)?;
    let body = outer.body.unwrap_or("").trim();

    if let Some(t) = try_parse_tag(body, "delete") {
        let pos = parse_attr(t.attrs, "pos")?;
        let len = parse_attr(t.attrs, "len")?;
        return Ok(Request::do_request(user, vector, Operation::Delete { pos, len }));
    }
    if let Some(t) = try_parse_tag(body, "move") {
        let caret = parse_attr(t.attrs, "caret")?;
        let selection = parse_attr(t.attrs, "selection")?;
        return Ok(Request::do_request(user, vector, Operation::Move { user, from: selection, to: caret }));
    }
    if let Some(t) = try_parse_tag(body, "undo") {
        let target = parse_attr(t.attrs, "target")?;
        return Ok(Request::undo_request(user, vector, Operation::NoOp, target));
    }
    if let Some(t) = try_parse_tag(body, "redo") {
        let target = parse_attr(t.attrs, "target")?;
        return Ok(Request::redo_request(user, vector, Operation::NoOp, target));
    }
    if let Some(t) = try_parse_tag(body, "insert") {
        let pos = parse_attr(t.attrs, "pos")?;
        let text = unescape(t.body.unwrap_or(""));
        return Ok(Request::do_request(user, vector, Operation::Insert { pos, payload: TextChunk::single(user, text) }));
    }
    Err(OtError::UnknownOperation(format!("unrecognized request body: {body:?}")))
}

fn attr(raw: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=\"");
    let start = raw.find(&needle)? + needle.len();
    let end = raw[start..].find('"')? + start;
    Some(raw[start..end].to_string())
}

fn parse_attr<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    attr(raw, key)
        .ok_or_else(|| OtError::UnknownOperation(format!("missing attribute {key}")))?
        .parse()
        .map_err(|_| OtError::UnknownOperation(format!("attribute {key} not numeric")))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&quot;", "\"").replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec1(n: u32) -> StateVector {
        let mut v = StateVector::new();
        v.set(UserId(1), n);
        v
    }

    #[test]
    fn insert_roundtrips() {
        let req = Request::do_request(UserId(1), vec1(0), Operation::Insert { pos: 2, payload: TextChunk::single(UserId(1), "hi") });
        let xml = encode_request(&req);
        assert!(xml.contains("<insert pos=\"2\">hi</insert>"));
        let back = decode_request(&xml).unwrap();
        assert_eq!(back.user_id, req.user_id);
        assert_eq!(back.vector, req.vector);
        assert_eq!(back.operation, req.operation);
    }

    #[test]
    fn delete_roundtrips_without_payload() {
        let req = Request::do_request(UserId(2), vec1(1), Operation::Delete { pos: 0, len: 3 });
        let xml = encode_request(&req);
        assert_eq!(xml, "<request user=\"2\" time=\"1:1\"><delete pos=\"0\" len=\"3\"/></request>");
        let back = decode_request(&xml).unwrap();
        assert_eq!(back.operation, Operation::Delete { pos: 0, len: 3 });
    }

    #[test]
    fn undo_roundtrips_with_target() {
        let req = Request::undo_request(UserId(1), vec1(2), Operation::NoOp, 0);
        let xml = encode_request(&req);
        let back = decode_request(&xml).unwrap();
        assert_eq!(back.kind, RequestKind::Undo);
        assert_eq!(back.target_index, Some(0));
    }

    #[test]
    fn escapes_special_characters_in_insert_text() {
        let req = Request::do_request(UserId(1), vec1(0), Operation::Insert { pos: 0, payload: TextChunk::single(UserId(1), "<a & b>") });
        let xml = encode_request(&req);
        let back = decode_request(&xml).unwrap();
        match back.operation {
            Operation::Insert { payload, .. } => assert_eq!(payload.to_plain_string(), "<a & b>"),
            other => panic!("expected Insert, got {other:?}"),
        }
    }
}
