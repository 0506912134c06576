//! Owner-side serving on X11: the post-fork event loop answering conversion
//! requests for the written payload until another client claims CLIPBOARD.

use std::cmp;

use log::{debug, warn};
use xcb::{Atom, Window};

use super::Context;
use crate::data::ClipboardFormat;

/// An INCR stream in flight towards one `(window, property)` pair.
///
/// Outstanding streams are few, so a plain list with linear scans does the
/// job of anything fancier.
struct IncrRequest {
    window: Window,
    property: Atom,
    target: Atom,
    cursor: usize,
}

/// The slice of the payload a stream at `cursor` sends next.
pub(super) fn next_chunk(data: &[u8], cursor: usize, chunk_size: usize) -> &[u8] {
    let len = cmp::min(chunk_size, data.len() - cursor);
    &data[cursor..cursor + len]
}

/// Advance the stream addressed by `(window, property)`, if one is in
/// flight. Returns the target atom and the chunk to put on the wire; an
/// empty chunk is the terminator, and its stream is dropped from the list
/// the moment it is handed out. Streams to other requestors are untouched.
fn advance_stream<'a>(
    pending: &mut Vec<IncrRequest>,
    window: Window,
    property: Atom,
    data: &'a [u8],
    chunk_size: usize,
) -> Option<(Atom, &'a [u8])> {
    let index = pending
        .iter()
        .position(|stream| stream.window == window && stream.property == property)?;
    let stream = &mut pending[index];
    let chunk = next_chunk(data, stream.cursor, chunk_size);
    stream.cursor += chunk.len();
    let target = stream.target;
    if chunk.is_empty() {
        pending.remove(index);
    }
    Some((target, chunk))
}

/// Run the owner loop. Returns the child's exit code: 0 once another client
/// takes the selection over, 1 if the connection dies under us.
pub(super) fn run(ctx: &Context, data: &[u8], format: ClipboardFormat) -> i32 {
    let mut pending: Vec<IncrRequest> = Vec::new();
    loop {
        let event = match ctx.connection.wait_for_event() {
            Some(event) => event,
            None => return 1,
        };
        match event.response_type() & !0x80 {
            xcb::SELECTION_CLEAR => {
                let clear: &xcb::SelectionClearEvent = unsafe { xcb::cast_event(&event) };
                if clear.selection() == ctx.atoms.clipboard {
                    debug!("selection taken over, serving done");
                    return 0;
                }
            }
            xcb::SELECTION_REQUEST => {
                let request: &xcb::SelectionRequestEvent = unsafe { xcb::cast_event(&event) };
                handle_request(ctx, data, format, request, &mut pending);
            }
            xcb::PROPERTY_NOTIFY => {
                let notify: &xcb::PropertyNotifyEvent = unsafe { xcb::cast_event(&event) };
                if notify.state() != xcb::PROPERTY_DELETE as u8 {
                    continue;
                }
                // the requestor deleted its property: it is ready for more
                if let Some((target, chunk)) = advance_stream(
                    &mut pending,
                    notify.window(),
                    notify.atom(),
                    data,
                    ctx.chunk_size,
                ) {
                    xcb::change_property(
                        &ctx.connection,
                        xcb::PROP_MODE_REPLACE as u8,
                        notify.window(),
                        notify.atom(),
                        target,
                        8,
                        chunk,
                    );
                    ctx.connection.flush();
                    if chunk.is_empty() {
                        debug!("INCR transfer to window {} complete", notify.window());
                    }
                }
            }
            _ => (),
        }
    }
}

fn handle_request(
    ctx: &Context,
    data: &[u8],
    format: ClipboardFormat,
    request: &xcb::SelectionRequestEvent,
    pending: &mut Vec<IncrRequest>,
) {
    let mut property = request.property();
    // obsolete requestors may not name a property; ICCCM says to use the
    // target in that case
    if property == xcb::ATOM_NONE {
        property = request.target();
    }

    if request.target() == ctx.atoms.targets {
        let targets = ctx.atoms.advertised_targets(format);
        xcb::change_property(
            &ctx.connection,
            xcb::PROP_MODE_REPLACE as u8,
            request.requestor(),
            property,
            xcb::ATOM_ATOM,
            32,
            &targets,
        );
    } else if !ctx.atoms.advertised_targets(format).contains(&request.target()) {
        warn!("refusing conversion to unsupported target {}", request.target());
        property = xcb::ATOM_NONE;
    } else if data.len() <= ctx.chunk_size {
        xcb::change_property(
            &ctx.connection,
            xcb::PROP_MODE_REPLACE as u8,
            request.requestor(),
            property,
            request.target(),
            8,
            data,
        );
    } else {
        // payload exceeds one request: announce an INCR stream and feed it
        // chunk by chunk as the requestor deletes the property
        debug!(
            "starting INCR transfer of {} bytes to window {}",
            data.len(),
            request.requestor()
        );
        xcb::change_window_attributes(
            &ctx.connection,
            request.requestor(),
            &[(xcb::CW_EVENT_MASK, xcb::EVENT_MASK_PROPERTY_CHANGE)],
        );
        xcb::change_property(
            &ctx.connection,
            xcb::PROP_MODE_REPLACE as u8,
            request.requestor(),
            property,
            ctx.atoms.incr,
            32,
            &[data.len() as u32],
        );
        pending.push(IncrRequest {
            window: request.requestor(),
            property,
            target: request.target(),
            cursor: 0,
        });
    }

    xcb::send_event(
        &ctx.connection,
        false,
        request.requestor(),
        0,
        &xcb::SelectionNotifyEvent::new(
            request.time(),
            request.requestor(),
            request.selection(),
            request.target(),
            property,
        ),
    );
    ctx.connection.flush();
}

#[cfg(test)]
mod tests {
    use super::{advance_stream, next_chunk, IncrRequest};

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn stream(window: u32, property: u32) -> IncrRequest {
        IncrRequest {
            window,
            property,
            target: 99,
            cursor: 0,
        }
    }

    /// Pump one stream to its terminator, collecting what went on the wire.
    fn drain(
        pending: &mut Vec<IncrRequest>,
        window: u32,
        property: u32,
        data: &[u8],
        chunk_size: usize,
    ) -> Vec<u8> {
        let mut sent = Vec::new();
        loop {
            let (target, chunk) = advance_stream(pending, window, property, data, chunk_size)
                .expect("stream should be in flight");
            assert_eq!(target, 99);
            if chunk.is_empty() {
                return sent;
            }
            sent.extend_from_slice(chunk);
        }
    }

    #[test]
    fn payload_of_exactly_one_chunk() {
        let data = vec![7u8; 4096];
        assert_eq!(next_chunk(&data, 0, 4096).len(), 4096);
        assert_eq!(next_chunk(&data, 4096, 4096).len(), 0);
    }

    #[test]
    fn payload_one_byte_over() {
        let data = vec![7u8; 4097];
        assert_eq!(next_chunk(&data, 0, 4096).len(), 4096);
        assert_eq!(next_chunk(&data, 4096, 4096).len(), 1);
        assert_eq!(next_chunk(&data, 4097, 4096).len(), 0);
    }

    #[test]
    fn chunks_reassemble_to_the_source() {
        let data = payload(100_000);
        let mut cursor = 0;
        let mut rebuilt = Vec::new();
        loop {
            let chunk = next_chunk(&data, cursor, 4096);
            if chunk.is_empty() {
                break;
            }
            rebuilt.extend_from_slice(chunk);
            cursor += chunk.len();
        }
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn streams_are_keyed_by_window_and_property() {
        let data = payload(10);
        let mut pending = vec![stream(1, 10)];
        assert!(advance_stream(&mut pending, 2, 10, &data, 4).is_none());
        assert!(advance_stream(&mut pending, 1, 11, &data, 4).is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn finished_stream_is_dropped_and_the_other_keeps_going() {
        let data = payload(10_000);
        let mut pending = vec![stream(1, 10), stream(2, 20)];

        assert_eq!(drain(&mut pending, 1, 10, &data, 4096), data);
        assert_eq!(pending.len(), 1);

        // the survivor still serves from its own cursor, from the start
        assert_eq!(drain(&mut pending, 2, 20, &data, 4096), data);
        assert!(pending.is_empty());
    }

    #[test]
    fn interleaved_streams_do_not_crosstalk() {
        let data = payload(20_000);
        let mut pending = vec![stream(1, 10), stream(2, 20)];
        let mut first = Vec::new();
        let mut second = Vec::new();
        let mut first_done = false;
        let mut second_done = false;
        // uneven chunk sizes make the streams finish in different rounds
        while !(first_done && second_done) {
            if !first_done {
                let (_, chunk) = advance_stream(&mut pending, 1, 10, &data, 4096).unwrap();
                if chunk.is_empty() {
                    first_done = true;
                } else {
                    first.extend_from_slice(chunk);
                }
            }
            if !second_done {
                let (_, chunk) = advance_stream(&mut pending, 2, 20, &data, 1500).unwrap();
                if chunk.is_empty() {
                    second_done = true;
                } else {
                    second.extend_from_slice(chunk);
                }
            }
        }
        assert_eq!(first, data);
        assert_eq!(second, data);
        assert!(pending.is_empty());
    }
}
