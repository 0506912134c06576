//! X11 clipboard backend.
//!
//! Implements both sides of the ICCCM selection protocol on the CLIPBOARD
//! selection: the requestor role for reads (including chunked INCR
//! transfers) and the owner role for writes. An unmapped 1x1 proxy window is
//! the endpoint for all selection traffic.
//!
//! Ownership outlives the writing process: `write` forks, the child inherits
//! the display connection and answers conversion requests until a
//! `SelectionClear` tells it another client took over. The parent leaves the
//! handed-off connection untouched and reconnects for its next operation.

mod atoms;
mod serve;

use std::cmp;
use std::mem;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use nix::unistd::{self, ForkResult};
use xcb::{Atom, Window};

use crate::daemon;
use crate::data::{ClipboardData, ClipboardFormat, X11_AUTO_PRIORITY};
use crate::error::{Error, Result};
use atoms::Atoms;

/// How long the selection owner gets to answer a conversion request.
const CONVERT_TIMEOUT: Duration = Duration::from_secs(1);
/// How long a whole INCR stream may take.
const INCR_TIMEOUT: Duration = Duration::from_secs(5);
/// Sleep between event-queue polls while waiting on the owner.
const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Never chunk below this, however small the server's request limit is.
const MIN_CHUNK_SIZE: usize = 4096;

/// A quarter of the server's request limit per chunk leaves ample room for
/// the request headers around the payload.
fn chunk_size_for(max_request_bytes: usize) -> usize {
    cmp::max(max_request_bytes / 4, MIN_CHUNK_SIZE)
}

/// Fold one property read into the running INCR buffer. True means the
/// zero-length terminator arrived and the transfer is complete.
fn accept_chunk(buffer: &mut Vec<u8>, chunk: &[u8]) -> Result<bool> {
    if chunk.is_empty() {
        return Ok(true);
    }
    buffer.try_reserve(chunk.len())?;
    buffer.extend_from_slice(chunk);
    Ok(false)
}

/// One display connection with its proxy window and interned atoms.
struct Context {
    connection: xcb::Connection,
    window: Window,
    atoms: Atoms,
    chunk_size: usize,
}

impl Context {
    fn connect() -> Result<Context> {
        let (connection, screen_num) = xcb::Connection::connect(None).map_err(Error::init)?;
        let window = connection.generate_id();
        {
            let setup = connection.get_setup();
            let screen = setup
                .roots()
                .nth(screen_num as usize)
                .ok_or_else(|| Error::InitializationFailed("display has no such screen".to_owned()))?;
            xcb::create_window(
                &connection,
                xcb::COPY_FROM_PARENT as u8,
                window,
                screen.root(),
                0,
                0,
                1,
                1,
                0,
                xcb::WINDOW_CLASS_INPUT_OUTPUT as u16,
                screen.root_visual(),
                &[(
                    xcb::CW_EVENT_MASK,
                    xcb::EVENT_MASK_STRUCTURE_NOTIFY | xcb::EVENT_MASK_PROPERTY_CHANGE,
                )],
            );
            connection.flush();
        }
        let atoms = Atoms::intern_all(&connection)?;
        let max_request_bytes = connection.get_maximum_request_length() as usize * 4;
        let chunk_size = chunk_size_for(max_request_bytes);
        debug!("x11 proxy window {} ready, chunk size {}", window, chunk_size);
        Ok(Context {
            connection,
            window,
            atoms,
            chunk_size,
        })
    }

    fn selection_owner(&self) -> Result<Window> {
        xcb::get_selection_owner(&self.connection, self.atoms.clipboard)
            .get_reply()
            .map(|reply| reply.owner())
            .map_err(Error::read)
    }

    /// Wait for the `SelectionNotify` answering our conversion request,
    /// ignoring answers addressed to other windows.
    fn wait_selection_notify(&self, deadline: Instant) -> Result<(Atom, Atom)> {
        loop {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            let event = match self.connection.poll_for_event() {
                Some(event) => event,
                None => {
                    self.connection.has_error().map_err(Error::read)?;
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
            };
            if event.response_type() & !0x80 == xcb::SELECTION_NOTIFY {
                let notify: &xcb::SelectionNotifyEvent = unsafe { xcb::cast_event(&event) };
                if notify.requestor() != self.window {
                    continue;
                }
                return Ok((notify.property(), notify.target()));
            }
        }
    }

    /// Convert the CLIPBOARD selection to `target` and collect the answer,
    /// following an INCR handoff when the owner starts one.
    ///
    /// Returns the payload and the atom describing its actual type. For INCR
    /// streams that is the requested target: the stream is typed by what we
    /// asked for, not by the `INCR` marker of the signalling property.
    fn convert(&self, target: Atom) -> Result<(Vec<u8>, Atom)> {
        xcb::convert_selection(
            &self.connection,
            self.window,
            self.atoms.clipboard,
            target,
            self.atoms.property,
            xcb::CURRENT_TIME,
        );
        self.connection.flush();

        let (property, _) = self.wait_selection_notify(Instant::now() + CONVERT_TIMEOUT)?;
        if property == xcb::ATOM_NONE {
            return Err(Error::NoData);
        }

        // zero-length probe: type without consuming the property
        let probe = xcb::get_property(
            &self.connection,
            false,
            self.window,
            self.atoms.property,
            xcb::ATOM_NONE,
            0,
            0,
        )
        .get_reply()
        .map_err(Error::read)?;

        if probe.type_() == self.atoms.incr {
            let bytes = self.fetch_incr()?;
            return Ok((bytes, target));
        }

        let reply = xcb::get_property(
            &self.connection,
            true,
            self.window,
            self.atoms.property,
            xcb::ATOM_NONE,
            0,
            u32::MAX / 4,
        )
        .get_reply()
        .map_err(Error::read)?;
        self.connection.flush();
        let value: &[u8] = reply.value();
        let mut bytes = Vec::new();
        bytes.try_reserve(value.len())?;
        bytes.extend_from_slice(value);
        Ok((bytes, reply.type_()))
    }

    /// Collect an INCR stream: ack the signalling property, then append each
    /// `PropertyNotify`-announced chunk until a zero-length one ends it.
    fn fetch_incr(&self) -> Result<Vec<u8>> {
        debug!("owner started an INCR transfer");
        // deleting the INCR property tells the owner to start streaming
        xcb::delete_property(&self.connection, self.window, self.atoms.property);
        self.connection.flush();

        let deadline = Instant::now() + INCR_TIMEOUT;
        let mut bytes = Vec::new();
        loop {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            let event = match self.connection.poll_for_event() {
                Some(event) => event,
                None => {
                    self.connection.has_error().map_err(Error::read)?;
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
            };
            if event.response_type() & !0x80 != xcb::PROPERTY_NOTIFY {
                continue;
            }
            let notify: &xcb::PropertyNotifyEvent = unsafe { xcb::cast_event(&event) };
            if notify.window() != self.window
                || notify.atom() != self.atoms.property
                || notify.state() != xcb::PROPERTY_NEW_VALUE as u8
            {
                continue;
            }

            // reading with delete acknowledges the chunk and unblocks the owner
            let reply = xcb::get_property(
                &self.connection,
                true,
                self.window,
                self.atoms.property,
                xcb::ATOM_NONE,
                0,
                u32::MAX / 4,
            )
            .get_reply()
            .map_err(Error::read)?;
            self.connection.flush();
            let value: &[u8] = reply.value();
            if accept_chunk(&mut bytes, value)? {
                debug!("INCR transfer complete, {} bytes", bytes.len());
                return Ok(bytes);
            }
        }
    }

    /// Ask the owner which targets it can produce.
    fn fetch_targets(&self) -> Result<Vec<Atom>> {
        xcb::convert_selection(
            &self.connection,
            self.window,
            self.atoms.clipboard,
            self.atoms.targets,
            self.atoms.property,
            xcb::CURRENT_TIME,
        );
        self.connection.flush();

        let (property, _) = self.wait_selection_notify(Instant::now() + CONVERT_TIMEOUT)?;
        if property == xcb::ATOM_NONE {
            return Err(Error::NoData);
        }
        let reply = xcb::get_property(
            &self.connection,
            true,
            self.window,
            self.atoms.property,
            xcb::ATOM_NONE,
            0,
            u32::MAX / 4,
        )
        .get_reply()
        .map_err(Error::read)?;
        self.connection.flush();
        Ok(reply.value::<Atom>().to_vec())
    }
}

/// What the forked serving child is holding on our behalf.
struct OwnedSelection {
    /// The proxy window of the handed-off connection; the child answers as
    /// this window until it is cleared.
    window: Window,
    format: ClipboardFormat,
    data: Vec<u8>,
}

pub struct X11Clipboard {
    ctx: Option<Context>,
    owned: Option<OwnedSelection>,
}

impl X11Clipboard {
    pub fn new() -> Result<X11Clipboard> {
        Ok(X11Clipboard {
            ctx: Some(Context::connect()?),
            owned: None,
        })
    }

    /// The live connection, re-established when the previous one was handed
    /// to a serving child.
    fn ctx(&mut self) -> Result<&Context> {
        if self.ctx.is_none() {
            self.ctx = Some(Context::connect()?);
        }
        Ok(self.ctx.as_ref().unwrap())
    }

    /// Check who owns CLIPBOARD; serve from our cache while that is still
    /// our forked child, drop the cache once somebody else took over.
    fn cached_read(&mut self) -> Result<Option<&OwnedSelection>> {
        let owner = self.ctx()?.selection_owner()?;
        if owner == xcb::NONE {
            self.owned = None;
            return Err(Error::NoData);
        }
        match &self.owned {
            Some(owned) if owned.window == owner => Ok(self.owned.as_ref()),
            _ => {
                self.owned = None;
                Ok(None)
            }
        }
    }

    pub fn read(&mut self, format: ClipboardFormat) -> Result<ClipboardData> {
        if let Some(owned) = self.cached_read()? {
            return if owned.format == format {
                ClipboardData::new(owned.data.clone(), format)
            } else {
                Err(Error::InvalidData)
            };
        }
        let ctx = self.ctx.as_ref().expect("connected by cached_read");
        let target = ctx.atoms.canonical_target(format);
        let (bytes, type_atom) = ctx.convert(target)?;
        if bytes.is_empty() {
            return Err(Error::NoData);
        }
        ClipboardData::new(bytes, ctx.atoms.format_of(type_atom))
    }

    /// Negotiate the best offered target through TARGETS, then read it.
    pub fn read_best(&mut self) -> Result<ClipboardData> {
        if let Some(owned) = self.cached_read()? {
            return ClipboardData::new(owned.data.clone(), owned.format);
        }
        let ctx = self.ctx.as_ref().expect("connected by cached_read");
        let offered = ctx.fetch_targets()?;
        for format in X11_AUTO_PRIORITY.iter().copied() {
            for target in ctx.atoms.preferred_targets(format) {
                if offered.contains(&target) {
                    debug!("negotiated target {} for {:?}", target, format);
                    let (bytes, type_atom) = ctx.convert(target)?;
                    if bytes.is_empty() {
                        return Err(Error::NoData);
                    }
                    return ClipboardData::new(bytes, ctx.atoms.format_of(type_atom));
                }
            }
        }
        Err(Error::NoData)
    }

    pub fn available_formats(&mut self) -> Result<Vec<ClipboardFormat>> {
        match self.cached_read() {
            Ok(Some(owned)) => return Ok(vec![owned.format]),
            Ok(None) => {}
            Err(Error::NoData) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        }
        let ctx = self.ctx.as_ref().expect("connected by cached_read");
        let targets = ctx.fetch_targets()?;
        let mut formats = Vec::new();
        for atom in targets {
            if let Some(format) = ctx.atoms.format_of_target(atom) {
                if !formats.contains(&format) {
                    formats.push(format);
                }
            }
        }
        Ok(formats)
    }

    pub fn write(&mut self, bytes: &[u8], format: ClipboardFormat) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::NoData);
        }
        self.ctx()?;
        let ctx = self.ctx.take().expect("connected above");

        xcb::set_selection_owner(&ctx.connection, ctx.window, ctx.atoms.clipboard, xcb::CURRENT_TIME);
        ctx.connection.flush();
        let owner = xcb::get_selection_owner(&ctx.connection, ctx.atoms.clipboard)
            .get_reply()
            .map_err(Error::write)?
            .owner();
        if owner != ctx.window {
            self.ctx = Some(ctx);
            return Err(Error::WriteFailed(
                "server did not accept us as selection owner".to_owned(),
            ));
        }

        let data = bytes.to_vec();
        match unsafe { unistd::fork() }.map_err(Error::write)? {
            ForkResult::Child => {
                daemon::detach();
                process::exit(serve::run(&ctx, &data, format));
            }
            ForkResult::Parent { child } => {
                debug!("selection now served by pid {}", child);
                let window = ctx.window;
                // the child answers with this connection from now on; our
                // copy must neither be used nor torn down
                mem::forget(ctx);
                self.owned = Some(OwnedSelection { window, format, data });
                Ok(())
            }
        }
    }

    /// Give up ownership of CLIPBOARD and PRIMARY.
    pub fn clear(&mut self) -> Result<()> {
        self.owned = None;
        let ctx = self.ctx()?;
        xcb::set_selection_owner(&ctx.connection, xcb::NONE, ctx.atoms.clipboard, xcb::CURRENT_TIME);
        xcb::set_selection_owner(&ctx.connection, xcb::NONE, xcb::ATOM_PRIMARY, xcb::CURRENT_TIME);
        ctx.connection.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{accept_chunk, chunk_size_for, serve};

    #[test]
    fn chunk_is_a_quarter_of_the_request_limit() {
        assert_eq!(chunk_size_for(262_144), 65_536);
    }

    #[test]
    fn chunk_never_drops_below_the_floor() {
        assert_eq!(chunk_size_for(0), 4096);
        assert_eq!(chunk_size_for(8192), 4096);
        assert_eq!(chunk_size_for(16_384), 4096);
    }

    #[test]
    fn terminator_with_nothing_before_it() {
        let mut buffer = Vec::new();
        assert!(accept_chunk(&mut buffer, &[]).unwrap());
        assert!(buffer.is_empty());
    }

    #[test]
    fn chunks_accumulate_until_the_terminator() {
        let mut buffer = Vec::new();
        assert!(!accept_chunk(&mut buffer, b"ab").unwrap());
        assert!(!accept_chunk(&mut buffer, b"cd").unwrap());
        assert!(accept_chunk(&mut buffer, &[]).unwrap());
        assert_eq!(buffer, b"abcd");
    }

    #[test]
    fn reader_rebuilds_the_writers_partitioning() {
        let data: Vec<u8> = (0..50_000).map(|i| (i % 241) as u8).collect();
        let mut buffer = Vec::new();
        let mut cursor = 0;
        loop {
            let chunk = serve::next_chunk(&data, cursor, 4096);
            cursor += chunk.len();
            if accept_chunk(&mut buffer, chunk).unwrap() {
                break;
            }
        }
        assert_eq!(buffer, data);
    }

    #[test]
    fn single_chunk_payload_round_trips() {
        // exactly one chunk on the wire, then the terminator
        let data = vec![5u8; 4096];
        let mut buffer = Vec::new();
        assert!(!accept_chunk(&mut buffer, serve::next_chunk(&data, 0, 4096)).unwrap());
        assert!(accept_chunk(&mut buffer, serve::next_chunk(&data, 4096, 4096)).unwrap());
        assert_eq!(buffer, data);
    }
}
