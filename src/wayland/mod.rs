//! Wayland clipboard backend.
//!
//! Speaks the `data-control` protocol from wlroots when the compositor has
//! it, because data-control does not require surface focus. Compositors
//! without it get the core `wl_data_device` path instead.
//!
//! Writes survive the writing process: after the selection is set, a forked
//! child inherits the connection and keeps answering paste requests until
//! another client claims the clipboard. The parent never touches the
//! handed-off connection again and transparently reconnects for its next
//! operation.

mod device;
mod serve;

use std::cell::RefCell;
use std::fs::File;
use std::io::Read;
use std::mem;
use std::os::unix::io::FromRawFd;
use std::process;
use std::rc::Rc;

use log::debug;
use nix::unistd::{self, ForkResult};
use wayland_client::protocol::wl_data_device_manager::WlDataDeviceManager;
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::{global_filter, Display, EventQueue, GlobalManager, Main};
use wayland_protocols::wlr::unstable::data_control::v1::client::zwlr_data_control_manager_v1::ZwlrDataControlManagerV1;

use crate::daemon;
use crate::data::{choose_mime, offered_formats, ClipboardData, ClipboardFormat, WAYLAND_AUTO_PRIORITY};
use crate::error::{Error, Result};
use device::{DeviceFlavor, OfferFlavor, SelectionState};
use serve::{SourceFlavor, WriteContext};

/// A connected session: display, queue, the bound manager/device pair and
/// the listener-maintained selection state.
struct Connection {
    display: Display,
    queue: EventQueue,
    manager: ManagerFlavor,
    device: DeviceFlavor,
    state: Rc<RefCell<SelectionState>>,
}

/// Which data-device manager the compositor gave us.
enum ManagerFlavor {
    Wlr(Main<ZwlrDataControlManagerV1>),
    Standard(Main<WlDataDeviceManager>),
}

impl Connection {
    fn connect() -> Result<Connection> {
        let display = Display::connect_to_env().map_err(Error::init)?;
        let mut queue = display.create_event_queue();
        let attached = display.attach(queue.token());

        let seats: Rc<RefCell<Vec<Main<WlSeat>>>> = Rc::new(RefCell::new(Vec::new()));
        let seats2 = seats.clone();
        let globals = GlobalManager::new_with_cb(
            &attached,
            global_filter!([WlSeat, 2, move |seat: Main<WlSeat>, _: DispatchData| {
                seats2.borrow_mut().push(seat);
            }]),
        );
        queue
            .sync_roundtrip(&mut (), |_, _, _| {})
            .map_err(Error::init)?;

        let manager = match globals.instantiate_exact::<ZwlrDataControlManagerV1>(2) {
            Ok(manager) => {
                debug!("bound zwlr_data_control_manager_v1");
                ManagerFlavor::Wlr(manager)
            }
            Err(_) => match globals.instantiate_exact::<WlDataDeviceManager>(3) {
                Ok(manager) => {
                    debug!("no data-control global, using wl_data_device_manager");
                    ManagerFlavor::Standard(manager)
                }
                Err(err) => {
                    return Err(Error::init(format!(
                        "compositor offers neither data-control nor data-device: {}",
                        err
                    )))
                }
            },
        };

        let seat = {
            let seats = seats.borrow();
            seats
                .first()
                .cloned()
                .ok_or_else(|| Error::InitializationFailed("compositor advertised no seat".to_owned()))?
        };

        let state = Rc::new(RefCell::new(SelectionState::default()));
        let device = match &manager {
            ManagerFlavor::Wlr(manager) => {
                let device = manager.get_data_device(&seat);
                device::listen_wlr(&device, state.clone());
                DeviceFlavor::Wlr(device)
            }
            ManagerFlavor::Standard(manager) => {
                let device = manager.get_data_device(&seat);
                device::listen_standard(&device, state.clone());
                DeviceFlavor::Standard(device)
            }
        };

        // pick up the selection that exists right now, so the first read
        // does not mistake a populated clipboard for an empty one
        queue
            .sync_roundtrip(&mut (), |_, _, _| {})
            .map_err(Error::init)?;

        Ok(Connection {
            display,
            queue,
            manager,
            device,
            state,
        })
    }

    fn roundtrip(&mut self) -> Result<()> {
        self.queue
            .sync_roundtrip(&mut (), |_, _, _| {})
            .map_err(Error::read)?;
        Ok(())
    }

    fn current_offer(&self) -> Option<OfferFlavor> {
        self.state.borrow().offer.clone()
    }

    /// Fetch one MIME rendition of `offer` through a fresh pipe.
    fn receive(&mut self, offer: &OfferFlavor, mime: &str) -> Result<Vec<u8>> {
        let (read_fd, write_fd) = unistd::pipe().map_err(Error::read)?;
        offer.receive(mime.to_owned(), write_fd);
        // wayland-client dups the fd into the message, so our copy can go
        // right away; only the owner's copy must stay open until it is done
        let _ = unistd::close(write_fd);
        self.roundtrip()?;

        let mut pipe = unsafe { File::from_raw_fd(read_fd) };
        let mut bytes = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    bytes.try_reserve(n)?;
                    bytes.extend_from_slice(&chunk[..n]);
                }
                Err(err) => return Err(Error::read(err)),
            }
        }
        Ok(bytes)
    }

    /// Pick a format for a format-less read out of the current offer.
    fn negotiate(&self, offer: &OfferFlavor) -> Result<(ClipboardFormat, String)> {
        let mimes = offer.mime_types();
        let formats = offered_formats(&mimes);
        let format = WAYLAND_AUTO_PRIORITY
            .iter()
            .copied()
            .find(|format| formats.contains(format))
            .ok_or(Error::NoData)?;
        let mime = choose_mime(format, &mimes).ok_or(Error::NoData)?;
        Ok((format, mime))
    }
}

pub struct WaylandClipboard {
    conn: Option<Connection>,
    /// Format and payload of our own selection, kept after the serving child
    /// takes over the wire.
    own_data: Option<(ClipboardFormat, Rc<Vec<u8>>)>,
}

impl WaylandClipboard {
    pub fn new() -> Result<WaylandClipboard> {
        Ok(WaylandClipboard {
            conn: Some(Connection::connect()?),
            own_data: None,
        })
    }

    /// The live connection, re-established when the previous one was handed
    /// to a serving child.
    fn conn(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            self.conn = Some(Connection::connect()?);
        }
        Ok(self.conn.as_mut().unwrap())
    }

    pub fn read(&mut self, format: ClipboardFormat) -> Result<ClipboardData> {
        if let Some((own_format, data)) = &self.own_data {
            return if *own_format == format {
                ClipboardData::new(data.as_ref().clone(), format)
            } else {
                Err(Error::InvalidData)
            };
        }
        let conn = self.conn()?;
        conn.roundtrip()?;
        let offer = conn.current_offer().ok_or(Error::NoData)?;
        let mimes = offer.mime_types();
        if !offered_formats(&mimes).contains(&format) {
            return Err(Error::InvalidData);
        }
        let mime = choose_mime(format, &mimes).ok_or(Error::InvalidData)?;
        debug!("fetching clipboard as {}", mime);
        let bytes = conn.receive(&offer, &mime)?;
        ClipboardData::new(bytes, format)
    }

    pub fn read_auto(&mut self) -> Result<ClipboardData> {
        if let Some((format, data)) = &self.own_data {
            return ClipboardData::new(data.as_ref().clone(), *format);
        }
        let conn = self.conn()?;
        conn.roundtrip()?;
        let offer = conn.current_offer().ok_or(Error::NoData)?;
        let (format, mime) = conn.negotiate(&offer)?;
        debug!("fetching clipboard as {}", mime);
        let bytes = conn.receive(&offer, &mime)?;
        ClipboardData::new(bytes, format)
    }

    pub fn available_formats(&mut self) -> Result<Vec<ClipboardFormat>> {
        let conn = self.conn()?;
        conn.roundtrip()?;
        Ok(match conn.current_offer() {
            Some(offer) => offered_formats(&offer.mime_types()),
            None => Vec::new(),
        })
    }

    pub fn write(&mut self, bytes: &[u8], format: ClipboardFormat) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::NoData);
        }
        let ctx = WriteContext::new(bytes);
        {
            let conn = self.conn()?;
            let source = match &conn.manager {
                ManagerFlavor::Wlr(manager) => SourceFlavor::Wlr(manager.create_data_source()),
                ManagerFlavor::Standard(manager) => {
                    SourceFlavor::Standard(manager.create_data_source())
                }
            };
            source.listen(&ctx);
            for mime in format.offered_mimes() {
                source.offer(mime);
            }
            match (&conn.device, &source) {
                (DeviceFlavor::Wlr(device), SourceFlavor::Wlr(source)) => {
                    device.set_selection(Some(source))
                }
                // without a surface there is no input serial to present
                (DeviceFlavor::Standard(device), SourceFlavor::Standard(source)) => {
                    device.set_selection(Some(source), 0)
                }
                _ => unreachable!("device and source always share a flavor"),
            }
            conn.queue
                .sync_roundtrip(&mut (), |_, _, _| {})
                .map_err(Error::write)?;
        }

        // keep the payload claimable after this process exits: a forked
        // child inherits the connection and dispatches until cancelled
        let conn = self.conn.take().expect("connected above");
        match unsafe { unistd::fork() }.map_err(Error::write)? {
            ForkResult::Child => {
                daemon::detach();
                process::exit(serve_until_cancelled(conn, &ctx));
            }
            ForkResult::Parent { child } => {
                debug!("selection now served by pid {}", child);
                // the child answers on this connection from now on; our copy
                // must neither be used nor torn down
                mem::forget(conn);
                self.own_data = Some((format, ctx.data.clone()));
                Ok(())
            }
        }
    }

    pub fn clear(&mut self) -> Result<()> {
        self.own_data = None;
        let conn = self.conn()?;
        match &conn.device {
            DeviceFlavor::Wlr(device) => device.set_selection(None),
            DeviceFlavor::Standard(device) => device.set_selection(None, 0),
        }
        conn.queue
            .sync_roundtrip(&mut (), |_, _, _| {})
            .map_err(Error::write)?;
        Ok(())
    }

    /// Block until the compositor announces the next selection change and
    /// return its contents.
    ///
    /// Every change is one emission; identical payloads are not coalesced.
    pub fn wait_for_change(&mut self) -> Result<ClipboardData> {
        let conn = self.conn()?;
        conn.state.borrow_mut().selection_arrived = false;
        loop {
            let _ = conn.display.flush();
            conn.queue
                .dispatch(&mut (), |_, _, _| {})
                .map_err(Error::read)?;
            if conn.state.borrow().selection_arrived {
                break;
            }
        }
        // a cleared selection is a change with nothing to fetch
        let offer = conn.current_offer().ok_or(Error::NoData)?;
        let (format, mime) = conn.negotiate(&offer)?;
        let bytes = conn.receive(&offer, &mime)?;
        ClipboardData::new(bytes, format)
    }
}

/// Post-fork body of `write`: answer paste requests on the inherited
/// connection until another client replaces the selection.
fn serve_until_cancelled(mut conn: Connection, ctx: &WriteContext) -> i32 {
    loop {
        if ctx.cancelled.get() {
            return 0;
        }
        if conn.display.flush().is_err() {
            return 1;
        }
        if conn.queue.dispatch(&mut (), |_, _, _| {}).is_err() {
            return 1;
        }
    }
}
