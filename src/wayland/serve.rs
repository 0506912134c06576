//! Owner-side serving for writes: the data source that answers paste
//! requests with the cached payload.

use std::cell::Cell;
use std::fs::File;
use std::io::Write;
use std::os::unix::io::{FromRawFd, RawFd};
use std::rc::Rc;

use log::debug;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use wayland_client::protocol::wl_data_source::{self, WlDataSource};
use wayland_client::Main;
use wayland_protocols::wlr::unstable::data_control::v1::client::zwlr_data_control_source_v1::{
    self, ZwlrDataControlSourceV1,
};

/// One write's payload, shared between the parent's own-data cache and the
/// source listener serving paste requests.
pub(super) struct WriteContext {
    pub data: Rc<Vec<u8>>,
    pub cancelled: Rc<Cell<bool>>,
}

impl WriteContext {
    pub fn new(bytes: &[u8]) -> WriteContext {
        WriteContext {
            data: Rc::new(bytes.to_vec()),
            cancelled: Rc::new(Cell::new(false)),
        }
    }
}

/// The data source paired with the active device flavor.
pub(super) enum SourceFlavor {
    Wlr(Main<ZwlrDataControlSourceV1>),
    Standard(Main<WlDataSource>),
}

impl SourceFlavor {
    pub fn offer(&self, mime: &str) {
        match self {
            SourceFlavor::Wlr(source) => source.offer(mime.to_owned()),
            SourceFlavor::Standard(source) => source.offer(mime.to_owned()),
        }
    }

    /// Install the serving listener. `cancelled` flips once the selection is
    /// taken over, which is terminal for this source.
    pub fn listen(&self, ctx: &WriteContext) {
        match self {
            SourceFlavor::Wlr(source) => {
                let data = ctx.data.clone();
                let cancelled = ctx.cancelled.clone();
                source.quick_assign(move |source, event, _| match event {
                    zwlr_data_control_source_v1::Event::Send { mime_type, fd } => {
                        debug!("serving {} bytes as {}", data.len(), mime_type);
                        serve_request(fd, &data);
                    }
                    zwlr_data_control_source_v1::Event::Cancelled => {
                        cancelled.set(true);
                        source.destroy();
                    }
                    _ => (),
                });
            }
            SourceFlavor::Standard(source) => {
                let data = ctx.data.clone();
                let cancelled = ctx.cancelled.clone();
                source.quick_assign(move |source, event, _| match event {
                    wl_data_source::Event::Send { mime_type, fd } => {
                        debug!("serving {} bytes as {}", data.len(), mime_type);
                        serve_request(fd, &data);
                    }
                    wl_data_source::Event::Cancelled => {
                        cancelled.set(true);
                        source.destroy();
                    }
                    _ => (),
                });
            }
        }
    }
}

/// Push the whole payload into the requestor's pipe in one blocking write.
fn serve_request(fd: RawFd, data: &[u8]) {
    // the compositor may hand over a non-blocking fd, but this write must
    // not be partial
    if let Ok(flags) = fcntl(fd, FcntlArg::F_GETFL) {
        let flags = OFlag::from_bits_truncate(flags) & !OFlag::O_NONBLOCK;
        let _ = fcntl(fd, FcntlArg::F_SETFL(flags));
    }
    let mut sink = unsafe { File::from_raw_fd(fd) };
    // a requestor hanging up early is its own problem
    let _ = sink.write_all(data);
}
