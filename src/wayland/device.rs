//! The two data-device flavors and the listeners that track the current
//! selection offer.
//!
//! Listeners only record state; every fetch happens on the caller's thread
//! between roundtrips, never inside a callback.

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use wayland_client::protocol::wl_data_device::{self, WlDataDevice};
use wayland_client::protocol::wl_data_offer::{self, WlDataOffer};
use wayland_client::Main;
use wayland_protocols::wlr::unstable::data_control::v1::client::zwlr_data_control_device_v1::{
    self, ZwlrDataControlDeviceV1,
};
use wayland_protocols::wlr::unstable::data_control::v1::client::zwlr_data_control_offer_v1::{
    self, ZwlrDataControlOfferV1,
};

/// Selection state maintained by the device listeners.
#[derive(Default)]
pub(super) struct SelectionState {
    /// The offer currently bound to the CLIPBOARD selection, if any.
    pub offer: Option<OfferFlavor>,
    /// Set on every `selection` event; reset by whoever waits for one.
    pub selection_arrived: bool,
}

/// The data device this connection listens on. Exactly one flavor exists per
/// connection, which also pins which offer flavor can ever show up.
pub(super) enum DeviceFlavor {
    Wlr(Main<ZwlrDataControlDeviceV1>),
    Standard(Main<WlDataDevice>),
}

/// The offer currently holding the selection.
#[derive(Clone)]
pub(super) enum OfferFlavor {
    Wlr(ZwlrDataControlOfferV1),
    Standard(WlDataOffer),
}

impl OfferFlavor {
    /// The MIME types advertised for this offer, in arrival order without
    /// duplicates.
    pub fn mime_types(&self) -> Vec<String> {
        let user_data = match self {
            OfferFlavor::Wlr(offer) => offer.as_ref().user_data(),
            OfferFlavor::Standard(offer) => offer.as_ref().user_data(),
        };
        user_data
            .get::<RefCell<Vec<String>>>()
            .map(|mimes| mimes.borrow().clone())
            .unwrap_or_default()
    }

    /// Ask the owner to write the offer's contents for `mime` into `fd`.
    pub fn receive(&self, mime: String, fd: RawFd) {
        match self {
            OfferFlavor::Wlr(offer) => offer.receive(mime, fd),
            OfferFlavor::Standard(offer) => offer.receive(mime, fd),
        }
    }

    pub fn destroy(&self) {
        match self {
            OfferFlavor::Wlr(offer) => offer.destroy(),
            OfferFlavor::Standard(offer) => offer.destroy(),
        }
    }
}

pub(super) fn listen_wlr(
    device: &Main<ZwlrDataControlDeviceV1>,
    state: Rc<RefCell<SelectionState>>,
) {
    device.quick_assign(move |_device, event, _| match event {
        zwlr_data_control_device_v1::Event::DataOffer { id } => {
            // collect MIME types from the moment the offer appears
            id.as_ref().user_data().set(|| RefCell::new(Vec::<String>::new()));
            id.quick_assign(|offer, event, _| {
                if let zwlr_data_control_offer_v1::Event::Offer { mime_type } = event {
                    if let Some(mimes) = offer.as_ref().user_data().get::<RefCell<Vec<String>>>() {
                        let mut mimes = mimes.borrow_mut();
                        if !mimes.contains(&mime_type) {
                            mimes.push(mime_type);
                        }
                    }
                }
            });
        }
        zwlr_data_control_device_v1::Event::Selection { id } => {
            let mut state = state.borrow_mut();
            if let Some(old) = state.offer.take() {
                old.destroy();
            }
            state.offer = id.map(OfferFlavor::Wlr);
            state.selection_arrived = true;
        }
        _ => (),
    });
}

pub(super) fn listen_standard(device: &Main<WlDataDevice>, state: Rc<RefCell<SelectionState>>) {
    device.quick_assign(move |_device, event, _| match event {
        wl_data_device::Event::DataOffer { id } => {
            id.as_ref().user_data().set(|| RefCell::new(Vec::<String>::new()));
            id.quick_assign(|offer, event, _| {
                if let wl_data_offer::Event::Offer { mime_type } = event {
                    if let Some(mimes) = offer.as_ref().user_data().get::<RefCell<Vec<String>>>() {
                        let mut mimes = mimes.borrow_mut();
                        if !mimes.contains(&mime_type) {
                            mimes.push(mime_type);
                        }
                    }
                }
            });
        }
        wl_data_device::Event::Selection { id } => {
            let mut state = state.borrow_mut();
            if let Some(old) = state.offer.take() {
                old.destroy();
            }
            state.offer = id.map(OfferFlavor::Standard);
            state.selection_arrived = true;
        }
        // drag-and-drop traffic is none of our business
        _ => (),
    });
}
