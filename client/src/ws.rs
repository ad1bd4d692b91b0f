use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BinaryType, CloseEvent, Event, MessageEvent, WebSocket};

use crate::error::{Error, Result};
use crate::sync::Channel;

const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Open,
    Close,
    Error,
    Message(String),
}

pub struct WsChannel {
    socket: WebSocket,
}

impl WsChannel {
    pub fn is_open(&self) -> bool {
        self.socket.ready_state() == WebSocket::OPEN
    }

    fn detach_handlers(&self) {
        self.socket.set_onopen(None);
        self.socket.set_onclose(None);
        self.socket.set_onerror(None);
        self.socket.set_onmessage(None);
    }
}

impl Channel for WsChannel {
    fn send_binary(&self, payload: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Transport(
                "The live connection is not open.".to_string(),
            ));
        }
        self.socket.send_with_u8_array(payload)?;
        Ok(())
    }

    fn close(&self) {
        self.detach_handlers();
        if self.socket.ready_state() != WebSocket::CLOSED {
            let _ = self.socket.close_with_code(NORMAL_CLOSURE);
        }
    }
}

pub fn connect_ws(url: &str, on_event: impl 'static + FnMut(WsEvent)) -> Result<WsChannel> {
    let socket = WebSocket::new(url)?;
    socket.set_binary_type(BinaryType::Arraybuffer);

    let on_event = Rc::new(RefCell::new(on_event));
    let open_reported = Rc::new(Cell::new(false));

    {
        let on_event = on_event.clone();
        let open_reported = open_reported.clone();
        let onopen = Closure::<dyn FnMut(Event)>::new(move |_| {
            open_reported.set(true);
            on_event.borrow_mut()(WsEvent::Open);
        });
        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        onopen.forget();
    }

    {
        let on_event = on_event.clone();
        let onclose = Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
            log::info!("live channel closed code={}", event.code());
            on_event.borrow_mut()(WsEvent::Close);
        });
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        onclose.forget();
    }

    {
        let on_event = on_event.clone();
        let onerror = Closure::<dyn FnMut(Event)>::new(move |_| {
            on_event.borrow_mut()(WsEvent::Error);
        });
        socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        onerror.forget();
    }

    {
        let on_event = on_event.clone();
        let open_reported = open_reported.clone();
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            if !open_reported.replace(true) {
                on_event.borrow_mut()(WsEvent::Open);
            }
            match event.data().as_string() {
                Some(text) => on_event.borrow_mut()(WsEvent::Message(text)),
                None => log::warn!("live channel sent a non-text frame; discarded"),
            }
        });
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        onmessage.forget();
    }

    Ok(WsChannel { socket })
}
