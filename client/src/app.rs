use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use gloo_timers::callback::Timeout;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{DragEvent, Event, File, HtmlElement, MouseEvent, PointerEvent, Window};

use inkpin_shared::Picture;

use crate::comments::ThreadId;
use crate::config::{debug_enabled, ClientConfig, ERROR_DISMISS_MS};
use crate::dom::{event_point, DomLayers, DomThreadFactory, ThreadAction};
use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::net::{channel_url, share_link, validate_image_type, PictureStore};
use crate::palette::BrushColor;
use crate::render::CanvasSurface;
use crate::session::{AnnotationSession, SnapshotOutcome};
use crate::state::ErrorTicket;
use crate::stroke::{CommitTicket, COMMIT_DELAY_MS};
use crate::ws::{connect_ws, WsChannel, WsEvent};

type PageSession = AnnotationSession<CanvasSurface, DomThreadFactory, WsChannel>;

/// Everything that can happen to the page. Callbacks only enqueue these; one task applies them
/// in arrival order.
enum UiEvent {
    EnterPublication,
    EnterShare,
    EnterComment,
    EnterDraw,
    EnterError(String),
    DismissError,
    SetColor(String),
    ShowComments(bool),
    Publish(File),
    Drop(File),
    Load(String),
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    Click(Point),
    Thread(ThreadId, ThreadAction),
    CommitDue(CommitTicket),
    DismissDue(ErrorTicket),
    Channel { generation: u64, event: WsEvent },
    Loaded { generation: u64, result: Result<Picture> },
    Published(Result<Picture>),
    CommentPosted { generation: u64, thread: ThreadId, result: Result<()> },
    Relayout,
    Unload,
}

#[wasm_bindgen(start)]
pub fn run() -> std::result::Result<(), JsValue> {
    console_error_panic_hook::set_once();
    let search = web_sys::window()
        .and_then(|window| window.location().search().ok())
        .unwrap_or_default();
    let level = if debug_enabled(&search) {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    if console_log::init_with_level(level).is_err() {
        web_sys::console::warn_1(&"logger already initialized".into());
    }
    Ok(())
}

/// Handle given to the hosting page's menu.
#[wasm_bindgen]
pub struct Annotator {
    sender: UnboundedSender<UiEvent>,
    current: Rc<RefCell<Option<String>>>,
    page_base: String,
}

#[wasm_bindgen]
impl Annotator {
    pub fn mount(root: HtmlElement) -> std::result::Result<Annotator, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("Missing document"))?;
        let config = ClientConfig::from_page(&window, &root)?;
        log::info!(
            "mounting annotator api={} debug={} picture={:?}",
            config.api_base,
            config.debug,
            config.picture_id
        );

        let (sender, receiver) = unbounded();
        let layers = DomLayers::build(&document, root)?;
        let surface = CanvasSurface::new(layers.canvas().clone())?;
        let factory = {
            let sender = sender.clone();
            DomThreadFactory::new(
                document.clone(),
                layers.comments_container().clone(),
                Rc::new(move |id, action| {
                    let _ = sender.unbounded_send(UiEvent::Thread(id, action));
                }),
            )
        };
        install_listeners(&window, &layers, &sender)?;

        let current = Rc::new(RefCell::new(None));
        let page_base = config.page_base.clone();
        if let Some(id) = config.picture_id.clone() {
            let _ = sender.unbounded_send(UiEvent::Load(id));
        }
        let page = Page {
            store: PictureStore::new(config.api_base.clone()),
            config,
            window,
            layers,
            session: AnnotationSession::new(surface, factory),
            sender: sender.clone(),
            current: current.clone(),
            generation: 0,
            commit_timer: None,
            dismiss_timer: None,
        };
        spawn_local(page.run(receiver));

        Ok(Annotator {
            sender,
            current,
            page_base,
        })
    }

    #[wasm_bindgen(js_name = enterPublication)]
    pub fn enter_publication(&self) {
        self.post(UiEvent::EnterPublication);
    }

    #[wasm_bindgen(js_name = enterShare)]
    pub fn enter_share(&self) {
        self.post(UiEvent::EnterShare);
    }

    #[wasm_bindgen(js_name = enterComment)]
    pub fn enter_comment(&self) {
        self.post(UiEvent::EnterComment);
    }

    #[wasm_bindgen(js_name = enterDraw)]
    pub fn enter_draw(&self) {
        self.post(UiEvent::EnterDraw);
    }

    #[wasm_bindgen(js_name = enterError)]
    pub fn enter_error(&self, message: String) {
        self.post(UiEvent::EnterError(message));
    }

    #[wasm_bindgen(js_name = dismissError)]
    pub fn dismiss_error(&self) {
        self.post(UiEvent::DismissError);
    }

    #[wasm_bindgen(js_name = setColor)]
    pub fn set_color(&self, name: String) {
        self.post(UiEvent::SetColor(name));
    }

    #[wasm_bindgen(js_name = setCommentsVisible)]
    pub fn set_comments_visible(&self, visible: bool) {
        self.post(UiEvent::ShowComments(visible));
    }

    pub fn publish(&self, file: File) {
        self.post(UiEvent::Publish(file));
    }

    pub fn load(&self, picture_id: String) {
        self.post(UiEvent::Load(picture_id));
    }

    #[wasm_bindgen(js_name = pictureId)]
    pub fn picture_id(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    #[wasm_bindgen(js_name = shareLink)]
    pub fn share_link(&self) -> Option<String> {
        self.current
            .borrow()
            .as_deref()
            .map(|id| share_link(&self.page_base, id))
    }
}

impl Annotator {
    fn post(&self, event: UiEvent) {
        if self.sender.unbounded_send(event).is_err() {
            log::warn!("annotator is no longer running");
        }
    }
}

fn install_listeners(
    window: &Window,
    layers: &DomLayers,
    sender: &UnboundedSender<UiEvent>,
) -> std::result::Result<(), JsValue> {
    let root = layers.root();

    {
        let sender = sender.clone();
        let ondown = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            if !event.is_primary() {
                return;
            }
            if let Some(point) = event_point(&event) {
                let _ = sender.unbounded_send(UiEvent::PointerDown(point));
            }
        });
        root.add_event_listener_with_callback("pointerdown", ondown.as_ref().unchecked_ref())?;
        ondown.forget();
    }

    {
        let sender = sender.clone();
        let onmove = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            if !event.is_primary() {
                return;
            }
            if let Some(point) = event_point(&event) {
                let _ = sender.unbounded_send(UiEvent::PointerMove(point));
            }
        });
        root.add_event_listener_with_callback("pointermove", onmove.as_ref().unchecked_ref())?;
        onmove.forget();
    }

    {
        let sender = sender.clone();
        let onstop = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            if event.is_primary() {
                let _ = sender.unbounded_send(UiEvent::PointerUp);
            }
        });
        root.add_event_listener_with_callback("pointerup", onstop.as_ref().unchecked_ref())?;
        root.add_event_listener_with_callback("pointercancel", onstop.as_ref().unchecked_ref())?;
        root.add_event_listener_with_callback("pointerleave", onstop.as_ref().unchecked_ref())?;
        onstop.forget();
    }

    {
        let sender = sender.clone();
        let onclick = Closure::<dyn FnMut(MouseEvent)>::new(move |event: MouseEvent| {
            if let Some(point) = event_point(&event) {
                let _ = sender.unbounded_send(UiEvent::Click(point));
            }
        });
        layers
            .comments_container()
            .add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    {
        let ondragover = Closure::<dyn FnMut(DragEvent)>::new(|event: DragEvent| {
            event.prevent_default();
        });
        root.add_event_listener_with_callback("dragover", ondragover.as_ref().unchecked_ref())?;
        ondragover.forget();
    }

    {
        let sender = sender.clone();
        let ondrop = Closure::<dyn FnMut(DragEvent)>::new(move |event: DragEvent| {
            event.prevent_default();
            let file = event
                .data_transfer()
                .and_then(|transfer| transfer.files())
                .and_then(|files| files.get(0));
            if let Some(file) = file {
                let _ = sender.unbounded_send(UiEvent::Drop(file));
            }
        });
        root.add_event_listener_with_callback("drop", ondrop.as_ref().unchecked_ref())?;
        ondrop.forget();
    }

    {
        let sender = sender.clone();
        let onload = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
            let _ = sender.unbounded_send(UiEvent::Relayout);
        });
        layers
            .picture()
            .add_event_listener_with_callback("load", onload.as_ref().unchecked_ref())?;
        onload.forget();
    }

    {
        let sender = sender.clone();
        let onresize = Closure::<dyn FnMut()>::new(move || {
            let _ = sender.unbounded_send(UiEvent::Relayout);
        });
        window.add_event_listener_with_callback("resize", onresize.as_ref().unchecked_ref())?;
        onresize.forget();
    }

    {
        let sender = sender.clone();
        let onbeforeunload = Closure::<dyn FnMut(Event)>::new(move |_: Event| {
            let _ = sender.unbounded_send(UiEvent::Unload);
        });
        window.add_event_listener_with_callback(
            "beforeunload",
            onbeforeunload.as_ref().unchecked_ref(),
        )?;
        onbeforeunload.forget();
    }

    Ok(())
}

struct Page {
    config: ClientConfig,
    store: PictureStore,
    window: Window,
    layers: DomLayers,
    session: PageSession,
    sender: UnboundedSender<UiEvent>,
    current: Rc<RefCell<Option<String>>>,
    // Bumped on every picture switch; results tagged with an older value are ignored.
    generation: u64,
    commit_timer: Option<Timeout>,
    dismiss_timer: Option<Timeout>,
}

impl Page {
    async fn run(mut self, mut receiver: UnboundedReceiver<UiEvent>) {
        self.render();
        while let Some(event) = receiver.next().await {
            self.handle(event);
            self.render();
        }
        log::info!("annotator event loop stopped");
    }

    fn handle(&mut self, event: UiEvent) {
        match event {
            UiEvent::EnterPublication => self.session.modes_mut().enter_publication(),
            UiEvent::EnterShare => self.session.modes_mut().enter_share(),
            UiEvent::EnterComment => self.session.modes_mut().enter_comment(),
            UiEvent::EnterDraw => self.session.modes_mut().enter_draw(),
            UiEvent::EnterError(message) => {
                self.dismiss_timer = None;
                self.session.modes_mut().enter_error(message);
            }
            UiEvent::DismissError => {
                self.dismiss_timer = None;
                self.session.modes_mut().dismiss_error();
            }
            UiEvent::SetColor(name) => match BrushColor::from_name(&name) {
                Some(color) => self.session.set_color(color),
                None => log::warn!("unknown brush color {name:?}"),
            },
            UiEvent::ShowComments(visible) => self.session.comments_mut().show_all(visible),
            UiEvent::Publish(file) => self.publish(file),
            UiEvent::Drop(file) => match self.session.accept_drop() {
                Ok(()) => self.publish(file),
                Err(error) => self.fail(error),
            },
            UiEvent::Load(picture_id) => self.load(picture_id),
            UiEvent::PointerDown(point) => {
                if self.session.pointer_down(point) {
                    self.commit_timer = None;
                }
            }
            UiEvent::PointerMove(point) => {
                self.session.pointer_move(point);
            }
            UiEvent::PointerUp => {
                if let Some(ticket) = self.session.pointer_up() {
                    self.arm_commit(ticket);
                }
            }
            UiEvent::Click(point) => {
                if let Err(error) = self.session.click(point) {
                    self.fail(error);
                }
            }
            UiEvent::Thread(thread, action) => self.thread_action(thread, action),
            UiEvent::CommitDue(ticket) => match self.session.commit_due(ticket) {
                Ok(true) => log::debug!("mask committed"),
                Ok(false) => {}
                Err(error) => self.fail(error),
            },
            UiEvent::DismissDue(ticket) => {
                if let Some(mode) = self.session.error_expired(ticket) {
                    self.dismiss_timer = None;
                    log::debug!("error dismissed, back to {}", mode.name());
                }
            }
            UiEvent::Channel { generation, event } => {
                if generation == self.generation {
                    self.channel_event(event);
                }
            }
            UiEvent::Loaded { generation, result } => {
                if generation != self.generation {
                    return;
                }
                match result {
                    Ok(picture) => self.apply_snapshot(picture),
                    Err(error) => self.fail(error),
                }
            }
            UiEvent::Published(result) => match result {
                Ok(picture) => {
                    self.bind(&picture.id);
                    self.apply_snapshot(picture);
                    self.session.modes_mut().enter_share();
                }
                Err(error) => self.fail(error),
            },
            UiEvent::CommentPosted {
                generation,
                thread,
                result,
            } => {
                if generation != self.generation {
                    return;
                }
                if let Err(error) = self.session.comment_submitted(thread, result) {
                    self.fail(error);
                }
            }
            UiEvent::Relayout => self.relayout(),
            UiEvent::Unload => {
                self.commit_timer = None;
                self.session.close();
            }
        }
    }

    fn render(&mut self) {
        let changes = self.session.layers_mut().drain_changes();
        let changed = !changes.is_empty();
        for change in changes {
            if let Err(error) = self.layers.apply(change) {
                log::error!("could not update layers: {error:?}");
            }
        }
        if changed {
            self.relayout();
        }
        self.layers.show_mode(self.session.modes());
    }

    fn relayout(&mut self) {
        let rect = self.layers.relayout();
        log::debug!(
            "annotation layer at ({}, {}) {}x{}",
            rect.left,
            rect.top,
            rect.width,
            rect.height
        );
        if let Err(error) = self.session.set_layer_rect(rect) {
            self.fail(error);
        }
    }

    fn fail(&mut self, error: Error) {
        let Some(ticket) = self.session.report(&error) else {
            return;
        };
        if !error.auto_dismisses() {
            self.dismiss_timer = None;
            return;
        }
        let sender = self.sender.clone();
        self.dismiss_timer = Some(Timeout::new(ERROR_DISMISS_MS, move || {
            let _ = sender.unbounded_send(UiEvent::DismissDue(ticket));
        }));
    }

    fn arm_commit(&mut self, ticket: CommitTicket) {
        let sender = self.sender.clone();
        self.commit_timer = Some(Timeout::new(COMMIT_DELAY_MS, move || {
            let _ = sender.unbounded_send(UiEvent::CommitDue(ticket));
        }));
    }

    fn bind(&mut self, picture_id: &str) {
        self.generation += 1;
        self.commit_timer = None;
        self.session.bind_picture(picture_id);
        *self.current.borrow_mut() = Some(picture_id.to_string());
        self.remember(picture_id);
        self.connect(picture_id);
    }

    fn remember(&self, picture_id: &str) {
        let link = share_link(&self.config.page_base, picture_id);
        let replaced = self
            .window
            .history()
            .and_then(|history| history.replace_state_with_url(&JsValue::NULL, "", Some(&link)));
        if let Err(error) = replaced {
            log::warn!("could not record the picture in the address bar: {error:?}");
        }
    }

    fn connect(&mut self, picture_id: &str) {
        let url = match channel_url(&self.config.api_base, picture_id) {
            Ok(url) => url,
            Err(error) => {
                self.fail(error);
                return;
            }
        };
        let generation = self.generation;
        let sender = self.sender.clone();
        log::debug!("connecting live channel {url}");
        match connect_ws(&url, move |event| {
            let _ = sender.unbounded_send(UiEvent::Channel { generation, event });
        }) {
            Ok(channel) => self.session.attach_channel(channel),
            Err(error) => self.fail(error),
        }
    }

    fn load(&mut self, picture_id: String) {
        self.bind(&picture_id);
        self.fetch(picture_id);
    }

    fn fetch(&self, picture_id: String) {
        let generation = self.generation;
        let store = self.store.clone();
        let sender = self.sender.clone();
        spawn_local(async move {
            let result = store.load(&picture_id).await;
            let _ = sender.unbounded_send(UiEvent::Loaded { generation, result });
        });
    }

    fn publish(&mut self, file: File) {
        if let Err(error) = validate_image_type(&file.type_()) {
            self.fail(error);
            return;
        }
        let store = self.store.clone();
        let sender = self.sender.clone();
        spawn_local(async move {
            let result = store.upload(&file).await;
            let _ = sender.unbounded_send(UiEvent::Published(result));
        });
    }

    fn apply_snapshot(&mut self, picture: Picture) {
        match self.session.apply_snapshot(picture) {
            Ok(SnapshotOutcome::Applied { comments }) => {
                log::debug!("snapshot applied with {comments} comments")
            }
            Ok(outcome) => log::debug!("snapshot skipped: {outcome:?}"),
            Err(error) => self.fail(error),
        }
    }

    fn channel_event(&mut self, event: WsEvent) {
        match event {
            WsEvent::Open => self.session.channel_opened(),
            WsEvent::Message(text) => match self.session.handle_message(&text) {
                Ok(Some(picture_id)) => self.fetch(picture_id),
                Ok(None) => {}
                Err(error) => self.fail(error),
            },
            WsEvent::Error => log::warn!("live channel reported an error"),
            WsEvent::Close => {
                self.session.channel_dropped();
                self.fail(Error::Transport(
                    "The live connection to the picture was lost.".to_string(),
                ));
            }
        }
    }

    fn thread_action(&mut self, thread: ThreadId, action: ThreadAction) {
        match action {
            ThreadAction::Focus => {
                self.session.comments_mut().focus(thread);
            }
            ThreadAction::Close => {
                self.session.comments_mut().close(thread);
            }
            ThreadAction::Submit(message) => match self.session.submit_comment(thread, &message) {
                Ok((picture_id, draft)) => {
                    let generation = self.generation;
                    let store = self.store.clone();
                    let sender = self.sender.clone();
                    spawn_local(async move {
                        let result = store.post_comment(&picture_id, &draft).await.map(|_| ());
                        let _ = sender.unbounded_send(UiEvent::CommentPosted {
                            generation,
                            thread,
                            result,
                        });
                    });
                }
                Err(error) => self.fail(error),
            },
        }
    }
}
