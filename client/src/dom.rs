use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, HtmlCanvasElement, HtmlElement, HtmlImageElement, HtmlInputElement,
    HtmlTextAreaElement, MouseEvent, Node,
};

use inkpin_shared::Comment;

use crate::comments::{ThreadFactory, ThreadId, ThreadView};
use crate::error::{Error, Result};
use crate::geometry::{center_offset, normalize_point, LayerRect, Point, PositionKey};
use crate::layers::{LayerChange, LayerKind};
use crate::state::{Mode, ModeMachine};

const HIDDEN_CLASS: &str = "comments__hidden";
const LOADER_CLASS: &str = "loader";

pub fn create_element<T: JsCast>(
    document: &Document,
    tag: &str,
    class: &str,
) -> std::result::Result<T, JsValue> {
    let element = document.create_element(tag)?;
    if !class.is_empty() {
        element.set_class_name(class);
    }
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {tag}.{class}")))
}

pub fn measure_rect(element: &Element) -> LayerRect {
    let rect = element.get_bounding_client_rect();
    LayerRect::new(rect.left(), rect.top(), rect.width(), rect.height())
}

pub fn event_point(event: &MouseEvent) -> Option<Point> {
    normalize_point(Point::new(
        f64::from(event.client_x()),
        f64::from(event.client_y()),
    ))
}

fn set_px(element: &HtmlElement, property: &str, value: f64) {
    let _ = element
        .style()
        .set_property(property, &format!("{}px", value.round()));
}

fn stack(element: &HtmlElement, z_index: usize) {
    let style = element.style();
    let _ = style.set_property("position", "absolute");
    let _ = style.set_property("z-index", &z_index.to_string());
}

fn format_timestamp(timestamp: i64) -> String {
    let date = js_sys::Date::new(&JsValue::from_f64(timestamp as f64));
    String::from(date.to_locale_string("default", &JsValue::UNDEFINED))
}

/// The rendered layer stack inside the component's root element.
pub struct DomLayers {
    document: Document,
    root: HtmlElement,
    picture: HtmlImageElement,
    canvas: HtmlCanvasElement,
    comments: HtmlElement,
    mask: Option<HtmlImageElement>,
    control: HtmlElement,
    message: HtmlElement,
}

impl DomLayers {
    pub fn build(document: &Document, root: HtmlElement) -> std::result::Result<Self, JsValue> {
        let picture: HtmlImageElement = create_element(document, "img", "current-image")?;
        picture.set_alt("");
        let canvas: HtmlCanvasElement = create_element(document, "canvas", "drawing-layer")?;
        let comments: HtmlElement = create_element(document, "div", "comments-container")?;
        let control: HtmlElement = create_element(document, "div", "error")?;
        let message: HtmlElement = create_element(document, "p", "error__message")?;
        control.append_child(&message)?;
        control.set_hidden(true);

        let _ = root.style().set_property("position", "relative");
        for (z_index, element) in [
            picture.unchecked_ref::<HtmlElement>(),
            canvas.unchecked_ref::<HtmlElement>(),
            &comments,
            &control,
        ]
        .into_iter()
        .enumerate()
        {
            stack(element, z_index);
            root.append_child(element)?;
        }

        Ok(Self {
            document: document.clone(),
            root,
            picture,
            canvas,
            comments,
            mask: None,
            control,
            message,
        })
    }

    pub fn root(&self) -> &HtmlElement {
        &self.root
    }

    pub fn picture(&self) -> &HtmlImageElement {
        &self.picture
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    pub fn comments_container(&self) -> &HtmlElement {
        &self.comments
    }

    pub fn apply(&mut self, change: LayerChange) -> std::result::Result<(), JsValue> {
        match change {
            LayerChange::Insert {
                index,
                kind: LayerKind::Mask,
                source,
            } => {
                if self.mask.is_none() {
                    let mask: HtmlImageElement = create_element(&self.document, "img", "mask-layer")?;
                    mask.set_alt("");
                    stack(mask.unchecked_ref(), index);
                    let _ = mask.style().set_property("pointer-events", "none");
                    let control: &Node = &self.control;
                    self.root.insert_before(&mask, Some(control))?;
                    stack(&self.control, index + 1);
                    self.mask = Some(mask);
                }
                if let Some(mask) = &self.mask {
                    mask.set_src(source.as_deref().unwrap_or_default());
                }
            }
            LayerChange::Replace {
                kind: LayerKind::Picture,
                source,
            } => self.picture.set_src(source.as_deref().unwrap_or_default()),
            LayerChange::Replace {
                kind: LayerKind::Mask,
                source,
            } => {
                if let Some(mask) = &self.mask {
                    mask.set_src(source.as_deref().unwrap_or_default());
                }
            }
            LayerChange::Remove {
                kind: LayerKind::Mask,
            } => {
                if let Some(mask) = self.mask.take() {
                    mask.remove();
                }
            }
            other => log::debug!("layer change without a rendered counterpart: {other:?}"),
        }
        Ok(())
    }

    /// Centers every annotation layer over the picture and returns the measured layer rect.
    pub fn relayout(&self) -> LayerRect {
        let width = f64::from(self.picture.offset_width());
        let height = f64::from(self.picture.offset_height());
        let offset = center_offset(
            f64::from(self.root.client_width()),
            f64::from(self.root.client_height()),
            width,
            height,
        );
        set_px(self.picture.unchecked_ref(), "left", offset.x);
        set_px(self.picture.unchecked_ref(), "top", offset.y);
        let mut overlays: Vec<&HtmlElement> = vec![self.canvas.unchecked_ref(), &self.comments];
        if let Some(mask) = &self.mask {
            overlays.push(mask.unchecked_ref());
        }
        for element in overlays {
            set_px(element, "left", offset.x);
            set_px(element, "top", offset.y);
            set_px(element, "width", width);
            set_px(element, "height", height);
        }
        measure_rect(&self.comments)
    }

    pub fn show_mode(&self, modes: &ModeMachine) {
        let _ = self.root.set_attribute("data-mode", modes.current().name());
        let in_error = modes.current() == Mode::Error;
        self.control.set_hidden(!in_error);
        self.message
            .set_text_content(if in_error { modes.message() } else { None });
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThreadAction {
    Focus,
    Close,
    Submit(String),
}

pub type ThreadActionHandler = Rc<dyn Fn(ThreadId, ThreadAction)>;

pub struct DomThreadFactory {
    document: Document,
    container: HtmlElement,
    on_action: ThreadActionHandler,
}

impl DomThreadFactory {
    pub fn new(document: Document, container: HtmlElement, on_action: ThreadActionHandler) -> Self {
        Self {
            document,
            container,
            on_action,
        }
    }

    fn build(&self, id: ThreadId) -> std::result::Result<DomThreadView, JsValue> {
        let document = &self.document;
        let form: HtmlElement = create_element(document, "form", "comments__form")?;
        let marker: HtmlElement = create_element(document, "span", "comments__marker")?;
        let checkbox: HtmlInputElement =
            create_element(document, "input", "comments__marker-checkbox")?;
        checkbox.set_type("checkbox");
        let body: HtmlElement = create_element(document, "div", "comments__body")?;
        let loader_wrap: HtmlElement = create_element(document, "div", "comment")?;
        let loader: HtmlElement = create_element(document, "div", "")?;
        for _ in 0..5 {
            let dot: Element = document.create_element("span")?;
            loader.append_child(&dot)?;
        }
        loader_wrap.append_child(&loader)?;
        let input: HtmlTextAreaElement = create_element(document, "textarea", "comments__input")?;
        input.set_placeholder("Write a reply...");
        let close: HtmlInputElement = create_element(document, "input", "comments__close")?;
        close.set_type("button");
        close.set_value("Close");
        let submit: HtmlInputElement = create_element(document, "input", "comments__submit")?;
        submit.set_type("button");
        submit.set_value("Send");

        body.append_child(&loader_wrap)?;
        body.append_child(&input)?;
        body.append_child(&close)?;
        body.append_child(&submit)?;
        form.append_child(&marker)?;
        form.append_child(&checkbox)?;
        form.append_child(&body)?;

        let mut listeners = Vec::new();
        {
            // Clicks inside a thread must not reach the container's click-to-open handler.
            let onclick = Closure::<dyn FnMut(Event)>::new(|event: Event| {
                event.stop_propagation();
            });
            form.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
            listeners.push(onclick);
        }
        {
            let onsubmit = Closure::<dyn FnMut(Event)>::new(|event: Event| {
                event.prevent_default();
            });
            form.add_event_listener_with_callback("submit", onsubmit.as_ref().unchecked_ref())?;
            listeners.push(onsubmit);
        }
        {
            let on_action = self.on_action.clone();
            let checkbox_cb = checkbox.clone();
            let onchange = Closure::<dyn FnMut(Event)>::new(move |_| {
                let action = if checkbox_cb.checked() {
                    ThreadAction::Focus
                } else {
                    ThreadAction::Close
                };
                on_action(id, action);
            });
            checkbox.add_event_listener_with_callback("change", onchange.as_ref().unchecked_ref())?;
            listeners.push(onchange);
        }
        {
            let on_action = self.on_action.clone();
            let onclose = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
                event.prevent_default();
                on_action(id, ThreadAction::Close);
            });
            close.add_event_listener_with_callback("click", onclose.as_ref().unchecked_ref())?;
            listeners.push(onclose);
        }
        {
            let on_action = self.on_action.clone();
            let input_cb = input.clone();
            let onsend = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
                event.prevent_default();
                on_action(id, ThreadAction::Submit(input_cb.value()));
            });
            submit.add_event_listener_with_callback("click", onsend.as_ref().unchecked_ref())?;
            listeners.push(onsend);
        }

        stack(&form, 1);
        self.container.append_child(&form)?;
        Ok(DomThreadView {
            document: document.clone(),
            form,
            checkbox,
            body,
            loader_wrap,
            loader,
            input,
            entries: Vec::new(),
            _listeners: listeners,
        })
    }
}

impl ThreadFactory for DomThreadFactory {
    type View = DomThreadView;

    fn create(&mut self, id: ThreadId, anchor: PositionKey) -> Result<DomThreadView> {
        self.build(id).map_err(|error| {
            Error::Widget(format!(
                "thread at ({}, {}): {error:?}",
                anchor.x, anchor.y
            ))
        })
    }
}

pub struct DomThreadView {
    document: Document,
    form: HtmlElement,
    checkbox: HtmlInputElement,
    body: HtmlElement,
    loader_wrap: HtmlElement,
    loader: HtmlElement,
    input: HtmlTextAreaElement,
    entries: Vec<HtmlElement>,
    _listeners: Vec<Closure<dyn FnMut(Event)>>,
}

impl DomThreadView {
    fn build_entry(&self, comment: &Comment) -> std::result::Result<HtmlElement, JsValue> {
        let entry: HtmlElement = create_element(&self.document, "div", "comment")?;
        let time: HtmlElement = create_element(&self.document, "p", "comment__time")?;
        time.set_text_content(Some(&format_timestamp(comment.timestamp)));
        let message: HtmlElement = create_element(&self.document, "p", "comment__message")?;
        message.set_inner_text(&comment.message);
        entry.append_child(&time)?;
        entry.append_child(&message)?;
        Ok(entry)
    }
}

impl ThreadView for DomThreadView {
    fn place(&mut self, local: Point, _viewport: Point) {
        set_px(&self.form, "left", local.x);
        set_px(&self.form, "top", local.y);
    }

    fn insert_comment(&mut self, index: usize, comment: &Comment) {
        let entry = match self.build_entry(comment) {
            Ok(entry) => entry,
            Err(error) => {
                log::error!("could not render comment: {error:?}");
                return;
            }
        };
        let before: &Node = match self.entries.get(index) {
            Some(entry) => entry,
            None => &self.loader_wrap,
        };
        if let Err(error) = self.body.insert_before(&entry, Some(before)) {
            log::error!("could not insert comment: {error:?}");
            return;
        }
        self.entries.insert(index.min(self.entries.len()), entry);
    }

    fn set_body_open(&mut self, open: bool) {
        self.checkbox.set_checked(open);
        if open {
            let _ = self.input.focus();
        }
    }

    fn set_marker_visible(&mut self, visible: bool) {
        let _ = self.form.class_list().toggle_with_force(HIDDEN_CLASS, !visible);
    }

    fn set_pending(&mut self, pending: bool) {
        let _ = self.loader.class_list().toggle_with_force(LOADER_CLASS, pending);
        self.input.set_disabled(pending);
        if pending {
            self.input.set_value("");
        }
    }

    fn destroy(&mut self) {
        self.form.remove();
        self.entries.clear();
    }
}
