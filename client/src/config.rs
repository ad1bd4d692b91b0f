use wasm_bindgen::JsValue;
use web_sys::{Element, Window};

use crate::net::picture_id_from_search;

pub const ERROR_DISMISS_MS: u32 = 3000;
pub const API_ATTRIBUTE: &str = "data-api";

/// Where the page talks to and what it was opened with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub page_base: String,
    pub debug: bool,
    pub picture_id: Option<String>,
}

impl ClientConfig {
    pub fn from_parts(origin: &str, pathname: &str, search: &str, api_attr: Option<&str>) -> Self {
        let api_base = api_attr
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(origin)
            .trim_end_matches('/')
            .to_string();
        Self {
            api_base,
            page_base: format!("{origin}{pathname}"),
            debug: debug_enabled(search),
            picture_id: picture_id_from_search(search),
        }
    }

    pub fn from_page(window: &Window, root: &Element) -> Result<Self, JsValue> {
        let location = window.location();
        let origin = location.origin()?;
        let pathname = location.pathname()?;
        let search = location.search()?;
        let api_attr = root.get_attribute(API_ATTRIBUTE);
        Ok(Self::from_parts(&origin, &pathname, &search, api_attr.as_deref()))
    }
}

pub fn debug_enabled(search: &str) -> bool {
    search
        .trim_start_matches('?')
        .split('&')
        .any(|pair| matches!(pair, "debug" | "debug=1" | "debug=true"))
}
