use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    InvalidInput,
    Protocol,
    Widget,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("could not build comment thread: {0}")]
    Widget(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub const INVALID_FILE_TYPE: &str = "Invalid file format. Please choose a .jpg or .png image.";
pub const PUBLISH_FROM_MENU: &str =
    "To upload a new picture, use the \"Upload new\" menu item.";
pub const EMPTY_COMMENT: &str = "Write a comment before sending it.";

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Widget(_) => ErrorKind::Widget,
        }
    }

    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Error::Protocol(_))
    }

    pub fn auto_dismisses(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<gloo_net::Error> for Error {
    fn from(error: gloo_net::Error) -> Self {
        Error::Transport(error.to_string())
    }
}

impl From<inkpin_shared::EventDecodeError> for Error {
    fn from(error: inkpin_shared::EventDecodeError) -> Self {
        Error::Protocol(error.to_string())
    }
}

impl From<wasm_bindgen::JsValue> for Error {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        Error::Transport(
            value
                .as_string()
                .unwrap_or_else(|| format!("{value:?}")),
        )
    }
}

impl From<Error> for wasm_bindgen::JsValue {
    fn from(error: Error) -> Self {
        wasm_bindgen::JsValue::from_str(&error.to_string())
    }
}
