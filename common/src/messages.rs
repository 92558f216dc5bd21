use serde::{Deserialize, Serialize};

/// Tag printed in front of every status line.
pub const LOG_TAG: &str = "[timelapse]";

/// Messages the rendering client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// One captured frame, usually `canvas.toDataURL("image/png")`.
    #[serde(rename = "timelapse:newframe")]
    NewFrame { image: String },
}

/// Messages the server sends to connected rendering clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Watched source content changed; the client should send a frame back.
    #[serde(rename = "timelapse:changed")]
    Changed,
    #[serde(rename = "timelapse:log")]
    Log { msg: String },
    #[serde(rename = "timelapse:warn")]
    Warn { msg: String },
}

impl ServerMessage {
    pub fn log(body: impl AsRef<str>) -> Self {
        Self::Log {
            msg: status_line(body.as_ref()),
        }
    }

    pub fn warn(body: impl AsRef<str>) -> Self {
        Self::Warn {
            msg: status_line(body.as_ref()),
        }
    }
}

/// Prefix a message with the local wall-clock time and the log tag,
/// e.g. `14:02:11 [timelapse] 00003.png exported`.
pub fn status_line(body: &str) -> String {
    format!(
        "{} {LOG_TAG} {body}",
        chrono::Local::now().format("%H:%M:%S")
    )
}
