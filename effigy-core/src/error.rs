//! Error types for the Effigy kernel.
//!
//! All errors carry a stable short code in their message plus the
//! identifiers (directory name, capability, storage name, ...) needed to
//! act on the failure without a debugger.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for kernel operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Application / Directory Errors (E001-E019)
    // =========================================================================
    /// A named directory was requested but never registered.
    #[error("E001: Unknown app directory '{name}'")]
    UnknownDir {
        /// The directory name that was requested.
        name: String,
    },

    /// Creating an application directory on disk failed.
    #[error("E002: Failed to create app directory at {path}: {cause}")]
    DirCreate {
        /// The path that could not be created.
        path: PathBuf,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Configuration Errors (E020-E039)
    // =========================================================================
    /// Reading a configuration file failed.
    #[error("E021: Failed to read config file {path}: {cause}")]
    ConfigLoad {
        /// The config file path.
        path: PathBuf,
        /// Reason for the read failure.
        cause: String,
    },

    /// Parsing a configuration file failed.
    #[error("E022: Failed to parse config file {path}: {cause}")]
    ConfigParse {
        /// The config file path.
        path: PathBuf,
        /// Reason for the parse failure.
        cause: String,
    },

    // =========================================================================
    // Routing Errors (E040-E059)
    // =========================================================================
    /// A named route was requested but does not exist.
    #[error("E041: Route '{name}' not found")]
    RouteNotFound {
        /// The route name that was requested.
        name: String,
    },

    /// A route URL could not be built because a parameter is missing.
    #[error("E042: Missing parameter '{param}' for route '{name}'")]
    RouteParam {
        /// The route name.
        name: String,
        /// The missing parameter.
        param: String,
    },

    // =========================================================================
    // Template Errors (E060-E079)
    // =========================================================================
    /// A view template file does not exist.
    #[error("E061: Template '{template}' not found at {path}")]
    TemplateMissing {
        /// The template name.
        template: String,
        /// The path that was probed.
        path: PathBuf,
    },

    /// Rendering a view template failed.
    #[error("E062: Failed to render template '{template}': {cause}")]
    TemplateRender {
        /// The template name.
        template: String,
        /// Reason for the render failure.
        cause: String,
    },

    // =========================================================================
    // Queue / Mail Errors (E080-E099)
    // =========================================================================
    /// A named queue is not registered.
    #[error("E081: Queue '{name}' is not registered")]
    UnknownQueue {
        /// The queue name.
        name: String,
    },

    /// A named mailer is not registered.
    #[error("E082: Mailer '{name}' is not registered")]
    UnknownMailer {
        /// The mailer name.
        name: String,
    },

    // =========================================================================
    // Notifier Errors (E100-E119)
    // =========================================================================
    /// A named notifier channel is not registered.
    #[error("E101: Channel '{name}' is not registered")]
    UnknownChannel {
        /// The channel name.
        name: String,
    },

    /// A notification does not define a message for a channel.
    #[error(
        "E102: Undefined message on channel '{channel}' for notification '{notification}' to recipient '{recipient}'"
    )]
    UndefinedMessage {
        /// The channel that was asked to deliver.
        channel: String,
        /// The notification name.
        notification: String,
        /// The recipient identity.
        recipient: String,
    },

    /// A recipient has no address for a channel.
    #[error(
        "E103: Undefined address on channel '{channel}' for notification '{notification}' to recipient '{recipient}'"
    )]
    UndefinedAddress {
        /// The channel that was asked to deliver.
        channel: String,
        /// The notification name.
        notification: String,
        /// The recipient identity.
        recipient: String,
    },

    // =========================================================================
    // File Storage Errors (E120-E139)
    // =========================================================================
    /// A named storage is not registered.
    #[error("E121: Storage '{name}' is not registered")]
    UnknownStorage {
        /// The storage name.
        name: String,
    },

    /// A storage filesystem operation failed.
    #[error("E122: Storage '{storage}' failed at '{path}': {cause}")]
    StorageIo {
        /// The storage name.
        storage: String,
        /// The storage-relative path.
        path: String,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Session Errors (E140-E159)
    // =========================================================================
    /// Loading or saving session data failed.
    #[error("E141: Session storage failed: {cause}")]
    SessionIo {
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Auth Errors (E160-E179)
    // =========================================================================
    /// A token storage operation failed.
    #[error("E161: Token storage '{storage}' failed: {cause}")]
    TokenStorage {
        /// The token storage name.
        storage: String,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // Handler Errors (E180-E199)
    // =========================================================================
    /// A route handler failed.
    #[error("E181: Handler failed: {cause}")]
    Handler {
        /// Reason for the handler failure.
        cause: String,
    },

    // =========================================================================
    // I/O and Serialization Errors (E900-E999)
    // =========================================================================
    /// File I/O error.
    #[error("E901: I/O error at {path}: {cause}")]
    Io {
        /// The path where the I/O error occurred.
        path: PathBuf,
        /// Description of the I/O error.
        cause: String,
    },

    /// JSON serialization or deserialization error.
    #[error("E902: JSON error: {0}")]
    Json(
        /// The serialization error message.
        String,
    ),
}

impl CoreError {
    /// Get the error code (e.g., "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownDir { .. } => "E001",
            Self::DirCreate { .. } => "E002",
            Self::ConfigLoad { .. } => "E021",
            Self::ConfigParse { .. } => "E022",
            Self::RouteNotFound { .. } => "E041",
            Self::RouteParam { .. } => "E042",
            Self::TemplateMissing { .. } => "E061",
            Self::TemplateRender { .. } => "E062",
            Self::UnknownQueue { .. } => "E081",
            Self::UnknownMailer { .. } => "E082",
            Self::UnknownChannel { .. } => "E101",
            Self::UndefinedMessage { .. } => "E102",
            Self::UndefinedAddress { .. } => "E103",
            Self::UnknownStorage { .. } => "E121",
            Self::StorageIo { .. } => "E122",
            Self::SessionIo { .. } => "E141",
            Self::TokenStorage { .. } => "E161",
            Self::Handler { .. } => "E181",
            Self::Io { .. } => "E901",
            Self::Json(_) => "E902",
        }
    }

    /// Check if this error is an undefined-notification fault (missing
    /// message or missing recipient address).
    #[must_use]
    pub fn is_undefined_fault(&self) -> bool {
        matches!(
            self,
            Self::UndefinedMessage { .. } | Self::UndefinedAddress { .. }
        )
    }

    /// Check if this error is a registry lookup failure for a named
    /// collaborator (queue, mailer, channel, storage, directory).
    #[must_use]
    pub fn is_unknown_name(&self) -> bool {
        matches!(
            self,
            Self::UnknownDir { .. }
                | Self::UnknownQueue { .. }
                | Self::UnknownMailer { .. }
                | Self::UnknownChannel { .. }
                | Self::UnknownStorage { .. }
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Extension trait for mapping raw I/O failures onto kernel errors.
pub trait IoResultExt<T> {
    /// Attach the path where the I/O operation failed.
    fn io_at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| CoreError::Io {
            path: path.into(),
            cause: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_correct() {
        let err = CoreError::UnknownDir {
            name: "config".to_string(),
        };
        assert_eq!(err.code(), "E001");

        let err = CoreError::UndefinedAddress {
            channel: "sms".to_string(),
            notification: "order_shipped".to_string(),
            recipient: "user:5".to_string(),
        };
        assert_eq!(err.code(), "E103");
    }

    #[test]
    fn error_display() {
        let err = CoreError::UndefinedMessage {
            channel: "mail".to_string(),
            notification: "welcome".to_string(),
            recipient: "user:7".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("E102"));
        assert!(msg.contains("mail"));
        assert!(msg.contains("welcome"));
        assert!(msg.contains("user:7"));
    }

    #[test]
    fn undefined_faults() {
        assert!(
            CoreError::UndefinedMessage {
                channel: "sms".to_string(),
                notification: "n".to_string(),
                recipient: "r".to_string()
            }
            .is_undefined_fault()
        );

        assert!(
            !CoreError::RouteNotFound {
                name: "login".to_string()
            }
            .is_undefined_fault()
        );
    }

    #[test]
    fn io_result_ext_attaches_path() {
        let res: std::io::Result<()> = Err(std::io::Error::other("denied"));
        let err = res.io_at("/tmp/missing").unwrap_err();
        assert_eq!(err.code(), "E901");
        assert!(format!("{}", err).contains("/tmp/missing"));
    }
}
