//! Response emission.

use crate::error::{IoResultExt, Result};
use crate::http::response::Response;
use std::io::Write;
use std::sync::Arc;

/// Sends a finished response to the outside world.
pub trait ResponseEmitter: Send + Sync {
    /// Emit the response.
    fn emit(&self, response: &Response) -> Result<()>;

    /// Whether this emitter only captures instead of sending.
    fn is_mock(&self) -> bool {
        false
    }
}

/// Shared emitter handle flowing through the capability chain.
pub type SharedEmitter = Arc<dyn ResponseEmitter>;

/// Writes the wire form of a response to stdout.
pub struct WriterEmitter;

impl ResponseEmitter for WriterEmitter {
    fn emit(&self, response: &Response) -> Result<()> {
        let mut out = std::io::stdout().lock();
        out.write_all(format_response(response).as_bytes())
            .io_at("stdout")?;
        out.write_all(response.body()).io_at("stdout")?;
        Ok(())
    }
}

/// Render status line and headers in wire form.
pub fn format_response(response: &Response) -> String {
    let mut out = format!("HTTP/1.1 {}\r\n", response.status());
    for (name, value) in response.headers() {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitters_are_real_by_default() {
        assert!(!WriterEmitter.is_mock());
    }

    #[test]
    fn wire_form_has_status_and_headers() {
        let response = Response::text(404, "gone");
        let wire = format_response(&response);
        assert!(wire.starts_with("HTTP/1.1 404\r\n"));
        assert!(wire.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }
}
