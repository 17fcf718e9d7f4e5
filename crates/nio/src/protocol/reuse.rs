use http::header::CONNECTION;
use http::Version;

use crate::protocol::ResponseHead;

/// Decides whether a connection remains open for another exchange after the
/// current response completes.
///
/// Consulted by both engines after every fully transferred response.
pub trait ConnectionReuseStrategy: Send + Sync {
    fn keep_alive(&self, response: &ResponseHead) -> bool;
}

/// The standard HTTP/1.x keep-alive rules.
///
/// - `Connection: close` always ends the connection
/// - HTTP/1.1 (and later) connections are persistent by default
/// - HTTP/1.0 connections persist only with an explicit `Connection: keep-alive`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultReuseStrategy;

impl ConnectionReuseStrategy for DefaultReuseStrategy {
    fn keep_alive(&self, response: &ResponseHead) -> bool {
        let mut directive = None;
        for value in response.headers().get_all(CONNECTION) {
            if let Ok(token) = value.to_str() {
                if token.eq_ignore_ascii_case("close") {
                    directive = Some(false);
                    break;
                }
                if token.eq_ignore_ascii_case("keep-alive") {
                    directive = Some(true);
                }
            }
        }

        match directive {
            Some(keep) => keep,
            None => response.version() >= Version::HTTP_11,
        }
    }
}
