//! A `tracing_subscriber::Layer` that relays every log line to the most
//! recently connected TCP client, in addition to whatever `tracing-subscriber`
//! prints locally (spec's ambient logging stack; ported from `Logger.py`'s
//! socket server, which keeps exactly one "last writer wins" client).

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Holds the one live client connection, if any. Cloned into both the
/// accept-loop thread and the [`LogRelayLayer`] so both can reach it.
#[derive(Clone, Default)]
struct SharedClient(Arc<Mutex<Option<TcpStream>>>);

impl SharedClient {
    fn replace(&self, stream: TcpStream) {
        let mut guard = self.0.lock().expect("log relay client mutex poisoned");
        *guard = Some(stream);
    }

    fn send_line(&self, line: &str) {
        let mut guard = self.0.lock().expect("log relay client mutex poisoned");
        let Some(stream) = guard.as_mut() else {
            return;
        };

        let mut framed = String::with_capacity(line.len() + 2);
        framed.push_str(line);
        framed.push_str("\r\n");

        if stream.write_all(framed.as_bytes()).is_err() {
            *guard = None;
        }
    }
}

pub struct LogRelayLayer {
    client: SharedClient,
}

impl LogRelayLayer {
    /// Binds `host:port` and spawns a background thread that accepts
    /// connections, replacing whatever client was previously attached.
    /// Mirrors `Logger.start_server`.
    pub fn bind(host: &str, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((host, port))?;
        let client = SharedClient::default();
        let accept_client = client.clone();

        std::thread::Builder::new()
            .name("log-relay-listener".to_string())
            .spawn(move || accept_loop(listener, accept_client))
            .expect("failed to spawn log relay listener thread");

        Ok(Self { client })
    }
}

fn accept_loop(listener: TcpListener, client: SharedClient) {
    for incoming in listener.incoming() {
        if let Ok(stream) = incoming {
            client.replace(stream);
        }
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for LogRelayLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let timestamp = format_timestamp();
        let level = event.metadata().level();
        let line = format!("[{timestamp} {level}] {}", visitor.message)
            .replace('\r', "")
            .replace('\n', "");

        self.client.send_line(&line);
    }
}

fn format_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    humantime_timestamp(now.as_secs())
}

/// A minimal `%Y-%m-%d %H:%M:%S` UTC formatter, avoiding a chrono dependency
/// for one call site.
fn humantime_timestamp(unix_secs: u64) -> String {
    const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let days_total = unix_secs / 86_400;
    let secs_of_day = unix_secs % 86_400;
    let (hour, minute, second) = (secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60);

    let mut year = 1970u64;
    let mut days_left = days_total;
    loop {
        let is_leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
        let days_in_year = if is_leap { 366 } else { 365 };
        if days_left < days_in_year {
            break;
        }
        days_left -= days_in_year;
        year += 1;
    }

    let is_leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    let mut month = 0usize;
    for (i, &len) in DAYS_IN_MONTH.iter().enumerate() {
        let len = if i == 1 && is_leap { len + 1 } else { len };
        if days_left < len {
            month = i;
            break;
        }
        days_left -= len;
    }

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month + 1,
        days_left + 1,
        hour,
        minute,
        second
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_formats_to_1970() {
        assert_eq!(humantime_timestamp(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn known_timestamp_formats_correctly() {
        // 2021-01-01 00:00:00 UTC
        assert_eq!(humantime_timestamp(1_609_459_200), "2021-01-01 00:00:00");
    }
}
