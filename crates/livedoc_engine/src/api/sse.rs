use std::io::{self, Read};

use serde_json::json;

use crate::live_sync::{Subscription, SyncEvent};

/* 📖 # Why use SSE for reload notifications?
Server-Sent Events are a one-way, browser-native push channel: the page opens an
`EventSource` and gets reconnection for free. Reload signals only ever flow
server to client, so nothing more is needed. Heartbeats are sent as SSE
comments, which the browser ignores but which still force a write to the socket
and so reveal a dead peer.
*/

/// Format an event as SSE wire text.
pub fn format_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Connected { project } => {
            let data = json!({ "project": project.as_str() });
            format!("event: connected\ndata: {data}\n\n")
        }
        SyncEvent::Reload { project, timestamp } => {
            let data = json!({ "project": project.as_str(), "timestamp": timestamp });
            format!("event: reload\ndata: {data}\n\n")
        }
        SyncEvent::Heartbeat => ": heartbeat\n\n".to_string(),
    }
}

/* 📖 # Why implement Read for SseStream?
Response bodies are `Read`ers. SseStream bridges from the subscription (where
events arrive) to the HTTP body (what is written to the client). `read` blocks
on the next event, which is fine because every request has its own thread. When
the client goes away the server drops the stream, and with it the
subscription, which unsubscribes.
*/

/// SSE body for one subscription. Without a subscription the body is empty.
pub struct SseStream {
    subscription: Option<Subscription>,
    buffer: Vec<u8>,
    position: usize,
}

impl SseStream {
    pub fn new(subscription: Option<Subscription>) -> Self {
        Self {
            subscription,
            buffer: Vec::new(),
            position: 0,
        }
    }
}

impl Read for SseStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position >= self.buffer.len() {
            let Some(subscription) = &self.subscription else {
                return Ok(0);
            };
            match subscription.recv() {
                Some(event) => {
                    self.buffer = format_event(&event).into_bytes();
                    self.position = 0;
                }
                None => {
                    self.subscription = None;
                    return Ok(0);
                }
            }
        }

        let remaining = self.buffer.len() - self.position;
        let to_copy = remaining.min(buf.len());
        buf[..to_copy].copy_from_slice(&self.buffer[self.position..self.position + to_copy]);
        self.position += to_copy;

        Ok(to_copy)
    }
}
