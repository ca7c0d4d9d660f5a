//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to connected browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Refresh stylesheets without reloading the page
    Css,

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a new reload hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open
        let _ = self.sender.send(msg);
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The browser side of live reload, served at `/__livereload.js`.
///
/// Connects back to whichever host served the page, so it works for any
/// bind address or port.
pub fn reload_client_script() -> &'static str {
    r#"(function() {
  'use strict';

  var attempts = 0;
  var maxAttempts = 10;

  function refreshStylesheets() {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    Array.prototype.forEach.call(links, function(link) {
      var url = new URL(link.href, location.href);
      if (url.host !== location.host) {
        return;
      }
      url.searchParams.set('livereload', Date.now());
      link.href = url.toString();
    });
  }

  function connect() {
    var scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
    var ws = new WebSocket(scheme + location.host + '/__livereload');

    ws.onopen = function() {
      if (attempts > 0) {
        location.reload();
        return;
      }
      console.log('[livereload] Connected');
    };

    ws.onmessage = function(event) {
      var msg = JSON.parse(event.data);
      switch (msg.type) {
        case 'reload':
          location.reload();
          break;
        case 'css':
          refreshStylesheets();
          break;
        case 'connected':
          attempts = 0;
          break;
      }
    };

    ws.onclose = function() {
      if (attempts < maxAttempts) {
        attempts++;
        setTimeout(connect, 1000 * attempts);
      }
    };
  }

  connect();
})();
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.send(ReloadMessage::Css);

        assert_eq!(first.try_recv().unwrap(), ReloadMessage::Css);
        assert_eq!(second.try_recv().unwrap(), ReloadMessage::Css);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn sending_without_clients_is_fine() {
        let hub = ReloadHub::new();
        hub.send(ReloadMessage::Reload);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn serializes_messages() {
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Reload).unwrap(),
            r#"{"type":"reload"}"#
        );
        assert_eq!(
            serde_json::to_string(&ReloadMessage::Css).unwrap(),
            r#"{"type":"css"}"#
        );
        assert_eq!(
            serde_json::from_str::<ReloadMessage>(r#"{"type":"connected"}"#).unwrap(),
            ReloadMessage::Connected
        );
    }

    #[test]
    fn client_script_uses_the_serving_host() {
        let script = reload_client_script();
        assert!(script.contains("location.host + '/__livereload'"));
        assert!(script.contains("case 'css'"));
    }
}
