//! Event-Kanal – strukturierte JSON-Events neben dem Audio
//!
//! Der Kanal wird vor dem Offer angelegt, damit er im ausgehandelten SDP
//! enthalten ist. Eingehende Nachrichten werden in Ankunftsreihenfolge
//! zugestellt. Solange kein Handler registriert ist, werden sie gepuffert.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use voxbridge_core::{Result, SessionError};

use crate::handle::ConnectionHandle;
use crate::transport::DataChannelTransport;

type Handler = Box<dyn Fn(Value) + Send + Sync>;

/// Bidirektionaler Kanal fuer Events, Clone teilt den Kanal
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<EventChannelInner>,
}

struct EventChannelInner {
    label: String,
    transport: Arc<dyn DataChannelTransport>,
    zustellung: Mutex<Zustellung>,
}

#[derive(Default)]
struct Zustellung {
    handler: Option<Handler>,
    puffer: VecDeque<Value>,
}

impl EventChannel {
    /// Legt den Kanal auf der Verbindung an und startet die Zustellung
    pub async fn open(handle: &ConnectionHandle, label: &str) -> Result<Self> {
        let transport = handle.transport().create_data_channel(label).await?;
        let rx = transport.take_receiver().ok_or_else(|| {
            SessionError::transport(format!("Empfaenger von Kanal '{}' bereits vergeben", label))
        })?;

        let channel = Self {
            inner: Arc::new(EventChannelInner {
                label: label.to_owned(),
                transport,
                zustellung: Mutex::new(Zustellung::default()),
            }),
        };
        handle.channel_setzen(channel.clone())?;

        tokio::spawn(zustell_loop(Arc::downgrade(&channel.inner), rx));
        debug!(connection = %handle.id(), label, "Event-Kanal angelegt");
        Ok(channel)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_open(&self) -> bool {
        self.inner.transport.is_open()
    }

    /// Registriert den Handler fuer eingehende Nachrichten
    ///
    /// Gepufferte Nachrichten werden sofort in Reihenfolge zugestellt.
    /// Ein spaeterer Aufruf ersetzt den Handler. Der Handler laeuft unter
    /// der Zustell-Sperre und darf `on_message` nicht selbst aufrufen.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let mut z = self.inner.zustellung.lock();
        while let Some(nachricht) = z.puffer.pop_front() {
            handler(nachricht);
        }
        z.handler = Some(Box::new(handler));
    }

    /// Serialisiert und sendet eine Nachricht
    pub async fn send<T: Serialize + ?Sized>(&self, nachricht: &T) -> Result<()> {
        if !self.is_open() {
            return Err(SessionError::ChannelNotOpen(self.inner.label.clone()));
        }
        let text = serde_json::to_string(nachricht)
            .map_err(|e| SessionError::transport(format!("Event serialisieren: {}", e)))?;
        trace!(label = %self.inner.label, bytes = text.len(), "Sende Event");
        self.inner.transport.send_text(text).await
    }

    /// Schliesst den Datenkanal, nicht zugestellte Nachrichten verfallen
    pub async fn close(&self) {
        self.inner.transport.close().await;
        let verworfen = {
            let mut z = self.inner.zustellung.lock();
            let n = z.puffer.len();
            z.puffer.clear();
            n
        };
        debug!(label = %self.inner.label, verworfen, "Event-Kanal geschlossen");
    }
}

impl EventChannelInner {
    fn zustellen(&self, nachricht: Value) {
        let mut z = self.zustellung.lock();
        match z.handler.as_ref() {
            Some(handler) => handler(nachricht),
            None => z.puffer.push_back(nachricht),
        }
    }
}

/// Ungueltiges JSON wird als String weitergereicht statt verworfen
fn nachricht_lesen(label: &str, roh: String) -> Value {
    match serde_json::from_str(&roh) {
        Ok(v) => v,
        Err(e) => {
            warn!(label, fehler = %e, "Kanal-Nachricht ist kein JSON");
            Value::String(roh)
        }
    }
}

async fn zustell_loop(inner: Weak<EventChannelInner>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(roh) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let nachricht = nachricht_lesen(&inner.label, roh);
        inner.zustellen(nachricht);
    }
    trace!("Zustell-Loop des Event-Kanals beendet");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ungueltiges_json_bleibt_erhalten() {
        assert_eq!(
            nachricht_lesen("x", r#"{"type":"ping"}"#.into()),
            serde_json::json!({"type": "ping"})
        );
        assert_eq!(
            nachricht_lesen("x", "kein json".into()),
            Value::String("kein json".into())
        );
    }
}
