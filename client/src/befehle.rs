//! Befehle der Terminal-Konsole
//!
//! Eine Eingabezeile wird zu genau einem `Befehl` geparst. Leere Zeilen
//! ergeben `None`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Befehl {
    Connect,
    Disconnect,
    Mute,
    Unmute,
    Status,
    Health,
    /// Eingabegeraete auflisten
    Geraete,
    /// JSON-Event ueber den Event-Kanal senden
    Senden(Value),
    Hilfe,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum BefehlFehler {
    #[error("Unbekannter Befehl: {0} (hilfe fuer eine Uebersicht)")]
    Unbekannt(String),
    #[error("send erwartet ein JSON-Objekt, z.B. send {{\"type\":\"response.create\"}}")]
    JsonFehlt,
    #[error("Ungueltiges JSON: {0}")]
    UngueltigesJson(String),
    #[error("Event muss ein JSON-Objekt sein")]
    KeinObjekt,
}

pub const HILFE: &str = "\
Befehle:
  connect            Verbindung aufbauen
  disconnect         Verbindung abbauen
  mute | unmute      Mikrofon stumm schalten / freigeben
  status             Verbindungszustand anzeigen
  health             Backend-Health abfragen
  geraete            Eingabegeraete auflisten
  send <json>        Event ueber den Event-Kanal senden
  hilfe              Diese Uebersicht
  quit               Verbindung abbauen und beenden";

impl Befehl {
    pub fn parsen(zeile: &str) -> Result<Option<Self>, BefehlFehler> {
        let zeile = zeile.trim();
        if zeile.is_empty() {
            return Ok(None);
        }

        let (wort, rest) = match zeile.split_once(char::is_whitespace) {
            Some((wort, rest)) => (wort, rest.trim()),
            None => (zeile, ""),
        };

        let befehl = match wort.to_ascii_lowercase().as_str() {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "mute" => Self::Mute,
            "unmute" => Self::Unmute,
            "status" => Self::Status,
            "health" => Self::Health,
            "geraete" | "devices" => Self::Geraete,
            "send" => Self::Senden(event_parsen(rest)?),
            "hilfe" | "help" | "?" => Self::Hilfe,
            "quit" | "exit" => Self::Quit,
            _ => return Err(BefehlFehler::Unbekannt(wort.to_string())),
        };
        Ok(Some(befehl))
    }
}

fn event_parsen(text: &str) -> Result<Value, BefehlFehler> {
    if text.is_empty() {
        return Err(BefehlFehler::JsonFehlt);
    }
    let wert: Value =
        serde_json::from_str(text).map_err(|e| BefehlFehler::UngueltigesJson(e.to_string()))?;
    if !wert.is_object() {
        return Err(BefehlFehler::KeinObjekt);
    }
    Ok(wert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einfache_befehle() {
        assert_eq!(Befehl::parsen("connect"), Ok(Some(Befehl::Connect)));
        assert_eq!(Befehl::parsen("  DISCONNECT "), Ok(Some(Befehl::Disconnect)));
        assert_eq!(Befehl::parsen("mute"), Ok(Some(Befehl::Mute)));
        assert_eq!(Befehl::parsen("unmute"), Ok(Some(Befehl::Unmute)));
        assert_eq!(Befehl::parsen("status"), Ok(Some(Befehl::Status)));
        assert_eq!(Befehl::parsen("health"), Ok(Some(Befehl::Health)));
        assert_eq!(Befehl::parsen("geraete"), Ok(Some(Befehl::Geraete)));
        assert_eq!(Befehl::parsen("Devices"), Ok(Some(Befehl::Geraete)));
        assert_eq!(Befehl::parsen("help"), Ok(Some(Befehl::Hilfe)));
        assert_eq!(Befehl::parsen("exit"), Ok(Some(Befehl::Quit)));
    }

    #[test]
    fn leere_zeile() {
        assert_eq!(Befehl::parsen(""), Ok(None));
        assert_eq!(Befehl::parsen("   \t"), Ok(None));
    }

    #[test]
    fn send_mit_json() {
        let befehl = Befehl::parsen(r#"send {"type": "response.create"}"#)
            .unwrap()
            .unwrap();
        match befehl {
            Befehl::Senden(wert) => assert_eq!(wert["type"], "response.create"),
            anderer => panic!("Senden erwartet, bekommen: {:?}", anderer),
        }
    }

    #[test]
    fn send_fehlerfaelle() {
        assert_eq!(Befehl::parsen("send"), Err(BefehlFehler::JsonFehlt));
        assert_eq!(Befehl::parsen("send [1, 2]"), Err(BefehlFehler::KeinObjekt));
        assert!(matches!(
            Befehl::parsen("send {kaputt"),
            Err(BefehlFehler::UngueltigesJson(_))
        ));
    }

    #[test]
    fn unbekannter_befehl() {
        assert_eq!(
            Befehl::parsen("tanzen bitte"),
            Err(BefehlFehler::Unbekannt("tanzen".into()))
        );
    }
}
