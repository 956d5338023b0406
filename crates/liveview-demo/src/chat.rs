//! Chat room: nicknames, public and private messages, presence.
//!
//! Each browser tab is one session. Sessions talk to each other only through
//! the registry bus, with two message shapes:
//!
//! - `NEW_USER`: the user list changed, re-render the recipient picker
//! - `MSG|<html>`: append a line to the transcript

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use liveview_core::{ComponentId, HandlerError, SessionId};
use liveview_server::session::{Session, SessionHooks, SessionSpec};
use liveview_server::{EventComponent, SessionFactory, SessionRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

/// Recipient value meaning "everyone".
pub const PUBLIC: &str = "*";
const PUBLIC_LABEL: &str = "Everyone";

const NEW_USER: &str = "NEW_USER";
const MSG_PREFIX: &str = "MSG|";

const STATUS_INTERVAL: Duration = Duration::from_secs(5);
/// Transcript lines kept per session; older lines scroll off.
const TRANSCRIPT_LINES: usize = 200;

/// Nicknames of everyone who has joined, keyed by session.
#[derive(Debug, Default)]
pub struct ChatRoom {
    users: Mutex<BTreeMap<SessionId, String>>,
}

impl ChatRoom {
    /// Create an empty room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `nickname` for `id`. Fails if it is blank or taken by someone else.
    pub fn join(&self, id: &SessionId, nickname: &str) -> bool {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return false;
        }
        let mut users = self.users.lock();
        if users.iter().any(|(other, name)| other != id && name == nickname) {
            return false;
        }
        let _ = users.insert(id.clone(), nickname.to_owned());
        true
    }

    /// Drop `id` from the room, returning its nickname.
    pub fn leave(&self, id: &str) -> Option<String> {
        self.users.lock().remove(id)
    }

    /// Nickname claimed by `id`.
    pub fn nickname(&self, id: &str) -> Option<String> {
        self.users.lock().get(id).cloned()
    }

    /// Recipient choices: everyone first, then users by session id.
    pub fn recipients(&self) -> Vec<(String, String)> {
        let users = self.users.lock();
        std::iter::once((PUBLIC.to_owned(), PUBLIC_LABEL.to_owned()))
            .chain(users.iter().map(|(id, name)| (id.to_string(), name.clone())))
            .collect()
    }
}

/// Build a factory producing one chat session per connection.
pub fn factory(room: Arc<ChatRoom>) -> impl SessionFactory {
    move || new_session(&room)
}

fn new_session(room: &Arc<ChatRoom>) -> SessionSpec {
    let id = SessionId::new();
    let selected = Arc::new(Mutex::new(PUBLIC.to_owned()));
    let transcript = Arc::new(Mutex::new(Vec::<String>::new()));

    SessionSpec::new(EventComponent::markup(LAYOUT))
        .with_id(id)
        .mount("text_nickname", nickname_input(room))
        .mount("select_to", recipient_select(room, &selected))
        .mount("button_send", send_button(room, &selected))
        .hooks(
            SessionHooks::new()
                .on_event(move |session: Arc<Session>, message: Value| {
                    let transcript = Arc::clone(&transcript);
                    async move { on_bus_message(&session, &message, &transcript) }
                })
                .on_tick(STATUS_INTERVAL, |session: Arc<Session>| async move {
                    let now = chrono::Local::now().format("%H:%M:%S").to_string();
                    let _ = session.fill("div_status", format!("online · {now}"));
                })
                .on_destroy({
                    let room = Arc::clone(room);
                    move |id: SessionId, registry: Arc<SessionRegistry>| {
                        let left = room.leave(&id);
                        async move {
                            if let Some(nickname) = left {
                                info!(%nickname, "user left");
                            }
                            let _ = registry.broadcast(Value::from(NEW_USER)).await;
                        }
                    }
                }),
        )
}

const LAYOUT: &str = r#"<div> Nickname:
  <input type="text" id="text_nickname" onchange="send_event(this.id,'Change',this.value)"/>
  <span id="span_text_nickname"></span>
</div>
<hr/>
<div id="div_general_chat"></div>
<hr/>
<div> Message: <input type="text" id="text_msg"/>
  to <select id="select_to" onchange="send_event(this.id,'Change',this.value)"></select>
  <button id="button_send" onclick="send_event(this.id,'Click')">Send</button>
</div>
<hr/>
<div id="div_status"></div>"#;

fn nickname_input(room: &Arc<ChatRoom>) -> EventComponent {
    let room = Arc::clone(room);
    EventComponent::handlers().on("Change", move |session: Arc<Session>, payload: Value| {
        let room = Arc::clone(&room);
        async move {
            let nickname = payload
                .as_str()
                .ok_or_else(|| HandlerError::InvalidPayload("nickname must be a string".into()))?;
            if !room.join(session.id(), nickname) {
                let _ = session.set_property("text_nickname", "value", "");
                return Ok(());
            }
            info!(nickname, "user joined");
            let _ = session.fill("span_text_nickname", escape_html(nickname.trim()));
            let _ = session.broadcast(NEW_USER).await;
            Ok(())
        }
    })
}

fn recipient_select(room: &Arc<ChatRoom>, selected: &Arc<Mutex<String>>) -> EventComponent {
    let render_room = Arc::clone(room);
    let render_selected = Arc::clone(selected);
    let selected = Arc::clone(selected);
    EventComponent::new(move |_: &ComponentId| {
        render_options(&render_room.recipients(), &render_selected.lock())
    })
    .on("Change", move |_, payload: Value| {
        let selected = Arc::clone(&selected);
        async move {
            let value = payload.as_str().unwrap_or(PUBLIC).to_owned();
            *selected.lock() = value;
            Ok(())
        }
    })
}

fn send_button(room: &Arc<ChatRoom>, selected: &Arc<Mutex<String>>) -> EventComponent {
    let room = Arc::clone(room);
    let selected = Arc::clone(selected);
    EventComponent::handlers().on("Click", move |session: Arc<Session>, _| {
        let room = Arc::clone(&room);
        let selected = Arc::clone(&selected);
        async move {
            let Some(nickname) = room.nickname(session.id()) else {
                let _ = session.fill("div_status", "choose a nickname first");
                return Ok(());
            };
            let text = session
                .query_value("text_msg")
                .await
                .map_err(|e| HandlerError::failed(e.to_string()))?;
            let text = text.as_str().unwrap_or_default().trim().to_owned();
            if text.is_empty() {
                return Ok(());
            }
            let _ = session.set_property("text_msg", "value", "");

            let to = selected.lock().clone();
            let stamp = chrono::Local::now().format("%H:%M").to_string();
            let line = if to == PUBLIC {
                format!("[{stamp}] {}[Public]: {}", escape_html(&nickname), escape_html(&text))
            } else {
                let Some(recipient) = room.nickname(&to) else {
                    let _ = session.fill("div_status", "recipient has left");
                    return Ok(());
                };
                format!(
                    "[{stamp}] {} to {}[Private]: {}",
                    escape_html(&nickname),
                    escape_html(&recipient),
                    escape_html(&text)
                )
            };
            let message = Value::from(format!("{MSG_PREFIX}{line}"));
            let delivered = if to == PUBLIC {
                session.broadcast(message).await
            } else {
                session.send_to(message, &[to.as_str(), session.id().as_str()]).await
            };
            debug!(delivered, "chat message sent");
            Ok(())
        }
    })
}

fn on_bus_message(session: &Session, message: &Value, transcript: &Mutex<Vec<String>>) {
    let Some(message) = message.as_str() else {
        return;
    };
    if let Some(line) = message.strip_prefix(MSG_PREFIX) {
        let html = append_line(&mut transcript.lock(), line);
        let _ = session.fill("div_general_chat", html);
    } else if message == NEW_USER || message == liveview_server::session::FIRST_CONTACT_MESSAGE {
        let _ = session.commit("select_to");
    }
}

/// Append `line`, drop what no longer fits, and render the transcript.
fn append_line(lines: &mut Vec<String>, line: &str) -> String {
    lines.push(line.to_owned());
    let excess = lines.len().saturating_sub(TRANSCRIPT_LINES);
    let _ = lines.drain(..excess);
    lines.join("<br/>")
}

fn render_options(recipients: &[(String, String)], selected: &str) -> String {
    recipients
        .iter()
        .map(|(value, label)| {
            let marker = if value == selected { " selected" } else { "" };
            format!(
                r#"<option value="{}"{marker}>{}</option>"#,
                escape_html(value),
                escape_html(label)
            )
        })
        .collect()
}

/// Escape text for inclusion in HTML markup or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_rejects_blank_and_taken_nicknames() {
        let room = ChatRoom::new();
        let (a, b) = (SessionId::from("a"), SessionId::from("b"));
        assert!(room.join(&a, "alice"));
        assert!(!room.join(&b, "alice"));
        assert!(!room.join(&b, "   "));
        assert!(room.join(&a, "alice"));
        assert!(room.join(&b, " bob "));
        assert_eq!(room.nickname("b").as_deref(), Some("bob"));
    }

    #[test]
    fn leave_frees_nickname() {
        let room = ChatRoom::new();
        let a = SessionId::from("a");
        assert!(room.join(&a, "alice"));
        assert_eq!(room.leave("a").as_deref(), Some("alice"));
        assert!(room.join(&SessionId::from("b"), "alice"));
        assert!(room.leave("a").is_none());
    }

    #[test]
    fn recipients_start_with_everyone() {
        let room = ChatRoom::new();
        let _ = room.join(&SessionId::from("s2"), "zed");
        let _ = room.join(&SessionId::from("s1"), "amy");
        let got = room.recipients();
        assert_eq!(got[0], (PUBLIC.to_owned(), PUBLIC_LABEL.to_owned()));
        assert_eq!(got[1], ("s1".to_owned(), "amy".to_owned()));
        assert_eq!(got[2], ("s2".to_owned(), "zed".to_owned()));
    }

    #[test]
    fn transcript_keeps_only_recent_lines() {
        let mut lines = Vec::new();
        for n in 0..TRANSCRIPT_LINES + 5 {
            let _ = append_line(&mut lines, &format!("line {n}"));
        }
        assert_eq!(lines.len(), TRANSCRIPT_LINES);
        assert_eq!(lines[0], "line 5");

        let html = append_line(&mut lines, "last");
        assert_eq!(lines.len(), TRANSCRIPT_LINES);
        assert!(html.starts_with("line 6<br/>"));
        assert!(html.ends_with("<br/>last"));
    }

    #[test]
    fn options_mark_selection_and_escape() {
        let html = render_options(
            &[("*".into(), "Everyone".into()), ("x".into(), "<b>".into())],
            "x",
        );
        assert_eq!(
            html,
            r#"<option value="*">Everyone</option><option value="x" selected>&lt;b&gt;</option>"#
        );
    }

    #[test]
    fn escape_html_covers_specials() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn factory_mounts_chat_components() {
        let spec = factory(Arc::new(ChatRoom::new())).create();
        let ids: Vec<_> = spec.components.iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(ids, vec!["text_nickname", "select_to", "button_send"]);
        assert!(spec.id.is_some());
        assert_eq!(spec.hooks.tick_interval(), Some(STATUS_INTERVAL));
    }
}
