//! Page shell and the browser-side client script.

/// Client script: opens the socket, applies server frames to the DOM and
/// answers `get` queries. `send_event` is what markup calls from handlers.
const CLIENT_SCRIPT: &str = r#"
(function () {
  const scheme = location.protocol === "https:" ? "wss://" : "ws://";
  const ws = new WebSocket(scheme + location.host + "__WS_PATH__");

  window.send_event = function (id, event, data) {
    ws.send(JSON.stringify({ type: "data", id: id, event: event, data: data === undefined ? null : data }));
  };

  function read(el, subType, name) {
    if (!el) return null;
    switch (subType) {
      case "value": return el.value;
      case "html": return el.innerHTML;
      case "text": return el.innerText;
      case "style": return el.style.cssText;
      case "propertie": return el[name];
      default: return null;
    }
  }

  ws.onmessage = function (event) {
    const msg = JSON.parse(event.data);
    const el = msg.id ? document.getElementById(msg.id) : null;
    switch (msg.type) {
      case "fill": if (el) el.innerHTML = msg.value; break;
      case "text": if (el) el.innerText = msg.value; break;
      case "propertie": if (el) el[msg.propertie] = msg.value; break;
      case "style": if (el) el.style.cssText = msg.value; break;
      case "remove": if (el) el.remove(); break;
      case "script": (new Function(msg.value))(); break;
      case "get":
        ws.send(JSON.stringify({ type: "get", id_ret: msg.id_ret, data: read(el, msg.sub_type, msg.value) }));
        break;
    }
  };

  ws.onclose = function () {
    const content = document.getElementById("content");
    if (content) content.style.opacity = "0.4";
  };
})();
"#;

/// Render the HTML page that hosts a session.
///
/// The body holds the root mount point; everything inside it arrives over
/// the socket.
pub fn render(title: &str, ws_path: &str) -> String {
    let script = CLIENT_SCRIPT.replace("__WS_PATH__", ws_path);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8"/>
    <title>{title}</title>
  </head>
  <body>
    <div id="{root}"></div>
    <script>{script}</script>
  </body>
</html>
"#,
        title = crate::chat::escape_html(title),
        root = liveview_server::session::ROOT_COMPONENT_ID,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_has_mount_point_and_socket_path() {
        let html = render("Chat", "/ws_goliveview");
        assert!(html.contains(r#"<div id="content"></div>"#));
        assert!(html.contains(r#"location.host + "/ws_goliveview""#));
        assert!(!html.contains("__WS_PATH__"));
        assert!(html.contains("<title>Chat</title>"));
    }
}
