//! Bootstrap HTML page for first-time visitors.
//!
//! Embeds the filtered content known at request time, the resolved cursor,
//! and the streaming endpoint URL, so the inline script can render
//! immediately and then follow along over the WebSocket.

/// Values injected into the page.
#[derive(Debug)]
pub struct PageParams<'a> {
    /// `ws` or `wss`.
    pub scheme: &'a str,
    /// Host (and port) the client should reconnect to.
    pub host: &'a str,
    /// Streaming endpoint path, without leading slash.
    pub ws_path: &'a str,
    /// Resolved cursor, embedded as decimal strings.
    pub last_mod: i64,
    pub last_pos: u64,
    /// Display name of the monitored file.
    pub filename: &'a str,
    /// Filtered content as of request time.
    pub content: &'a str,
}

/// Renders the bootstrap document.
pub fn render(params: &PageParams<'_>) -> String {
    let title = escape_html(params.filename);
    // JSON string literals are valid JavaScript string literals. `<` is
    // re-escaped afterwards so `</script>`-style content cannot close the
    // script block early.
    let content_js = serde_json::to_string(params.content)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c");
    let stream_url = format!(
        "{}://{}/{}?lastMod={}&lastPos={}",
        params.scheme, params.host, params.ws_path, params.last_mod, params.last_pos,
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="description" content="tailcast: live file tail in the browser">
<link rel="icon" href="data:;base64,iVBORw0KGgo=">
<title>{title}</title>
<style>
  body {{ margin: 0; padding: 0; font-family: monospace; }}
  header {{
    position: fixed; top: 0; width: 100vw; display: flex;
    justify-content: space-between; padding: 16px 0;
    background: #111; color: #eee; font-family: sans-serif;
  }}
  header div {{ padding: 0 20px; }}
  #lines {{ margin-top: 64px; }}
  .line {{ padding: 0 10px; white-space: pre-wrap; }}
  .line.marked {{ background: #ffb2b0; }}
</style>
</head>
<body>
<header>
  <div>File: {title}</div>
  <div><input id="filter" placeholder="filter" size="20"></div>
</header>
<div id="lines"></div>
<script>
  var container = document.getElementById("lines");
  var filterBox = document.getElementById("filter");

  function append(text) {{
    var filter = filterBox.value;
    var lines = text.split("\n");
    for (var i = 0; i < lines.length; i++) {{
      if (lines[i] === "" && i === lines.length - 1) continue;
      if (filter && !lines[i].match(new RegExp(filter, "i"))) continue;
      var el = document.createElement("div");
      el.className = "line";
      el.textContent = lines[i];
      el.addEventListener("click", function () {{
        this.classList.toggle("marked");
      }});
      container.appendChild(el);
    }}
    window.scrollTo(0, document.body.scrollHeight);
  }}

  append({content_js});

  var conn = new WebSocket("{stream_url}");
  conn.onmessage = function (evt) {{ append(evt.data); }};
  conn.onclose = function () {{ append("--- connection closed ---\n"); }};
</script>
</body>
</html>
"#
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params<'a>(content: &'a str, filename: &'a str) -> PageParams<'a> {
        PageParams {
            scheme: "ws",
            host: "127.0.0.1:8080",
            ws_path: "ws",
            last_mod: 1_700_000_000,
            last_pos: 1234,
            filename,
            content,
        }
    }

    #[test]
    fn embeds_cursor_and_stream_url() {
        let html = render(&params("hello\n", "/var/log/app.log"));
        assert!(html.contains("ws://127.0.0.1:8080/ws?lastMod=1700000000&lastPos=1234"));
        assert!(html.contains("/var/log/app.log"));
    }

    #[test]
    fn content_is_json_encoded() {
        let html = render(&params("line with \"quotes\"\n", "f.log"));
        assert!(html.contains(r#""line with \"quotes\"\n""#));
    }

    #[test]
    fn script_breakout_is_neutralized() {
        let html = render(&params("</script><script>alert(1)</script>", "f.log"));
        // `<` is unicode-escaped, so the raw closing tag never appears in
        // the embedded content.
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains("\\u003c/script>"));
    }

    #[test]
    fn filename_is_html_escaped() {
        let html = render(&params("", "<img src=x>.log"));
        assert!(html.contains("&lt;img src=x&gt;.log"));
        assert!(!html.contains("<img src=x>.log"));
    }

    #[test]
    fn wss_scheme_propagates() {
        let mut p = params("", "f.log");
        p.scheme = "wss";
        let html = render(&p);
        assert!(html.contains("wss://127.0.0.1:8080/ws"));
    }
}
