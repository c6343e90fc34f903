// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static landing page served at `/`.
//!
//! Everything else on the listener is treated as a proxy target, so this is
//! the one page a human ever sees.  It holds a single form that
//! percent-encodes the entered URL and navigates to `/{encoded}`.

use reqwest::Body;
use reqwest::header::CONTENT_TYPE;

use hyper::Response;

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Periscope</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 4rem auto; padding: 0 1rem; color: #222; }
  h1 { font-size: 1.6rem; }
  form { display: flex; gap: .5rem; margin: 1.5rem 0; }
  input { flex: 1; padding: .5rem .75rem; font-size: 1rem; border: 1px solid #bbb; border-radius: 4px; }
  button { padding: .5rem 1.25rem; font-size: 1rem; border: none; border-radius: 4px; background: #2563eb; color: #fff; cursor: pointer; }
  button:hover { background: #1d4ed8; }
  .hint { color: #666; font-size: .9rem; }
  code { background: #f3f4f6; padding: .1rem .3rem; border-radius: 3px; }
</style>
</head>
<body>
<h1>Periscope</h1>
<p>Enter a URL below to browse it through this proxy.</p>
<form onsubmit="go(); return false;">
  <input id="url" type="text" placeholder="https://example.com" autofocus>
  <button type="submit">Go</button>
</form>
<p class="hint">Or request <code>/&lt;percent-encoded URL&gt;</code> directly. URLs without a scheme get this page's scheme.</p>
<script>
function go() {
  var url = document.getElementById('url').value.trim();
  if (!url) { return; }
  location.href = '/' + encodeURIComponent(url);
}
</script>
</body>
</html>
"#;

/// Build the landing page response.
pub(super) fn response() -> Response<Body> {
    Response::builder()
        .status(200)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(LANDING_PAGE))
        .unwrap()
}
