use actix_web::{http::header::ContentType, HttpResponse};

use crate::auth::AuthenticatedUser;

const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
<main>
  <h1>Sign in</h1>
  <form id="login" method="post" action="/api/auth/login">
    <label>Username <input name="username" autocomplete="username" required></label>
    <label>Password <input name="password" type="password" autocomplete="current-password" required></label>
    <button type="submit">Sign in</button>
  </form>
  <form id="two-factor" method="post" action="/api/auth/verify-2fa" hidden>
    <input type="hidden" name="challengeToken">
    <label>Authentication code <input name="code" inputmode="numeric" pattern="[0-9]{6}" autocomplete="one-time-code"></label>
    <button type="submit">Verify</button>
  </form>
  <p id="error" role="alert"></p>
</main>
<script>
async function post(url, body) {
  const res = await fetch(url, {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify(body),
  });
  return res.json();
}
function fail(result) {
  document.getElementById("error").textContent = result.error ? result.error.message : "Sign in failed";
}
document.getElementById("login").addEventListener("submit", async (event) => {
  event.preventDefault();
  const form = event.target;
  const result = await post(form.action, { username: form.username.value, password: form.password.value });
  if (!result.success) return fail(result);
  if (!result.requiresTwoFactor) return window.location.assign("/");
  const second = document.getElementById("two-factor");
  second.challengeToken.value = result.challengeToken;
  form.hidden = true;
  second.hidden = false;
});
document.getElementById("two-factor").addEventListener("submit", async (event) => {
  event.preventDefault();
  const form = event.target;
  const result = await post(form.action, { challengeToken: form.challengeToken.value, code: form.code.value });
  if (!result.success) return fail(result);
  window.location.assign("/");
});
</script>
</body>
</html>
"#;

/// Public entry page; the guard redirects here.
pub async fn login_page() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(LOGIN_PAGE)
}

pub async fn dashboard(user: AuthenticatedUser) -> HttpResponse {
    let body = format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Dashboard</title></head>\n<body><h1>Welcome back, {}</h1></body>\n</html>\n",
        escape_html(&user.claims.name)
    );
    HttpResponse::Ok().content_type(ContentType::html()).body(body)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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
    fn test_escape_html() {
        assert_eq!(escape_html("<b>Tom & \"Jerry\"</b>"), "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }
}
