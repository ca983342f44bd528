//! HTML templates for the local login widget.

/// Shared CSS styles.
const STYLES: &str = r#"
body { font-family: system-ui, -apple-system, "Segoe UI", sans-serif; background: #f4f5f7; color: #1f2933; margin: 0; }
.container { max-width: 380px; margin: 80px auto; }
.card { background: #fff; border-radius: 8px; box-shadow: 0 1px 3px rgba(0,0,0,.12); padding: 28px; }
.card-title { font-size: 20px; font-weight: 600; margin-bottom: 20px; }
.form-group { margin-bottom: 16px; }
.form-label { display: block; font-size: 14px; margin-bottom: 6px; }
.form-input { width: 100%; box-sizing: border-box; padding: 9px 11px; border: 1px solid #cbd2d9; border-radius: 4px; }
.checkbox { display: flex; gap: 8px; align-items: center; font-size: 14px; }
.btn { width: 100%; padding: 10px; border: 0; border-radius: 4px; background: #2563eb; color: #fff; font-weight: 600; cursor: pointer; }
.alert-error { background: #fdecea; color: #b42318; padding: 10px 12px; border-radius: 4px; margin-bottom: 16px; }
"#;

/// Text shown when a local sign-in is refused.
pub const LOGIN_ERROR_TEXT: &str = "Error";

fn html_page(title: &str, content: &str) -> String {
    let mut html = String::with_capacity(content.len() + 1500);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str(
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str("    <title>");
    html.push_str(&html_escape(title));
    html.push_str(" - SiteGate</title>\n");
    html.push_str("    <style>");
    html.push_str(STYLES);
    html.push_str("</style>\n</head>\n<body>\n    <div class=\"container\">\n");
    html.push_str(content);
    html.push_str("\n    </div>\n</body>\n</html>");
    html
}

/// Renders the password-less login form.
///
/// # Arguments
///
/// * `action` - Path the form posts to
/// * `csrf_token` - Token for the hidden CSRF field
/// * `error` - Optional error message to display
pub fn render_local_login_form(action: &str, csrf_token: &str, error: Option<&str>) -> String {
    let mut content = String::with_capacity(2048);

    content.push_str("<div class=\"card\">\n");
    content.push_str("<div class=\"card-title\">Sign in</div>\n\n");

    if let Some(e) = error {
        content.push_str("<div class=\"alert alert-error\">");
        content.push_str(&html_escape(e));
        content.push_str("</div>\n\n");
    }

    content.push_str("<form method=\"POST\" action=\"");
    content.push_str(&html_escape(action));
    content.push_str("\">\n");
    content.push_str("<input type=\"hidden\" name=\"csrf_token\" value=\"");
    content.push_str(&html_escape(csrf_token));
    content.push_str("\">\n\n");

    content.push_str("<div class=\"form-group\">\n");
    content.push_str("<label class=\"form-label\" for=\"username\">Username</label>\n");
    content
        .push_str("<input type=\"text\" id=\"username\" name=\"username\" class=\"form-input\" ");
    content.push_str("required autocomplete=\"username\">\n");
    content.push_str("</div>\n\n");

    content.push_str("<div class=\"form-group checkbox\">\n");
    content.push_str(
        "<input type=\"checkbox\" id=\"remember_me\" name=\"remember_me\" value=\"true\">\n",
    );
    content.push_str("<label for=\"remember_me\">Remember me</label>\n");
    content.push_str("</div>\n\n");

    content.push_str("<button type=\"submit\" class=\"btn\">Sign in</button>\n");
    content.push_str("</form>\n");
    content.push_str("</div>");

    html_page("Sign In", &content)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
