//! Minimal inline HTML pages. There is deliberately no template engine; each
//! page is a small string assembled here, with user-supplied text escaped.

use crate::storage::User;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{} · Confide</title></head>\n<body>\n<nav><a href=\"/\">Home</a> · <a href=\"/secrets\">Secrets</a> · <a href=\"/submit\">Submit</a> · <a href=\"/login\">Login</a> · <a href=\"/register\">Register</a> · <a href=\"/logout\">Logout</a></nav>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    )
}

pub fn home() -> String {
    layout(
        "Welcome",
        "<h1>Confide</h1>\n<p>A place to leave a secret, anonymously, next to everyone else's.</p>\n<p><a href=\"/register\">Register</a> or <a href=\"/login\">log in</a> to leave yours.</p>",
    )
}

pub fn login() -> String {
    layout(
        "Login",
        "<h1>Login</h1>\n<form method=\"post\" action=\"/login\">\n<p><label>Username <input type=\"text\" name=\"username\" autofocus></label></p>\n<p><label>Password <input type=\"password\" name=\"password\"></label></p>\n<p><button type=\"submit\">Login</button></p>\n</form>\n<p><a href=\"/auth/google\">Sign in with Google</a></p>",
    )
}

pub fn register() -> String {
    layout(
        "Register",
        "<h1>Register</h1>\n<form method=\"post\" action=\"/register\">\n<p><label>Username <input type=\"text\" name=\"username\" autofocus></label></p>\n<p><label>Password <input type=\"password\" name=\"password\"></label></p>\n<p><button type=\"submit\">Register</button></p>\n</form>\n<p><a href=\"/auth/google\">Sign up with Google</a></p>",
    )
}

pub fn submit() -> String {
    layout(
        "Submit a secret",
        "<h1>Submit a secret</h1>\n<form method=\"post\" action=\"/submit\">\n<p><textarea name=\"secret\" rows=\"4\" cols=\"60\" autofocus></textarea></p>\n<p><button type=\"submit\">Share</button></p>\n</form>",
    )
}

pub fn secrets(users: &[User]) -> String {
    let mut body = String::from("<h1>Secrets</h1>\n");
    if users.is_empty() {
        body.push_str("<p>No secrets yet. <a href=\"/submit\">Be the first.</a></p>");
    } else {
        body.push_str("<ul>\n");
        for user in users {
            if let Some(secret) = user.secret.as_deref() {
                body.push_str(&format!("<li>{}</li>\n", escape(secret)));
            }
        }
        body.push_str("</ul>");
    }
    layout("Secrets", &body)
}
