//! Human-facing invitation link.
//!
//! Emails carry a link to this endpoint; it renders HTML outcomes instead of
//! structured error payloads and reuses the same accept operation as the API.

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::Html,
};
use serde::Deserialize;

use orglicense_core::AppError;

use crate::middleware::AuthState;

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub token: Option<String>,
}

pub async fn accept_via_link(
    Extension(auth): Extension<AuthState>,
    Query(query): Query<LinkQuery>,
    headers: HeaderMap,
) -> Html<String> {
    let Some(token) = query.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return Html(error_page("Invalid Request", "No invitation token provided."));
    };

    let user = match auth.authenticate(&headers).await {
        Ok(current) => current.0,
        Err(_) => return Html(login_required_page(token)),
    };

    match auth.services.invitations.accept(token, &user).await {
        Ok((membership, organization)) => Html(success_page(
            &organization.name,
            membership.role.as_str(),
        )),
        Err(AppError::NotFound { detail, .. }) => Html(error_page(
            "Invitation Not Found",
            &format!("{detail}. This invitation is invalid or has already been used."),
        )),
        Err(AppError::BadRequest { detail, .. }) => {
            Html(error_page("Cannot Accept Invitation", &detail))
        }
        Err(AppError::Forbidden { detail, .. }) => Html(error_page("Access Denied", &detail)),
        Err(_) => Html(error_page(
            "Something Went Wrong",
            "An unexpected error occurred. Please try again later.",
        )),
    }
}

const STYLE: &str = "\
body { font-family: Arial, sans-serif; background-color: #f5f5f5; margin: 0; padding: 40px; }\
.container { max-width: 500px; margin: 0 auto; background: white; border-radius: 10px; \
padding: 40px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); text-align: center; }\
.icon { font-size: 60px; }\
h1 { color: #333; margin-top: 20px; }\
p { color: #666; font-size: 16px; }\
.org-name { color: #4A90D9; font-weight: bold; }\
.role { background: #e3f2fd; padding: 5px 15px; border-radius: 20px; display: inline-block; }\
.token-box { background: #f5f5f5; padding: 15px; border-radius: 5px; margin: 20px 0; \
word-break: break-all; font-family: monospace; font-size: 12px; }";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n<style>{STYLE}</style>\n\
         </head>\n<body>\n<div class='container'>\n{body}\n</div>\n</body>\n</html>"
    )
}

fn success_page(organization_name: &str, role: &str) -> String {
    let organization_name = escape(organization_name);
    page(
        "Invitation Accepted",
        &format!(
            "<div class='icon' style='color:#4CAF50'>&#10003;</div>\
             <h1>Welcome!</h1>\
             <p>You have successfully joined <span class='org-name'>{organization_name}</span></p>\
             <p class='role'>Role: {role}</p>\
             <p style='margin-top:30px;font-size:14px;color:#888'>You can now close this page.</p>"
        ),
    )
}

fn login_required_page(token: &str) -> String {
    let token = escape(token);
    page(
        "Login Required",
        &format!(
            "<div class='icon' style='color:#FF9800'>&#128274;</div>\
             <h1>Login Required</h1>\
             <p>To accept this invitation, you need to be logged in.</p>\
             <p style='font-size:14px;color:#888'>Log in, then accept via \
             <code>POST /api/memberships/invitations/accept</code> with your token:</p>\
             <div class='token-box'>{token}</div>"
        ),
    )
}

fn error_page(title: &str, message: &str) -> String {
    let message = escape(message);
    page(
        title,
        &format!(
            "<div class='icon' style='color:#f44336'>&#10007;</div>\
             <h1>{title}</h1>\
             <p>{message}</p>"
        ),
    )
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_escape_interpolated_values() {
        let html = success_page("<script>alert(1)</script>", "Member");
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn login_page_carries_the_token() {
        let html = login_required_page("tok-123");
        assert!(html.contains("tok-123"));
        assert!(html.contains("Login Required"));
    }
}
