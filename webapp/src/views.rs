//! HTML views rendered from templates embedded in the binary.

use crate::error::AppError;
use crate::identity::IdentityContext;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use std::collections::BTreeMap;
use tera::{Context, Tera};

const TPL_BASE: &str = include_str!("templates/base.html");
const TPL_INDEX: &str = include_str!("templates/index.html");
const TPL_UNAUTHORIZED: &str = include_str!("templates/unauthorized.html");
const TPL_TOKEN_DETAILS: &str = include_str!("templates/token_details.html");
const TPL_GROUPS: &str = include_str!("templates/groups.html");

/// Page renderer. Template names end in `.html` so tera escapes every value.
pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> Result<Self, AppError> {
        let mut tera = Tera::default();

        // base first, the others extend it
        tera.add_raw_template("base.html", TPL_BASE)?;
        tera.add_raw_template("index.html", TPL_INDEX)?;
        tera.add_raw_template("unauthorized.html", TPL_UNAUTHORIZED)?;
        tera.add_raw_template("token_details.html", TPL_TOKEN_DETAILS)?;
        tera.add_raw_template("groups.html", TPL_GROUPS)?;

        Ok(Self { tera })
    }

    fn render(&self, template: &str, context: &Context) -> Result<Html<String>, AppError> {
        Ok(Html(self.tera.render(template, context)?))
    }

    pub fn index(&self, identity: &IdentityContext) -> Result<Html<String>, AppError> {
        let mut context = Context::new();
        context.insert("authenticated", &identity.is_authenticated());
        context.insert("username", identity.username().unwrap_or_default());
        self.render("index.html", &context)
    }

    pub fn unauthorized(&self) -> Result<Html<String>, AppError> {
        self.render("unauthorized.html", &Context::new())
    }

    /// 401 page; falls back to the plain error body if the template fails
    pub fn unauthorized_response(&self) -> Response {
        match self.unauthorized() {
            Ok(page) => (StatusCode::UNAUTHORIZED, page).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Could not render 401 page");
                AppError::Unauthorized.into_response()
            }
        }
    }

    /// `claims` empty and `authenticated` false renders the sign-in hint
    pub fn token_details(
        &self,
        authenticated: bool,
        claims: &BTreeMap<String, String>,
    ) -> Result<Html<String>, AppError> {
        let mut context = Context::new();
        context.insert("authenticated", &authenticated);
        context.insert("claims", claims);
        self.render("token_details.html", &context)
    }

    pub fn groups(&self, identity: &IdentityContext) -> Result<Html<String>, AppError> {
        let mut context = Context::new();
        context.insert("groups_overage", &identity.has_groups_overage());
        context.insert("group_ids", identity.group_ids());
        self.render("groups.html", &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views() -> Views {
        Views::new().unwrap()
    }

    #[test]
    fn test_index_anonymous_offers_sign_in() {
        let Html(page) = views().index(&IdentityContext::default()).unwrap();
        assert!(page.contains("/auth/sign_in"));
        assert!(!page.contains("/auth/sign_out"));
        assert!(page.contains("<nav><a href=\"/\">Home</a></nav>"));
    }

    #[test]
    fn test_token_details_escapes_values() {
        let mut claims = BTreeMap::new();
        claims.insert("name".to_string(), "<b>Jane</b>".to_string());
        let Html(page) = views().token_details(true, &claims).unwrap();
        assert!(page.contains("<td>name</td><td>&lt;b&gt;Jane"));
        assert!(!page.contains("<b>Jane"));
    }

    #[test]
    fn test_token_details_without_session() {
        let Html(page) = views().token_details(false, &BTreeMap::new()).unwrap();
        assert!(page.contains("No id token in this session"));
        assert!(!page.contains("<table>"));
    }

    #[test]
    fn test_groups_without_membership() {
        let Html(page) = views().groups(&IdentityContext::default()).unwrap();
        assert!(page.contains("No group memberships."));
    }

    #[test]
    fn test_unauthorized_response() {
        let response = views().unauthorized_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
