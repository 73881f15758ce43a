//! Login form discovery and submission planning.
//!
//! Parsing is synchronous so no `scraper::Html` is held across an await.

use scraper::{ElementRef, Html};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::extract::rules::parse_selector;
use crate::security::SiteCredentials;
use crate::types::target::LoginConfig;

/// How a filled form is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStrategy {
    /// POST to the form's resolved `action`
    FormAction,
    /// POST to the configured submit URL
    ExplicitSubmitUrl,
}

impl std::fmt::Display for SubmitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitStrategy::FormAction => f.write_str("form action"),
            SubmitStrategy::ExplicitSubmitUrl => f.write_str("explicit submit URL"),
        }
    }
}

/// A filled-in login form, ready to post.
#[derive(Debug, Clone)]
pub struct LoginForm {
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

impl LoginForm {
    /// Locate the form on the login page and fill it.
    ///
    /// Every named input is collected (hidden tokens included), configured
    /// fixed values are applied, then the credential fields are set.
    pub fn from_page(
        html: &str,
        page_url: &Url,
        login: &LoginConfig,
        credentials: &SiteCredentials,
    ) -> AuthResult<Self> {
        let selector = parse_selector(&login.form_selector)
            .map_err(|_| AuthError::FormNotFound {
                url: page_url.to_string(),
            })?;
        let document = Html::parse_document(html);
        let form = document
            .select(&selector)
            .next()
            .ok_or_else(|| AuthError::FormNotFound {
                url: page_url.to_string(),
            })?;

        let action = form
            .value()
            .attr("action")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .and_then(|a| page_url.join(a).ok())
            .unwrap_or_else(|| page_url.clone());

        let mut fields = collect_inputs(form);
        for (name, value) in &login.extra_fields {
            set_field(&mut fields, name, value);
        }
        set_field(&mut fields, &login.username_field, &credentials.username);
        set_field(&mut fields, &login.password_field, credentials.password.expose());

        Ok(Self { action, fields })
    }

    /// Submission attempts in order. The explicit URL is skipped when it is
    /// missing, unparsable, or the same as the form action.
    pub fn strategies(&self, login: &LoginConfig) -> Vec<(SubmitStrategy, Url)> {
        let mut plan = vec![(SubmitStrategy::FormAction, self.action.clone())];
        if let Some(url) = login.submit_url.as_deref().and_then(|u| Url::parse(u).ok()) {
            if url != self.action {
                plan.push((SubmitStrategy::ExplicitSubmitUrl, url));
            }
        }
        plan
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

fn collect_inputs(form: ElementRef<'_>) -> Vec<(String, String)> {
    let Ok(inputs) = scraper::Selector::parse("input[name], select[name], textarea[name]") else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for input in form.select(&inputs) {
        let el = input.value();
        let Some(name) = el.attr("name") else {
            continue;
        };
        let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
        match kind.as_str() {
            "submit" | "button" | "image" | "reset" | "file" => continue,
            "checkbox" | "radio" if el.attr("checked").is_none() => continue,
            _ => {}
        }
        let value = match el.name() {
            "textarea" => input.text().collect::<String>(),
            "select" => selected_option(input),
            _ => el.attr("value").unwrap_or("").to_string(),
        };
        fields.push((name.to_string(), value));
    }
    fields
}

fn selected_option(select: ElementRef<'_>) -> String {
    let Ok(options) = scraper::Selector::parse("option") else {
        return String::new();
    };
    let mut first = None;
    for option in select.select(&options) {
        let value = option
            .value()
            .attr("value")
            .map(str::to_string)
            .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
        if option.value().attr("selected").is_some() {
            return value;
        }
        first.get_or_insert(value);
    }
    first.unwrap_or_default()
}

fn set_field(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    match fields.iter_mut().find(|(n, _)| n == name) {
        Some(field) => field.1 = value.to_string(),
        None => fields.push((name.to_string(), value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const LOGIN_PAGE: &str = r#"
<html><body>
  <form name="Search" action="/search"><input name="q"></form>
  <form name="Logon" action="/shop/Logon" method="post">
    <input type="hidden" name="storeId" value="">
    <input type="hidden" name="reLogonURL" value="LogonForm">
    <input type="text" name="logonId">
    <input type="password" name="logonPassword">
    <input type="checkbox" name="rememberMe" value="true">
    <select name="langId"><option value="-1" selected>English</option><option value="-2">French</option></select>
    <input type="submit" name="go" value="Sign In">
  </form>
</body></html>
"#;

    fn login(submit_url: Option<&str>) -> LoginConfig {
        let mut extra_fields = BTreeMap::new();
        extra_fields.insert("storeId".to_string(), "10151".to_string());
        LoginConfig {
            login_url: "https://dealer.example.com/shop/LogonForm".into(),
            form_selector: "form[name=\"Logon\"]".into(),
            username_field: "logonId".into(),
            password_field: "logonPassword".into(),
            username_env: "U".into(),
            password_env: "P".into(),
            submit_url: submit_url.map(str::to_string),
            extra_fields,
            login_markers: vec!["logonform".into()],
            session_file: None,
            probe_url: None,
        }
    }

    fn page_url() -> Url {
        Url::parse("https://dealer.example.com/shop/LogonForm").unwrap()
    }

    #[test]
    fn test_form_is_filled() {
        let creds = SiteCredentials::new("installer", "secret");
        let form = LoginForm::from_page(LOGIN_PAGE, &page_url(), &login(None), &creds).unwrap();

        assert_eq!(form.action.as_str(), "https://dealer.example.com/shop/Logon");
        assert_eq!(form.field("storeId"), Some("10151"));
        assert_eq!(form.field("reLogonURL"), Some("LogonForm"));
        assert_eq!(form.field("logonId"), Some("installer"));
        assert_eq!(form.field("logonPassword"), Some("secret"));
        assert_eq!(form.field("langId"), Some("-1"));
        assert_eq!(form.field("rememberMe"), None);
        assert_eq!(form.field("go"), None);
        assert_eq!(form.field("q"), None);
    }

    #[test]
    fn test_missing_form() {
        let creds = SiteCredentials::new("installer", "secret");
        let err = LoginForm::from_page("<html></html>", &page_url(), &login(None), &creds)
            .unwrap_err();
        assert!(matches!(err, AuthError::FormNotFound { .. }));
    }

    #[test]
    fn test_strategies_order() {
        let creds = SiteCredentials::new("installer", "secret");
        let cfg = login(Some("https://dealer.example.com/shop/AjaxLogon"));
        let form = LoginForm::from_page(LOGIN_PAGE, &page_url(), &cfg, &creds).unwrap();
        let plan = form.strategies(&cfg);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].0, SubmitStrategy::FormAction);
        assert_eq!(plan[1].0, SubmitStrategy::ExplicitSubmitUrl);
        assert_eq!(plan[1].1.as_str(), "https://dealer.example.com/shop/AjaxLogon");
    }

    #[test]
    fn test_same_submit_url_not_repeated() {
        let creds = SiteCredentials::new("installer", "secret");
        let cfg = login(Some("https://dealer.example.com/shop/Logon"));
        let form = LoginForm::from_page(LOGIN_PAGE, &page_url(), &cfg, &creds).unwrap();
        assert_eq!(form.strategies(&cfg).len(), 1);
    }
}
