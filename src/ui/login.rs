use std::io::{self, BufRead, Write};

use artua::api::ApiClient;
use artua::api::models::Registration;
use artua::error::{Error, Result};
use artua::session::Session;

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

pub fn prompt(label: &str) -> Result<String> {
    let mut out = io::stdout();
    write!(out, "{label}: ")?;
    out.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => prompt(label),
    }
}

/// Password rules enforced before registration is attempted.
pub fn validate_password(password: &str) -> std::result::Result<(), &'static str> {
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err("password must contain at least one special character (!@#$%^&*(),.?\":{}|<>)");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("password must contain at least one uppercase letter");
    }
    Ok(())
}

pub async fn login(session: &Session, api: &ApiClient, email: Option<String>, password: Option<String>) -> Result<()> {
    let email = value_or_prompt(email, "Email")?;
    let password = value_or_prompt(password, "Password")?;
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::Rejected("please enter email and password".into()));
    }
    let token = api.login(email.trim(), &password).await?;
    session.sign_in(token)?;
    match session.current_user() {
        Some(user) => println!("Signed in as {}.", user.display_name()),
        None => println!("Signed in."),
    }
    Ok(())
}

pub async fn register(session: &Session, api: &ApiClient, mut form: Registration) -> Result<()> {
    form.first_name = value_or_prompt(Some(form.first_name), "First name")?;
    form.last_name = value_or_prompt(Some(form.last_name), "Last name")?;
    form.email = value_or_prompt(Some(form.email), "Email")?;
    form.password = value_or_prompt(Some(form.password), "Password")?;
    validate_password(&form.password).map_err(|e| Error::Rejected(e.into()))?;

    let token = api.register(&form).await?;
    session.sign_in(token)?;
    println!("Registered and signed in.");
    Ok(())
}

/// Prompt for credentials when there is no session yet.
pub async fn ensure_signed_in(session: &Session, api: &ApiClient) -> Result<()> {
    if session.is_signed_in() {
        return Ok(());
    }
    println!("Please sign in.");
    login(session, api, None, None).await
}
